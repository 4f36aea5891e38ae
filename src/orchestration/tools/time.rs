// Time calculator - UTC time arithmetic on RFC 3339 timestamps

use super::{Capability, Tool, ToolCapability, ToolError, optional_str, required_str};
use crate::orchestration::types::JsonObject;
use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::json;

pub struct TimeCalculatorTool;

impl TimeCalculatorTool {
    pub fn new() -> Self {
        Self
    }

    fn now(&self) -> serde_json::Value {
        json!({ "now": format_time(Utc::now()) })
    }

    fn shift(&self, parameters: &JsonObject, forward: bool) -> Result<serde_json::Value, ToolError> {
        let base = match optional_str(parameters, "time") {
            Some(time) => parse_time(time)?,
            None => Utc::now(),
        };
        let duration = match parameters.get("duration") {
            Some(serde_json::Value::Number(seconds)) => seconds
                .as_i64()
                .and_then(Duration::try_seconds)
                .ok_or_else(|| {
                    ToolError::InvalidParameters(format!("duration {} is not a usable number of seconds", seconds))
                })?,
            Some(serde_json::Value::String(text)) => parse_duration(text)?,
            _ => return Err(ToolError::InvalidParameters("missing parameter duration".to_string())),
        };

        let result = if forward {
            base.checked_add_signed(duration)
        } else {
            base.checked_sub_signed(duration)
        }
        .ok_or_else(|| ToolError::ProcessingError("time out of range".to_string()))?;

        Ok(json!({
            "time": format_time(base),
            "duration_seconds": duration.num_seconds(),
            "result": format_time(result),
        }))
    }

    fn difference(&self, parameters: &JsonObject) -> Result<serde_json::Value, ToolError> {
        let first = parse_time(required_str(parameters, "time1")?)?;
        let second = parse_time(required_str(parameters, "time2")?)?;
        let unit = optional_str(parameters, "unit").unwrap_or("seconds");

        let seconds = (second - first).num_milliseconds().abs() as f64 / 1000.0;
        let value = match unit {
            "seconds" => seconds,
            "minutes" => seconds / 60.0,
            "hours" => seconds / 3600.0,
            "days" => seconds / 86400.0,
            other => return Err(ToolError::InvalidParameters(format!("unsupported time unit: {}", other))),
        };

        Ok(json!({
            "time1": format_time(first),
            "time2": format_time(second),
            "difference": value,
            "unit": unit,
        }))
    }
}

impl Default for TimeCalculatorTool {
    fn default() -> Self {
        Self::new()
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_time(text: &str) -> Result<DateTime<Utc>, ToolError> {
    DateTime::parse_from_rfc3339(text.trim())
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| ToolError::InvalidParameters(format!("could not parse time {}: {}", text, e)))
}

/// `HH:MM`, `HH:MM:SS`, a plain number of seconds or `<n> <unit>`
/// such as `90 minutes`
fn parse_duration(text: &str) -> Result<Duration, ToolError> {
    let invalid = || ToolError::InvalidParameters(format!("could not parse duration {}", text));
    let text = text.trim();

    if let Ok(seconds) = text.parse::<i64>() {
        return Duration::try_seconds(seconds).ok_or_else(invalid);
    }

    if let Some((amount, unit)) = text.split_once(char::is_whitespace) {
        let amount = amount.parse::<i64>().map_err(|_| invalid())?;
        let unit = unit.trim().to_ascii_lowercase();
        let scale = match unit.trim_end_matches('s') {
            "sec" | "second" => 1,
            "min" | "minute" => 60,
            "hour" | "hr" => 3600,
            "day" => 86_400,
            _ => return Err(invalid()),
        };
        return amount
            .checked_mul(scale)
            .and_then(Duration::try_seconds)
            .ok_or_else(invalid);
    }

    let parts: Vec<&str> = text.split(':').collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(invalid());
    }
    let mut fields = Vec::with_capacity(3);
    for part in &parts {
        fields.push(part.parse::<u32>().map_err(|_| invalid())?);
    }
    let hours = fields[0] as i64;
    let minutes = fields[1] as i64;
    let seconds = fields.get(2).copied().unwrap_or(0) as i64;
    if minutes >= 60 || seconds >= 60 {
        return Err(invalid());
    }

    hours
        .checked_mul(3600)
        .and_then(|total| total.checked_add(minutes * 60 + seconds))
        .and_then(Duration::try_seconds)
        .ok_or_else(invalid)
}

/// Operation named by the parameters, or inferred from which placeholders
/// the routed example filled in
fn operation(parameters: &JsonObject) -> &str {
    if let Some(operation) = optional_str(parameters, "operation") {
        return operation;
    }
    if parameters.contains_key("time1") && parameters.contains_key("time2") {
        return "difference";
    }
    if parameters.contains_key("duration") {
        let query = optional_str(parameters, "query").unwrap_or_default().to_ascii_lowercase();
        let subtract = query
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| matches!(word, "subtract" | "minus" | "before" | "ago" | "earlier"));
        return if subtract { "subtract" } else { "add" };
    }
    "now"
}

#[async_trait]
impl Tool for TimeCalculatorTool {
    async fn execute(&self, parameters: &JsonObject) -> Result<serde_json::Value, ToolError> {
        match operation(parameters) {
            "now" => Ok(self.now()),
            "add" => self.shift(parameters, true),
            "subtract" => self.shift(parameters, false),
            "difference" => self.difference(parameters),
            other => Err(ToolError::InvalidParameters(format!("unknown operation {}", other))),
        }
    }

    fn tool_id(&self) -> &str {
        "time_calculator"
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::new("Time Calculator", "Current UTC time and time arithmetic")
            .with_category("time")
            .with_capabilities([Capability::Time])
            .with_keywords(["time", "clock", "date", "utc", "duration", "timestamp"])
            .with_examples([
                "What time is it",
                "What is the current time",
                "Current UTC time",
                "Add {duration} to {time}",
                "Subtract {duration} from {time}",
                "Time between {time1} and {time2}",
            ])
            .with_priority(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters(value: serde_json::Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("01:30").unwrap(), Duration::seconds(5400));
        assert_eq!(parse_duration("00:00:45").unwrap(), Duration::seconds(45));
        assert_eq!(parse_duration("90").unwrap(), Duration::seconds(90));
        assert!(parse_duration("1:75").is_err());
        assert!(parse_duration("soon").is_err());
        assert_eq!(parse_duration("90 minutes").unwrap(), Duration::seconds(5400));
        assert_eq!(parse_duration("2 Days").unwrap(), Duration::seconds(172_800));
        assert!(parse_duration("3 fortnights").is_err());
    }

    #[tokio::test]
    async fn test_out_of_range_duration_is_invalid_parameters() {
        let tool = TimeCalculatorTool::new();
        for duration in [
            json!("9000000000000000000"),
            json!(9_000_000_000_000_000_000i64),
            json!("9000000000000000000 days"),
        ] {
            let err = tool
                .execute(&parameters(json!({
                    "operation": "add",
                    "time": "2024-01-01T00:00:00Z",
                    "duration": duration
                })))
                .await
                .unwrap_err();
            assert!(matches!(err, ToolError::InvalidParameters(_)), "{:?}", err);
        }
    }

    #[test]
    fn test_operation_is_inferred_from_parameters() {
        assert_eq!(operation(&parameters(json!({"query": "What time is it"}))), "now");
        assert_eq!(
            operation(&parameters(json!({"query": "Add 5 minutes to x", "duration": "5 minutes"}))),
            "add"
        );
        assert_eq!(
            operation(&parameters(json!({"query": "Subtract 5 minutes from x", "duration": "5 minutes"}))),
            "subtract"
        );
        assert_eq!(operation(&parameters(json!({"time1": "a", "time2": "b"}))), "difference");
        assert_eq!(operation(&parameters(json!({"operation": "add", "time1": "a", "time2": "b"}))), "add");
    }

    #[tokio::test]
    async fn test_add_and_subtract() {
        let tool = TimeCalculatorTool::new();
        let added = tool
            .execute(&parameters(json!({
                "operation": "add",
                "time": "2024-01-01T23:30:00Z",
                "duration": "01:00"
            })))
            .await
            .unwrap();
        assert_eq!(added["result"], "2024-01-02T00:30:00Z");

        let subtracted = tool
            .execute(&parameters(json!({
                "operation": "subtract",
                "time": "2024-01-01T00:00:00+02:00",
                "duration": 60
            })))
            .await
            .unwrap();
        assert_eq!(subtracted["result"], "2023-12-31T21:59:00Z");
    }

    #[tokio::test]
    async fn test_difference() {
        let tool = TimeCalculatorTool::new();
        let result = tool
            .execute(&parameters(json!({
                "operation": "difference",
                "time1": "2024-01-02T00:00:00Z",
                "time2": "2024-01-01T12:00:00Z",
                "unit": "hours"
            })))
            .await
            .unwrap();
        assert_eq!(result["difference"], 12.0);
    }

    #[tokio::test]
    async fn test_default_operation_is_now() {
        let tool = TimeCalculatorTool::new();
        let result = tool.execute(&parameters(json!({"query": "what time is it"}))).await.unwrap();
        let now = result["now"].as_str().unwrap();
        assert!(parse_time(now).is_ok());
    }

    #[tokio::test]
    async fn test_bad_time_is_invalid_parameters() {
        let tool = TimeCalculatorTool::new();
        let err = tool
            .execute(&parameters(json!({"operation": "add", "time": "yesterday", "duration": 5})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }
}
