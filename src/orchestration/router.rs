// Smart router - picks a tool for a query and executes it

use super::retry::{RetriesExhausted, RetryPolicy};
use super::tools::{Capability, Tool, ToolCapability, ToolError};
use super::types::JsonObject;
use regex::Regex;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("No matching tool found for query: {0}")]
    NoMatchingTool(String),

    #[error("Tool {0} not found")]
    ToolNotFound(String),

    #[error("Tool {tool_id} missing dependencies: {}", .missing.join(", "))]
    MissingDependencies { tool_id: String, missing: Vec<String> },

    #[error("Tool {tool_id} timed out after {timeout:?}")]
    Timeout { tool_id: String, timeout: Duration },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Max retries exceeded")]
    MaxRetriesExceeded,
}

impl From<RetriesExhausted> for RouterError {
    fn from(_: RetriesExhausted) -> Self {
        RouterError::MaxRetriesExceeded
    }
}

/// A routed call to one tool
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub tool_id: String,
    pub parameters: JsonObject,
    /// Extra tools that must be registered, on top of the tool's own dependencies
    pub dependencies: Vec<String>,
    pub timeout: Option<Duration>,
    /// Total attempts
    pub retry_count: u32,
}

impl ToolRequest {
    pub fn new(tool_id: impl Into<String>, parameters: JsonObject) -> Self {
        Self {
            tool_id: tool_id.into(),
            parameters,
            dependencies: Vec::new(),
            timeout: None,
            retry_count: 1,
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionMetrics {
    pub execution_time: f64,
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResponse {
    pub tool_id: String,
    pub result: serde_json::Value,
    pub metrics: ExecutionMetrics,
}

/// Running totals for one tool
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolMetrics {
    pub total_executions: u64,
    pub total_time: f64,
    pub average_time: f64,
}

impl ToolMetrics {
    fn record(&mut self, execution_time: f64) {
        self.total_executions += 1;
        self.total_time += execution_time;
        self.average_time = self.total_time / self.total_executions as f64;
    }
}

struct CompiledPattern {
    regex: Regex,
    source_len: usize,
}

struct RegisteredCapability {
    tool_id: String,
    capability: ToolCapability,
    patterns: Vec<CompiledPattern>,
    keywords: Vec<Regex>,
}

/// Routes natural-language queries to registered tools.
///
/// Example patterns win over keywords. Among matching patterns the highest
/// priority wins, then the longest match, then the shorter example, then
/// the earliest registration. Keyword scores are matches times priority,
/// ties going to the earliest registration.
pub struct SmartRouter {
    handlers: HashMap<String, Arc<dyn Tool>>,
    dependencies: HashMap<String, BTreeSet<String>>,
    capabilities: Vec<RegisteredCapability>,
    metrics: Mutex<HashMap<String, ToolMetrics>>,
    retry_backoff: f64,
}

impl SmartRouter {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            dependencies: HashMap::new(),
            capabilities: Vec::new(),
            metrics: Mutex::new(HashMap::new()),
            retry_backoff: 1.0,
        }
    }

    /// Backoff factor in seconds between tool retries
    pub fn with_retry_backoff(mut self, factor: f64) -> Self {
        self.retry_backoff = factor;
        self
    }

    pub fn register_handler(&mut self, tool_id: impl Into<String>, tool: Arc<dyn Tool>) {
        let tool_id = tool_id.into();
        tracing::info!("Registered handler for tool {}", tool_id);
        self.handlers.insert(tool_id, tool);
    }

    pub fn register_dependencies(&mut self, tool_id: impl Into<String>, dependencies: Vec<String>) {
        let tool_id = tool_id.into();
        tracing::debug!("Registered dependencies for tool {}: {:?}", tool_id, dependencies);
        self.dependencies.insert(tool_id, dependencies.into_iter().collect());
    }

    /// Handler, capability and dependencies in one call
    pub fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        let tool_id = tool.tool_id().to_string();
        let dependencies = tool.dependencies();
        if !dependencies.is_empty() {
            self.register_dependencies(tool_id.as_str(), dependencies);
        }
        self.register_capability(tool_id.as_str(), tool.capability());
        self.register_handler(tool_id, tool);
    }

    /// Record a routing descriptor. Re-registering a tool replaces its
    /// descriptor but keeps its original position.
    pub fn register_capability(&mut self, tool_id: impl Into<String>, capability: ToolCapability) {
        let tool_id = tool_id.into();
        let capability = capability.normalized();

        let patterns = capability
            .examples
            .iter()
            .filter_map(|example| match compile_example(example) {
                Ok(regex) => Some(CompiledPattern {
                    regex,
                    source_len: example.len(),
                }),
                Err(e) => {
                    tracing::warn!("Skipping example {:?} for {}: {}", example, tool_id, e);
                    None
                }
            })
            .collect();

        let keywords = capability
            .keywords
            .iter()
            .filter_map(|keyword| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(keyword.trim()))).ok())
            .collect();

        let entry = RegisteredCapability {
            tool_id: tool_id.clone(),
            capability,
            patterns,
            keywords,
        };

        match self.capabilities.iter_mut().find(|c| c.tool_id == tool_id) {
            Some(existing) => *existing = entry,
            None => self.capabilities.push(entry),
        }
        tracing::debug!("Registered capability for tool {}", tool_id);
    }

    pub fn has_handler(&self, tool_id: &str) -> bool {
        self.handlers.contains_key(tool_id)
    }

    pub fn tool_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Registered descriptors in registration order
    pub fn capabilities(&self) -> impl Iterator<Item = (&str, &ToolCapability)> {
        self.capabilities.iter().map(|c| (c.tool_id.as_str(), &c.capability))
    }

    pub fn capability(&self, tool_id: &str) -> Option<&ToolCapability> {
        self.capabilities
            .iter()
            .find(|c| c.tool_id == tool_id)
            .map(|c| &c.capability)
    }

    /// Pick a tool for `query`. Parameters always include `query`.
    pub fn route_request(&self, query: &str) -> Result<ToolRequest, RouterError> {
        tracing::debug!("Routing query: {}", query);
        let mut parameters = JsonObject::new();
        parameters.insert("query".to_string(), serde_json::Value::String(query.to_string()));

        let mut sequence = 0usize;
        let mut best = None;
        for entry in &self.capabilities {
            for pattern in &entry.patterns {
                sequence += 1;
                let Some(captures) = pattern.regex.captures(query) else {
                    continue;
                };
                let matched = captures.get(0).map_or(0, |m| m.len());
                let key = (
                    entry.capability.priority,
                    matched,
                    Reverse(pattern.source_len),
                    Reverse(sequence),
                );
                if best.as_ref().is_none_or(|(best_key, _, _, _)| key > *best_key) {
                    best = Some((key, entry, pattern, captures));
                }
            }
        }

        if let Some((_, entry, pattern, captures)) = best {
            for name in pattern.regex.capture_names().flatten() {
                if let Some(value) = captures.name(name) {
                    parameters.insert(name.to_string(), serde_json::Value::String(value.as_str().trim().to_string()));
                }
            }
            tracing::debug!("Selected tool {} by pattern", entry.tool_id);
            return Ok(ToolRequest::new(entry.tool_id.as_str(), parameters));
        }

        tracing::debug!("No pattern matches found, falling back to keyword matching");
        let mut best: Option<(u32, &RegisteredCapability)> = None;
        for entry in &self.capabilities {
            let matched = entry.keywords.iter().filter(|k| k.is_match(query)).count() as u32;
            if matched == 0 {
                continue;
            }
            let score = matched * entry.capability.priority as u32;
            if best.is_none_or(|(best_score, _)| score > best_score) {
                best = Some((score, entry));
            }
        }

        match best {
            Some((score, entry)) => {
                tracing::debug!("Selected tool {} by keywords, score {}", entry.tool_id, score);
                Ok(ToolRequest::new(entry.tool_id.as_str(), parameters))
            }
            None => {
                tracing::warn!("No matching tool found for query: {}", query);
                Err(RouterError::NoMatchingTool(query.to_string()))
            }
        }
    }

    /// First registered tool that advertises `capability`
    pub fn route_capability(&self, capability: &Capability) -> Result<String, RouterError> {
        self.capabilities
            .iter()
            .find(|c| c.capability.has_capability(capability))
            .map(|c| c.tool_id.clone())
            .ok_or_else(|| RouterError::NoMatchingTool(capability.to_string()))
    }

    pub async fn execute_tool(&self, request: ToolRequest) -> Result<ToolResponse, RouterError> {
        let result = self.run_tool(&request).await;
        if let Err(e) = &result {
            tracing::error!("Tool {} execution failed: {}", request.tool_id, e);
        }
        result
    }

    async fn run_tool(&self, request: &ToolRequest) -> Result<ToolResponse, RouterError> {
        let tool = self
            .handlers
            .get(&request.tool_id)
            .cloned()
            .ok_or_else(|| RouterError::ToolNotFound(request.tool_id.clone()))?;
        self.check_dependencies(request)?;

        let policy = RetryPolicy::new(request.retry_count.max(1), self.retry_backoff, 30.0);
        let tool_id = request.tool_id.as_str();
        let parameters = &request.parameters;
        let timeout = request.timeout;

        let (result, metrics) = policy
            .run(tool_id, |attempt| {
                let tool = tool.clone();
                async move {
                    let started = Instant::now();
                    let result = match timeout {
                        Some(limit) => tokio::time::timeout(limit, tool.execute(parameters))
                            .await
                            .map_err(|_| RouterError::Timeout {
                                tool_id: tool_id.to_string(),
                                timeout: limit,
                            })??,
                        None => tool.execute(parameters).await?,
                    };
                    let metrics = ExecutionMetrics {
                        execution_time: started.elapsed().as_secs_f64(),
                        attempt,
                    };
                    Ok::<_, RouterError>((result, metrics))
                }
            })
            .await?;

        self.metrics
            .lock()
            .await
            .entry(tool_id.to_string())
            .or_default()
            .record(metrics.execution_time);

        Ok(ToolResponse {
            tool_id: tool_id.to_string(),
            result,
            metrics,
        })
    }

    fn check_dependencies(&self, request: &ToolRequest) -> Result<(), RouterError> {
        let registered = self.dependencies.get(&request.tool_id).into_iter().flatten();
        let missing: BTreeSet<String> = registered
            .chain(request.dependencies.iter())
            .filter(|dependency| !self.handlers.contains_key(dependency.as_str()))
            .cloned()
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(RouterError::MissingDependencies {
                tool_id: request.tool_id.clone(),
                missing: missing.into_iter().collect(),
            })
        }
    }

    /// Route `query` and execute the chosen tool. Tool errors come back
    /// unchanged inside `RouterError::Tool`.
    pub async fn execute_query(&self, query: &str) -> Result<ToolResponse, RouterError> {
        let request = self.route_request(query)?;
        self.execute_tool(request).await
    }

    pub async fn get_metrics(&self, tool_id: &str) -> Option<ToolMetrics> {
        self.metrics.lock().await.get(tool_id).cloned()
    }

    pub async fn all_metrics(&self) -> HashMap<String, ToolMetrics> {
        self.metrics.lock().await.clone()
    }
}

impl Default for SmartRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn an example phrasing into a case-insensitive search pattern.
///
/// `{name}` and `<name>` become capture groups named after the placeholder.
/// Placeholders that are not valid group names, repeat an earlier name or
/// are called `query` stay unnamed. The last placeholder is greedy.
fn compile_example(example: &str) -> Result<Regex, regex::Error> {
    let placeholder = Regex::new(r"\{([^{}]+)\}|<([^<>]+)>")?;
    let identifier = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$")?;

    let total = placeholder.find_iter(example).count();
    let mut pattern = String::from("(?i)");
    let mut names = BTreeSet::new();
    let mut last = 0;

    for (index, captures) in placeholder.captures_iter(example).enumerate() {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        pattern.push_str(&regex::escape(&example[last..whole.start()]));
        last = whole.end();

        let name = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str().trim())
            .unwrap_or_default();
        let body = if index + 1 == total { ".+" } else { ".+?" };

        if identifier.is_match(name) && name != "query" && names.insert(name.to_string()) {
            pattern.push_str(&format!("(?P<{}>{})", name, body));
        } else {
            pattern.push_str(&format!("(?:{})", body));
        }
    }
    pattern.push_str(&regex::escape(&example[last..]));

    Regex::new(&pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct EchoTool {
        id: &'static str,
        capability: ToolCapability,
        dependencies: Vec<String>,
    }

    impl EchoTool {
        fn new(id: &'static str, capability: ToolCapability) -> Arc<Self> {
            Arc::new(Self {
                id,
                capability,
                dependencies: Vec::new(),
            })
        }
    }

    #[async_trait]
    impl Tool for EchoTool {
        async fn execute(&self, parameters: &JsonObject) -> Result<serde_json::Value, ToolError> {
            Ok(json!({"tool": self.id, "parameters": parameters}))
        }

        fn tool_id(&self) -> &str {
            self.id
        }

        fn capability(&self) -> ToolCapability {
            self.capability.clone()
        }

        fn dependencies(&self) -> Vec<String> {
            self.dependencies.clone()
        }
    }

    struct FlakyTool {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Tool for FlakyTool {
        async fn execute(&self, _parameters: &JsonObject) -> Result<serde_json::Value, ToolError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                Err(ToolError::ProcessingError(format!("failure {}", call)))
            } else {
                Ok(json!({"call": call}))
            }
        }

        fn tool_id(&self) -> &str {
            "flaky"
        }

        fn capability(&self) -> ToolCapability {
            ToolCapability::new("Flaky", "")
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        async fn execute(&self, _parameters: &JsonObject) -> Result<serde_json::Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!(null))
        }

        fn tool_id(&self) -> &str {
            "slow"
        }

        fn capability(&self) -> ToolCapability {
            ToolCapability::new("Slow", "")
        }
    }

    fn location() -> ToolCapability {
        ToolCapability::new("Location Drummer", "Location-based services")
            .with_capabilities([Capability::Location])
            .with_keywords(["location", "map", "nearby", "coffee"])
            .with_examples(["Find {business_type} near {location}", "Get directions to {destination}"])
            .with_priority(3)
    }

    fn search() -> ToolCapability {
        ToolCapability::new("Search Drummer", "Web search")
            .with_capabilities([Capability::Search])
            .with_keywords(["search", "find", "news"])
            .with_examples(["Find recent news about {subject}", "Get search results for {query}"])
            .with_priority(2)
    }

    fn router() -> SmartRouter {
        let mut router = SmartRouter::new().with_retry_backoff(0.0);
        router.register_tool(EchoTool::new("location_drummer", location()));
        router.register_tool(EchoTool::new("search_drummer", search()));
        router
    }

    #[test]
    fn test_compile_example_named_groups() {
        let regex = compile_example("Find {business_type} near <location>").unwrap();
        let captures = regex.captures("please FIND coffee shops near the old harbour").unwrap();
        assert_eq!(&captures["business_type"], "coffee shops");
        assert_eq!(&captures["location"], "the old harbour");
    }

    #[test]
    fn test_compile_example_escapes_literals() {
        let regex = compile_example("What is {concept}?").unwrap();
        assert!(regex.is_match("what is rust?"));
        assert!(!regex.is_match("what is rust"));

        // Repeated and reserved names stay unnamed
        let regex = compile_example("{query} vs {query} and {x}").unwrap();
        let names: Vec<&str> = regex.capture_names().flatten().collect();
        assert_eq!(names, vec!["x"]);
    }

    #[test]
    fn test_pattern_priority_wins() {
        let router = router();
        let request = router.route_request("Find recent news about coffee near Berlin").unwrap();
        // Both tools match; location has the higher priority
        assert_eq!(request.tool_id, "location_drummer");
        assert_eq!(request.parameters["location"], "Berlin");
        assert_eq!(request.parameters["query"], "Find recent news about coffee near Berlin");
    }

    #[test]
    fn test_placeholders_become_parameters() {
        let router = router();
        let request = router.route_request("get search results for rust async").unwrap();
        assert_eq!(request.tool_id, "search_drummer");
        // `query` keeps the full text
        assert_eq!(request.parameters["query"], "get search results for rust async");
    }

    #[test]
    fn test_keyword_fallback() {
        let router = router();
        let request = router.route_request("any coffee on the map?").unwrap();
        assert_eq!(request.tool_id, "location_drummer");
        assert_eq!(request.parameters.len(), 1);
    }

    #[test]
    fn test_keyword_ties_go_to_first_registered() {
        let mut router = SmartRouter::new();
        let shared = |name: &str| ToolCapability::new(name, "").with_keywords(["weather"]).with_priority(2);
        router.register_capability("first", shared("First"));
        router.register_capability("second", shared("Second"));
        assert_eq!(router.route_request("weather today").unwrap().tool_id, "first");

        // Re-registration keeps the original position
        router.register_capability("first", shared("First again"));
        assert_eq!(router.route_request("weather today").unwrap().tool_id, "first");
    }

    #[test]
    fn test_equal_patterns_go_to_first_registered() {
        let mut router = SmartRouter::new();
        let shared = |name: &str| ToolCapability::new(name, "").with_examples(["Tell me about {topic}"]);
        router.register_capability("first", shared("First"));
        router.register_capability("second", shared("Second"));
        assert_eq!(router.route_request("tell me about Ceres").unwrap().tool_id, "first");
    }

    #[test]
    fn test_no_match() {
        let router = router();
        let err = router.route_request("xyzzy").unwrap_err();
        assert!(matches!(err, RouterError::NoMatchingTool(_)));
    }

    #[test]
    fn test_route_capability() {
        let router = router();
        assert_eq!(router.route_capability(&Capability::Search).unwrap(), "search_drummer");
        assert!(router.route_capability(&Capability::Finance).is_err());
    }

    #[tokio::test]
    async fn test_execute_query_records_metrics() {
        let router = router();
        let response = router.execute_query("Get directions to the spaceport").await.unwrap();
        assert_eq!(response.tool_id, "location_drummer");
        assert_eq!(response.result["parameters"]["destination"], "the spaceport");
        assert_eq!(response.metrics.attempt, 1);

        router.execute_query("Get directions to Tycho").await.unwrap();
        let metrics = router.get_metrics("location_drummer").await.unwrap();
        assert_eq!(metrics.total_executions, 2);
        assert!((metrics.average_time - metrics.total_time / 2.0).abs() < f64::EPSILON);
        assert!(router.get_metrics("search_drummer").await.is_none());
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let router = router();
        let err = router
            .execute_tool(ToolRequest::new("ghost", JsonObject::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_missing_dependencies() {
        let mut router = router();
        router.register_tool(Arc::new(EchoTool {
            id: "report",
            capability: ToolCapability::new("Report", ""),
            dependencies: vec!["search_drummer".to_string(), "ghost".to_string()],
        }));

        let err = router
            .execute_tool(ToolRequest::new("report", JsonObject::new()).with_dependencies(vec!["phantom".to_string()]))
            .await
            .unwrap_err();
        match err {
            RouterError::MissingDependencies { tool_id, missing } => {
                assert_eq!(tool_id, "report");
                assert_eq!(missing, vec!["ghost".to_string(), "phantom".to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let mut router = SmartRouter::new().with_retry_backoff(0.0);
        router.register_tool(Arc::new(FlakyTool {
            failures: 2,
            calls: AtomicU32::new(0),
        }));

        let response = router
            .execute_tool(ToolRequest::new("flaky", JsonObject::new()).with_retry_count(3))
            .await
            .unwrap();
        assert_eq!(response.metrics.attempt, 3);
        assert_eq!(response.result["call"], 3);
    }

    #[tokio::test]
    async fn test_tool_error_propagates() {
        let mut router = SmartRouter::new().with_retry_backoff(0.0);
        router.register_tool(Arc::new(FlakyTool {
            failures: 5,
            calls: AtomicU32::new(0),
        }));

        let err = router
            .execute_tool(ToolRequest::new("flaky", JsonObject::new()).with_retry_count(2))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Tool(ToolError::ProcessingError(ref m)) if m == "failure 2"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut router = SmartRouter::new();
        router.register_tool(Arc::new(SlowTool));

        let err = router
            .execute_tool(ToolRequest::new("slow", JsonObject::new()).with_timeout(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, RouterError::Timeout { .. }));
    }
}
