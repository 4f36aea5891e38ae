// Text analyst - local statistics for prose and code

use super::{Capability, Tool, ToolCapability, ToolError, optional_str, required_str};
use crate::orchestration::types::JsonObject;
use async_trait::async_trait;
use serde::Serialize;

const WORDS_PER_MINUTE: f64 = 200.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextStatistics {
    pub words: usize,
    pub characters: usize,
    pub lines: usize,
    pub paragraphs: usize,
    pub reading_minutes: u32,
    pub insights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CodeStatistics {
    pub total_lines: usize,
    pub blank_lines: usize,
    pub comment_lines: usize,
    pub code_lines: usize,
    pub patterns: Vec<String>,
}

/// Analyzes text passed in the `text` parameter (or the raw `query`)
pub struct TextAnalystTool;

impl TextAnalystTool {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze_text(&self, text: &str) -> TextStatistics {
        let words = text.split_whitespace().count();
        TextStatistics {
            words,
            characters: text.chars().count(),
            lines: text.lines().count(),
            paragraphs: text.split("\n\n").filter(|p| !p.trim().is_empty()).count(),
            reading_minutes: (words as f64 / WORDS_PER_MINUTE).ceil() as u32,
            insights: self.text_insights(text),
        }
    }

    pub fn analyze_code(&self, code: &str) -> CodeStatistics {
        let total_lines = code.lines().count();
        let blank_lines = code.lines().filter(|l| l.trim().is_empty()).count();
        let comment_lines = code
            .lines()
            .filter(|l| {
                let trimmed = l.trim();
                trimmed.starts_with("//") || trimmed.starts_with('#') || trimmed.starts_with("/*")
            })
            .count();

        CodeStatistics {
            total_lines,
            blank_lines,
            comment_lines,
            code_lines: total_lines - blank_lines - comment_lines,
            patterns: self.detect_code_patterns(code),
        }
    }

    fn detect_code_patterns(&self, code: &str) -> Vec<String> {
        let code_lower = code.to_lowercase();
        let checks = [
            (code_lower.contains("async") || code_lower.contains("await"), "Asynchronous programming patterns"),
            (code_lower.contains("struct") || code_lower.contains("class"), "Object-oriented or struct-based design"),
            (
                code_lower.contains("fn ") || code_lower.contains("def ") || code_lower.contains("function"),
                "Function definitions present",
            ),
            (code_lower.contains("test") || code_lower.contains("assert"), "Testing code detected"),
            (code_lower.contains("error") || code_lower.contains("result"), "Error handling patterns"),
        ];

        let patterns: Vec<String> = checks
            .into_iter()
            .filter(|(found, _)| *found)
            .map(|(_, pattern)| pattern.to_string())
            .collect();

        if patterns.is_empty() {
            vec!["No specific patterns detected".to_string()]
        } else {
            patterns
        }
    }

    fn text_insights(&self, text: &str) -> Vec<String> {
        let text_lower = text.to_lowercase();
        let mut insights = Vec::new();

        if text_lower.contains("introduction") || text_lower.contains("conclusion") {
            insights.push("Structured document with formal sections");
        }
        if text_lower.contains("first") || text_lower.contains("second") || text_lower.contains("third") {
            insights.push("Enumerated or sequential content");
        }
        if text.contains("```") || text_lower.contains("code") {
            insights.push("Contains code examples or technical content");
        }
        if text.matches('?').count() > 3 {
            insights.push("Question-driven or FAQ-style content");
        }

        if insights.is_empty() {
            insights.push("General prose content");
        }
        insights.into_iter().map(String::from).collect()
    }

    fn looks_like_code(text: &str) -> bool {
        text.contains("```")
            || text.lines().any(|l| {
                let trimmed = l.trim_start();
                trimmed.starts_with("fn ")
                    || trimmed.starts_with("def ")
                    || trimmed.starts_with("class ")
                    || trimmed.ends_with('{')
                    || trimmed.ends_with(';')
            })
    }
}

impl Default for TextAnalystTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for TextAnalystTool {
    async fn execute(&self, parameters: &JsonObject) -> Result<serde_json::Value, ToolError> {
        let text = match optional_str(parameters, "text") {
            Some(text) => text,
            None => required_str(parameters, "query")?,
        };

        let mode = optional_str(parameters, "mode").unwrap_or("auto");
        let as_code = match mode {
            "code" => true,
            "text" => false,
            "auto" => Self::looks_like_code(text),
            other => {
                return Err(ToolError::InvalidParameters(format!(
                    "unknown mode {}, expected text, code or auto",
                    other
                )));
            }
        };

        let analysis = if as_code {
            serde_json::to_value(self.analyze_code(text))
        } else {
            serde_json::to_value(self.analyze_text(text))
        }
        .map_err(|e| ToolError::ProcessingError(e.to_string()))?;

        Ok(serde_json::json!({
            "kind": if as_code { "code" } else { "text" },
            "analysis": analysis,
        }))
    }

    fn tool_id(&self) -> &str {
        "text_analyst"
    }

    fn capability(&self) -> ToolCapability {
        ToolCapability::new("Text Analyst", "Word, line and paragraph statistics with simple code pattern detection")
            .with_category("analysis")
            .with_capabilities([Capability::TextAnalysis])
            .with_keywords(["analyze text", "word count", "statistics", "reading time", "paragraphs"])
            .with_examples(["Analyze this text: {text}", "Count the words in {text}"])
            .with_priority(1)
    }
}
