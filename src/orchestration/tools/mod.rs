// Tool implementations

mod capabilities;
mod model;
mod text;
mod time;

pub use capabilities::{model_tool_capabilities, model_tool_capability};
pub use model::ModelTool;
pub use text::TextAnalystTool;
pub use time::TimeCalculatorTool;

use super::error::ModelError;
use super::types::JsonObject;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Base trait for all tools the router can execute
#[async_trait]
pub trait Tool: Send + Sync {
    /// Run the tool with routed parameters
    async fn execute(&self, parameters: &JsonObject) -> Result<serde_json::Value, ToolError>;

    fn tool_id(&self) -> &str;

    /// Descriptor used for routing and discovery
    fn capability(&self) -> ToolCapability;

    /// Tools that must be registered before this one can run
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }
}

/// The local tools that ship with the crate
pub fn builtin_tools() -> Vec<Arc<dyn Tool>> {
    vec![Arc::new(TimeCalculatorTool::new()), Arc::new(TextAnalystTool::new())]
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Processing error: {0}")]
    ProcessingError(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}

/// What a tool can do
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Capability {
    Research,
    Documents,
    Finance,
    Code,
    Property,
    Location,
    Search,
    Knowledge,
    Time,
    TextAnalysis,
    Chat,
    Custom(String),
}

impl Capability {
    pub fn as_str(&self) -> &str {
        match self {
            Capability::Research => "research",
            Capability::Documents => "documents",
            Capability::Finance => "finance",
            Capability::Code => "code",
            Capability::Property => "property",
            Capability::Location => "location",
            Capability::Search => "search",
            Capability::Knowledge => "knowledge",
            Capability::Time => "time",
            Capability::TextAnalysis => "text_analysis",
            Capability::Chat => "chat",
            Capability::Custom(name) => name,
        }
    }
}

impl From<String> for Capability {
    fn from(value: String) -> Self {
        match value.as_str() {
            "research" => Capability::Research,
            "documents" => Capability::Documents,
            "finance" => Capability::Finance,
            "code" => Capability::Code,
            "property" => Capability::Property,
            "location" => Capability::Location,
            "search" => Capability::Search,
            "knowledge" => Capability::Knowledge,
            "time" => Capability::Time,
            "text_analysis" => Capability::TextAnalysis,
            "chat" => Capability::Chat,
            _ => Capability::Custom(value),
        }
    }
}

impl From<&str> for Capability {
    fn from(value: &str) -> Self {
        Capability::from(value.to_string())
    }
}

impl From<Capability> for String {
    fn from(value: Capability) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 5;

/// Routing descriptor for a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCapability {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Example phrasings; `{name}` and `<name>` mark parameters
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: u8,
}

fn default_category() -> String {
    "general".to_string()
}

fn default_priority() -> u8 {
    MIN_PRIORITY
}

impl ToolCapability {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: default_category(),
            capabilities: Vec::new(),
            keywords: Vec::new(),
            examples: Vec::new(),
            priority: default_priority(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities = capabilities.into_iter().collect();
        self
    }

    pub fn with_keywords<S: Into<String>>(mut self, keywords: impl IntoIterator<Item = S>) -> Self {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_examples<S: Into<String>>(mut self, examples: impl IntoIterator<Item = S>) -> Self {
        self.examples = examples.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self.normalized()
    }

    /// Clamp the priority into 1..=5
    pub fn normalized(mut self) -> Self {
        self.priority = self.priority.clamp(MIN_PRIORITY, MAX_PRIORITY);
        self
    }

    pub fn has_capability(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }
}

/// Read a required string parameter
pub(crate) fn required_str<'a>(parameters: &'a JsonObject, key: &str) -> Result<&'a str, ToolError> {
    match parameters.get(key) {
        Some(serde_json::Value::String(value)) => Ok(value),
        Some(other) => Err(ToolError::InvalidParameters(format!(
            "{} must be a string, got {}",
            key, other
        ))),
        None => Err(ToolError::InvalidParameters(format!("missing parameter {}", key))),
    }
}

/// Read an optional string parameter
pub(crate) fn optional_str<'a>(parameters: &'a JsonObject, key: &str) -> Option<&'a str> {
    parameters.get(key).and_then(|value| value.as_str())
}
