// Model tool - forwards routed parameters to a model endpoint

use super::{Tool, ToolCapability, ToolError};
use crate::orchestration::communicator::ModelCommunicator;
use crate::orchestration::types::{JsonObject, MessageDraft, MessageType};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A tool backed by a model registered with the communicator.
///
/// The routed parameters become the content of a `query` message; the
/// serialized `ModelResponse` is the tool result.
pub struct ModelTool {
    tool_id: String,
    model_id: String,
    capability: ToolCapability,
    dependencies: Vec<String>,
    timeout: Option<Duration>,
    communicator: Arc<ModelCommunicator>,
}

impl ModelTool {
    pub fn new(
        tool_id: impl Into<String>,
        model_id: impl Into<String>,
        capability: ToolCapability,
        communicator: Arc<ModelCommunicator>,
    ) -> Self {
        Self {
            tool_id: tool_id.into(),
            model_id: model_id.into(),
            capability: capability.normalized(),
            dependencies: Vec::new(),
            timeout: None,
            communicator,
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[async_trait]
impl Tool for ModelTool {
    async fn execute(&self, parameters: &JsonObject) -> Result<serde_json::Value, ToolError> {
        let draft = MessageDraft::new(MessageType::Query, parameters.clone())
            .with_metadata("tool_id", self.tool_id.as_str());
        let response = self
            .communicator
            .send_message(&self.model_id, draft, self.timeout)
            .await?;
        serde_json::to_value(response).map_err(|e| ToolError::ProcessingError(e.to_string()))
    }

    fn tool_id(&self) -> &str {
        &self.tool_id
    }

    fn capability(&self) -> ToolCapability {
        self.capability.clone()
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::config::RetryConfig;
    use serde_json::json;

    #[tokio::test]
    async fn test_parameters_are_sent_as_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/search")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model_id": "search_drummer",
                "message_type": "query",
                "content": {"query": "rust news"},
                "metadata": {"tool_id": "search_drummer"}
            })))
            .with_status(200)
            .with_body(r#"{"results": ["a", "b"]}"#)
            .create_async()
            .await;

        let communicator = Arc::new(ModelCommunicator::new(&RetryConfig::default()).unwrap());
        communicator
            .add_model("search_drummer", format!("{}/search", server.url()), Duration::from_secs(5))
            .await;

        let tool = ModelTool::new(
            "search_drummer",
            "search_drummer",
            ToolCapability::new("Search Drummer", "Web search"),
            communicator,
        );
        let mut parameters = JsonObject::new();
        parameters.insert("query".to_string(), json!("rust news"));

        let result = tool.execute(&parameters).await.unwrap();
        assert_eq!(result["model_id"], "search_drummer");
        assert_eq!(result["content"]["results"], json!(["a", "b"]));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_model_is_a_model_error() {
        let communicator = Arc::new(ModelCommunicator::new(&RetryConfig::default()).unwrap());
        let tool = ModelTool::new("ghost_tool", "ghost", ToolCapability::new("Ghost", ""), communicator);
        let err = tool.execute(&JsonObject::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::Model(ref e) if e.is_not_found()));
    }
}
