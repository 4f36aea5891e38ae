// Core message types exchanged with model endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A JSON object, the payload shape of every message and response
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Kind of message sent to a model
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    Task,
    Query,
    Response,
    Other(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Task => "task",
            MessageType::Query => "query",
            MessageType::Response => "response",
            MessageType::Other(kind) => kind,
        }
    }
}

impl From<String> for MessageType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "task" => MessageType::Task,
            "query" => MessageType::Query,
            "response" => MessageType::Response,
            _ => MessageType::Other(value),
        }
    }
}

impl From<&str> for MessageType {
    fn from(value: &str) -> Self {
        MessageType::from(value.to_string())
    }
}

impl From<MessageType> for String {
    fn from(value: MessageType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message addressed to one model endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub model_id: String,
    pub message_type: MessageType,
    pub content: JsonObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonObject>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ModelMessage {
    pub fn new(model_id: impl Into<String>, message_type: MessageType, content: JsonObject) -> Self {
        Self {
            model_id: model_id.into(),
            message_type,
            content,
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata
            .get_or_insert_with(JsonObject::new)
            .insert(key.into(), value.into());
        self
    }
}

/// A message without a recipient yet; the communicator addresses it on send
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDraft {
    pub message_type: MessageType,
    pub content: JsonObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonObject>,
}

impl MessageDraft {
    pub fn new(message_type: MessageType, content: JsonObject) -> Self {
        Self {
            message_type,
            content,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata
            .get_or_insert_with(JsonObject::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn address(self, model_id: impl Into<String>) -> ModelMessage {
        ModelMessage {
            model_id: model_id.into(),
            message_type: self.message_type,
            content: self.content,
            metadata: self.metadata,
            timestamp: Utc::now(),
        }
    }
}

/// Anything `send_message` accepts: a complete message or a draft
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Message(ModelMessage),
    Draft(MessageDraft),
}

impl OutboundMessage {
    pub fn into_message(self, target: &str) -> ModelMessage {
        match self {
            OutboundMessage::Message(message) => message,
            OutboundMessage::Draft(draft) => draft.address(target),
        }
    }
}

impl From<ModelMessage> for OutboundMessage {
    fn from(message: ModelMessage) -> Self {
        OutboundMessage::Message(message)
    }
}

impl From<MessageDraft> for OutboundMessage {
    fn from(draft: MessageDraft) -> Self {
        OutboundMessage::Draft(draft)
    }
}

/// Normalized response from a model endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub model_id: String,
    pub response_type: String,
    pub content: JsonObject,
    /// Seconds spent on the successful attempt
    pub execution_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JsonObject>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ModelResponse {
    /// Build a response from a raw JSON body.
    ///
    /// A body that already looks like a response (a string `response_type` and
    /// an object `content`) keeps its fields; any other object becomes the
    /// content. Non-object bodies are wrapped under `value`.
    pub fn from_body(target: &str, body: serde_json::Value, execution_time: f64) -> Self {
        let mut object = match body {
            serde_json::Value::Object(object) => object,
            other => {
                let mut wrapped = JsonObject::new();
                wrapped.insert("value".to_string(), other);
                wrapped
            }
        };

        let shaped = matches!(object.get("response_type"), Some(serde_json::Value::String(_)))
            && matches!(object.get("content"), Some(serde_json::Value::Object(_)));

        if !shaped {
            return Self {
                model_id: target.to_string(),
                response_type: "response".to_string(),
                content: object,
                execution_time,
                metadata: None,
                timestamp: Utc::now(),
            };
        }

        let model_id = match object.remove("model_id") {
            Some(serde_json::Value::String(id)) => id,
            _ => target.to_string(),
        };
        let response_type = match object.remove("response_type") {
            Some(serde_json::Value::String(kind)) => kind,
            _ => "response".to_string(),
        };
        let content = match object.remove("content") {
            Some(serde_json::Value::Object(content)) => content,
            _ => JsonObject::new(),
        };
        let metadata = match object.remove("metadata") {
            Some(serde_json::Value::Object(metadata)) => Some(metadata),
            _ => None,
        };

        Self {
            model_id,
            response_type,
            content,
            execution_time,
            metadata,
            timestamp: Utc::now(),
        }
    }
}

/// Availability of an active model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    Ready,
    Busy,
    Maintenance,
    Offline,
}

impl Default for ModelState {
    fn default() -> Self {
        Self::Ready
    }
}

/// Snapshot of an active model as the communicator sees it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub model_id: String,
    pub status: ModelState,
    pub endpoint: String,
    /// Per-attempt timeout in seconds
    pub timeout: f64,
}

/// Partial update for an active model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelEndpointUpdate {
    pub endpoint: Option<String>,
    pub timeout: Option<Duration>,
    pub status: Option<ModelState>,
}

impl ModelEndpointUpdate {
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn status(mut self, status: ModelState) -> Self {
        self.status = Some(status);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_type_round_trip() {
        assert_eq!(MessageType::from("query"), MessageType::Query);
        assert_eq!(MessageType::from("plan"), MessageType::Other("plan".to_string()));
        assert_eq!(String::from(MessageType::Task), "task");
    }

    #[test]
    fn test_draft_is_addressed_to_target() {
        let mut content = JsonObject::new();
        content.insert("test".to_string(), json!("data"));
        let draft = MessageDraft::new(MessageType::Query, content).with_metadata("source", "cli");

        let message = OutboundMessage::from(draft).into_message("test_model");
        assert_eq!(message.model_id, "test_model");
        assert_eq!(message.message_type, MessageType::Query);
        assert_eq!(message.metadata.unwrap()["source"], "cli");
    }

    #[test]
    fn test_plain_body_becomes_content() {
        let response = ModelResponse::from_body("test_model", json!({"content": "hi"}), 0.2);
        assert_eq!(response.model_id, "test_model");
        assert_eq!(response.response_type, "response");
        assert_eq!(serde_json::Value::Object(response.content), json!({"content": "hi"}));
    }

    #[test]
    fn test_response_shaped_body_is_unwrapped() {
        let body = json!({
            "model_id": "test_model",
            "response_type": "test_response",
            "content": {"result": "success"},
            "execution_time": 99.0
        });
        let response = ModelResponse::from_body("other", body, 0.5);
        assert_eq!(response.model_id, "test_model");
        assert_eq!(response.response_type, "test_response");
        assert_eq!(response.content["result"], "success");
        assert_eq!(response.execution_time, 0.5);
    }

    #[test]
    fn test_non_object_body_is_wrapped() {
        let response = ModelResponse::from_body("m", json!(["a", "b"]), 0.0);
        assert_eq!(response.content["value"], json!(["a", "b"]));
    }
}
