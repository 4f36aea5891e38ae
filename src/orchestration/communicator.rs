// Model communicator - sends messages to model endpoints over HTTP with retries

use super::config::RetryConfig;
use super::error::ModelError;
use super::registry::ModelRegistry;
use super::retry::RetryPolicy;
use super::types::{ModelEndpointUpdate, ModelMessage, ModelResponse, ModelState, ModelStatus, OutboundMessage};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct ActiveModel {
    endpoint: String,
    timeout: Duration,
    status: ModelState,
}

/// Sends messages to the active models and normalizes their replies
pub struct ModelCommunicator {
    client: reqwest::Client,
    active_models: RwLock<HashMap<String, ActiveModel>>,
    retry: RetryPolicy,
}

impl ModelCommunicator {
    /// Create a communicator with no active models
    pub fn new(retry_config: &RetryConfig) -> Result<Self, ModelError> {
        Self::with_models(retry_config, HashMap::new())
    }

    /// One active model per registry entry, retry behaviour from the registry settings
    pub fn from_registry(registry: &ModelRegistry) -> Result<Self, ModelError> {
        let models = registry
            .models()
            .map(|model| {
                (
                    model.model_id.clone(),
                    ActiveModel {
                        endpoint: model.endpoint.clone(),
                        timeout: model.timeout(),
                        status: ModelState::Ready,
                    },
                )
            })
            .collect();
        Self::with_models(&registry.get_settings().retry_config, models)
    }

    fn with_models(retry_config: &RetryConfig, models: HashMap<String, ActiveModel>) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ModelError::invalid_config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            active_models: RwLock::new(models),
            retry: RetryPolicy::from(retry_config),
        })
    }

    pub async fn add_model(&self, model_id: impl Into<String>, endpoint: impl Into<String>, timeout: Duration) {
        let model_id = model_id.into();
        tracing::debug!("Activating model {}", model_id);
        self.active_models.write().await.insert(
            model_id,
            ActiveModel {
                endpoint: endpoint.into(),
                timeout,
                status: ModelState::Ready,
            },
        );
    }

    /// Returns whether the model was active
    pub async fn remove_model(&self, model_id: &str) -> bool {
        self.active_models.write().await.remove(model_id).is_some()
    }

    pub async fn active_model_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active_models.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Send a message to `target` and wait for its response.
    ///
    /// Drafts are addressed to `target`. `timeout` overrides the model's own
    /// per-attempt timeout. Attempts follow the retry policy; the error of
    /// the last attempt is returned when all of them fail.
    pub async fn send_message(
        &self,
        target: &str,
        message: impl Into<OutboundMessage>,
        timeout: Option<Duration>,
    ) -> Result<ModelResponse, ModelError> {
        let model = self
            .active_models
            .read()
            .await
            .get(target)
            .cloned()
            .ok_or_else(|| ModelError::NotFound(target.to_string()))?;

        let message = message.into().into_message(target);
        let timeout = timeout.unwrap_or(model.timeout);
        let endpoint = model.endpoint.as_str();
        let message = &message;

        tracing::debug!("Sending {} message to {} at {}", message.message_type, target, endpoint);
        self.retry
            .run(target, |_| self.dispatch(target, endpoint, message, timeout))
            .await
    }

    /// Send the same message to every target concurrently.
    ///
    /// Failed targets are logged and left out; the remaining responses keep
    /// the order of `targets`.
    pub async fn broadcast_message<T: AsRef<str>>(
        &self,
        message: impl Into<OutboundMessage>,
        targets: &[T],
        timeout: Option<Duration>,
    ) -> Vec<ModelResponse> {
        let message = message.into();
        let sends = targets
            .iter()
            .map(|target| self.send_message(target.as_ref(), message.clone(), timeout));

        futures_util::future::join_all(sends)
            .await
            .into_iter()
            .zip(targets)
            .filter_map(|(result, target)| match result {
                Ok(response) => Some(response),
                Err(e) => {
                    tracing::warn!("Broadcast to {} failed: {}", target.as_ref(), e);
                    None
                }
            })
            .collect()
    }

    pub async fn get_model_status(&self, model_id: &str) -> Result<ModelStatus, ModelError> {
        let models = self.active_models.read().await;
        let model = models
            .get(model_id)
            .ok_or_else(|| ModelError::NotFound(model_id.to_string()))?;

        Ok(ModelStatus {
            model_id: model_id.to_string(),
            status: model.status,
            endpoint: model.endpoint.clone(),
            timeout: model.timeout.as_secs_f64(),
        })
    }

    pub async fn update_model_config(&self, model_id: &str, update: ModelEndpointUpdate) -> Result<(), ModelError> {
        let mut models = self.active_models.write().await;
        let model = models
            .get_mut(model_id)
            .ok_or_else(|| ModelError::NotFound(model_id.to_string()))?;

        if let Some(endpoint) = update.endpoint {
            model.endpoint = endpoint;
        }
        if let Some(timeout) = update.timeout {
            model.timeout = timeout;
        }
        if let Some(status) = update.status {
            model.status = status;
        }
        tracing::info!("Updated configuration for model {}", model_id);
        Ok(())
    }

    /// One HTTP attempt
    async fn dispatch(
        &self,
        target: &str,
        endpoint: &str,
        message: &ModelMessage,
        timeout: Duration,
    ) -> Result<ModelResponse, ModelError> {
        let started = Instant::now();
        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                ModelError::Timeout {
                    model_id: target.to_string(),
                    timeout,
                }
            } else {
                ModelError::Communication {
                    model_id: target.to_string(),
                    message: e.to_string(),
                }
            }
        };

        let response = self
            .client
            .post(endpoint)
            .timeout(timeout)
            .json(message)
            .send()
            .await
            .map_err(transport)?;

        if !response.status().is_success() {
            return Err(ModelError::Http {
                model_id: target.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(transport)?;
        let body: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| ModelError::InvalidResponse {
            model_id: target.to_string(),
            message: e.to_string(),
        })?;

        Ok(ModelResponse::from_body(target, body, started.elapsed().as_secs_f64()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::types::{JsonObject, MessageDraft, MessageType};
    use serde_json::json;

    fn no_backoff(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            backoff_factor: 0.0,
            max_backoff: 0.0,
            jitter: 0.0,
        }
    }

    fn query() -> MessageDraft {
        let mut content = JsonObject::new();
        content.insert("test".to_string(), json!("data"));
        MessageDraft::new(MessageType::Query, content)
    }

    async fn communicator_for(server: &mockito::ServerGuard, retries: u32, models: &[&str]) -> ModelCommunicator {
        let communicator = ModelCommunicator::new(&no_backoff(retries)).unwrap();
        for model in models {
            communicator
                .add_model(*model, format!("{}/{}", server.url(), model), Duration::from_secs(5))
                .await;
        }
        communicator
    }

    #[tokio::test]
    async fn test_send_message_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/test_model")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"response_type": "test_response", "content": {"result": "success"}}"#)
            .create_async()
            .await;

        let communicator = communicator_for(&server, 3, &["test_model"]).await;
        let response = communicator.send_message("test_model", query(), None).await.unwrap();

        assert_eq!(response.model_id, "test_model");
        assert_eq!(response.response_type, "test_response");
        assert_eq!(response.content["result"], "success");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_message_is_posted_as_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/test_model")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model_id": "test_model",
                "message_type": "query",
                "content": {"test": "data"}
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let communicator = communicator_for(&server, 1, &["test_model"]).await;
        communicator.send_message("test_model", query(), None).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_target_is_not_found() {
        let communicator = ModelCommunicator::new(&RetryConfig::default()).unwrap();
        let err = communicator.send_message("ghost", query(), None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_failing_target_uses_every_attempt() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/test_model")
            .with_status(500)
            .expect(3)
            .create_async()
            .await;

        let communicator = communicator_for(&server, 3, &["test_model"]).await;
        let err = communicator.send_message("test_model", query(), None).await.unwrap_err();

        assert!(matches!(err, ModelError::Http { status: 500, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_invalid_json_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/test_model")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let communicator = communicator_for(&server, 1, &["test_model"]).await;
        let err = communicator.send_message("test_model", query(), None).await.unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_timeout_override() {
        // Accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let communicator = ModelCommunicator::new(&no_backoff(1)).unwrap();
        communicator
            .add_model("slow_model", format!("http://{}/slow", addr), Duration::from_secs(30))
            .await;

        let started = Instant::now();
        let err = communicator
            .send_message("slow_model", query(), Some(Duration::from_millis(100)))
            .await
            .unwrap_err();

        assert!(err.is_timeout(), "{}", err);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_broadcast_skips_failures() {
        let mut server = mockito::Server::new_async().await;
        for model in ["model1", "model2"] {
            server
                .mock("POST", format!("/{}", model).as_str())
                .with_status(200)
                .with_body(format!(r#"{{"model": "{}"}}"#, model))
                .create_async()
                .await;
        }
        server
            .mock("POST", "/model3")
            .with_status(503)
            .create_async()
            .await;

        let communicator = communicator_for(&server, 1, &["model1", "model2", "model3"]).await;
        let responses = communicator
            .broadcast_message(query(), &["model1", "model2", "model3"], None)
            .await;

        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].model_id, "model1");
        assert_eq!(responses[1].content["model"], "model2");
    }

    #[tokio::test]
    async fn test_model_status_and_update() {
        let communicator = ModelCommunicator::new(&RetryConfig::default()).unwrap();
        communicator
            .add_model("test_model", "http://localhost:8001/test", Duration::from_secs(30))
            .await;

        let status = communicator.get_model_status("test_model").await.unwrap();
        assert_eq!(status.status, ModelState::Ready);
        assert_eq!(status.timeout, 30.0);

        communicator
            .update_model_config(
                "test_model",
                ModelEndpointUpdate::default()
                    .endpoint("http://localhost:8002/test")
                    .timeout(Duration::from_secs(60))
                    .status(ModelState::Maintenance),
            )
            .await
            .unwrap();

        let status = communicator.get_model_status("test_model").await.unwrap();
        assert_eq!(status.endpoint, "http://localhost:8002/test");
        assert_eq!(status.timeout, 60.0);
        assert_eq!(status.status, ModelState::Maintenance);

        assert!(communicator.get_model_status("ghost").await.unwrap_err().is_not_found());
        assert!(communicator.remove_model("test_model").await);
        assert!(communicator.active_model_ids().await.is_empty());
    }
}
