// MoE system - owns the registry, communicator, router, discovery and task manager

use super::communicator::ModelCommunicator;
use super::config::SystemPaths;
use super::discovery::ToolDiscovery;
use super::error::ModelError;
use super::registry::ModelRegistry;
use super::router::SmartRouter;
use super::task::TaskManager;
use super::types::JsonObject;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Result of a query, as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum QueryOutcome {
    Success {
        task_id: Uuid,
        tool_id: String,
        result: serde_json::Value,
    },
    Error {
        error: String,
        task_id: Option<Uuid>,
    },
}

impl QueryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryOutcome::Success { .. })
    }

    pub fn task_id(&self) -> Option<Uuid> {
        match self {
            QueryOutcome::Success { task_id, .. } => Some(*task_id),
            QueryOutcome::Error { task_id, .. } => *task_id,
        }
    }
}

pub struct MoeSystem {
    paths: SystemPaths,
    registry: ModelRegistry,
    communicator: Arc<ModelCommunicator>,
    router: SmartRouter,
    discovery: ToolDiscovery,
    task_manager: TaskManager,
}

impl MoeSystem {
    /// Load `models.yaml` from the config directory, or the built-in models
    /// when there is none. A malformed file is an error.
    pub fn new(paths: SystemPaths) -> Result<Self, ModelError> {
        let registry = ModelRegistry::from_path_or_default(paths.models_config())?;
        Self::with_registry(paths, registry)
    }

    pub fn with_registry(paths: SystemPaths, registry: ModelRegistry) -> Result<Self, ModelError> {
        let communicator = Arc::new(ModelCommunicator::from_registry(&registry)?);
        let discovery = ToolDiscovery::new(paths.tools_dir.clone());

        Ok(Self {
            paths,
            registry,
            communicator,
            router: SmartRouter::new(),
            discovery,
            task_manager: TaskManager::default(),
        })
    }

    /// Discover and register tools. Returns the number of tools found.
    pub fn start(&mut self) -> usize {
        tracing::info!("Starting MoE system");
        tracing::debug!("Config directory: {}", self.paths.config_dir.display());
        tracing::debug!("Models directory: {}", self.paths.models_dir.display());
        tracing::debug!("Tools directory: {}", self.paths.tools_dir.display());

        let count = self
            .discovery
            .discover_tools(&mut self.router, &self.registry, &self.communicator);
        let categories = self.discovery.get_categories();
        tracing::info!("Discovered {} tools in {} categories", count, categories.len());
        for category in &categories {
            let tools: Vec<&str> = self
                .discovery
                .get_tools_by_category(category)
                .into_iter()
                .map(|tool| tool.tool_id.as_str())
                .collect();
            tracing::debug!("Category {}: {}", category, tools.join(", "));
        }

        tracing::info!("MoE system started");
        count
    }

    /// Run a query as a tracked task. Failures are reported in the outcome.
    pub async fn execute_query(&self, query: &str) -> QueryOutcome {
        let mut metadata = JsonObject::new();
        metadata.insert("query".to_string(), serde_json::Value::String(query.to_string()));
        let task_id = self.task_manager.create_task("query", metadata).await;

        match self
            .task_manager
            .execute_task(task_id, self.router.execute_query(query))
            .await
        {
            Ok(Ok(response)) => QueryOutcome::Success {
                task_id,
                tool_id: response.tool_id,
                result: response.result,
            },
            Ok(Err(e)) => {
                tracing::error!("Error executing query: {}", e);
                QueryOutcome::Error {
                    error: e.to_string(),
                    task_id: Some(task_id),
                }
            }
            Err(e) => {
                tracing::error!("Error tracking query task: {}", e);
                QueryOutcome::Error {
                    error: e.to_string(),
                    task_id: Some(task_id),
                }
            }
        }
    }

    pub async fn stop(&self) {
        let active = self.task_manager.get_active_tasks().await;
        if !active.is_empty() {
            tracing::warn!("Stopping with {} unfinished tasks", active.len());
        }
        tracing::info!("MoE system stopped");
    }

    /// Register a model and make it reachable through the communicator
    pub async fn register_model(&mut self, model_id: &str, config: serde_json::Value) -> Result<(), ModelError> {
        self.registry.register_model(model_id, config)?;
        let model = self.registry.get_model(model_id)?;
        self.communicator
            .add_model(model_id, model.endpoint.clone(), model.timeout())
            .await;
        Ok(())
    }

    pub async fn remove_model(&mut self, model_id: &str) -> Result<(), ModelError> {
        self.registry.remove_model(model_id)?;
        self.communicator.remove_model(model_id).await;
        Ok(())
    }

    pub fn paths(&self) -> &SystemPaths {
        &self.paths
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn communicator(&self) -> &Arc<ModelCommunicator> {
        &self.communicator
    }

    pub fn router(&self) -> &SmartRouter {
        &self.router
    }

    pub fn discovery(&self) -> &ToolDiscovery {
        &self.discovery
    }

    pub fn task_manager(&self) -> &TaskManager {
        &self.task_manager
    }
}
