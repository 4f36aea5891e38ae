// Orchestration core - model registry, communication, routing and task tracking

pub mod communicator;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod registry;
pub mod retry;
pub mod router;
pub mod system;
pub mod task;
pub mod tools;
pub mod types;

pub use communicator::ModelCommunicator;
pub use config::{GlobalSettings, ModelCapabilities, ModelConfig, ModelType, RetryConfig, SystemPaths};
pub use discovery::{ToolDiscovery, ToolManifest};
pub use error::ModelError;
pub use events::{EventBus, EventKind, ObservationEvent};
pub use registry::ModelRegistry;
pub use retry::RetryPolicy;
pub use router::{RouterError, SmartRouter, ToolRequest, ToolResponse};
pub use system::{MoeSystem, QueryOutcome};
pub use task::{Task, TaskError, TaskManager, TaskStatus};
pub use tools::{Capability, Tool, ToolCapability, ToolError};
pub use types::*;
