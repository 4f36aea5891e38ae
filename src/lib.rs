// toollama - mixture-of-experts orchestration over HTTP model endpoints

pub mod orchestration;

pub use orchestration::{
    ModelCommunicator, ModelError, ModelRegistry, MoeSystem, QueryOutcome, SmartRouter, TaskManager,
};
