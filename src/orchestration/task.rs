// Task manager - lifecycle tracking and bounded execution of orchestration work

use super::events::{EventBus, EventKind, ObservationEvent};
use super::types::JsonObject;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;
use tokio::sync::{RwLock, Semaphore, broadcast};
use uuid::Uuid;

pub const DEFAULT_MAX_CONCURRENT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Initialized,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task {0} not found")]
    NotFound(Uuid),

    #[error("Task {0} has already finished")]
    AlreadyFinished(Uuid),

    #[error("Task manager is shut down")]
    Closed,

    #[error("Task {task_id} result cannot be serialized: {message}")]
    UnserializableResult { task_id: Uuid, message: String },
}

/// A tracked unit of orchestration work.
///
/// Progress stays within 0..=100 and never decreases. Once a task reaches
/// a terminal status every further transition is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: Uuid,
    pub task_type: String,
    pub status: TaskStatus,
    pub progress: f64,
    #[serde(default)]
    pub metadata: JsonObject,
    #[serde(default)]
    pub results: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(task_type: impl Into<String>, metadata: JsonObject) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            task_type: task_type.into(),
            status: TaskStatus::Initialized,
            progress: 0.0,
            metadata,
            results: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn start(&mut self) -> bool {
        if self.status != TaskStatus::Initialized {
            return false;
        }
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        true
    }

    /// Raise progress to `progress`, clamped to 0..=100. NaN is ignored.
    pub fn update_progress(&mut self, progress: f64) -> bool {
        if self.status.is_terminal() || progress.is_nan() {
            return false;
        }
        if self.status == TaskStatus::Initialized {
            self.start();
        }
        self.progress = self.progress.max(progress.clamp(0.0, 100.0));
        true
    }

    pub fn complete(&mut self, results: serde_json::Value) -> bool {
        if !self.finish(TaskStatus::Completed) {
            return false;
        }
        self.progress = 100.0;
        self.results = Some(results);
        true
    }

    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if !self.finish(TaskStatus::Failed) {
            return false;
        }
        self.error = Some(error.into());
        true
    }

    pub fn cancel(&mut self) -> bool {
        self.finish(TaskStatus::Cancelled)
    }

    fn finish(&mut self, status: TaskStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.finished_at = Some(Utc::now());
        true
    }

    /// Seconds between start and finish, when both are known
    pub fn execution_time(&self) -> Option<f64> {
        let started = self.started_at?;
        let finished = self.finished_at?;
        Some((finished - started).num_milliseconds() as f64 / 1000.0)
    }

    pub fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Restore a task; out-of-range progress is clamped
    pub fn from_json(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let mut task: Task = serde_json::from_value(value)?;
        task.progress = if task.progress.is_nan() { 0.0 } else { task.progress.clamp(0.0, 100.0) };
        Ok(task)
    }
}

/// Tracks tasks and runs their work with bounded concurrency
pub struct TaskManager {
    tasks: RwLock<HashMap<Uuid, Task>>,
    semaphore: Semaphore,
    max_concurrent: usize,
    events: EventBus,
}

impl TaskManager {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            tasks: RwLock::new(HashMap::new()),
            semaphore: Semaphore::new(max_concurrent),
            max_concurrent,
            events: EventBus::new(),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ObservationEvent> {
        self.events.subscribe()
    }

    pub async fn create_task(&self, task_type: impl Into<String>, metadata: JsonObject) -> Uuid {
        let task = Task::new(task_type, metadata);
        let task_id = task.task_id;

        let message = format!("New {} task created", task.task_type);
        let mut event = ObservationEvent::new(task_id, EventKind::Created, message)
            .with_metadata("type", task.task_type.as_str());
        for (key, value) in &task.metadata {
            event = event.with_metadata(key.as_str(), value.clone());
        }

        self.tasks.write().await.insert(task_id, task);
        self.events.publish(event);
        task_id
    }

    pub async fn get_task(&self, task_id: Uuid) -> Result<Task, TaskError> {
        self.tasks
            .read()
            .await
            .get(&task_id)
            .cloned()
            .ok_or(TaskError::NotFound(task_id))
    }

    pub async fn start(&self, task_id: Uuid) -> Result<bool, TaskError> {
        let applied = self.with_task(task_id, |task| task.start()).await?;
        if applied {
            self.events
                .publish(ObservationEvent::new(task_id, EventKind::Started, "Task started"));
        }
        Ok(applied)
    }

    pub async fn update_progress(&self, task_id: Uuid, progress: f64) -> Result<bool, TaskError> {
        let applied = self.with_task(task_id, |task| task.update_progress(progress)).await?;
        if applied {
            self.events.publish(
                ObservationEvent::new(task_id, EventKind::Progress, "Progress updated")
                    .with_metadata("progress", progress.clamp(0.0, 100.0)),
            );
        }
        Ok(applied)
    }

    pub async fn complete(&self, task_id: Uuid, results: serde_json::Value) -> Result<bool, TaskError> {
        let applied = self.with_task(task_id, |task| task.complete(results)).await?;
        if applied {
            self.events
                .publish(ObservationEvent::new(task_id, EventKind::Completed, "Task completed"));
        }
        Ok(applied)
    }

    pub async fn fail(&self, task_id: Uuid, error: impl Into<String>) -> Result<bool, TaskError> {
        let error = error.into();
        let message = format!("Task failed: {}", error);
        let applied = self.with_task(task_id, |task| task.fail(error)).await?;
        if applied {
            self.events
                .publish(ObservationEvent::new(task_id, EventKind::Failed, message));
        }
        Ok(applied)
    }

    /// Mark the task cancelled. Work already running is not interrupted.
    pub async fn cancel(&self, task_id: Uuid) -> Result<bool, TaskError> {
        let applied = self.with_task(task_id, |task| task.cancel()).await?;
        if applied {
            self.events
                .publish(ObservationEvent::new(task_id, EventKind::Cancelled, "Task cancelled"));
        }
        Ok(applied)
    }

    /// Run `work` for a tracked task once a concurrency slot is free.
    ///
    /// The task is marked running, then completed with the serialized
    /// output or failed with the error message. The outer error covers
    /// bookkeeping and unserializable output; the work's own result is
    /// passed through.
    pub async fn execute_task<T, E, Fut>(&self, task_id: Uuid, work: Fut) -> Result<Result<T, E>, TaskError>
    where
        Fut: Future<Output = Result<T, E>>,
        T: Serialize,
        E: Display,
    {
        if self.get_task(task_id).await?.status.is_terminal() {
            return Err(TaskError::AlreadyFinished(task_id));
        }

        let _permit = self.semaphore.acquire().await.map_err(|_| TaskError::Closed)?;

        // Cancelled while waiting for a slot
        if !self.start(task_id).await? && self.get_task(task_id).await?.status.is_terminal() {
            return Err(TaskError::AlreadyFinished(task_id));
        }

        let started = Instant::now();
        let outcome = work.await;
        let elapsed = started.elapsed().as_secs_f64();

        match &outcome {
            Ok(value) => match serde_json::to_value(value) {
                Ok(results) => {
                    let applied = self.with_task(task_id, |task| task.complete(results)).await?;
                    if applied {
                        self.events.publish(
                            ObservationEvent::new(task_id, EventKind::Completed, "Task completed")
                                .with_metadata("execution_time", elapsed),
                        );
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    self.fail(task_id, format!("cannot serialize task result: {}", message)).await?;
                    return Err(TaskError::UnserializableResult { task_id, message });
                }
            },
            Err(e) => {
                tracing::error!("Task {} failed: {}", task_id, e);
                let error = e.to_string();
                let message = format!("Task failed: {}", error);
                let applied = self.with_task(task_id, |task| task.fail(error)).await?;
                if applied {
                    self.events.publish(
                        ObservationEvent::new(task_id, EventKind::Failed, message)
                            .with_metadata("execution_time", elapsed),
                    );
                }
            }
        }

        Ok(outcome)
    }

    /// Tasks that are initialized or running, oldest first
    pub async fn get_active_tasks(&self) -> Vec<Task> {
        let mut active: Vec<Task> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|task| task.status.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|task| task.created_at);
        active
    }

    /// Drop terminal tasks that finished more than `max_age` ago
    pub async fn cleanup_completed_tasks(&self, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut tasks = self.tasks.write().await;
        let before = tasks.len();
        tasks.retain(|_, task| {
            !(task.status.is_terminal() && task.finished_at.is_some_and(|finished| finished < cutoff))
        });
        let removed = before - tasks.len();
        if removed > 0 {
            tracing::info!("Cleaned up {} finished tasks", removed);
        }
        removed
    }

    async fn with_task<R>(&self, task_id: Uuid, apply: impl FnOnce(&mut Task) -> R) -> Result<R, TaskError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&task_id).ok_or(TaskError::NotFound(task_id))?;
        Ok(apply(task))
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT)
    }
}
