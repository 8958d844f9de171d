use thiserror::Error;

use crate::id::{TaskId, UserId};
use crate::types::{LifecycleAction, LifecycleState, TaskStatus};

/// One failed dependent from a best-effort reopen cascade.
#[derive(Debug, Clone)]
pub struct CascadeFailure {
    pub task_id: TaskId,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum TfError {
    /// Underlying persistence failure. Callers see no driver detail;
    /// full context is logged at the failure site.
    #[error("Store failure: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Comment owner not found: {0}")]
    CommentOwnerNotFound(String),

    #[error("A task cannot depend on itself: {0}")]
    SelfDependency(TaskId),

    #[error("Dependency would create a cycle")]
    DependencyCycle { task_id: TaskId, depends_on: TaskId },

    /// Reserved for callers that want to forbid requesting Blocked
    /// directly. Not constructed by the current engine.
    #[allow(dead_code)]
    #[error("Invalid status transition to {requested:?}")]
    InvalidTransition { task_id: TaskId, requested: TaskStatus },

    #[error("Cannot {action} a {state} record")]
    InvalidLifecycle {
        state: LifecycleState,
        action: LifecycleAction,
    },

    #[error("Invalid attachment: {reason}")]
    InvalidAttachment { reason: String },

    /// Optimistic version check kept failing after retries. Indicates
    /// sustained write contention on one task row.
    #[error("Concurrent update conflict on task {0}")]
    StaleVersion(TaskId),

    /// Aggregate failure from a best-effort reopen cascade. Successfully
    /// reopened dependents keep their new state.
    #[error("{} dependent(s) failed to update during reopen cascade", failures.len())]
    CascadeFailed { failures: Vec<CascadeFailure> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TfError>;
