use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("task execution failed: {0}")]
    TaskExecutionFailed(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("context error: {0}")]
    ContextError(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("step limit of {0} exceeded")]
    StepLimitExceeded(usize),
}

pub type Result<T> = std::result::Result<T, GraphError>;
