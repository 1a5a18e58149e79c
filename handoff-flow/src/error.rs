use thiserror::Error;

/// Errors raised while building or running a task graph
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Task execution failed: {0}")]
    TaskExecutionFailed(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Context error: {0}")]
    ContextError(String),

    #[error("Graph '{0}' has no start task")]
    NoStartTask(String),

    #[error("Graph '{graph}' exceeded {limit} steps")]
    StepLimitExceeded { graph: String, limit: usize },
}

pub type Result<T> = std::result::Result<T, GraphError>;
