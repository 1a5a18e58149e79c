pub mod context;
pub mod error;
pub mod graph;
pub mod message;
pub mod task;

// Re-export commonly used types
pub use context::Context;
pub use error::{GraphError, Result};
pub use graph::{DEFAULT_STEP_LIMIT, ExecutionResult, Graph, GraphBuilder};
pub use message::{Message, Role};
pub use task::{NextAction, Task, TaskResult};
