pub mod echo;
pub mod executor;
pub mod kind;
pub mod listener;
pub mod queue;
pub mod registry;
pub mod router;
pub mod system;

pub use echo::EchoTool;
pub use executor::ToolExecutor;
pub use kind::ToolKind;
pub use listener::{
    ToolCallRequest, ToolExecutionResponse, ToolExecutionStatus, ToolListener,
    UnhandledToolListener,
};
pub use queue::{DelegationQueue, QueuedDelegation};
pub use registry::{Tool, ToolDefinition, ToolRegistry};
pub use router::ToolRouter;
