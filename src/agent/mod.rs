//! Agent 层：定义、委派树与 Supervisor prompt

pub mod graph;
pub mod spec;
pub mod supervisor;

pub use graph::{Agent, AgentGraph, AgentGraphBuilder, GraphError};
pub use spec::{AgentId, AgentSpec, ProviderSettings, SessionId, SystemToolToggles, ToolChoice};
pub use supervisor::SupervisorSpec;
