//! 核心层：编排错误与步骤调度

pub mod error;
pub mod scheduler;

pub use error::OrchestrationError;
pub use scheduler::{StepHandler, StepScheduler};
