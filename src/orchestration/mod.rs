//! 编排层：步骤、响应分发、答案发布与引擎

pub mod answer;
pub mod dispatcher;
pub mod engine;
pub mod step;

pub use answer::{Answer, AnswerKind, AnswerListener, AnswerSink, ChannelAnswerListener, EngineEvent};
pub use dispatcher::Dispatcher;
pub use engine::{Engine, EngineBuilder, EngineCore};
pub use step::{Step, StepOutcome};
