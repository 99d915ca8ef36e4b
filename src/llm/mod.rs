//! LLM 层：模型客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{EchoModelClient, ScriptedModelClient};
pub use openai::{OpenAiModelClient, TokenUsage};
pub use traits::{ChatRequest, ChatResponse, Choice, ModelClient, ToolCall};
