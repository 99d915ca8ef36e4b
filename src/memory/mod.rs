//! 记忆层：模型消息与情景记忆（按会话、按 Agent 的状态时间线）

pub mod episodic;
pub mod message;

pub use episodic::{EpisodicMemory, InMemoryEpisodicStore, RecordEvent, Status};
pub use message::{Message, Role};
