//! Hive - 分层多 Agent 编排引擎
//!
//! 模块划分：
//! - **agent**: Agent 定义、不可变 Agent 图、Supervisor prompt
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排错误与步骤调度
//! - **llm**: 模型客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 消息与按 (会话, Agent) 的情景记忆
//! - **observability**: 日志初始化
//! - **orchestration**: 响应分发、答案发布与引擎
//! - **prompt**: 模板渲染、情景记忆 prompt、交接消息、上下文组装
//! - **tools**: 工具注册与执行、系统工具目录、工具路由与委派队列

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod orchestration;
pub mod prompt;
pub mod tools;

pub use orchestration::{Engine, EngineBuilder};
