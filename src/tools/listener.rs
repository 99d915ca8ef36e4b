//! 外部工具监听接口
//!
//! 非编排类工具的调用交给 ToolListener；失败不抛给引擎，而是编码在 ToolExecutionResponse 里，
//! 由 Agent 在随后的自我反思中决定如何处理。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::ToolCall;
use crate::memory::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolExecutionStatus {
    Success,
    Error,
}

impl ToolExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolExecutionStatus::Success => "SUCCESS",
            ToolExecutionStatus::Error => "ERROR",
        }
    }
}

/// 工具执行结果：details 为任意 JSON，status 表示成功或失败
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionResponse {
    pub details: Value,
    pub status: ToolExecutionStatus,
}

impl ToolExecutionResponse {
    pub fn success(details: impl Into<Value>) -> Self {
        Self {
            details: details.into(),
            status: ToolExecutionStatus::Success,
        }
    }

    pub fn error(details: impl Into<Value>) -> Self {
        Self {
            details: details.into(),
            status: ToolExecutionStatus::Error,
        }
    }
}

/// 一次外部工具调用请求
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub session_id: String,
    pub agent_id: String,
    pub user_message: Option<Message>,
    pub tool_call: ToolCall,
}

impl ToolCallRequest {
    /// 解析参数；空字符串视为空对象
    pub fn arguments(&self) -> Result<Value, serde_json::Error> {
        let raw = self.tool_call.arguments.trim();
        if raw.is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(raw)
    }
}

#[async_trait]
pub trait ToolListener: Send + Sync {
    async fn on_tool_call_requested(&self, request: ToolCallRequest) -> ToolExecutionResponse;
}

/// 未配置监听器时的默认实现：一律返回 ERROR
#[derive(Debug, Default)]
pub struct UnhandledToolListener;

#[async_trait]
impl ToolListener for UnhandledToolListener {
    async fn on_tool_call_requested(&self, request: ToolCallRequest) -> ToolExecutionResponse {
        tracing::warn!(tool = %request.tool_call.name, "no tool listener configured");
        ToolExecutionResponse::error(format!(
            "No executor is configured for tool '{}'",
            request.tool_call.name
        ))
    }
}
