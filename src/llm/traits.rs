//! 模型客户端抽象
//!
//! 引擎只关心一次完整的请求/响应：组装好的消息 + 工具定义进，choices（文本和/或工具调用）出。
//! 重试、超时、线协议都是客户端自己的事；失败以 Err(String) 返回，引擎视为“无响应”。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::ToolChoice;
use crate::memory::Message;
use crate::tools::ToolDefinition;

/// 一次模型调用的完整载荷
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

/// 模型请求的一次工具调用；arguments 为原始 JSON 文本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl Choice {
    /// 去掉空白后的文本；纯空白视为没有文本
    pub fn text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
}

impl ChatResponse {
    /// 单个纯文本 choice
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            choices: vec![Choice {
                text: Some(text.into()),
                tool_calls: Vec::new(),
                finish_reason: Some("stop".to_string()),
            }],
        }
    }

    /// 单个 choice，携带若干工具调用
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            choices: vec![Choice {
                text: None,
                tool_calls: calls,
                finish_reason: Some("tool_calls".to_string()),
            }],
        }
    }

    pub fn tool_call(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self::tool_calls(vec![ToolCall::new(name, arguments)])
    }

    /// 既无文本也无工具调用
    pub fn is_empty(&self) -> bool {
        self.choices
            .iter()
            .all(|c| c.text().is_none() && c.tool_calls.is_empty())
    }
}

/// 模型客户端 trait
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn call(&self, request_id: &str, request: &ChatRequest) -> Result<ChatResponse, String>;

    /// 累计 token 使用：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_text_counts_as_empty() {
        let response = ChatResponse::text("   \n");
        assert!(response.is_empty());
        assert_eq!(response.choices[0].text(), None);

        assert!(!ChatResponse::text(" hello ").is_empty());
        assert!(!ChatResponse::tool_call("echo", "{}").is_empty());
        assert!(ChatResponse::default().is_empty());
    }
}
