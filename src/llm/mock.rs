//! Mock 模型客户端（用于测试与离线控制台，无需 API）
//!
//! - `ScriptedModelClient`：按顺序吐出预置响应，并记录收到的每个请求，便于断言组装结果；
//! - `EchoModelClient`：把最后一条 user 消息原样回显为文本答案。

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::llm::{ChatRequest, ChatResponse, ModelClient, ToolCall};
use crate::memory::Role;

/// 脚本化客户端：脚本耗尽后返回错误
#[derive(Default)]
pub struct ScriptedModelClient {
    script: Mutex<VecDeque<Result<ChatResponse, String>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, response: ChatResponse) {
        self.script.lock().await.push_back(Ok(response));
    }

    pub async fn push_text(&self, text: &str) {
        self.push(ChatResponse::text(text)).await;
    }

    pub async fn push_tool_call(&self, name: &str, arguments: serde_json::Value) {
        self.push(ChatResponse::tool_calls(vec![ToolCall::new(
            name,
            arguments.to_string(),
        )]))
        .await;
    }

    pub async fn push_failure(&self, reason: &str) {
        self.script.lock().await.push_back(Err(reason.to_string()));
    }

    /// 迄今收到的所有请求（按调用顺序）
    pub async fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn remaining(&self) -> usize {
        self.script.lock().await.len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn call(&self, request_id: &str, request: &ChatRequest) -> Result<ChatResponse, String> {
        self.requests.lock().await.push(request.clone());
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(format!("script exhausted at request {request_id}")))
    }
}

/// 回显客户端：回显用户最后一条消息
#[derive(Debug, Default)]
pub struct EchoModelClient;

#[async_trait]
impl ModelClient for EchoModelClient {
    async fn call(&self, _request_id: &str, request: &ChatRequest) -> Result<ChatResponse, String> {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        Ok(ChatResponse::text(format!("Echo from Mock: {last_user}")))
    }
}
