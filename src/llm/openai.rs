//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 的 byot（自带类型）接口发送 chat completions：请求与响应都用本模块的 serde 结构，
//! 这样工具定义、tool_choice、tool_calls 能原样透传，任意 OpenAI 兼容端点（可配置 base_url）均可使用。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::Client;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::ToolChoice;
use crate::llm::{ChatRequest, ChatResponse, Choice, ModelClient, ToolCall};
use crate::tools::ToolDefinition;

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens
            .fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: &'a ToolDefinition,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireAssistantMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireAssistantMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireToolCall {
    id: Option<String>,
    function: WireFunction,
}

#[derive(Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

fn to_wire(request: &ChatRequest) -> WireRequest<'_> {
    let tools: Vec<WireTool<'_>> = request
        .tools
        .iter()
        .map(|function| WireTool {
            kind: "function",
            function,
        })
        .collect();
    // 没有工具时发送 tool_choice 会被端点拒绝
    let tool_choice = (!tools.is_empty()).then(|| match request.tool_choice {
        ToolChoice::Auto => "auto",
        ToolChoice::None => "none",
        ToolChoice::Required => "required",
    });
    WireRequest {
        model: &request.model,
        messages: request
            .messages
            .iter()
            .map(|m| WireMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect(),
        tools,
        tool_choice,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        top_p: request.top_p,
    }
}

fn from_wire(response: WireResponse) -> ChatResponse {
    ChatResponse {
        choices: response
            .choices
            .into_iter()
            .map(|c| Choice {
                text: c.message.content,
                tool_calls: c
                    .message
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(|t| ToolCall {
                        id: t.id,
                        name: t.function.name,
                        arguments: t.function.arguments,
                    })
                    .collect(),
                finish_reason: c.finish_reason,
            })
            .collect(),
    }
}

/// OpenAI 兼容客户端：模型参数来自每次请求，本身只持有连接配置与超时
pub struct OpenAiModelClient {
    client: Client<OpenAIConfig>,
    timeout: Duration,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiModelClient {
    pub fn new(base_url: Option<&str>, api_key: Option<&str>, timeout: Duration) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };

        Self {
            client: Client::with_config(config),
            timeout,
            usage: TokenUsage::default(),
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiModelClient {
    async fn call(&self, request_id: &str, request: &ChatRequest) -> Result<ChatResponse, String> {
        let wire = to_wire(request);
        let response: WireResponse = tokio::time::timeout(
            self.timeout,
            self.client.chat().create_byot(wire),
        )
        .await
        .map_err(|_| format!("request {request_id} timed out after {:?}", self.timeout))?
        .map_err(|e| e.to_string())?;

        if let Some(usage) = &response.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }
        Ok(from_wire(response))
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}
