//! 系统工具目录：编排用工具的名称、参数载荷与 JSON Schema
//!
//! 参数 Schema 由 schemars 从载荷结构生成，字段文档即参数说明。
//! 目录顺序：route_to_agent、route_to_parent、record_event、finalize_request、chit_chat、fallback、
//! self_reflection，之后是显式注册的外部工具。

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

use crate::agent::AgentSpec;
use crate::tools::ToolDefinition;

pub const ROUTE_TO_AGENT: &str = "route_to_agent";
pub const ROUTE_TO_PARENT: &str = "route_to_parent";
pub const RECORD_EVENT: &str = "record_event";
pub const FINALIZE_REQUEST: &str = "finalize_request";
pub const CHIT_CHAT: &str = "chit_chat";
pub const FALLBACK: &str = "fallback";
pub const SELF_REFLECTION: &str = "self_reflection";

pub const SYSTEM_TOOL_NAMES: [&str; 7] = [
    ROUTE_TO_AGENT,
    ROUTE_TO_PARENT,
    RECORD_EVENT,
    FINALIZE_REQUEST,
    CHIT_CHAT,
    FALLBACK,
    SELF_REFLECTION,
];

pub fn is_system_tool(name: &str) -> bool {
    SYSTEM_TOOL_NAMES.contains(&name)
}

const DEFAULT_CAPABILITY: &str = "Handle requests within the currently configured tools";

/// route_to_agent 参数
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RouteMapper {
    /// Name (or identifier) of the child agent that should take over.
    pub agent: String,
    /// What the child agent must achieve, stated as a single clear objective.
    pub objective: String,
    /// Data already collected that the child agent needs to fulfill the objective.
    pub input: Option<String>,
    /// Short message shown to the user while the child agent works.
    pub response: Option<String>,
}

/// route_to_parent 参数
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RouteParentMapper {
    /// Summary of what was done and the results obtained.
    pub summary: String,
    /// Short message shown to the user while control returns to the parent agent.
    pub response: Option<String>,
}

/// record_event 参数
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RecordEventArgs {
    /// WAIT_USER_INPUT when the user must answer a question, FINISHED when the objective is complete.
    pub status: String,
    /// The question for the user, or the final result of the execution.
    pub content: String,
}

/// finalize_request 参数
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FinalizeRequestArgs {
    /// Final answer summarizing the completed request.
    pub summary: String,
}

/// chit_chat 参数
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ChitChatArgs {
    /// Reply to small talk, greetings or thanks.
    pub message: String,
    /// Optional short message shown before the reply.
    pub interim_message: Option<String>,
}

/// fallback 参数
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FallbackArgs {
    /// Polite explanation that the request is outside the supported scope.
    pub response: String,
    /// Topics this agent can help with, as shown to the user.
    pub supported_topics: String,
    /// Optional short message shown before the response.
    pub interim_message: Option<String>,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct NoArgs {}

/// 从载荷结构生成参数 Schema，去掉 omit 中列出的字段
fn parameters<T: JsonSchema>(omit: &[&str]) -> Value {
    let mut value = serde_json::to_value(schema_for!(T))
        .unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    if let Some(root) = value.as_object_mut() {
        root.remove("$schema");
        root.remove("title");
        root.remove("description");
        root.entry("properties")
            .or_insert_with(|| Value::Object(Default::default()));
    }
    if let Some(props) = value.get_mut("properties").and_then(Value::as_object_mut) {
        for field in omit {
            props.remove(*field);
        }
    }
    if let Some(required) = value.get_mut("required").and_then(Value::as_array_mut) {
        required.retain(|field| field.as_str().map_or(true, |f| !omit.contains(&f)));
    }
    value
}

fn route_to_agent(interim: bool) -> ToolDefinition {
    let omit: &[&str] = if interim { &[] } else { &["response"] };
    ToolDefinition::new(
        ROUTE_TO_AGENT,
        "Delegate the current objective to one of your child agents. \
         Use it when a child agent is better suited to handle the request.",
        parameters::<RouteMapper>(omit),
    )
}

fn route_to_parent(interim: bool) -> ToolDefinition {
    let omit: &[&str] = if interim { &[] } else { &["response"] };
    ToolDefinition::new(
        ROUTE_TO_PARENT,
        "Return control to your parent agent once your objective is done, \
         or when the request is outside your responsibility.",
        parameters::<RouteParentMapper>(omit),
    )
}

fn record_event() -> ToolDefinition {
    ToolDefinition::new(
        RECORD_EVENT,
        "Record the state of the execution. Use WAIT_USER_INPUT to ask the user for missing data \
         and FINISHED when the objective is complete.",
        parameters::<RecordEventArgs>(&[]),
    )
}

fn finalize_request() -> ToolDefinition {
    ToolDefinition::new(
        FINALIZE_REQUEST,
        "Close the request and deliver the final answer to the user.",
        parameters::<FinalizeRequestArgs>(&[]),
    )
}

fn chit_chat() -> ToolDefinition {
    ToolDefinition::new(
        CHIT_CHAT,
        "Answer greetings, thanks and small talk that need no other tool.",
        parameters::<ChitChatArgs>(&[]),
    )
}

fn fallback(external: &[ToolDefinition]) -> ToolDefinition {
    let mut capabilities: Vec<String> = external
        .iter()
        .filter(|t| !is_system_tool(&t.name))
        .map(|t| t.summary_line().unwrap_or(t.name.as_str()).to_string())
        .collect();
    if capabilities.is_empty() {
        capabilities.push(DEFAULT_CAPABILITY.to_string());
    }
    let catalog = capabilities
        .iter()
        .map(|c| format!("- {c}"))
        .collect::<Vec<_>>()
        .join("\n");
    ToolDefinition::new(
        FALLBACK,
        format!(
            "Use when the request is outside the supported scope. Supported capabilities:\n{catalog}"
        ),
        parameters::<FallbackArgs>(&[]),
    )
}

fn self_reflection() -> ToolDefinition {
    ToolDefinition::new(
        SELF_REFLECTION,
        "Review your own execution history before deciding the next step.",
        parameters::<NoArgs>(&[]),
    )
}

/// 按图结构和开关计算某个 Agent 的完整工具目录
pub fn catalog_for(
    spec: &AgentSpec,
    has_children: bool,
    has_parent: bool,
    external: &[ToolDefinition],
) -> Vec<ToolDefinition> {
    let interim = spec.supports_interim_messages;
    let toggles = spec.system_tools;
    let mut tools = Vec::with_capacity(external.len() + 4);
    if has_children {
        tools.push(route_to_agent(interim));
    }
    if has_parent {
        tools.push(route_to_parent(interim));
    }
    tools.push(record_event());
    if toggles.finalize_request {
        tools.push(finalize_request());
    }
    if toggles.chit_chat {
        tools.push(chit_chat());
    }
    if toggles.fallback {
        tools.push(fallback(external));
    }
    if toggles.self_reflection {
        tools.push(self_reflection());
    }
    tools.extend(external.iter().cloned());
    tools
}
