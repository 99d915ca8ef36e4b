//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__LLM__MODEL=gpt-4o`）。
//! `[[agents]]` 描述 Agent 图；存在 `[supervisor]` 时，所有未声明 parent 的 Agent 挂到它下面。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::agent::{AgentGraph, AgentSpec, ProviderSettings, SupervisorSpec, SystemToolToggles, ToolChoice};
use crate::core::OrchestrationError;
use crate::tools::ToolRegistry;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineSection,
    pub llm: LlmSection,
    pub memory: MemorySection,
    pub agents: Vec<AgentSection>,
    pub supervisor: Option<SupervisorSpec>,
}

/// [engine] 段：worker 并发与外部工具超时
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_max_concurrent_steps")]
    pub max_concurrent_steps: usize,
    /// 单次外部工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

fn default_max_concurrent_steps() -> usize {
    4
}

fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_concurrent_steps: default_max_concurrent_steps(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// [llm] 段：后端选择、默认模型参数与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// 保存 API Key 的环境变量名
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_top_p() -> f32 {
    1.0
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

impl LlmSection {
    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: self.top_p,
        }
    }

    /// 从 api_key_env 指向的环境变量读取 API Key（空值视为未设置）
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

/// [memory] 段：会话空闲多久后可被回收；不设置或设为 0 则不回收
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MemorySection {
    pub session_ttl_secs: Option<u64>,
}

impl MemorySection {
    /// 空闲回收周期；未设置或为 0 时关闭回收
    pub fn session_ttl(&self) -> Option<Duration> {
        self.session_ttl_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// [[agents]] 条目
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    pub id: String,
    pub name: String,
    pub goal: String,
    pub prompt: String,
    pub parent: Option<String>,
    /// 暴露给该 Agent 的外部工具（ToolRegistry 中的名字）
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub supports_interim_messages: bool,
    #[serde(default)]
    pub tool_choice: ToolChoice,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    #[serde(default)]
    pub finalize_tool: bool,
    #[serde(default)]
    pub chit_chat_tool: bool,
    #[serde(default)]
    pub fallback_tool: bool,
    #[serde(default)]
    pub self_reflection_tool: bool,
}

impl AgentSection {
    fn to_spec(&self, defaults: &ProviderSettings) -> AgentSpec {
        let provider = ProviderSettings {
            model: self.model.clone().unwrap_or_else(|| defaults.model.clone()),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            top_p: self.top_p.unwrap_or(defaults.top_p),
        };
        AgentSpec::new(&self.id, &self.name, &self.goal, &self.prompt)
            .with_provider(provider)
            .with_interim_messages(self.supports_interim_messages)
            .with_tool_choice(self.tool_choice)
            .with_system_tools(SystemToolToggles {
                finalize_request: self.finalize_tool,
                chit_chat: self.chit_chat_tool,
                fallback: self.fallback_tool,
                self_reflection: self.self_reflection_tool,
            })
    }
}

/// 未配置任何 Agent 时使用的单个助手
fn builtin_assistant(provider: ProviderSettings) -> AgentSpec {
    AgentSpec::new(
        "assistant",
        "Assistant",
        "Help the user with their request",
        "You are {{name}}. Your goal: {{goal}}.",
    )
    .with_provider(provider)
    .with_system_tools(SystemToolToggles {
        finalize_request: true,
        chit_chat: true,
        ..SystemToolToggles::default()
    })
}

impl AppConfig {
    /// 按配置构建 Agent 图；外部工具从 registry 中按名字取定义
    pub fn agent_graph(&self, registry: &ToolRegistry) -> Result<AgentGraph, OrchestrationError> {
        let defaults = self.llm.provider_settings();
        let mut builder = AgentGraph::builder();

        if self.agents.is_empty() {
            if self.supervisor.is_some() {
                tracing::warn!("supervisor configured without agents; using the built-in assistant");
            }
            let assistant = builtin_assistant(defaults);
            let tools = registry.definitions();
            return Ok(builder
                .tools(assistant.id.clone(), tools)
                .agent(assistant)
                .build()?);
        }

        for section in &self.agents {
            builder = builder.agent(section.to_spec(&defaults));
            if let Some(parent) = &section.parent {
                builder = builder.attach_child(parent.clone(), section.id.clone());
            }
            for name in &section.tools {
                let tool = registry.get(name).ok_or_else(|| {
                    OrchestrationError::Config(format!(
                        "agent '{}' references unknown tool '{name}'",
                        section.id
                    ))
                })?;
                builder = builder.tool(section.id.clone(), tool.definition());
            }
        }

        if let Some(supervisor) = &self.supervisor {
            let orphans: Vec<&AgentSection> =
                self.agents.iter().filter(|a| a.parent.is_none()).collect();
            let spec = supervisor
                .clone()
                .into_agent_spec(orphans.len(), defaults)?;
            let supervisor_id = spec.id.clone();
            builder = builder.agent(spec);
            for orphan in orphans {
                builder = builder.attach_child(supervisor_id.clone(), orphan.id.clone());
            }
        }

        Ok(builder.build()?)
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
