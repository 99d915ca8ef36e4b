//! Agent 定义：身份、目标、prompt 模板、模型参数与系统工具开关

use serde::{Deserialize, Serialize};

use crate::agent::GraphError;

pub type AgentId = String;
pub type SessionId = String;

/// 模型参数（对引擎不透明，原样透传给模型客户端）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 1024,
            top_p: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    #[default]
    Auto,
    None,
    Required,
}

/// 可选系统工具；route_to_agent / route_to_parent / record_event 由图结构决定，不在此列
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemToolToggles {
    pub finalize_request: bool,
    pub chit_chat: bool,
    pub fallback: bool,
    pub self_reflection: bool,
}

/// 构建 AgentGraph 的输入
#[derive(Debug, Clone)]
pub struct AgentSpec {
    pub id: AgentId,
    pub name: String,
    pub goal: String,
    /// prompt 模板，可引用 {{name}}、{{goal}}、{{agents}}
    pub prompt: String,
    pub provider: ProviderSettings,
    pub supports_interim_messages: bool,
    pub tool_choice: ToolChoice,
    pub system_tools: SystemToolToggles,
}

impl AgentSpec {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        goal: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            goal: goal.into(),
            prompt: prompt.into(),
            provider: ProviderSettings::default(),
            supports_interim_messages: false,
            tool_choice: ToolChoice::Auto,
            system_tools: SystemToolToggles::default(),
        }
    }

    pub fn with_provider(mut self, provider: ProviderSettings) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_interim_messages(mut self, enabled: bool) -> Self {
        self.supports_interim_messages = enabled;
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }

    pub fn with_system_tools(mut self, toggles: SystemToolToggles) -> Self {
        self.system_tools = toggles;
        self
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        let fields = [
            ("id", &self.id),
            ("name", &self.name),
            ("goal", &self.goal),
            ("prompt", &self.prompt),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(GraphError::InvalidSpec {
                    agent: self.id.clone(),
                    field,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_fields_are_rejected() {
        assert!(AgentSpec::new("a", "A", "help", "You are A").validate().is_ok());
        let err = AgentSpec::new("a", "A", "  ", "You are A")
            .validate()
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidSpec { field: "goal", .. }));
    }

    #[test]
    fn test_tool_choice_parses_lowercase() {
        let choice: ToolChoice = serde_json::from_str("\"required\"").unwrap();
        assert_eq!(choice, ToolChoice::Required);
        assert_eq!(ToolChoice::default(), ToolChoice::Auto);
    }
}
