//! Supervisor：只做编排的根 Agent
//!
//! prompt 由固定段落拼成，不列出子 Agent 的描述，只给出子 Agent 数量。

use serde::Deserialize;

use crate::agent::{AgentSpec, GraphError, ProviderSettings, SystemToolToggles, ToolChoice};

const DEFAULT_LANGUAGE: &str = "pt-BR";
const DEFAULT_TONE: &str = "concise";

#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSpec {
    pub id: String,
    pub name: String,
    pub goal: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub additional_instructions: Option<String>,
    #[serde(default)]
    pub supports_interim_messages: bool,
    #[serde(default)]
    pub tool_choice: ToolChoice,
    #[serde(default = "default_enabled")]
    pub chit_chat_tool: bool,
    #[serde(default = "default_enabled")]
    pub fallback_tool: bool,
    #[serde(default = "default_enabled")]
    pub finalize_tool: bool,
}

fn default_enabled() -> bool {
    true
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl SupervisorSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            goal: goal.into(),
            language: None,
            tone: None,
            additional_instructions: None,
            supports_interim_messages: false,
            tool_choice: ToolChoice::Auto,
            chit_chat_tool: true,
            fallback_tool: true,
            finalize_tool: true,
        }
    }

    /// 生成 Supervisor 的 system prompt
    pub fn build_prompt(&self, child_count: usize) -> String {
        let language = non_blank(&self.language).unwrap_or(DEFAULT_LANGUAGE);
        let tone = non_blank(&self.tone).unwrap_or(DEFAULT_TONE);

        let mut prompt = String::with_capacity(900);
        prompt.push_str("You are the SUPERVISOR agent.\n\n");

        prompt.push_str("OBJECTIVE:\n");
        prompt.push_str(self.goal.trim());
        prompt.push_str("\n\n");

        prompt.push_str("PROCEDURAL RULES (STRICT):\n");
        prompt.push_str("- You only orchestrate; you do NOT execute domain work yourself.\n");
        prompt.push_str("- Routing decisions must be performed using the routing tool (when enabled).\n");
        prompt.push_str("- For chit-chat, you MUST use the chit-chat tool.\n");
        prompt.push_str("- For out-of-scope or unsupported requests, you MUST use the fallback tool.\n");
        prompt.push_str("- If the user request is ambiguous, ask ONE clarification question and wait.\n");
        prompt.push_str("- Never claim an action is completed unless a tool/agent result confirms it.\n\n");

        prompt.push_str("LANGUAGE & STYLE:\n");
        prompt.push_str(&format!("- Respond in: {language}\n"));
        prompt.push_str(&format!("- Tone: {tone}\n"));
        prompt.push_str("- Keep responses short and actionable.\n\n");

        prompt.push_str("CONTEXT:\n");
        prompt.push_str(&format!("- Linked child agents: {child_count}\n"));

        if let Some(extra) = non_blank(&self.additional_instructions) {
            prompt.push_str("\nADDITIONAL INSTRUCTIONS:\n");
            prompt.push_str(extra);
            prompt.push('\n');
        }
        prompt
    }

    /// 转成普通 AgentSpec（prompt 已生成，不含模板变量）
    pub fn into_agent_spec(
        self,
        child_count: usize,
        provider: ProviderSettings,
    ) -> Result<AgentSpec, GraphError> {
        let prompt = self.build_prompt(child_count);
        let spec = AgentSpec::new(self.id, self.name, self.goal, prompt)
            .with_provider(provider)
            .with_interim_messages(self.supports_interim_messages)
            .with_tool_choice(self.tool_choice)
            .with_system_tools(SystemToolToggles {
                finalize_request: self.finalize_tool,
                chit_chat: self.chit_chat_tool,
                fallback: self.fallback_tool,
                self_reflection: false,
            });
        spec.validate()?;
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_uses_defaults_for_blank_style() {
        let mut spec = SupervisorSpec::new("sup", "Supervisor", "Route customer requests");
        spec.tone = Some("   ".to_string());
        let prompt = spec.build_prompt(3);

        assert!(prompt.starts_with("You are the SUPERVISOR agent.\n\nOBJECTIVE:\nRoute customer requests\n"));
        assert!(prompt.contains("- Respond in: pt-BR\n"));
        assert!(prompt.contains("- Tone: concise\n"));
        assert!(prompt.contains("- Linked child agents: 3\n"));
        assert!(!prompt.contains("ADDITIONAL INSTRUCTIONS"));
    }

    #[test]
    fn test_prompt_appends_additional_instructions() {
        let mut spec = SupervisorSpec::new("sup", "Supervisor", "Route");
        spec.language = Some("en-US".to_string());
        spec.additional_instructions = Some("Never discuss pricing.".to_string());
        let prompt = spec.build_prompt(0);

        assert!(prompt.contains("- Respond in: en-US\n"));
        assert!(prompt.ends_with("ADDITIONAL INSTRUCTIONS:\nNever discuss pricing.\n"));
    }

    #[test]
    fn test_agent_spec_enables_supervisor_tools() {
        let spec = SupervisorSpec::new("sup", "Supervisor", "Route")
            .into_agent_spec(2, ProviderSettings::default())
            .unwrap();
        assert!(spec.system_tools.chit_chat);
        assert!(spec.system_tools.fallback);
        assert!(spec.system_tools.finalize_request);
        assert!(spec.prompt.contains("Linked child agents: 2"));

        let err = SupervisorSpec::new("sup", "Supervisor", " ")
            .into_agent_spec(0, ProviderSettings::default())
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidSpec { field: "goal", .. }));
    }
}
