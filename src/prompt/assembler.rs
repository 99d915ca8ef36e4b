//! 上下文组装：为一次模型调用拼出有序消息列表
//!
//! 顺序固定为 `[system(渲染后的 Agent prompt), 交接?, 情景?, 用户消息?]`。
//! 情景消息只在时间线非空时附加：优先用 Step 显式携带的，否则按当前时间线现场渲染。

use std::sync::Arc;

use crate::agent::Agent;
use crate::core::OrchestrationError;
use crate::llm::ChatRequest;
use crate::memory::{EpisodicMemory, Message};
use crate::orchestration::Step;
use crate::prompt::{render_episodic_summary, TemplateRenderer};

pub struct ContextAssembler {
    renderer: Arc<dyn TemplateRenderer>,
    memory: Arc<dyn EpisodicMemory>,
}

impl ContextAssembler {
    pub fn new(renderer: Arc<dyn TemplateRenderer>, memory: Arc<dyn EpisodicMemory>) -> Self {
        Self { renderer, memory }
    }

    pub async fn assemble(&self, agent: &Agent, step: &Step) -> Result<ChatRequest, OrchestrationError> {
        let system = self
            .renderer
            .render(&agent.prompt, agent.context())
            .map_err(OrchestrationError::Template)?;

        let mut messages = vec![Message::system(system)];
        if let Some(handoff) = &step.handoff {
            messages.push(handoff.clone());
        }

        let timeline = self.memory.timeline(&step.session_id, &agent.id).await;
        if !timeline.is_empty() {
            let episodic = match &step.episodic {
                Some(provided) => Some(provided.clone()),
                None => render_episodic_summary(&timeline).map(Message::system),
            };
            messages.extend(episodic);
        }

        if let Some(user) = &step.user_message {
            messages.push(user.clone());
        }

        Ok(ChatRequest {
            model: agent.provider.model.clone(),
            messages,
            tools: agent.tools().to_vec(),
            tool_choice: agent.tool_choice,
            temperature: agent.provider.temperature,
            max_tokens: agent.provider.max_tokens,
            top_p: agent.provider.top_p,
        })
    }
}
