//! 编排步骤：一次“组装 -> 调模型 -> 分发”的输入与结果

use crate::agent::{AgentId, SessionId};
use crate::memory::{Message, Status};

/// 针对某个 (会话, Agent) 的一次模型调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub session_id: SessionId,
    pub agent_id: AgentId,
    /// 交接说明（委派、反思、上交）
    pub handoff: Option<Message>,
    /// 显式情景上下文；为空时由组装器按当前时间线渲染
    pub episodic: Option<Message>,
    /// 触发本轮的原始用户消息，沿委派链一路携带
    pub user_message: Option<Message>,
}

impl Step {
    pub fn new(session_id: impl Into<SessionId>, agent_id: impl Into<AgentId>) -> Self {
        Self {
            session_id: session_id.into(),
            agent_id: agent_id.into(),
            handoff: None,
            episodic: None,
            user_message: None,
        }
    }

    pub fn with_handoff(mut self, handoff: Message) -> Self {
        self.handoff = Some(handoff);
        self
    }

    pub fn with_episodic(mut self, episodic: Option<Message>) -> Self {
        self.episodic = episodic;
        self
    }

    pub fn with_user_message(mut self, user_message: Option<Message>) -> Self {
        self.user_message = user_message;
        self
    }
}

/// 分发一次模型响应后的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// 已向用户发布内容，等待新的用户输入
    AwaitingUser,
    /// 根 Agent 完成，最终答案已发布
    Completed,
    /// 需要继续调用模型（可能换了 Agent）
    Continue(Step),
    /// 记录了一个不驱动流转的状态
    Recorded(Status),
    /// 响应既无文本也无工具调用
    Empty,
}

impl StepOutcome {
    pub fn next_step(&self) -> Option<&Step> {
        match self {
            StepOutcome::Continue(step) => Some(step),
            _ => None,
        }
    }
}
