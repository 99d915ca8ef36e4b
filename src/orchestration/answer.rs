//! 答案分发：把中间消息与最终答案原样扇出给所有监听者
//!
//! 监听者是同步回调，分发不做任何变换；同一会话内的顺序即发布顺序。

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::OrchestrationError;
use crate::memory::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerKind {
    /// 多步动作进行中的提示
    Interim,
    /// 需要用户回应的回答或提问
    Answer,
    /// 根 Agent 的最终答案
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub session_id: String,
    pub agent_id: Option<String>,
    pub user_message: Option<String>,
    pub text: String,
    pub kind: AnswerKind,
}

impl Answer {
    pub fn new(
        session_id: &str,
        agent_id: Option<&str>,
        user_message: Option<&Message>,
        text: &str,
        kind: AnswerKind,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            agent_id: agent_id.map(str::to_string),
            user_message: user_message.map(|m| m.content.clone()),
            text: text.to_string(),
            kind,
        }
    }
}

pub trait AnswerListener: Send + Sync {
    fn on_answer(&self, answer: &Answer);

    /// worker 上某一步失败时通知；默认忽略
    fn on_step_failed(&self, _session_id: &str, _agent_id: &str, _error: &OrchestrationError) {}
}

#[derive(Default, Clone)]
pub struct AnswerSink {
    listeners: Vec<Arc<dyn AnswerListener>>,
}

impl AnswerSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&mut self, listener: Arc<dyn AnswerListener>) {
        self.listeners.push(listener);
    }

    pub fn deliver(&self, answer: Answer) {
        tracing::info!(
            session = %answer.session_id,
            agent = answer.agent_id.as_deref().unwrap_or("-"),
            kind = ?answer.kind,
            "answer published"
        );
        for listener in &self.listeners {
            listener.on_answer(&answer);
        }
    }

    pub fn step_failed(&self, session_id: &str, agent_id: &str, error: &OrchestrationError) {
        for listener in &self.listeners {
            listener.on_step_failed(session_id, agent_id, error);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// 引擎对外事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Answer(Answer),
    StepFailed {
        session_id: String,
        agent_id: String,
        error: String,
    },
}

/// 把事件转发进 mpsc 通道的监听者
pub struct ChannelAnswerListener {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelAnswerListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("event receiver dropped");
        }
    }
}

impl AnswerListener for ChannelAnswerListener {
    fn on_answer(&self, answer: &Answer) {
        self.send(EngineEvent::Answer(answer.clone()));
    }

    fn on_step_failed(&self, session_id: &str, agent_id: &str, error: &OrchestrationError) {
        self.send(EngineEvent::StepFailed {
            session_id: session_id.to_string(),
            agent_id: agent_id.to_string(),
            error: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_fans_out_to_every_listener() {
        let (first, mut rx1) = ChannelAnswerListener::new();
        let (second, mut rx2) = ChannelAnswerListener::new();
        let mut sink = AnswerSink::new();
        sink.add_listener(Arc::new(first));
        sink.add_listener(Arc::new(second));

        let user = Message::user("hi");
        sink.deliver(Answer::new("s1", Some("a"), Some(&user), "hello", AnswerKind::Answer));
        sink.step_failed("s1", "a", &OrchestrationError::NoParent("a".to_string()));

        for rx in [&mut rx1, &mut rx2] {
            match rx.try_recv().unwrap() {
                EngineEvent::Answer(answer) => {
                    assert_eq!(answer.text, "hello");
                    assert_eq!(answer.user_message.as_deref(), Some("hi"));
                }
                other => panic!("unexpected event {other:?}"),
            }
            assert!(matches!(rx.try_recv().unwrap(), EngineEvent::StepFailed { .. }));
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = EngineEvent::Answer(Answer::new("s1", None, None, "done", AnswerKind::Final));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "answer");
        assert_eq!(json["kind"], "final");
        assert_eq!(json["text"], "done");
    }
}
