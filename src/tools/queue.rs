//! 待执行委派队列
//!
//! 一次模型响应里若有多个 route_to_agent，只执行第一个，其余按 (会话, Agent) 排进 FIFO；
//! 子 Agent 交还控制权时先取出队首继续委派，队列排空后才真正向上返回。

use std::collections::{HashMap, VecDeque};

use tokio::sync::Mutex;

use crate::llm::ToolCall;
use crate::memory::Message;

/// 排队中的委派：原始工具调用 + 触发时的用户消息
#[derive(Debug, Clone)]
pub struct QueuedDelegation {
    pub tool_call: ToolCall,
    pub user_message: Option<Message>,
}

#[derive(Default)]
pub struct DelegationQueue {
    queues: Mutex<HashMap<(String, String), VecDeque<QueuedDelegation>>>,
}

impl DelegationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(&self, session_id: &str, agent_id: &str, item: QueuedDelegation) {
        self.queues
            .lock()
            .await
            .entry((session_id.to_string(), agent_id.to_string()))
            .or_default()
            .push_back(item);
    }

    pub async fn pop(&self, session_id: &str, agent_id: &str) -> Option<QueuedDelegation> {
        let mut queues = self.queues.lock().await;
        let key = (session_id.to_string(), agent_id.to_string());
        let queue = queues.get_mut(&key)?;
        let item = queue.pop_front();
        if queue.is_empty() {
            queues.remove(&key);
        }
        item
    }

    pub async fn len(&self, session_id: &str, agent_id: &str) -> usize {
        self.queues
            .lock()
            .await
            .get(&(session_id.to_string(), agent_id.to_string()))
            .map_or(0, VecDeque::len)
    }

    /// 丢弃某个 Agent 名下的排队委派
    pub async fn clear(&self, session_id: &str, agent_id: &str) {
        self.queues
            .lock()
            .await
            .remove(&(session_id.to_string(), agent_id.to_string()));
    }

    /// 丢弃某个会话的全部排队委派
    pub async fn clear_session(&self, session_id: &str) {
        self.queues
            .lock()
            .await
            .retain(|(session, _), _| session != session_id);
    }
}
