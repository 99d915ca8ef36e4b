//! 情景记忆：按 (会话, Agent) 划分的只追加时间线
//!
//! 概念上是 `Map<SessionId, Map<AgentId, Vec<RecordEvent>>>`：
//! - 读取不存在的键返回空时间线，从不失败；
//! - 记录只追加，不修改、不删除、不重排，最后一条即“当前状态”；
//! - 同一时间线的并发追加由该时间线自己的锁串行化，不同键之间只共享外层读锁。
//!
//! 会话生命周期归嵌入方所有：引擎本身从不驱逐，`evict_session` / `evict_idle` 供外部调用。

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

/// 时间线状态（封闭集合，只做分类，不隐含先后顺序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    UserInputRequest,
    WaitUserInput,
    AgentExecution,
    WaitAgentExecution,
    FinishedAgentExecution,
    WaitToolExecution,
    FinishedToolExecution,
    Finished,
}

impl Status {
    pub const ALL: [Status; 8] = [
        Status::UserInputRequest,
        Status::WaitUserInput,
        Status::AgentExecution,
        Status::WaitAgentExecution,
        Status::FinishedAgentExecution,
        Status::WaitToolExecution,
        Status::FinishedToolExecution,
        Status::Finished,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::UserInputRequest => "USER_INPUT_REQUEST",
            Status::WaitUserInput => "WAIT_USER_INPUT",
            Status::AgentExecution => "AGENT_EXECUTION",
            Status::WaitAgentExecution => "WAIT_AGENT_EXECUTION",
            Status::FinishedAgentExecution => "FINISHED_AGENT_EXECUTION",
            Status::WaitToolExecution => "WAIT_TOOL_EXECUTION",
            Status::FinishedToolExecution => "FINISHED_TOOL_EXECUTION",
            Status::Finished => "FINISHED",
        }
    }

    /// 情景记忆 prompt 中的状态图例
    pub fn usage(&self) -> &'static str {
        match self {
            Status::UserInputRequest => "The user sent input that the agent must process to continue.",
            Status::WaitUserInput => "Execution is paused until the user provides the requested information.",
            Status::AgentExecution => "An agent started working on the objective assigned to it.",
            Status::WaitAgentExecution => "Work was delegated to another agent and its result is pending.",
            Status::FinishedAgentExecution => "A delegated agent completed its objective and reported back.",
            Status::WaitToolExecution => "A tool was triggered and its result is pending.",
            Status::FinishedToolExecution => "A tool finished and its result was received.",
            Status::Finished => "The overall objective has been fully completed.",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Status::ALL
            .iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .copied()
            .ok_or_else(|| wanted.to_string())
    }
}

/// 时间线上的一条不可变记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordEvent {
    pub status: Status,
    pub content: String,
    pub recorded_at: DateTime<Utc>,
}

impl RecordEvent {
    pub fn new(status: Status, content: impl Into<String>) -> Self {
        Self {
            status,
            content: content.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// 情景记忆存储接口（注入到引擎中，默认实现为进程内存）
#[async_trait]
pub trait EpisodicMemory: Send + Sync {
    /// 追加一条记录；键不存在时隐式创建
    async fn append(&self, session_id: &str, agent_id: &str, record: RecordEvent);

    /// 按插入顺序返回时间线快照，键不存在时返回空
    async fn timeline(&self, session_id: &str, agent_id: &str) -> Vec<RecordEvent>;

    /// 当前状态（时间线最后一条）
    async fn current(&self, session_id: &str, agent_id: &str) -> Option<RecordEvent> {
        self.timeline(session_id, agent_id).await.pop()
    }

    /// 丢弃整个会话的所有时间线，返回是否存在
    async fn evict_session(&self, session_id: &str) -> bool;

    /// 丢弃超过 ttl 未被写入的会话，返回被丢弃的数量
    /// 返回被回收的会话 id
    async fn evict_idle(&self, ttl: Duration) -> Vec<String>;

    async fn session_count(&self) -> usize;
}

type Timeline = Arc<Mutex<Vec<RecordEvent>>>;

/// 单个会话：各 Agent 的时间线 + 最近写入时间（毫秒）
struct SessionEntry {
    agents: RwLock<HashMap<String, Timeline>>,
    touched_at_ms: AtomicI64,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            touched_at_ms: AtomicI64::new(Utc::now().timestamp_millis()),
        }
    }

    fn touch(&self) {
        self.touched_at_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    async fn timeline(&self, agent_id: &str) -> Option<Timeline> {
        self.agents.read().await.get(agent_id).cloned()
    }

    async fn timeline_or_create(&self, agent_id: &str) -> Timeline {
        if let Some(timeline) = self.timeline(agent_id).await {
            return timeline;
        }
        self.agents
            .write()
            .await
            .entry(agent_id.to_string())
            .or_default()
            .clone()
    }
}

/// 进程内情景记忆
#[derive(Default)]
pub struct InMemoryEpisodicStore {
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
}

impl InMemoryEpisodicStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn session(&self, session_id: &str) -> Option<Arc<SessionEntry>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    async fn session_or_create(&self, session_id: &str) -> Arc<SessionEntry> {
        if let Some(entry) = self.session(session_id).await {
            return entry;
        }
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(SessionEntry::new()))
            .clone()
    }
}

#[async_trait]
impl EpisodicMemory for InMemoryEpisodicStore {
    async fn append(&self, session_id: &str, agent_id: &str, record: RecordEvent) {
        let session = self.session_or_create(session_id).await;
        let timeline = session.timeline_or_create(agent_id).await;
        tracing::debug!(
            session = %session_id,
            agent = %agent_id,
            status = %record.status,
            "episodic append"
        );
        timeline.lock().await.push(record);
        session.touch();
    }

    async fn timeline(&self, session_id: &str, agent_id: &str) -> Vec<RecordEvent> {
        let Some(session) = self.session(session_id).await else {
            return Vec::new();
        };
        match session.timeline(agent_id).await {
            Some(timeline) => timeline.lock().await.clone(),
            None => Vec::new(),
        }
    }

    async fn evict_session(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    async fn evict_idle(&self, ttl: Duration) -> Vec<String> {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let now = Utc::now().timestamp_millis();
        let mut sessions = self.sessions.write().await;
        let idle: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| {
                now.saturating_sub(entry.touched_at_ms.load(Ordering::Relaxed)) > ttl_ms
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &idle {
            sessions.remove(id);
        }
        if !idle.is_empty() {
            tracing::info!(evicted = idle.len(), "evicted idle sessions");
        }
        idle
    }

    async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_accepts_any_case() {
        assert_eq!("FINISHED".parse::<Status>(), Ok(Status::Finished));
        assert_eq!(
            " wait_user_input ".parse::<Status>(),
            Ok(Status::WaitUserInput)
        );
        assert_eq!("DONE".parse::<Status>(), Err("DONE".to_string()));
    }

    #[test]
    fn test_status_serializes_screaming_snake() {
        let json = serde_json::to_string(&Status::FinishedToolExecution).unwrap();
        assert_eq!(json, "\"FINISHED_TOOL_EXECUTION\"");
    }

    #[tokio::test]
    async fn test_missing_timeline_reads_empty() {
        let store = InMemoryEpisodicStore::new();
        assert!(store.timeline("s1", "a").await.is_empty());
        assert!(store.current("s1", "a").await.is_none());
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_timeline_only_grows() {
        let store = InMemoryEpisodicStore::new();
        let mut previous: Vec<RecordEvent> = Vec::new();
        for (i, status) in Status::ALL.iter().enumerate() {
            store
                .append("s1", "a", RecordEvent::new(*status, format!("step {i}")))
                .await;
            let current = store.timeline("s1", "a").await;
            assert_eq!(current.len(), previous.len() + 1);
            assert_eq!(&current[..previous.len()], previous.as_slice());
            previous = current;
        }
        assert_eq!(
            store.current("s1", "a").await.map(|r| r.status),
            Some(Status::Finished)
        );
    }

    #[tokio::test]
    async fn test_timelines_are_keyed_by_session_and_agent() {
        let store = InMemoryEpisodicStore::new();
        store
            .append("s1", "a", RecordEvent::new(Status::UserInputRequest, "hi"))
            .await;
        store
            .append("s1", "b", RecordEvent::new(Status::AgentExecution, "go"))
            .await;
        store
            .append("s2", "a", RecordEvent::new(Status::Finished, "bye"))
            .await;

        assert_eq!(store.timeline("s1", "a").await[0].content, "hi");
        assert_eq!(store.timeline("s1", "b").await[0].content, "go");
        assert_eq!(store.timeline("s2", "a").await[0].content, "bye");
        assert!(store.timeline("s2", "b").await.is_empty());
        assert_eq!(store.session_count().await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sessions_do_not_mix() {
        let store = Arc::new(InMemoryEpisodicStore::new());
        let mut handles = Vec::new();
        for session in ["s1", "s2"] {
            for i in 0..50 {
                let store = store.clone();
                handles.push(tokio::spawn(async move {
                    store
                        .append(
                            session,
                            "x",
                            RecordEvent::new(Status::WaitUserInput, format!("{session}-{i}")),
                        )
                        .await;
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap();
        }

        for session in ["s1", "s2"] {
            let timeline = store.timeline(session, "x").await;
            assert_eq!(timeline.len(), 50);
            assert!(timeline
                .iter()
                .all(|r| r.content.starts_with(&format!("{session}-"))));
        }
    }

    #[tokio::test]
    async fn test_evict_session_and_idle() {
        let store = InMemoryEpisodicStore::new();
        store
            .append("s1", "a", RecordEvent::new(Status::Finished, "done"))
            .await;
        store
            .append("s2", "a", RecordEvent::new(Status::Finished, "done"))
            .await;

        assert!(store.evict_session("s1").await);
        assert!(!store.evict_session("s1").await);
        assert!(store.timeline("s1", "a").await.is_empty());

        assert!(store.evict_idle(Duration::from_secs(3600)).await.is_empty());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.evict_idle(Duration::from_millis(1)).await, vec!["s2".to_string()]);
        assert_eq!(store.session_count().await, 0);
    }
}
