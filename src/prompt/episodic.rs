//! 情景记忆 prompt：把一条时间线渲染成可续跑的上下文
//!
//! 必须同时给出最近一条记录（当前状态）和完整历史（旧 -> 新），Agent 才能避免重复已完成的步骤。

use crate::memory::{RecordEvent, Status};

/// 时间线为空时返回 None（不伪造历史）
pub fn render_episodic_summary(records: &[RecordEvent]) -> Option<String> {
    let last = records.last()?;

    let legend = Status::ALL
        .iter()
        .map(|s| format!(" - {}: {}", s.as_str(), s.usage()))
        .collect::<Vec<_>>()
        .join("\n");

    let history = records
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {} - {}", i + 1, r.status, r.content.trim()))
        .collect::<Vec<_>>()
        .join("\n");

    Some(format!(
        "# EPISODIC MEMORY.

Purpose:
- Capture the current state and the execution history so the flow can resume correctly: \
what happened so far, where it stopped and what is expected next.

Status usage:
{legend}

Current execution state (most recent):
- status: {}
- context: {}

Execution history (oldest -> newest):
{history}",
        last.status,
        last.content.trim()
    ))
}
