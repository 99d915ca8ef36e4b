//! 编排错误类型
//!
//! 所有错误只中止当前 (会话, Agent) 的这一步编排，不会回滚或污染情景记忆。
//! 外部工具失败不在此列：它们被编码进工具结果，交给 Agent 自行反思处理。

use thiserror::Error;

use crate::agent::GraphError;

/// 单步编排中可能出现的致命错误
#[derive(Error, Debug)]
pub enum OrchestrationError {
    /// route_to_agent 指定的目标不在当前 Agent 的子节点中
    #[error("Failed to route execution to agent '{requested}' from '{acting}': agent not found")]
    AgentNotFound { requested: String, acting: String },

    /// route_to_parent 或需要上交的 finalize 发生在根 Agent 上
    #[error("Failed to route execution to parent: agent '{0}' has no parent configured")]
    NoParent(String),

    /// Step 指向图中不存在的 Agent
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// 工具参数与其角色期望的结构不符
    #[error("Failed to parse {tool} arguments: {reason}")]
    PayloadParse { tool: String, reason: String },

    /// record_event 中的 status 不在封闭集合内
    #[error("Invalid record status: {0}")]
    InvalidStatus(String),

    /// 模型调用失败（含超时），由 ModelClient 透传
    #[error("Model call failed: {0}")]
    ModelCall(String),

    #[error("Template rendering failed: {0}")]
    Template(String),

    /// 调度器已关闭，无法再提交新的 Step
    #[error("Step scheduler is closed")]
    SchedulerClosed,

    #[error("Config error: {0}")]
    Config(String),
}

impl OrchestrationError {
    /// 是否属于解析类错误（目标 Agent 或父节点缺失）
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            OrchestrationError::AgentNotFound { .. } | OrchestrationError::NoParent(_)
        )
    }

    pub(crate) fn payload(tool: &str, err: impl std::fmt::Display) -> Self {
        OrchestrationError::PayloadParse {
            tool: tool.to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<GraphError> for OrchestrationError {
    fn from(err: GraphError) -> Self {
        OrchestrationError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_errors_are_classified() {
        let not_found = OrchestrationError::AgentNotFound {
            requested: "billing".to_string(),
            acting: "supervisor".to_string(),
        };
        assert!(not_found.is_resolution());
        assert!(OrchestrationError::NoParent("root".to_string()).is_resolution());
        assert!(!OrchestrationError::ModelCall("timeout".to_string()).is_resolution());
    }

    #[test]
    fn test_error_messages_name_the_agent() {
        let err = OrchestrationError::AgentNotFound {
            requested: "billing".to_string(),
            acting: "supervisor".to_string(),
        };
        assert!(err.to_string().contains("'billing'"));

        let err = OrchestrationError::payload("route_to_agent", "missing field `objective`");
        assert!(err.to_string().contains("route_to_agent"));
        assert!(err.to_string().contains("objective"));
    }
}
