//! 工具调用分类：每个工具名唯一对应一种编排动作

use crate::tools::system::{
    CHIT_CHAT, FALLBACK, FINALIZE_REQUEST, RECORD_EVENT, ROUTE_TO_AGENT, ROUTE_TO_PARENT,
    SELF_REFLECTION,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// 委派给子 Agent
    DelegateDown,
    /// 交还给父 Agent
    ReturnUp,
    /// 让同一 Agent 基于自身历史重新决策
    SelfReflect,
    /// 记录状态并可能结束本轮
    Finalize,
    /// 非编排类工具，交给 ToolListener
    External,
}

impl ToolKind {
    pub fn classify(tool_name: &str) -> Self {
        match tool_name {
            ROUTE_TO_AGENT => ToolKind::DelegateDown,
            ROUTE_TO_PARENT => ToolKind::ReturnUp,
            SELF_REFLECTION => ToolKind::SelfReflect,
            RECORD_EVENT | FINALIZE_REQUEST | CHIT_CHAT | FALLBACK => ToolKind::Finalize,
            _ => ToolKind::External,
        }
    }

    pub fn is_internal(&self) -> bool {
        *self != ToolKind::External
    }
}
