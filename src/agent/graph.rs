//! Agent 图：构建后不可变的委派树
//!
//! 通过 AgentGraphBuilder 一次性声明 Agent、父子关系与外部工具，build 时统一校验
//! （单父、无环、无悬空引用）并计算每个 Agent 的最终工具目录：有子节点则带 route_to_agent，
//! 有父节点则带 route_to_parent。重复挂接同一子节点是幂等的。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;

use crate::agent::{AgentId, AgentSpec, ProviderSettings, ToolChoice};
use crate::core::OrchestrationError;
use crate::tools::{system, ToolDefinition};

/// 图构建错误
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    #[error("Agent '{agent}' has a blank {field}")]
    InvalidSpec { agent: String, field: &'static str },

    #[error("Agent '{0}' is declared twice")]
    DuplicateAgent(String),

    #[error("Unknown agent referenced: {0}")]
    UnknownAgent(String),

    #[error("Agent '{child}' already has parent '{existing}', cannot attach to '{requested}'")]
    ConflictingParent {
        child: String,
        existing: String,
        requested: String,
    },

    #[error("Attaching agents would create a cycle through '{0}'")]
    Cycle(String),
}

/// 图中的 Agent 节点；父子关系以 id 表示，节点本身不持有其他节点
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub goal: String,
    pub prompt: String,
    pub provider: ProviderSettings,
    pub supports_interim_messages: bool,
    pub tool_choice: ToolChoice,
    parent: Option<AgentId>,
    children: Vec<AgentId>,
    tools: Vec<ToolDefinition>,
    context: HashMap<String, String>,
}

impl Agent {
    pub fn parent_id(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn child_ids(&self) -> &[AgentId] {
        &self.children
    }

    /// 有序工具目录
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    /// prompt 模板变量：name、goal、agents
    pub fn context(&self) -> &HashMap<String, String> {
        &self.context
    }
}

#[derive(Default)]
pub struct AgentGraphBuilder {
    specs: Vec<AgentSpec>,
    links: Vec<(AgentId, AgentId)>,
    external_tools: Vec<(AgentId, ToolDefinition)>,
}

impl AgentGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn agent(mut self, spec: AgentSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// 把 child 挂到 parent 下；重复挂接同一对只生效一次
    pub fn attach_child(mut self, parent: impl Into<AgentId>, child: impl Into<AgentId>) -> Self {
        let link = (parent.into(), child.into());
        if !self.links.contains(&link) {
            self.links.push(link);
        }
        self
    }

    /// 等价于 attach_child(parent, agent)
    pub fn set_parent(self, agent: impl Into<AgentId>, parent: impl Into<AgentId>) -> Self {
        self.attach_child(parent, agent)
    }

    /// 为某个 Agent 注册外部工具，按注册顺序排在系统工具之后
    pub fn tool(mut self, agent: impl Into<AgentId>, tool: ToolDefinition) -> Self {
        self.external_tools.push((agent.into(), tool));
        self
    }

    pub fn tools(mut self, agent: impl Into<AgentId>, tools: Vec<ToolDefinition>) -> Self {
        let agent = agent.into();
        for tool in tools {
            self.external_tools.push((agent.clone(), tool));
        }
        self
    }

    pub fn build(self) -> Result<AgentGraph, GraphError> {
        let mut known: HashSet<&str> = HashSet::new();
        for spec in &self.specs {
            spec.validate()?;
            if !known.insert(spec.id.as_str()) {
                return Err(GraphError::DuplicateAgent(spec.id.clone()));
            }
        }

        let mut parents: HashMap<&str, &str> = HashMap::new();
        let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
        for (parent, child) in &self.links {
            for id in [parent, child] {
                if !known.contains(id.as_str()) {
                    return Err(GraphError::UnknownAgent(id.clone()));
                }
            }
            if parent == child {
                return Err(GraphError::Cycle(child.clone()));
            }
            if let Some(existing) = parents.get(child.as_str()) {
                return Err(GraphError::ConflictingParent {
                    child: child.clone(),
                    existing: existing.to_string(),
                    requested: parent.clone(),
                });
            }
            parents.insert(child.as_str(), parent.as_str());
            children
                .entry(parent.as_str())
                .or_default()
                .push(child.as_str());
        }

        // 沿父链向上走，回到起点即成环
        for spec in &self.specs {
            let start = spec.id.as_str();
            let mut seen = HashSet::from([start]);
            let mut cursor = start;
            while let Some(parent) = parents.get(cursor) {
                if !seen.insert(*parent) {
                    return Err(GraphError::Cycle(parent.to_string()));
                }
                cursor = *parent;
            }
        }

        for (agent, _) in &self.external_tools {
            if !known.contains(agent.as_str()) {
                return Err(GraphError::UnknownAgent(agent.clone()));
            }
        }

        let by_id: HashMap<&str, &AgentSpec> =
            self.specs.iter().map(|s| (s.id.as_str(), s)).collect();
        let mut agents = HashMap::with_capacity(self.specs.len());
        for spec in &self.specs {
            let id = spec.id.as_str();
            let child_ids: Vec<&str> = children.get(id).cloned().unwrap_or_default();
            let external: Vec<ToolDefinition> = self
                .external_tools
                .iter()
                .filter(|(owner, _)| owner == id)
                .map(|(_, tool)| tool.clone())
                .collect();
            let tools = system::catalog_for(
                spec,
                !child_ids.is_empty(),
                parents.contains_key(id),
                &external,
            );
            warn_duplicate_tools(id, &tools);

            let agents_listing = child_ids
                .iter()
                .filter_map(|c| by_id.get(c))
                .map(|c| format!("- {} ({}): {}", c.name, c.id, c.goal))
                .collect::<Vec<_>>()
                .join("\n");
            let context = HashMap::from([
                ("name".to_string(), spec.name.clone()),
                ("goal".to_string(), spec.goal.clone()),
                ("agents".to_string(), agents_listing),
            ]);

            agents.insert(
                spec.id.clone(),
                Arc::new(Agent {
                    id: spec.id.clone(),
                    name: spec.name.clone(),
                    goal: spec.goal.clone(),
                    prompt: spec.prompt.clone(),
                    provider: spec.provider.clone(),
                    supports_interim_messages: spec.supports_interim_messages,
                    tool_choice: spec.tool_choice,
                    parent: parents.get(id).map(|p| p.to_string()),
                    children: child_ids.iter().map(|c| c.to_string()).collect(),
                    tools,
                    context,
                }),
            );
        }

        tracing::info!(agents = agents.len(), links = self.links.len(), "agent graph built");
        Ok(AgentGraph {
            agents,
            order: self.specs.iter().map(|s| s.id.clone()).collect(),
        })
    }
}

fn warn_duplicate_tools(agent: &str, tools: &[ToolDefinition]) {
    let mut names = HashSet::new();
    for tool in tools {
        if !names.insert(tool.name.as_str()) {
            tracing::warn!(agent = %agent, tool = %tool.name, "duplicate tool name, dispatch is ambiguous");
        }
    }
}

/// 不可变的 Agent 图，可在多个 worker 间共享
#[derive(Debug)]
pub struct AgentGraph {
    agents: HashMap<AgentId, Arc<Agent>>,
    order: Vec<AgentId>,
}

impl AgentGraph {
    pub fn builder() -> AgentGraphBuilder {
        AgentGraphBuilder::new()
    }

    pub fn get(&self, id: &str) -> Option<Arc<Agent>> {
        self.agents.get(id).cloned()
    }

    pub fn require(&self, id: &str) -> Result<Arc<Agent>, OrchestrationError> {
        self.get(id)
            .ok_or_else(|| OrchestrationError::UnknownAgent(id.to_string()))
    }

    pub fn tools(&self, id: &str) -> Option<&[ToolDefinition]> {
        self.agents.get(id).map(|a| a.tools())
    }

    pub fn parent_of(&self, id: &str) -> Option<Arc<Agent>> {
        self.agents
            .get(id)
            .and_then(|a| a.parent_id())
            .and_then(|p| self.get(p))
    }

    pub fn children_of(&self, id: &str) -> Vec<Arc<Agent>> {
        self.agents
            .get(id)
            .map(|a| a.child_ids().iter().filter_map(|c| self.get(c)).collect())
            .unwrap_or_default()
    }

    /// 在 acting 的子节点中按名称查找，找不到再按 id 查找
    pub fn resolve_by_name_or_id(
        &self,
        acting: &Agent,
        requested: &str,
    ) -> Result<Arc<Agent>, OrchestrationError> {
        let wanted = requested.trim();
        let children = self.children_of(&acting.id);
        children
            .iter()
            .find(|c| c.name == wanted)
            .or_else(|| children.iter().find(|c| c.id == wanted))
            .cloned()
            .ok_or_else(|| OrchestrationError::AgentNotFound {
                requested: requested.to_string(),
                acting: acting.id.clone(),
            })
    }

    /// 没有父节点的 Agent，按声明顺序
    pub fn roots(&self) -> Vec<Arc<Agent>> {
        self.order
            .iter()
            .filter_map(|id| self.get(id))
            .filter(|a| a.parent_id().is_none())
            .collect()
    }

    pub fn agent_ids(&self) -> &[AgentId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::system::{RECORD_EVENT, ROUTE_TO_AGENT, ROUTE_TO_PARENT};

    fn spec(id: &str, name: &str) -> AgentSpec {
        AgentSpec::new(id, name, format!("{name} goal"), format!("You are {name}"))
    }

    fn count(agent: &Agent, tool: &str) -> usize {
        agent.tools().iter().filter(|t| t.name == tool).count()
    }

    #[test]
    fn test_attaching_same_child_twice_installs_one_delegate_tool() {
        let graph = AgentGraph::builder()
            .agent(spec("sup", "Supervisor"))
            .agent(spec("bill", "Billing"))
            .attach_child("sup", "bill")
            .attach_child("sup", "bill")
            .set_parent("bill", "sup")
            .build()
            .unwrap();

        let sup = graph.get("sup").unwrap();
        assert_eq!(count(&sup, ROUTE_TO_AGENT), 1);
        assert_eq!(sup.child_ids().len(), 1);
        assert_eq!(count(&sup, ROUTE_TO_PARENT), 0);

        let bill = graph.get("bill").unwrap();
        assert_eq!(count(&bill, ROUTE_TO_PARENT), 1);
        assert_eq!(count(&bill, ROUTE_TO_AGENT), 0);
        assert_eq!(count(&bill, RECORD_EVENT), 1);
        assert_eq!(graph.parent_of("bill").unwrap().id, "sup");
        assert!(graph.parent_of("sup").is_none());
    }

    #[test]
    fn test_resolve_prefers_name_then_id() {
        let graph = AgentGraph::builder()
            .agent(spec("sup", "Supervisor"))
            .agent(spec("a", "b"))
            .agent(spec("b", "Other"))
            .attach_child("sup", "a")
            .attach_child("sup", "b")
            .build()
            .unwrap();
        let sup = graph.get("sup").unwrap();

        assert_eq!(graph.resolve_by_name_or_id(&sup, "b").unwrap().id, "a");
        assert_eq!(graph.resolve_by_name_or_id(&sup, "Other").unwrap().id, "b");
        let err = graph.resolve_by_name_or_id(&sup, "Ghost").unwrap_err();
        assert!(matches!(err, OrchestrationError::AgentNotFound { .. }));

        // 只在自己的子节点中查找
        let a = graph.get("a").unwrap();
        assert!(graph.resolve_by_name_or_id(&a, "Other").is_err());
    }

    #[test]
    fn test_second_parent_is_rejected() {
        let err = AgentGraph::builder()
            .agent(spec("p1", "P1"))
            .agent(spec("p2", "P2"))
            .agent(spec("c", "C"))
            .attach_child("p1", "c")
            .attach_child("p2", "c")
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::ConflictingParent { .. }));
    }

    #[test]
    fn test_cycles_and_dangling_links_are_rejected() {
        let err = AgentGraph::builder()
            .agent(spec("a", "A"))
            .agent(spec("b", "B"))
            .attach_child("a", "b")
            .attach_child("b", "a")
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::Cycle(_)));

        let err = AgentGraph::builder()
            .agent(spec("a", "A"))
            .attach_child("a", "a")
            .build()
            .unwrap_err();
        assert!(matches!(err, GraphError::Cycle(_)));

        let err = AgentGraph::builder()
            .agent(spec("a", "A"))
            .attach_child("a", "ghost")
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::UnknownAgent("ghost".to_string()));

        let err = AgentGraph::builder()
            .agent(spec("a", "A"))
            .agent(spec("a", "Again"))
            .build()
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateAgent("a".to_string()));
    }

    #[test]
    fn test_external_tools_follow_system_tools_and_context_lists_children() {
        let lookup = ToolDefinition::new("lookup", "Find", serde_json::json!({}));
        let graph = AgentGraph::builder()
            .agent(spec("sup", "Supervisor"))
            .agent(spec("bill", "Billing"))
            .attach_child("sup", "bill")
            .tool("sup", lookup)
            .build()
            .unwrap();

        let sup = graph.get("sup").unwrap();
        let names: Vec<&str> = sup.tools().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec![ROUTE_TO_AGENT, RECORD_EVENT, "lookup"]);
        assert_eq!(sup.context()["agents"], "- Billing (bill): Billing goal");
        assert_eq!(sup.context()["name"], "Supervisor");
        assert_eq!(graph.roots().len(), 1);
    }
}
