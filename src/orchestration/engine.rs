//! 编排引擎：把 Agent 图、模型、记忆、工具与答案监听者组装到一起
//!
//! 每个 Step 的执行流程：查 Agent -> 组装上下文 -> 调模型 -> 分发响应。
//! 错误只中止当前这一步，记日志并通知监听者，不影响其它会话。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::agent::AgentGraph;
use crate::core::{OrchestrationError, StepHandler, StepScheduler};
use crate::llm::ModelClient;
use crate::memory::{EpisodicMemory, InMemoryEpisodicStore, Message};
use crate::orchestration::{AnswerListener, AnswerSink, Dispatcher, Step, StepOutcome};
use crate::prompt::{handoff, render_episodic_summary, ContextAssembler, PlaceholderRenderer, TemplateRenderer};
use crate::tools::{ToolListener, ToolRouter, UnhandledToolListener};

/// 单步执行所需的全部组件（在 worker 间共享）
pub struct EngineCore {
    graph: Arc<AgentGraph>,
    memory: Arc<dyn EpisodicMemory>,
    model: Arc<dyn ModelClient>,
    assembler: ContextAssembler,
    dispatcher: Dispatcher,
    answers: Arc<AnswerSink>,
}

impl EngineCore {
    /// 同步执行一个 Step（不经调度器）
    pub async fn run_step(&self, step: &Step) -> Result<Vec<StepOutcome>, OrchestrationError> {
        let agent = self.graph.require(&step.agent_id)?;
        let request = self.assembler.assemble(&agent, step).await?;

        let request_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(
            request_id = %request_id,
            session = %step.session_id,
            agent = %agent.id,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "calling model"
        );
        let response = self
            .model
            .call(&request_id, &request)
            .await
            .map_err(OrchestrationError::ModelCall)?;

        self.dispatcher.dispatch(step, &agent, response).await
    }
}

#[async_trait]
impl StepHandler for EngineCore {
    async fn handle(&self, step: Step) -> Vec<Step> {
        match self.run_step(&step).await {
            Ok(outcomes) => outcomes
                .into_iter()
                .filter_map(|outcome| match outcome {
                    StepOutcome::Continue(next) => Some(next),
                    _ => None,
                })
                .collect(),
            Err(e) => {
                tracing::error!(
                    session = %step.session_id,
                    agent = %step.agent_id,
                    error = %e,
                    "step failed"
                );
                self.answers.step_failed(&step.session_id, &step.agent_id, &e);
                Vec::new()
            }
        }
    }
}

pub struct Engine {
    core: Arc<EngineCore>,
    scheduler: StepScheduler,
}

impl Engine {
    pub fn builder(graph: AgentGraph, model: Arc<dyn ModelClient>) -> EngineBuilder {
        EngineBuilder::new(graph, model)
    }

    /// 记录用户输入并构造送往目标 Agent 的 Step
    ///
    /// 首次接触附带引导交接，情景上下文由组装器按时间线渲染；
    /// 否则附带追加本条输入之前的情景摘要。
    pub async fn prepare_user_step(
        &self,
        session_id: &str,
        agent_id: &str,
        text: &str,
    ) -> Result<Step, OrchestrationError> {
        let agent = self.core.graph.require(agent_id)?;
        let timeline = self.core.memory.timeline(session_id, &agent.id).await;

        let mut step = Step::new(session_id, agent.id.clone()).with_user_message(Some(Message::user(text)));
        if timeline.is_empty() {
            step = step.with_handoff(handoff::first_contact_handoff());
        } else {
            step = step.with_episodic(render_episodic_summary(&timeline).map(Message::system));
        }

        self.core
            .memory
            .append(session_id, &agent.id, handoff::user_input_record(text))
            .await;
        Ok(step)
    }

    /// 用户消息入口：记录输入并提交给调度器，立即返回
    pub async fn submit_user_message(
        &self,
        session_id: &str,
        agent_id: &str,
        text: &str,
    ) -> Result<(), OrchestrationError> {
        if self.scheduler.is_closed() {
            return Err(OrchestrationError::SchedulerClosed);
        }
        let step = self.prepare_user_step(session_id, agent_id, text).await?;
        tracing::info!(session = %session_id, agent = %agent_id, "user message submitted");
        self.submit(step)
    }

    pub fn submit(&self, step: Step) -> Result<(), OrchestrationError> {
        self.scheduler.submit(step)
    }

    pub async fn run_step(&self, step: &Step) -> Result<Vec<StepOutcome>, OrchestrationError> {
        self.core.run_step(step).await
    }

    /// 在当前 task 上一直执行到没有后续 Step，返回每一步的结果
    pub async fn drive(&self, step: Step) -> Result<Vec<StepOutcome>, OrchestrationError> {
        let mut all = Vec::new();
        let mut pending = vec![step];
        while let Some(step) = pending.pop() {
            let outcomes = self.core.run_step(&step).await?;
            pending.extend(outcomes.iter().filter_map(|o| o.next_step().cloned()));
            all.extend(outcomes);
        }
        Ok(all)
    }

    /// 已提交但尚未执行完的 Step 数
    pub fn pending(&self) -> usize {
        self.scheduler.pending()
    }

    /// 丢弃会话的情景记忆与排队委派
    pub async fn evict_session(&self, session_id: &str) -> bool {
        self.core.dispatcher.router().queue().clear_session(session_id).await;
        self.core.memory.evict_session(session_id).await
    }

    /// 回收空闲超过 `ttl` 的会话，连同它们的排队委派；返回被回收的会话 id
    pub async fn evict_idle(&self, ttl: Duration) -> Vec<String> {
        let evicted = self.core.memory.evict_idle(ttl).await;
        let queue = self.core.dispatcher.router().queue();
        for session_id in &evicted {
            queue.clear_session(session_id).await;
        }
        evicted
    }

    /// 某个 Agent 名下尚未执行的委派数
    pub async fn queued_delegations(&self, session_id: &str, agent_id: &str) -> usize {
        self.core
            .dispatcher
            .router()
            .queue()
            .len(session_id, agent_id)
            .await
    }

    pub fn memory(&self) -> &Arc<dyn EpisodicMemory> {
        &self.core.memory
    }

    pub fn graph(&self) -> &Arc<AgentGraph> {
        &self.core.graph
    }

    pub fn shutdown(&self) {
        tracing::info!("engine shutting down");
        self.scheduler.shutdown();
    }
}

pub struct EngineBuilder {
    graph: AgentGraph,
    model: Arc<dyn ModelClient>,
    memory: Option<Arc<dyn EpisodicMemory>>,
    renderer: Option<Arc<dyn TemplateRenderer>>,
    tools: Option<Arc<dyn ToolListener>>,
    answers: AnswerSink,
    max_concurrent_steps: usize,
}

impl EngineBuilder {
    pub fn new(graph: AgentGraph, model: Arc<dyn ModelClient>) -> Self {
        Self {
            graph,
            model,
            memory: None,
            renderer: None,
            tools: None,
            answers: AnswerSink::new(),
            max_concurrent_steps: 4,
        }
    }

    pub fn memory(mut self, memory: Arc<dyn EpisodicMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn tool_listener(mut self, tools: Arc<dyn ToolListener>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn answer_listener(mut self, listener: Arc<dyn AnswerListener>) -> Self {
        self.answers.add_listener(listener);
        self
    }

    pub fn max_concurrent_steps(mut self, n: usize) -> Self {
        self.max_concurrent_steps = n.max(1);
        self
    }

    /// 构建引擎并启动调度循环；需要在 tokio 运行时内调用
    pub fn build(self) -> Engine {
        let graph = Arc::new(self.graph);
        let memory = self
            .memory
            .unwrap_or_else(|| Arc::new(InMemoryEpisodicStore::new()));
        let renderer = self
            .renderer
            .unwrap_or_else(|| Arc::new(PlaceholderRenderer));
        let tools = self
            .tools
            .unwrap_or_else(|| Arc::new(UnhandledToolListener));
        if self.answers.listener_count() == 0 {
            tracing::warn!("engine built without answer listeners; answers will only be logged");
        }
        let answers = Arc::new(self.answers);

        let router = Arc::new(ToolRouter::new(
            graph.clone(),
            memory.clone(),
            answers.clone(),
            tools,
        ));
        let core = Arc::new(EngineCore {
            graph: graph.clone(),
            memory: memory.clone(),
            model: self.model,
            assembler: ContextAssembler::new(renderer, memory.clone()),
            dispatcher: Dispatcher::new(memory, answers.clone(), router),
            answers,
        });
        let scheduler = StepScheduler::start(core.clone(), self.max_concurrent_steps);
        tracing::info!(
            agents = graph.len(),
            max_concurrent_steps = self.max_concurrent_steps,
            "engine started"
        );
        Engine { core, scheduler }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::agent::AgentSpec;
    use crate::llm::ScriptedModelClient;
    use crate::memory::{Role, Status};

    fn graph() -> AgentGraph {
        AgentGraph::builder()
            .agent(AgentSpec::new("sup", "Supervisor", "route", "You are {{name}}."))
            .agent(AgentSpec::new("billing", "Billing", "invoices", "Billing agent"))
            .attach_child("sup", "billing")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_contact_gets_intro_handoff() {
        let model = Arc::new(ScriptedModelClient::new());
        model.push_text("Hello! What do you need?").await;
        let engine = Engine::builder(graph(), model.clone()).build();

        let step = engine.prepare_user_step("s1", "sup", "hi").await.unwrap();
        assert_eq!(step.handoff, Some(handoff::first_contact_handoff()));
        assert!(step.episodic.is_none());

        let outcomes = engine.run_step(&step).await.unwrap();
        assert_eq!(outcomes, vec![StepOutcome::AwaitingUser]);

        let request = &model.requests().await[0];
        assert_eq!(request.messages[0].content, "You are Supervisor.");
        assert_eq!(request.messages.len(), 4);
        assert!(request.messages[2].content.contains("The user input is: hi"));
        assert_eq!(request.messages[3].role, Role::User);

        let statuses: Vec<Status> = engine.memory().timeline("s1", "sup").await.iter().map(|r| r.status).collect();
        assert_eq!(statuses, vec![Status::UserInputRequest, Status::WaitUserInput]);
    }

    #[tokio::test]
    async fn test_second_message_carries_previous_summary() {
        let engine = Engine::builder(graph(), Arc::new(ScriptedModelClient::new())).build();
        engine.prepare_user_step("s1", "sup", "first").await.unwrap();

        let step = engine.prepare_user_step("s1", "sup", "second").await.unwrap();
        assert!(step.handoff.is_none());
        let summary = step.episodic.unwrap().content;
        assert!(summary.contains("first"));
        assert!(!summary.contains("second"));
    }

    #[tokio::test]
    async fn test_model_failure_leaves_memory_untouched() {
        let model = Arc::new(ScriptedModelClient::new());
        model.push_failure("timeout").await;
        let engine = Engine::builder(graph(), model).build();

        let step = Step::new("s1", "billing");
        let err = engine.run_step(&step).await.unwrap_err();
        assert!(matches!(err, OrchestrationError::ModelCall(reason) if reason == "timeout"));
        assert!(engine.memory().timeline("s1", "billing").await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_agent_is_rejected() {
        let engine = Engine::builder(graph(), Arc::new(ScriptedModelClient::new())).build();
        let err = engine.prepare_user_step("s1", "ghost", "hi").await.unwrap_err();
        assert!(matches!(err, OrchestrationError::UnknownAgent(_)));
    }

    #[tokio::test]
    async fn test_drive_follows_delegation_chain() {
        let model = Arc::new(ScriptedModelClient::new());
        model
            .push_tool_call("route_to_agent", json!({"agent": "Billing", "objective": "Refund"}))
            .await;
        model
            .push_tool_call("finalize_request", json!({"summary": "Refund issued"}))
            .await;
        model.push_tool_call("finalize_request", json!({"summary": "All set"})).await;
        let engine = Engine::builder(graph(), model.clone()).build();

        let step = engine.prepare_user_step("s1", "sup", "refund please").await.unwrap();
        let outcomes = engine.drive(step).await.unwrap();

        assert_eq!(outcomes.last(), Some(&StepOutcome::Completed));
        assert_eq!(model.remaining().await, 0);
        let parent_request = &model.requests().await[2];
        assert!(parent_request
            .messages
            .iter()
            .any(|m| m.content.contains("Refund issued")));
    }
}
