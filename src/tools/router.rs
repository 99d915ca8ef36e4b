//! 工具路由：执行一次工具调用对应的编排转移
//!
//! 先按 ToolKind 分类，再执行：
//! - DelegateDown：解析 RouteMapper，(可选) 发布中间消息，解析目标子 Agent，双方各记一条，进入子 Agent；
//! - ReturnUp：要求存在父节点；父节点若有排队中的委派则先执行它，否则记 FINISHED_AGENT_EXECUTION 并让父节点反思；
//! - SelfReflect：同一 Agent 带反思交接重新决策，不写记忆；
//! - Finalize：解析状态与内容，追加记录，按状态发布答案或上交父节点；
//!   FINISHED 上交时同样先排空父节点的委派队列，整个请求完成或转而等待用户时清掉残留队列；
//! - External：记等待、调用 ToolListener、记结果，然后自我反思。
//!
//! 所有可能失败的解析与查找都在写记忆之前完成，失败的步骤不会留下半截记录。

use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::agent::{Agent, AgentGraph};
use crate::core::OrchestrationError;
use crate::llm::ToolCall;
use crate::memory::{EpisodicMemory, Message, RecordEvent, Status};
use crate::orchestration::{Answer, AnswerKind, AnswerSink, Step, StepOutcome};
use crate::prompt::handoff;
use crate::tools::system::{
    ChitChatArgs, FallbackArgs, FinalizeRequestArgs, RecordEventArgs, RouteMapper,
    RouteParentMapper, CHIT_CHAT, FALLBACK, FINALIZE_REQUEST, RECORD_EVENT,
};
use crate::tools::{DelegationQueue, QueuedDelegation, ToolCallRequest, ToolKind, ToolListener};

/// 已通过解析与查找、尚未落盘的委派
struct Delegation {
    target: Arc<Agent>,
    objective: String,
    input: Option<String>,
}

/// Finalize 类工具统一解析后的载荷
struct FinalizePayload {
    status: Status,
    content: String,
    interim: Option<String>,
}

fn parse_args<T: DeserializeOwned>(call: &ToolCall) -> Result<T, OrchestrationError> {
    let raw = call.arguments.trim();
    let raw = if raw.is_empty() { "{}" } else { raw };
    serde_json::from_str(raw).map_err(|e| OrchestrationError::payload(&call.name, e))
}

fn parse_finalize(call: &ToolCall) -> Result<FinalizePayload, OrchestrationError> {
    let payload = match call.name.as_str() {
        RECORD_EVENT => {
            let args: RecordEventArgs = parse_args(call)?;
            let status = args
                .status
                .parse::<Status>()
                .map_err(OrchestrationError::InvalidStatus)?;
            FinalizePayload {
                status,
                content: args.content,
                interim: None,
            }
        }
        FINALIZE_REQUEST => {
            let args: FinalizeRequestArgs = parse_args(call)?;
            FinalizePayload {
                status: Status::Finished,
                content: args.summary,
                interim: None,
            }
        }
        CHIT_CHAT => {
            let args: ChitChatArgs = parse_args(call)?;
            FinalizePayload {
                status: Status::WaitUserInput,
                content: args.message,
                interim: args.interim_message,
            }
        }
        FALLBACK => {
            let args: FallbackArgs = parse_args(call)?;
            let content = match args.supported_topics.trim() {
                "" => args.response,
                topics => format!("{}\n\nSupported topics: {topics}", args.response.trim()),
            };
            FinalizePayload {
                status: Status::WaitUserInput,
                content,
                interim: args.interim_message,
            }
        }
        other => {
            return Err(OrchestrationError::payload(other, "not a finalize tool"));
        }
    };
    Ok(payload)
}

pub struct ToolRouter {
    graph: Arc<AgentGraph>,
    memory: Arc<dyn EpisodicMemory>,
    answers: Arc<AnswerSink>,
    tools: Arc<dyn ToolListener>,
    queue: DelegationQueue,
}

impl ToolRouter {
    pub fn new(
        graph: Arc<AgentGraph>,
        memory: Arc<dyn EpisodicMemory>,
        answers: Arc<AnswerSink>,
        tools: Arc<dyn ToolListener>,
    ) -> Self {
        Self {
            graph,
            memory,
            answers,
            tools,
            queue: DelegationQueue::new(),
        }
    }

    pub fn queue(&self) -> &DelegationQueue {
        &self.queue
    }

    /// 执行一次工具调用，返回本步的结果
    pub async fn route(
        &self,
        step: &Step,
        agent: &Arc<Agent>,
        call: &ToolCall,
    ) -> Result<StepOutcome, OrchestrationError> {
        let kind = ToolKind::classify(&call.name);
        tracing::info!(
            session = %step.session_id,
            agent = %agent.id,
            tool = %call.name,
            kind = ?kind,
            "routing tool call"
        );
        match kind {
            ToolKind::DelegateDown => self.delegate_down(step, agent, call).await,
            ToolKind::ReturnUp => self.return_up(step, agent, call).await,
            ToolKind::SelfReflect => Ok(self.self_reflect(step, agent)),
            ToolKind::Finalize => self.finalize(step, agent, call).await,
            ToolKind::External => Ok(self.external(step, agent, call).await),
        }
    }

    /// 同一响应中多余的委派，等当前委派交还后再执行
    pub async fn enqueue_delegation(&self, step: &Step, agent: &Agent, call: &ToolCall) {
        tracing::info!(
            session = %step.session_id,
            agent = %agent.id,
            "queueing extra delegation"
        );
        self.queue
            .enqueue(
                &step.session_id,
                &agent.id,
                QueuedDelegation {
                    tool_call: call.clone(),
                    user_message: step.user_message.clone(),
                },
            )
            .await;
    }

    fn publish_interim(&self, step: &Step, agent: &Agent, text: Option<&str>) {
        if !agent.supports_interim_messages {
            return;
        }
        if let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) {
            self.answers.deliver(Answer::new(
                &step.session_id,
                Some(&agent.id),
                step.user_message.as_ref(),
                text,
                AnswerKind::Interim,
            ));
        }
    }

    fn prepare_delegation(
        &self,
        step: &Step,
        acting: &Agent,
        call: &ToolCall,
    ) -> Result<Delegation, OrchestrationError> {
        let route: RouteMapper = parse_args(call)?;
        let target = self.graph.resolve_by_name_or_id(acting, &route.agent)?;
        self.publish_interim(step, acting, route.response.as_deref());
        Ok(Delegation {
            target,
            objective: route.objective,
            input: route.input,
        })
    }

    async fn commit_delegation(
        &self,
        session_id: &str,
        acting: &Agent,
        delegation: Delegation,
        user_message: Option<Message>,
    ) -> StepOutcome {
        let Delegation {
            target,
            objective,
            input,
        } = delegation;
        self.memory
            .append(
                session_id,
                &acting.id,
                handoff::wait_agent_record(&target.name, &objective),
            )
            .await;
        self.memory
            .append(session_id, &target.id, handoff::agent_execution_record(&objective))
            .await;
        tracing::info!(session = %session_id, from = %acting.id, to = %target.id, "delegating");

        StepOutcome::Continue(
            Step::new(session_id, target.id.clone())
                .with_handoff(handoff::delegate_handoff(&objective, input.as_deref()))
                .with_user_message(user_message),
        )
    }

    async fn delegate_down(
        &self,
        step: &Step,
        agent: &Agent,
        call: &ToolCall,
    ) -> Result<StepOutcome, OrchestrationError> {
        let delegation = self.prepare_delegation(step, agent, call)?;
        Ok(self
            .commit_delegation(&step.session_id, agent, delegation, step.user_message.clone())
            .await)
    }

    async fn return_up(
        &self,
        step: &Step,
        agent: &Agent,
        call: &ToolCall,
    ) -> Result<StepOutcome, OrchestrationError> {
        let parent = self
            .graph
            .parent_of(&agent.id)
            .ok_or_else(|| OrchestrationError::NoParent(agent.id.clone()))?;
        let route: RouteParentMapper = parse_args(call)?;
        let queued = self.next_queued(&step.session_id, &parent).await?;
        self.publish_interim(step, agent, route.response.as_deref());

        if let Some((delegation, user_message)) = queued {
            return Ok(self
                .drain_queued(&step.session_id, &parent, &route.summary, delegation, user_message)
                .await);
        }

        self.memory
            .append(
                &step.session_id,
                &parent.id,
                handoff::finished_agent_record(&route.summary),
            )
            .await;
        tracing::info!(session = %step.session_id, from = %agent.id, to = %parent.id, "returning to parent");

        Ok(StepOutcome::Continue(
            Step::new(step.session_id.clone(), parent.id.clone())
                .with_handoff(handoff::parent_reflection_handoff(&route.summary))
                .with_user_message(step.user_message.clone()),
        ))
    }

    /// 取出父节点队首的委派并完成解析
    ///
    /// 队首无法解析时返回错误，该项已出队：图不可变，重试也不会成功。
    /// 子 Agent 这次交还的结果随失败的步骤一起丢失，不会记到父节点上。
    async fn next_queued(
        &self,
        session_id: &str,
        parent: &Agent,
    ) -> Result<Option<(Delegation, Option<Message>)>, OrchestrationError> {
        let Some(queued) = self.queue.pop(session_id, &parent.id).await else {
            return Ok(None);
        };
        let queued_step =
            Step::new(session_id, parent.id.clone()).with_user_message(queued.user_message.clone());
        let delegation = self.prepare_delegation(&queued_step, parent, &queued.tool_call)?;
        Ok(Some((delegation, queued.user_message)))
    }

    /// 把子 Agent 的结果记到父节点上，然后由父节点执行下一项排队委派
    async fn drain_queued(
        &self,
        session_id: &str,
        parent: &Agent,
        summary: &str,
        delegation: Delegation,
        user_message: Option<Message>,
    ) -> StepOutcome {
        self.memory
            .append(session_id, &parent.id, handoff::finished_agent_record(summary))
            .await;
        tracing::info!(
            session = %session_id,
            agent = %parent.id,
            "draining queued delegation before returning up"
        );
        self.commit_delegation(session_id, parent, delegation, user_message)
            .await
    }

    fn self_reflect(&self, step: &Step, agent: &Agent) -> StepOutcome {
        StepOutcome::Continue(
            Step::new(step.session_id.clone(), agent.id.clone())
                .with_handoff(handoff::self_reflection_handoff())
                .with_user_message(step.user_message.clone()),
        )
    }

    async fn finalize(
        &self,
        step: &Step,
        agent: &Agent,
        call: &ToolCall,
    ) -> Result<StepOutcome, OrchestrationError> {
        let payload = parse_finalize(call)?;
        let parent = self.graph.parent_of(&agent.id);
        let queued = match (payload.status, &parent) {
            (Status::Finished, Some(parent)) => self.next_queued(&step.session_id, parent).await?,
            _ => None,
        };
        self.publish_interim(step, agent, payload.interim.as_deref());
        self.memory
            .append(
                &step.session_id,
                &agent.id,
                RecordEvent::new(payload.status, payload.content.clone()),
            )
            .await;

        let outcome = match payload.status {
            Status::WaitUserInput => {
                // 转而等待用户时，本 Agent 名下尚未执行的委派作废
                self.queue.clear(&step.session_id, &agent.id).await;
                self.publish(step, agent, &payload.content, AnswerKind::Answer);
                StepOutcome::AwaitingUser
            }
            Status::Finished => match (parent, queued) {
                (None, _) => {
                    self.queue.clear_session(&step.session_id).await;
                    self.publish(step, agent, &payload.content, AnswerKind::Final);
                    StepOutcome::Completed
                }
                (Some(parent), Some((delegation, user_message))) => {
                    self.drain_queued(
                        &step.session_id,
                        &parent,
                        &payload.content,
                        delegation,
                        user_message,
                    )
                    .await
                }
                (Some(parent), None) => {
                    let parent_records = self.memory.timeline(&step.session_id, &parent.id).await;
                    StepOutcome::Continue(
                        Step::new(step.session_id.clone(), parent.id.clone())
                            .with_handoff(handoff::finalize_parent_handoff(
                                &agent.name,
                                &payload.content,
                            ))
                            .with_episodic(handoff::finalize_parent_episodic(
                                &parent_records,
                                &agent.name,
                                &payload.content,
                            ))
                            .with_user_message(step.user_message.clone()),
                    )
                }
            },
            Status::FinishedToolExecution => {
                let target = parent
                    .map(|p| p.id.clone())
                    .unwrap_or_else(|| agent.id.clone());
                StepOutcome::Continue(
                    Step::new(step.session_id.clone(), target)
                        .with_handoff(Message::system(payload.content))
                        .with_user_message(step.user_message.clone()),
                )
            }
            other => {
                tracing::warn!(
                    session = %step.session_id,
                    agent = %agent.id,
                    status = %other,
                    "recorded status does not drive the flow"
                );
                StepOutcome::Recorded(other)
            }
        };
        Ok(outcome)
    }

    async fn external(&self, step: &Step, agent: &Agent, call: &ToolCall) -> StepOutcome {
        self.memory
            .append(&step.session_id, &agent.id, handoff::wait_tool_record(&call.name))
            .await;
        let response = self
            .tools
            .on_tool_call_requested(ToolCallRequest {
                session_id: step.session_id.clone(),
                agent_id: agent.id.clone(),
                user_message: step.user_message.clone(),
                tool_call: call.clone(),
            })
            .await;
        self.memory
            .append(
                &step.session_id,
                &agent.id,
                handoff::finished_tool_record(&call.name, &response),
            )
            .await;
        self.self_reflect(step, agent)
    }

    fn publish(&self, step: &Step, agent: &Agent, text: &str, kind: AnswerKind) {
        self.answers.deliver(Answer::new(
            &step.session_id,
            Some(&agent.id),
            step.user_message.as_ref(),
            text.trim(),
            kind,
        ));
    }
}
