//! 响应分发：把一次模型响应变成记忆追加、答案发布与后续步骤
//!
//! 所有选项里的第一个工具调用先交给 ToolRouter 执行；成功后其余的 route_to_agent
//! 进入委派队列（其它多余调用丢弃并告警），文本选项再记录并发布给用户。
//! 路由失败时整个响应不留痕迹。

use std::sync::Arc;

use crate::agent::Agent;
use crate::core::OrchestrationError;
use crate::llm::{ChatResponse, ToolCall};
use crate::memory::{EpisodicMemory, Status};
use crate::orchestration::{Answer, AnswerKind, AnswerSink, Step, StepOutcome};
use crate::prompt::handoff;
use crate::tools::{ToolKind, ToolRouter};

pub struct Dispatcher {
    memory: Arc<dyn EpisodicMemory>,
    answers: Arc<AnswerSink>,
    router: Arc<ToolRouter>,
}

impl Dispatcher {
    pub fn new(
        memory: Arc<dyn EpisodicMemory>,
        answers: Arc<AnswerSink>,
        router: Arc<ToolRouter>,
    ) -> Self {
        Self {
            memory,
            answers,
            router,
        }
    }

    pub fn router(&self) -> &ToolRouter {
        &self.router
    }

    pub async fn dispatch(
        &self,
        step: &Step,
        agent: &Arc<Agent>,
        response: ChatResponse,
    ) -> Result<Vec<StepOutcome>, OrchestrationError> {
        if response.is_empty() {
            tracing::warn!(
                session = %step.session_id,
                agent = %agent.id,
                "model returned neither text nor tool calls"
            );
            return Ok(vec![StepOutcome::Empty]);
        }

        let mut texts: Vec<String> = Vec::new();
        let mut calls: Vec<ToolCall> = Vec::new();
        for choice in response.choices {
            if let Some(text) = choice.text() {
                texts.push(text.to_string());
            }
            calls.extend(choice.tool_calls);
        }
        let first_contact = self
            .memory
            .timeline(&step.session_id, &agent.id)
            .await
            .is_empty();

        // 先执行可能失败的工具调用；失败时不排队、不发布、不写记录
        let mut outcomes = Vec::new();
        let mut calls = calls.into_iter();
        let routed = match calls.next() {
            Some(first) => Some(self.router.route(step, agent, &first).await?),
            None => None,
        };
        for extra in calls {
            if ToolKind::classify(&extra.name) == ToolKind::DelegateDown {
                self.router.enqueue_delegation(step, agent, &extra).await;
            } else {
                tracing::warn!(
                    session = %step.session_id,
                    agent = %agent.id,
                    tool = %extra.name,
                    "dropping extra tool call"
                );
            }
        }

        for text in &texts {
            outcomes.push(self.publish_text(step, agent, text, first_contact).await);
        }
        match routed {
            Some(outcome) => outcomes.push(outcome),
            // 纯文本回复即本轮暂停，等用户输入；之前排队的委派不再延续
            None => self.router.queue().clear(&step.session_id, &agent.id).await,
        }
        Ok(outcomes)
    }

    /// 模型直接对用户说话：首次接触记为 USER_INPUT_REQUEST，其余为 WAIT_USER_INPUT
    async fn publish_text(
        &self,
        step: &Step,
        agent: &Agent,
        text: &str,
        first_contact: bool,
    ) -> StepOutcome {
        let status = if first_contact {
            Status::UserInputRequest
        } else {
            Status::WaitUserInput
        };
        self.memory
            .append(
                &step.session_id,
                &agent.id,
                handoff::agent_question_record(status, text),
            )
            .await;
        self.answers.deliver(Answer::new(
            &step.session_id,
            Some(&agent.id),
            step.user_message.as_ref(),
            text,
            AnswerKind::Answer,
        ));
        StepOutcome::AwaitingUser
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::agent::{AgentGraph, AgentSpec};
    use crate::llm::Choice;
    use crate::memory::{InMemoryEpisodicStore, Message};
    use crate::orchestration::{AnswerListener, ChannelAnswerListener, EngineEvent};
    use crate::tools::UnhandledToolListener;

    fn dispatcher() -> (
        Dispatcher,
        Arc<AgentGraph>,
        Arc<InMemoryEpisodicStore>,
        tokio::sync::mpsc::UnboundedReceiver<EngineEvent>,
    ) {
        let graph = Arc::new(
            AgentGraph::builder()
                .agent(AgentSpec::new("sup", "Supervisor", "route", "p"))
                .agent(AgentSpec::new("a", "Alpha", "first", "p"))
                .agent(AgentSpec::new("b", "Beta", "second", "p"))
                .attach_child("sup", "a")
                .attach_child("sup", "b")
                .build()
                .unwrap(),
        );
        let memory = Arc::new(InMemoryEpisodicStore::new());
        let (listener, rx) = ChannelAnswerListener::new();
        let mut sink = AnswerSink::new();
        sink.add_listener(Arc::new(listener) as Arc<dyn AnswerListener>);
        let answers = Arc::new(sink);
        let router = Arc::new(ToolRouter::new(
            graph.clone(),
            memory.clone(),
            answers.clone(),
            Arc::new(UnhandledToolListener),
        ));
        (Dispatcher::new(memory.clone(), answers, router), graph, memory, rx)
    }

    fn step() -> Step {
        Step::new("s1", "sup").with_user_message(Some(Message::user("hello")))
    }

    #[tokio::test]
    async fn test_text_on_first_contact_is_user_input_request() {
        let (dispatcher, graph, memory, mut rx) = dispatcher();
        let sup = graph.get("sup").unwrap();

        let outcomes = dispatcher
            .dispatch(&step(), &sup, ChatResponse::text("How can I help?"))
            .await
            .unwrap();
        assert_eq!(outcomes, vec![StepOutcome::AwaitingUser]);

        let record = memory.current("s1", "sup").await.unwrap();
        assert_eq!(record.status, Status::UserInputRequest);
        assert!(record.content.contains("How can I help?"));

        let outcomes = dispatcher
            .dispatch(&step(), &sup, ChatResponse::text("Anything else?"))
            .await
            .unwrap();
        assert_eq!(outcomes, vec![StepOutcome::AwaitingUser]);
        assert_eq!(memory.current("s1", "sup").await.unwrap().status, Status::WaitUserInput);

        let mut texts = Vec::new();
        while let Ok(EngineEvent::Answer(answer)) = rx.try_recv() {
            assert_eq!(answer.user_message.as_deref(), Some("hello"));
            texts.push(answer.text);
        }
        assert_eq!(texts, vec!["How can I help?", "Anything else?"]);
    }

    #[tokio::test]
    async fn test_empty_response_is_a_no_op() {
        let (dispatcher, graph, memory, _rx) = dispatcher();
        let sup = graph.get("sup").unwrap();
        let empty = ChatResponse {
            choices: vec![Choice {
                text: Some("   ".to_string()),
                tool_calls: vec![],
                finish_reason: None,
            }],
        };
        let outcomes = dispatcher.dispatch(&step(), &sup, empty).await.unwrap();
        assert_eq!(outcomes, vec![StepOutcome::Empty]);
        assert_eq!(memory.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_only_first_call_runs_and_extra_delegations_queue() {
        let (dispatcher, graph, memory, _rx) = dispatcher();
        let sup = graph.get("sup").unwrap();
        let response = ChatResponse::tool_calls(vec![
            ToolCall::new("route_to_agent", json!({"agent": "a", "objective": "one"}).to_string()),
            ToolCall::new("route_to_agent", json!({"agent": "b", "objective": "two"}).to_string()),
            ToolCall::new("self_reflection", "{}"),
        ]);

        let outcomes = dispatcher.dispatch(&step(), &sup, response).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].next_step().unwrap().agent_id, "a");
        assert_eq!(dispatcher.router().queue().len("s1", "sup").await, 1);
        assert!(memory.timeline("s1", "b").await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_first_delegation_queues_nothing() {
        let (dispatcher, graph, memory, _rx) = dispatcher();
        let sup = graph.get("sup").unwrap();
        let response = ChatResponse::tool_calls(vec![
            ToolCall::new("route_to_agent", json!({"agent": "Ghost", "objective": "one"}).to_string()),
            ToolCall::new("route_to_agent", json!({"agent": "b", "objective": "two"}).to_string()),
        ]);

        let err = dispatcher.dispatch(&step(), &sup, response.clone()).await.unwrap_err();
        assert!(err.is_resolution());
        assert_eq!(dispatcher.router().queue().len("s1", "sup").await, 0);

        // 重试同一响应不会堆积重复的委派
        dispatcher.dispatch(&step(), &sup, response).await.unwrap_err();
        assert_eq!(dispatcher.router().queue().len("s1", "sup").await, 0);
        assert_eq!(memory.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_text_is_withheld_when_tool_call_fails() {
        let (dispatcher, graph, memory, mut rx) = dispatcher();
        let sup = graph.get("sup").unwrap();
        let response = ChatResponse {
            choices: vec![Choice {
                text: Some("Let me check".to_string()),
                tool_calls: vec![ToolCall::new(
                    "route_to_agent",
                    json!({"agent": "Ghost", "objective": "look"}).to_string(),
                )],
                finish_reason: None,
            }],
        };

        assert!(dispatcher.dispatch(&step(), &sup, response).await.is_err());
        assert!(memory.timeline("s1", "sup").await.is_empty());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_text_with_successful_call_keeps_first_contact_status() {
        let (dispatcher, graph, memory, mut rx) = dispatcher();
        let sup = graph.get("sup").unwrap();
        let response = ChatResponse {
            choices: vec![Choice {
                text: Some("Let me check".to_string()),
                tool_calls: vec![ToolCall::new(
                    "route_to_agent",
                    json!({"agent": "a", "objective": "look"}).to_string(),
                )],
                finish_reason: None,
            }],
        };

        let outcomes = dispatcher.dispatch(&step(), &sup, response).await.unwrap();
        assert_eq!(outcomes[0], StepOutcome::AwaitingUser);
        assert_eq!(outcomes[1].next_step().unwrap().agent_id, "a");

        let timeline = memory.timeline("s1", "sup").await;
        assert_eq!(timeline[0].status, Status::WaitAgentExecution);
        assert_eq!(timeline[1].status, Status::UserInputRequest);
        match rx.try_recv().unwrap() {
            EngineEvent::Answer(answer) => assert_eq!(answer.text, "Let me check"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_plain_text_reply_clears_pending_delegations() {
        let (dispatcher, graph, _memory, _rx) = dispatcher();
        let sup = graph.get("sup").unwrap();
        dispatcher
            .router()
            .enqueue_delegation(
                &step(),
                &sup,
                &ToolCall::new("route_to_agent", json!({"agent": "b", "objective": "two"}).to_string()),
            )
            .await;
        assert_eq!(dispatcher.router().queue().len("s1", "sup").await, 1);

        dispatcher
            .dispatch(&step(), &sup, ChatResponse::text("Which order?"))
            .await
            .unwrap();
        assert_eq!(dispatcher.router().queue().len("s1", "sup").await, 0);
    }
}
