//! 交接 prompt 与时间线记录文本
//!
//! 每次把控制权交给另一个（或同一个）Agent 时附带的 system 消息，以及各状态记录的固定措辞。

use crate::memory::{Message, RecordEvent, Status};
use crate::prompt::render_episodic_summary;
use crate::tools::ToolExecutionResponse;

pub const SELF_REFLECTION_HANDOFF: &str = "HANDOFF: SELF-REFLECTION

You are running an internal self-reflection step of an agent execution flow.

Evaluate the current execution state using:
- The objective you were assigned
- What has already been executed
- The current and historical execution context

Guidelines:
- Reflect only on what already happened and what is still missing.
- Do not perform domain work, calculations or data transformations.
- Do not assume or infer missing information.
- Do not expand or redefine the objective.
- Do not talk to the user directly.

Focus:
- Find gaps, incomplete steps or missing information.
- Check for pending work such as agents selected but not yet executed.
- Decide whether execution can continue, must pause, or must wait for a pending execution.";

pub const FIRST_CONTACT_HANDOFF: &str = "Process the user message, identify whether all required data \
has been collected and finish the execution by calling the appropriate tool.";

pub const FINALIZE_PARENT_HANDOFF: &str = "Check whether all required tasks have been completed. \
If so, produce the final user-facing response. If not, continue processing until the completion \
criteria are met.";

/// 委派给子 Agent 时的交接消息
pub fn delegate_handoff(objective: &str, input: Option<&str>) -> Message {
    let mut text = format!("HANDOFF: AGENT-REQUEST\n\nObjective: {}\n", objective.trim());
    if let Some(input) = input.map(str::trim).filter(|i| !i.is_empty()) {
        text.push_str(&format!("\nInput:\n{input}\n"));
    }
    text.push_str("\nConstraints:\n - Do not assume missing data.");
    Message::system(text)
}

/// 子 Agent 交还控制权后，父 Agent 的自我反思交接
pub fn parent_reflection_handoff(summary: &str) -> Message {
    Message::system(format!(
        "HANDOFF: SELF-REFLECTION (PARENT)

Objective:
Decide whether anything is still missing to fully complete the request.

Summary (what the child agent did):
{}

Completion rule:
- If no further actions, inputs or delegations are required, produce a final closing message \
summarizing the outcome and confirming that the request is complete.

Constraints:
- Do not assume missing data.
- Use the summary and the episodic context to decide what is missing.
- Do not expand or redefine the original objective.",
        summary.trim()
    ))
}

pub fn self_reflection_handoff() -> Message {
    Message::system(SELF_REFLECTION_HANDOFF)
}

/// 子 Agent 以 FINISHED 结束时交给父 Agent 的交接消息
pub fn finalize_parent_handoff(child_name: &str, content: &str) -> Message {
    Message::system(format!(
        "{FINALIZE_PARENT_HANDOFF}\n\nResult reported by agent '{child_name}':\n{}",
        content.trim()
    ))
}

/// 父 Agent 的情景上下文，末尾附上子 Agent 的完成结果
pub fn finalize_parent_episodic(
    parent_records: &[RecordEvent],
    child_name: &str,
    content: &str,
) -> Option<Message> {
    let summary = render_episodic_summary(parent_records)?;
    Some(Message::system(format!(
        "{summary}\n\nThe agent '{child_name}' execution is finished, resume: {}",
        content.trim()
    )))
}

pub fn first_contact_handoff() -> Message {
    Message::system(FIRST_CONTACT_HANDOFF)
}

// 时间线记录

pub fn user_input_record(text: &str) -> RecordEvent {
    RecordEvent::new(
        Status::UserInputRequest,
        format!("The user input is: {}", text.trim()),
    )
}

pub fn agent_question_record(status: Status, text: &str) -> RecordEvent {
    RecordEvent::new(
        status,
        format!("The agent then asked the user the following question: {}", text.trim()),
    )
}

pub fn wait_agent_record(target_name: &str, objective: &str) -> RecordEvent {
    RecordEvent::new(
        Status::WaitAgentExecution,
        format!(
            "Waiting for agent '{target_name}' execution with the aim of: {}",
            objective.trim()
        ),
    )
}

pub fn agent_execution_record(objective: &str) -> RecordEvent {
    RecordEvent::new(
        Status::AgentExecution,
        format!(
            "You are being invoked to fulfill the following objective: {}",
            objective.trim()
        ),
    )
}

pub fn finished_agent_record(summary: &str) -> RecordEvent {
    RecordEvent::new(
        Status::FinishedAgentExecution,
        format!("Agent execution finished. Summary: {}", summary.trim()),
    )
}

pub fn wait_tool_record(tool_name: &str) -> RecordEvent {
    RecordEvent::new(
        Status::WaitToolExecution,
        format!("The system is waiting for the tool '{tool_name}' execution to complete."),
    )
}

pub fn finished_tool_record(tool_name: &str, response: &ToolExecutionResponse) -> RecordEvent {
    RecordEvent::new(
        Status::FinishedToolExecution,
        format!(
            "The tool '{tool_name}' execution completed! Tool execution details: {}, toolExecutionDetails: {}",
            response.status.as_str(),
            response.details
        ),
    )
}
