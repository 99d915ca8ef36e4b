//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时；作为 ToolListener 接入引擎时，成功映射为 SUCCESS，
//! 参数非法、未知工具、执行失败或超时一律映射为 ERROR。每次调用输出一行结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout;

use crate::tools::{ToolCallRequest, ToolExecutionResponse, ToolListener, ToolRegistry};

pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 在超时内执行指定工具，并记审计日志
    pub async fn execute(&self, tool_name: &str, args: Value) -> ToolExecutionResponse {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(tool_name, args)).await;

        let (ok, outcome) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => ToolExecutionResponse::success(content),
            Ok(Err(e)) => ToolExecutionResponse::error(e),
            Err(_) => ToolExecutionResponse::error(format!(
                "Tool '{tool_name}' timed out after {}s",
                self.timeout.as_secs()
            )),
        }
    }
}

#[async_trait]
impl ToolListener for ToolExecutor {
    async fn on_tool_call_requested(&self, request: ToolCallRequest) -> ToolExecutionResponse {
        match request.arguments() {
            Ok(args) => self.execute(&request.tool_call.name, args).await,
            Err(e) => ToolExecutionResponse::error(format!(
                "Invalid arguments for tool '{}': {e}",
                request.tool_call.name
            )),
        }
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ToolCall;
    use crate::tools::{EchoTool, Tool, ToolExecutionStatus};

    struct Sleepy;

    #[async_trait]
    impl Tool for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn description(&self) -> &str {
            "Never finishes in time"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    fn request(name: &str, arguments: &str) -> ToolCallRequest {
        ToolCallRequest {
            session_id: "s1".to_string(),
            agent_id: "a".to_string(),
            user_message: None,
            tool_call: ToolCall::new(name, arguments),
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        registry.register(Sleepy);
        ToolExecutor {
            registry,
            timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_success_maps_to_success_status() {
        let response = executor()
            .on_tool_call_requested(request("echo", r#"{"text":"ok"}"#))
            .await;
        assert_eq!(response, ToolExecutionResponse::success("ok"));
    }

    #[tokio::test]
    async fn test_failures_map_to_error_status() {
        let executor = executor();
        for (name, args) in [
            ("echo", "{}"),
            ("echo", "not json"),
            ("missing", "{}"),
            ("sleepy", ""),
        ] {
            let response = executor.on_tool_call_requested(request(name, args)).await;
            assert_eq!(response.status, ToolExecutionStatus::Error, "{name} {args}");
        }
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = Value::String("x".repeat(500));
        let preview = args_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 203);
    }
}
