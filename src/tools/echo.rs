//! Echo 工具（控制台演示与测试用）

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::Tool;

/// 回显 `text` 参数；缺参数时报错，让 Agent 在反思中看到失败结果
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the given text back unchanged."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {"type": "string", "description": "Text to echo back"}
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        args.get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| "missing required argument 'text'".to_string())
    }
}
