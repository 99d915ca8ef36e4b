//! 工具注册表
//!
//! 外部工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按注册顺序保存；
//! 注册顺序即这些工具出现在 Agent 工具目录中的顺序。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 发给模型的工具定义（名称、描述、参数 JSON Schema）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// 描述的第一行非空文本，用于能力目录
    pub fn summary_line(&self) -> Option<&str> {
        self.description
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.parameters_schema())
    }
}

/// 工具注册表：同名工具后注册者替换先注册者，但保留原位置
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let tool: Arc<dyn Tool> = Arc::new(tool);
        match self.tools.iter().position(|t| t.name() == tool.name()) {
            Some(index) => {
                tracing::warn!(tool = %tool.name(), "tool registered twice, replacing");
                self.tools[index] = tool;
            }
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, String> {
        let tool = self.get(name).ok_or_else(|| format!("Unknown tool: {name}"))?;
        tool.execute(args).await
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// 按注册顺序返回工具定义，供 AgentGraphBuilder 挂到 Agent 上
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::EchoTool;

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn description(&self) -> &str {
            "\n  Uppercase text.\nSecond line."
        }

        async fn execute(&self, args: Value) -> Result<String, String> {
            args.get("text")
                .and_then(Value::as_str)
                .map(str::to_uppercase)
                .ok_or_else(|| "missing text".to_string())
        }
    }

    #[tokio::test]
    async fn test_registry_keeps_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(Upper);
        registry.register(EchoTool);
        registry.register(Upper);

        assert_eq!(registry.tool_names(), vec!["upper", "echo"]);
        let defs = registry.definitions();
        assert_eq!(defs[0].summary_line(), Some("Uppercase text."));

        let out = registry
            .execute("upper", serde_json::json!({"text": "abc"}))
            .await
            .unwrap();
        assert_eq!(out, "ABC");
        assert!(registry.execute("nope", Value::Null).await.is_err());
    }
}
