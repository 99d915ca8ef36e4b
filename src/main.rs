//! Hive 控制台
//!
//! 入口：加载配置、初始化日志、构建 Agent 图与引擎；从 stdin 逐行读取用户消息（会话 `console`），
//! 把答案与失败事件打印到 stdout。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use hive::config::{load_config, AppConfig};
use hive::llm::{EchoModelClient, ModelClient, OpenAiModelClient};
use hive::orchestration::{AnswerKind, ChannelAnswerListener, EngineEvent};
use hive::tools::{EchoTool, ToolExecutor, ToolRegistry};
use hive::Engine;
use tokio::io::{AsyncBufReadExt, BufReader};

const SESSION: &str = "console";

fn model_client(config: &AppConfig) -> Arc<dyn ModelClient> {
    let timeout = Duration::from_secs(config.llm.timeouts.request);
    match (config.llm.provider.as_str(), config.llm.api_key()) {
        ("openai", Some(key)) => {
            tracing::info!(model = %config.llm.model, "using OpenAI-compatible model client");
            Arc::new(OpenAiModelClient::new(
                config.llm.base_url.as_deref(),
                Some(&key),
                timeout,
            ))
        }
        (provider, _) => {
            tracing::warn!(provider = %provider, "no API key or mock provider; falling back to echo client");
            Arc::new(EchoModelClient)
        }
    }
}

fn print_event(event: EngineEvent) {
    match event {
        EngineEvent::Answer(answer) => {
            let agent = answer.agent_id.as_deref().unwrap_or("-");
            match answer.kind {
                AnswerKind::Interim => println!("[{agent}] ... {}", answer.text),
                AnswerKind::Answer => println!("[{agent}] {}", answer.text),
                AnswerKind::Final => println!("[{agent}] (final) {}", answer.text),
            }
        }
        EngineEvent::StepFailed { agent_id, error, .. } => {
            eprintln!("[{agent_id}] step failed: {error}");
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive::observability::init();

    let config_path = std::env::args().nth(1).map(Into::into);
    let config = load_config(config_path).context("Failed to load config")?;

    let mut registry = ToolRegistry::new();
    registry.register(EchoTool);
    let graph = config
        .agent_graph(&registry)
        .context("Failed to build agent graph")?;
    let entry = graph
        .roots()
        .first()
        .map(|a| a.id.clone())
        .context("Agent graph has no root agent")?;

    let (listener, mut events) = ChannelAnswerListener::new();
    let engine = Arc::new(
        Engine::builder(graph, model_client(&config))
            .tool_listener(Arc::new(ToolExecutor::new(
                registry,
                config.engine.tool_timeout_secs,
            )))
            .answer_listener(Arc::new(listener))
            .max_concurrent_steps(config.engine.max_concurrent_steps)
            .build(),
    );

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(event);
        }
    });

    if let Some(ttl) = config.memory.session_ttl() {
        let engine = engine.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(ttl);
            loop {
                tick.tick().await;
                engine.evict_idle(ttl).await;
            }
        });
    }

    println!("hive console (agent: {entry}); type a message, /quit to exit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/quit" {
            break;
        }
        if let Err(e) = engine.submit_user_message(SESSION, &entry, text).await {
            eprintln!("error: {e}");
        }
    }

    // 等待已提交的步骤跑完再退出
    while engine.pending() > 0 {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    engine.shutdown();
    Ok(())
}
