//! 交互式对话
//!
//! 读取配置后进入对话循环，保留多轮历史，输入 `quit` 退出。
//!
//! 用法：`modelgate-chat [config/dev.yml]`

use anyhow::Context;
use modelgate::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};

const DEFAULT_CONFIG_PATH: &str = "config/dev.yml";
const SYSTEM_PROMPT: &str = "你是一个有帮助的助手";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = AppConfig::load(&config_path)
        .with_context(|| format!("加载配置失败: {}", config_path))?;
    init_logging(&config.log)?;

    let llm = &config.llm_config;
    if llm.model.trim().is_empty() {
        anyhow::bail!("配置中缺少 llmConfig.model");
    }

    let registry = Arc::new(ConcurrencyRegistry::from_config(llm));
    let dispatcher = Dispatcher::from_config(llm, Arc::clone(&registry))?;
    info!(model = %llm.model, endpoint = %dispatcher.endpoint(), "LLM service initialized");

    let result = chat_loop(&dispatcher, &llm.model, llm.max_token).await;

    registry.shutdown();
    info!("LLM service stopped");
    result
}

async fn chat_loop(dispatcher: &Dispatcher, model: &str, max_tokens: u32) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut conversation = Conversation::with_system(SYSTEM_PROMPT);

    stdout
        .write_all("开始和 AI 对话（输入 'quit' 退出）:\n".as_bytes())
        .await?;

    loop {
        stdout.write_all("\n你: ".as_bytes()).await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };

        let Some(input) = line else {
            break;
        };
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" {
            break;
        }

        conversation.push_user(input);

        let started = Instant::now();
        let response = dispatcher
            .chat(model, &conversation, 0.0, max_tokens, Some(ResponseFormat::text()))
            .await;
        let elapsed = started.elapsed();

        match response {
            Ok(response) => {
                let reply = conversation.record_reply(&response).unwrap_or_default();
                stdout
                    .write_all(format!("\nAI: {}\n", reply).as_bytes())
                    .await?;
                stdout
                    .write_all(format!("\n[响应时间: {:.2} 秒]\n", elapsed.as_secs_f64()).as_bytes())
                    .await?;
            }
            Err(e) => {
                // 失败的这一轮不计入历史
                conversation.pop_user();
                error!(error = %e, "LLM 响应错误");
            }
        }
    }

    stdout.write_all("对话结束\n".as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}
