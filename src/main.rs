//! Scout - 命令行对话入口
//!
//! 初始化日志与配置，构建编排器，逐行读取标准输入并流式打印回复。
//! `/new` 开始新会话，`/approve on|off` 切换搜索前确认，`/quit` 退出。

use std::io::Write;

use anyhow::Context;
use scout::config::load_config;
use scout::core::{AgentBuilder, ChatRequest};
use scout::prompt::RuntimeFlags;
use tokio::io::{AsyncBufReadExt, BufReader};

const OWNER: &str = "local";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    scout::observability::init();

    let config_path = std::env::args().nth(1).map(std::path::PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;
    let orchestrator = AgentBuilder::new(cfg)
        .build()
        .await
        .context("Failed to build orchestrator")?;

    let mut session_id: Option<String> = None;
    let mut flags = RuntimeFlags::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt_marker()?;
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => {
                prompt_marker()?;
                continue;
            }
            "/quit" | "/exit" => break,
            "/new" => {
                session_id = None;
                println!("(new session)");
                prompt_marker()?;
                continue;
            }
            "/approve on" | "/approve off" => {
                flags.require_approval = input.ends_with("on");
                println!("(approval checkpoint: {})", flags.require_approval);
                prompt_marker()?;
                continue;
            }
            _ => {}
        }

        let request = ChatRequest::user(OWNER, session_id.clone(), input).with_flags(flags);
        let mut handle = match orchestrator.start_turn(request) {
            Ok(h) => h,
            Err(e) => {
                eprintln!("error: {e}");
                prompt_marker()?;
                continue;
            }
        };
        session_id = Some(handle.session_id.clone());

        let mut out = std::io::stdout();
        while let Some(fragment) = handle.fragments.recv().await {
            out.write_all(fragment.as_bytes())?;
            out.flush()?;
        }
        println!();
        match handle.done.await {
            Ok(Ok(outcome)) => {
                tracing::debug!(rounds = outcome.tool_rounds, end = ?outcome.end, "turn finished")
            }
            Ok(Err(e)) => tracing::warn!(error = %e, "turn failed"),
            Err(e) => tracing::error!(error = %e, "turn task panicked"),
        }
        prompt_marker()?;
    }

    Ok(())
}

fn prompt_marker() -> std::io::Result<()> {
    let mut out = std::io::stdout();
    out.write_all(b"> ")?;
    out.flush()
}
