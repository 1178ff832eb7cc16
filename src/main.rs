//! Scout - Rust 网络设备智能排查系统
//!
//! 入口：初始化日志、加载配置、组装编排器，对命令行给出的请求跑一个调查会话并打印报告。

use anyhow::Context;
use scout::config::load_config;
use scout::core::{create_orchestrator, SessionPhase};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with(fmt::layer())
        .init();

    let query: String = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        anyhow::bail!("usage: scout <investigation request>");
    }

    let cfg = load_config(None).context("Failed to load config")?;

    // 确保工作目录存在（学习存储落在其中）
    let workspace = cfg
        .app
        .workspace_root
        .clone()
        .unwrap_or_else(|| "workspace".into());
    let _ = std::fs::create_dir_all(&workspace);

    let orchestrator = create_orchestrator(&cfg).context("Failed to build orchestrator")?;
    let session = orchestrator
        .submit_session(&query)
        .await
        .context("Investigation failed")?;

    if session.phase == SessionPhase::Cancelled {
        tracing::warn!("Session was cancelled; the report below is partial");
    }
    println!("{}", session.summary.unwrap_or_default());
    Ok(())
}
