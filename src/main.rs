//! Reasoner 命令行入口
//!
//! 用法：`reasoner [--config <path>] [--index <file>]... "<query>"`
//! 先输出 Scratchpad（JSON Lines），再输出最终答案。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use reasoner::config::load_config;
use reasoner::core::describe_plan;
use reasoner::llm::ModelGateway;
use reasoner::observability;
use reasoner::retrieval::{InMemoryVectorStore, RetrievalAdapter};
use reasoner::{Orchestrator, ReasonError};

struct CliArgs {
    config: Option<PathBuf>,
    index: Vec<PathBuf>,
    query: String,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut config = None;
    let mut index = Vec::new();
    let mut words = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => config = Some(PathBuf::from(args.next().context("--config needs a path")?)),
            "--index" => index.push(PathBuf::from(args.next().context("--index needs a file")?)),
            _ => words.push(arg),
        }
    }
    let query = words.join(" ");
    if query.trim().is_empty() {
        bail!("usage: reasoner [--config <path>] [--index <file>]... \"<query>\"");
    }
    Ok(CliArgs {
        config,
        index,
        query,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let args = parse_args()?;

    // 显式传入的配置文件必须可用；否则回退到默认值
    let cfg = match load_config(args.config.clone()) {
        Ok(cfg) => cfg,
        Err(e) if args.config.is_some() => {
            return Err(ReasonError::ConfigError(e.to_string())).context("Failed to load config");
        }
        Err(e) => {
            tracing::warn!("Config load failed ({}), using defaults", e);
            Default::default()
        }
    };
    cfg.validate().context("Invalid config")?;

    let retrieval = if args.index.is_empty() {
        None
    } else {
        let gateway = Arc::new(ModelGateway::from_config(&cfg));
        let store = Arc::new(InMemoryVectorStore::new(cfg.retrieval.max_entries));
        let adapter = RetrievalAdapter::from_config(gateway, store, &cfg.retrieval);
        for path in &args.index {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let chunks = adapter
                .index_document(&text)
                .await
                .with_context(|| format!("Failed to index {}", path.display()))?;
            tracing::info!(file = %path.display(), chunks, "document indexed");
        }
        Some(Arc::new(adapter))
    };

    let orchestrator = Orchestrator::from_config(&cfg, retrieval);

    let cancel_token = tokio_util::sync::CancellationToken::new();
    let ctrl_c_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, stopping after the current step");
            ctrl_c_token.cancel();
        }
    });

    let stdout = std::io::stdout();
    match orchestrator.run_with_cancel(&args.query, cancel_token).await {
        Ok(result) => {
            tracing::info!("plan:\n{}", describe_plan(&result.plan));
            result
                .scratchpad
                .write_jsonl(stdout.lock())
                .context("Failed to write trace")?;
            println!("\n{}", result.final_answer);
            Ok(())
        }
        Err(ReasonError::Cancelled {
            completed_steps,
            scratchpad,
        }) => {
            scratchpad
                .write_jsonl(stdout.lock())
                .context("Failed to write trace")?;
            bail!("cancelled after {} step(s)", completed_steps)
        }
        Err(e) => Err(e).context("Reasoning run failed"),
    }
}
