//! Sehat: health-query triage server with offline fallback.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use sehat_reasoner::LLMConfig;
use sehat_server::{build_router, AppState};

fn resolve_data_dir() -> PathBuf {
    std::env::var("SEHAT_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--help" | "-h" | "help" => {
                println!("Sehat: health-query triage server");
                println!();
                println!("Usage: sehat");
                println!();
                println!("Environment:");
                println!("  PORT                         HTTP port (default 8080)");
                println!("  SEHAT_DATA_DIR               data directory (default ./data)");
                println!("  SEHAT_REMOTE_TIMEOUT_MS      per-call LLM timeout (default 5000)");
                println!("  SEHAT_PIPELINE_TIMEOUT_MS    whole-pipeline ceiling (default 15000)");
                println!("  SEHAT_BREAKER_THRESHOLD      failures before a stage breaker opens (default 3)");
                println!("  SEHAT_BREAKER_COOLDOWN_SECS  breaker cooldown (default 60)");
                println!("  OPENAI_API_KEY, ANTHROPIC_API_KEY, GROQ_API_KEY");
                return Ok(());
            }
            other => {
                eprintln!("Unknown command: {}. Use 'sehat help' for usage.", other);
                std::process::exit(1);
            }
        }
    }

    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = sehat_core::SehatConfig::from_env(&data_dir)?;
    let port = config.port;
    let llm_config = LLMConfig::load(&config.data_paths.llm_config_file);

    let state = Arc::new(
        AppState::new(config, llm_config)
            .map_err(|e| anyhow::anyhow!("Failed to initialize: {}", e))?,
    );
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Sehat server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
