use rmcp::{ServiceExt, transport::stdio};

use fysioscribe::config::Config;
use fysioscribe::server::FysioServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the MCP transport; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    load_dotenv();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "fysioscribe starting");

    let config = Config::load();
    tracing::debug!(?config, "configuration loaded");
    let server = FysioServer::new(config);

    let service = server
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("serving error: {e:?}"))?;

    service.waiting().await?;

    tracing::info!("fysioscribe shutting down");
    Ok(())
}

/// `.env` next to the binary first (the host may launch us from any CWD),
/// then the usual CWD search.
fn load_dotenv() {
    let beside_binary = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(".env")))
        .filter(|path| path.exists());

    match beside_binary {
        Some(path) => {
            if let Err(e) = dotenvy::from_path(&path) {
                tracing::warn!(path = %path.display(), "failed to load .env: {e}");
            }
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
}
