//! llm-relay server binary.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use llm_relay::config::{Cli, Config};
use llm_relay::server::api::{build_router, AppState};
use llm_relay::upstream::mock::ScriptedClient;
use llm_relay::upstream::openai::OpenAiClient;
use llm_relay::upstream::CompletionClient;

const MOCK_REPLY: &str = "This is a canned reply from the mock upstream, streamed word by word.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments.
    let cli = Cli::parse();

    // Initialize tracing/logging.
    let filter = if cli.verbose {
        "llm_relay=debug,tower_http=debug"
    } else {
        "llm_relay=info,tower_http=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_target(true)
        .init();

    info!("llm-relay v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration.
    let config = Arc::new(Config::load(&cli.config)?);

    info!(
        base_url = %config.upstream.base_url,
        streaming_model = %config.upstream.streaming_model,
        buffered_model = %config.upstream.buffered_model,
        "Configuration loaded"
    );

    // Pick the upstream client.
    let client: Arc<dyn CompletionClient> = if cli.mock_upstream {
        warn!("Using mock upstream; no completions will be requested");
        let words = MOCK_REPLY.split_inclusive(' ').map(str::to_string);
        Arc::new(ScriptedClient::new(words).with_delay(Duration::from_millis(50)))
    } else {
        let api_key = config.upstream.api_key();
        if api_key.is_none() {
            warn!(
                env = %config.upstream.api_key_env,
                "API key not set; upstream calls will be unauthenticated"
            );
        }
        Arc::new(OpenAiClient::new(&config.upstream, api_key)?)
    };

    // Build application state and router.
    let state = Arc::new(AppState::new(client, config.clone())?);
    let app = build_router(state);

    // Start the server.
    let listen_addr = cli.listen.unwrap_or_else(|| config.server.listen.clone());
    info!(addr = %listen_addr, "Starting server");

    let listener = TcpListener::bind(&listen_addr).await?;
    info!("Listening on {listen_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
