use std::sync::Arc;

use anyhow::Context;
use tokio::io::BufReader;

use marquee::{
    api::{create_router, AppState},
    config::{Config, RunMode},
    console::Console,
    db::JsonUserStore,
    logging,
    services::{
        BackendSet, BoundedExecutor, DeviceSession, InteractionTiming, OrchestratorConfig,
        RecommendationOrchestrator, SharedDeviceState,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    logging::init_logging(&config);

    let session = DeviceSession::start(
        config.telemetry_period(),
        InteractionTiming::from_config(&config),
    );
    let backends = config.backends_enabled.then(BackendSet::standard);
    let orchestrator = Arc::new(RecommendationOrchestrator::new(
        backends,
        BoundedExecutor::new(),
        session.recorder(),
        OrchestratorConfig::from_config(&config),
    ));

    let outcome = match config.mode {
        RunMode::Console => run_console(&config, orchestrator, session.state()).await,
        RunMode::Server => run_server(&config, orchestrator, session.state()).await,
    };

    session.shutdown();
    outcome
}

async fn run_console(
    config: &Config,
    orchestrator: Arc<RecommendationOrchestrator>,
    device: SharedDeviceState,
) -> anyhow::Result<()> {
    let store = Arc::new(JsonUserStore::open(&config.users_file).await);
    let mut console = Console::new(
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        orchestrator,
        store,
        device,
    );
    console.run().await.context("console session failed")
}

async fn run_server(
    config: &Config,
    orchestrator: Arc<RecommendationOrchestrator>,
    device: SharedDeviceState,
) -> anyhow::Result<()> {
    let app = create_router(AppState::new(orchestrator, device));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    tracing::info!(address = %address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("server error")
}
