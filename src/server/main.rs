use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fitflow::config::{get_config, FitflowConfig};
use fitflow::currency::RateService;
use fitflow::errors::{LicenseError, LicenseResult};
use fitflow::server::{
    build_router, execute_command, parse_command, AppState, Command, Database, LicenseManager,
    SessionTokens,
};

fn init_tracing(config: &FitflowConfig) {
    if !config.logging.enabled {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn serve(config: &FitflowConfig, db: Arc<Database>) -> LicenseResult<()> {
    let state = AppState::from_config(db, config)?;
    let sweeper = state
        .rate_limiter
        .spawn_sweeper(Duration::from_secs(config.rate_limit.sweep_interval_secs));

    let app = build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| LicenseError::ConfigError(format!("invalid server address: {e}")))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| LicenseError::ServerError(format!("failed to bind {addr}: {e}")))?;

    info!("FitFlow licensing server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if tokio::signal::ctrl_c().await.is_err() {
            warn!("Failed to listen for shutdown signal");
        }
    })
    .await
    .map_err(|e| LicenseError::ServerError(format!("server error: {e}")))?;

    sweeper.shutdown().await;
    info!("Server stopped");
    Ok(())
}

async fn run() -> LicenseResult<()> {
    let config = get_config()?;
    init_tracing(config);

    let args: Vec<String> = std::env::args().collect();
    let command = parse_command(&args)?;

    let db = Database::new().await?;
    db.migrate().await?;

    match command {
        Command::Serve => serve(config, db).await,
        cmd => {
            let licenses = LicenseManager::from_config(Arc::clone(&db), config)?;
            let sessions = SessionTokens::from_config(&config.auth).ok();
            let rates = RateService::from_config(Arc::clone(&db), &config.currency);
            execute_command(cmd, &licenses, sessions.as_ref(), &rates).await
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
