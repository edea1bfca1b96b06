use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use rand::{rngs::StdRng, SeedableRng};
use tokio::{net::TcpListener, signal};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use water_monitor_service::{
    api::{self, AppState},
    config::Config,
    db::{self, seed, MemoryStore, PgStore, Store},
    sampling::SamplingService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent, env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await?;
            info!("Database ready");
            Arc::new(PgStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set; readings are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    seed::bootstrap(store.as_ref(), Utc::now(), config.seed_demo_readings).await?;

    let sampler = if config.simulation_enabled {
        let rng = match config.simulation_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let service =
            SamplingService::bootstrap(Arc::clone(&store), rng, config.cycle, Utc::now())
                .await;
        Some(service.spawn())
    } else {
        info!("Simulation disabled; waiting for ingested readings");
        None
    };

    let app = api::router(AppState::new(store))
        .layer(api::cors_layer(&config.cors_origin)?)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sampler {
        handle.stop(config.shutdown_grace).await;
    }
    info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
