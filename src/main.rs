use chrono::Utc;
use mimalloc::MiMalloc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use recibo::db::STATE_TTL_SECS;
use recibo::identity::IdentityVerifier;
use recibo::router::{ReciboState, recibo_router};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = &recibo::config::CONFIG;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.database_url,
        listen_addr = %cfg.listen_addr,
        loglevel = %cfg.loglevel,
        identity_configured = cfg.jwt_secret.is_some(),
    );
    if cfg.jwt_secret.is_none() {
        warn!("no JWT secret configured; every request will be rejected");
    }

    let storage = recibo::db::connect(&cfg.database_url).await?;

    // Periodic reclamation of expired CSRF state rows. Expiry is enforced at
    // consume time; this only keeps the table small.
    let sweep_storage = storage.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let cutoff = Utc::now() - chrono::Duration::seconds(STATE_TTL_SECS);
            match sweep_storage.state_sweep(cutoff).await {
                Ok(0) => {}
                Ok(n) => info!(swept = n, "expired oauth states removed"),
                Err(e) => warn!(error = %e, "oauth state sweep failed"),
            }
        }
    });

    let verifier = IdentityVerifier::new(cfg.jwt_secret.clone(), cfg.jwt_audience.clone());
    let state = ReciboState::new(storage, verifier);
    let app = recibo_router(state);

    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    info!("HTTP server listening on {}", cfg.listen_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
