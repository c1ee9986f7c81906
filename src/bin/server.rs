//! visitflow API server

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use visitflow::api::{create_router, AppState};
use visitflow::billing::PaymentApplier;
use visitflow::config::AppConfig;
use visitflow::reconcile::{HttpGateway, Reconciler};
use visitflow::workflow::{QueueRepository, TransitionEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "visitflow=info,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env();

    info!("Connecting to database: {}", config.database_url);
    let pool = sqlx::PgPool::connect(&config.database_url).await?;

    let gateway = Arc::new(HttpGateway::new(config.gateway_base_url.clone()));
    let state = AppState {
        engine: Arc::new(TransitionEngine::new(pool.clone())),
        queues: Arc::new(QueueRepository::new(pool.clone())),
        applier: Arc::new(PaymentApplier::new(
            pool.clone(),
            config.overpayment_tolerance,
        )),
        reconciler: Arc::new(Reconciler::new(pool, gateway, &config)),
    };

    if config.pending_request_ttl_minutes > 0 {
        let reconciler = state.reconciler.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                if let Err(err) = reconciler.expire_stale_requests(Utc::now()).await {
                    warn!(%err, "stale mobile request sweep failed");
                }
            }
        });
    }

    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
