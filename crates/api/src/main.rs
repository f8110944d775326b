//! PushFleet API server binary entrypoint.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pushfleet_common::config::AppConfig;
use pushfleet_common::db::{create_pool, run_migrations};
use pushfleet_engine::memory::{InMemoryCampaignRecorder, InMemorySubscriptionRegistry};
use pushfleet_engine::recorder::{CampaignRecorder, PgCampaignRecorder};
use pushfleet_engine::registry::{PgSubscriptionRegistry, SubscriptionRegistry};
use pushfleet_engine::transport::PushTransport;
use pushfleet_notifier::sender::WebPushTransport;
use pushfleet_notifier::vapid::{VapidConfigStatus, load_vapid_config, validate_vapid_config};

use pushfleet_api::routes::create_router;
use pushfleet_api::state::AppState;

const MAX_BODY_BYTES: usize = 64 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "pushfleet_api=debug,pushfleet_engine=debug,pushfleet_notifier=debug,tower_http=debug",
            )
        }))
        .init();

    tracing::info!("Starting PushFleet API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Storage backends
    let (registry, recorder): (Arc<dyn SubscriptionRegistry>, Arc<dyn CampaignRecorder>) =
        match config.database_url.as_deref() {
            Some(database_url) => {
                let pool = create_pool(database_url, config.db_max_connections).await?;
                run_migrations(&pool).await?;
                tracing::info!("Database pool created");
                (
                    Arc::new(PgSubscriptionRegistry::new(pool.clone())),
                    Arc::new(PgCampaignRecorder::new(pool)),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory stores");
                (
                    Arc::new(InMemorySubscriptionRegistry::new()),
                    Arc::new(InMemoryCampaignRecorder::new()),
                )
            }
        };

    // Push transport
    let vapid_status = load_vapid_config(&config);
    let vapid_public_key = vapid_status.public_key().map(str::to_string);
    let transport: Option<Arc<dyn PushTransport>> = match vapid_status {
        VapidConfigStatus::Ready(vapid) => {
            validate_vapid_config(&vapid)?;
            tracing::info!(subject = %vapid.subject, "Web push enabled");
            Some(Arc::new(WebPushTransport::new(vapid, config.push_ttl_seconds)?))
        }
        VapidConfigStatus::Incomplete => {
            tracing::warn!(
                "VAPID configuration incomplete; set VAPID_PUBLIC_KEY, VAPID_PRIVATE_KEY and VAPID_SUBJECT"
            );
            None
        }
        VapidConfigStatus::Missing => {
            tracing::info!("VAPID keys not configured, push sending disabled");
            None
        }
    };

    let port = config.api_port;

    // Build application state
    let state = AppState::new(registry, recorder, transport, vapid_public_key, config);

    // Build router
    let app = create_router(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
