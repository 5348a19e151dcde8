use std::sync::Arc;
use std::time::Duration;

use axum::{Router, response::Html, routing::get};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use passkey_rp::{
    ChallengeStore, RelyingParty, RpConfig, ServiceContext, SessionCookie, StorageConfig,
    build_challenge_store, build_credential_store,
};
use passkey_rp_axum::passkey_router;

const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:8080";
const PURGE_INTERVAL: Duration = Duration::from_secs(60);

async fn index() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        #[cfg(debug_assertions)]
        {
            format!(
                "passkey_rp_axum=debug,passkey_rp=debug,{}=debug,info",
                env!("CARGO_CRATE_NAME")
            )
            .into()
        }

        #[cfg(not(debug_assertions))]
        {
            "info".into()
        }
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Drops expired ceremonies so abandoned begins do not accumulate.
fn spawn_purge_task(store: Arc<dyn ChallengeStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match store.purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!("Purged {} expired challenges", n),
                Err(e) => tracing::warn!("Challenge purge failed: {}", e),
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = RpConfig::from_env()?;
    let storage = StorageConfig::from_env()?;
    let challenges = build_challenge_store(&storage.challenge_store).await?;
    let credentials = build_credential_store(&storage.credential_store).await?;
    let session = SessionCookie::from_env(config.challenge_timeout_secs)?;

    spawn_purge_task(challenges.clone());

    let rp = RelyingParty::new(config, challenges, credentials);
    let ctx = Arc::new(ServiceContext::new(rp, session));

    let app = Router::new()
        .route("/", get(index))
        .merge(passkey_router(ctx));

    let addr = std::env::var("SERVER_ADDR").unwrap_or_else(|_| DEFAULT_SERVER_ADDR.to_string());
    tracing::info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
