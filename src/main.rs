use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use fireroute::api::{self, AppState};
use fireroute::config::Config;
use fireroute::db::{self, PostgresRepository};
use fireroute::geo::HttpGeocodeFetch;
use fireroute::nlp::{HttpChatEndpoint, NlpPool};
use fireroute::pipeline::Pipeline;
use fireroute::session::SessionStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("loading configuration")?;

    let pool = db::connect(&config.database_url, 16).context("building database pool")?;

    let endpoint = Arc::new(HttpChatEndpoint::new(config.model_base_url.as_str()));
    let nlp = Arc::new(NlpPool::new(
        endpoint,
        config.model_id.as_str(),
        config.nlp_concurrency,
    ));
    let geo_fetch = Arc::new(HttpGeocodeFetch::new(
        config.geocoder_base_url.as_str(),
        config.geocoder_api_key.as_str(),
    ));
    let sessions = Arc::new(SessionStore::new());
    let repo = Arc::new(PostgresRepository::new(pool.clone()));

    let pipeline = Arc::new(Pipeline::new(
        config.max_batch,
        nlp.clone(),
        geo_fetch,
        repo,
        sessions.clone(),
    ));

    let state = AppState {
        pipeline,
        nlp,
        sessions,
        pool,
    };
    let app = api::router(state, &config.frontend_origin);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "fireroute listening");

    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
