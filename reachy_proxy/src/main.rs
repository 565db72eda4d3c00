// reachy_proxy/src/main.rs - Standalone relay binary
use reachy_proxy::{ProxyState, app};
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let addr = env::args().nth(1).unwrap_or_else(|| "0.0.0.0:5001".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Reachy proxy listening on {}", listener.local_addr()?);

    axum::serve(listener, app(Arc::new(ProxyState::new()))).await?;
    Ok(())
}
