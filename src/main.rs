use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use embedmongo::{EmbeddedMongo, MongodConfig, health};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,embedmongo=info")),
        )
        .init();

    let config = MongodConfig::from_env().context("Invalid EMBEDMONGO_* configuration")?;
    let mongo = Arc::new(EmbeddedMongo::new(config));

    mongo
        .acquire()
        .await
        .context("Failed to start embedded MongoDB")?;
    if let Some(uri) = mongo.connection_string().await {
        println!("MongoDB running at {}", uri);
    }

    let health_addr = std::env::var("EMBEDMONGO_HEALTH_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let served = serve_health(Arc::clone(&mongo), &health_addr).await;

    // Stop mongod even when the status endpoint failed
    mongo.release().await;
    served
}

async fn serve_health(mongo: Arc<EmbeddedMongo>, addr: &str) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind status endpoint on {}", addr))?;
    tracing::info!("Status endpoint listening on http://{}/health", listener.local_addr()?);

    axum::serve(listener, health::router(mongo))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Status endpoint failed")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
