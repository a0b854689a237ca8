mod blobstore;
mod catalog;
mod checkout;
mod config;
mod consistency;
mod db;
mod entitlement;
mod error;
mod server;
mod subscription;
mod users;

use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Settings::load()?;

    // Use configured host/port to bind the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let app = server::create_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("whisperbox server running on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
