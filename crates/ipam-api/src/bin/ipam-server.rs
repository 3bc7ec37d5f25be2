//! HTTP server for the IPAM API

use axum::Router;
use std::net::SocketAddr;
use std::path::PathBuf;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use labipam_api::{AppContext, IpamApi};
use labipam_drivers::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::var_os("LABIPAM_CONFIG").map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;
    let addr: SocketAddr = settings.listen.parse()?;

    // Initialize shared application context
    let context = AppContext::bootstrap(&settings).await?;

    // Build the application router
    let app = Router::new()
        .merge(IpamApi::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(context);

    log::info!("Starting IPAM API server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
