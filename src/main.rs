//! Main entry point for the draw gateway

use draw_gateway::{api, config::Settings, AppState};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = match std::env::var("DRAW_GATEWAY_CONFIG") {
        Ok(path) => Settings::load_from_path(path)?,
        Err(_) => Settings::load()?,
    };

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    if settings.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }

    info!("Starting draw gateway");

    settings.validate()?;
    info!(
        host = %settings.server.host,
        port = settings.server.port,
        providers = settings.providers.len(),
        default_service = %settings.draw.default_service,
        cooldown_secs = settings.draw.cooldown_secs,
        "Loaded configuration"
    );

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let app_state = Arc::new(AppState::from_settings(settings)?);

    let app = api::routes::create_router(app_state);

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
