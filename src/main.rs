use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod model;
mod registry;
mod service;

use app::{AppError, AppState};
use model::Config;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load .env file if present (ignore if missing)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let state = AppState::new(config)?;

    let report_path = state.run().await?;
    tracing::info!(path = %report_path.display(), "Benchmark report written");

    Ok(())
}
