//! Cockpit Monitor - Main Entry Point

use api::{init_logging, run, AppSettings};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("cockpit.toml"));
    let settings = AppSettings::load(&path)?;

    init_logging(settings.log_json);

    info!("=== Cockpit Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Settings from {} (frames in {})", path.display(), settings.camera.frames_dir.display());

    run(settings).await?;

    Ok(())
}
