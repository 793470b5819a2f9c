//! Region Recorder: record a selected region of a browser tab as video or GIF.

mod app;
mod config;
mod coordinator;
mod error;
mod platform;
mod protocol;
#[cfg(test)]
mod tests;
mod ui_controller;

pub(crate) use {
    app::App,
    error::{AppError, Result as AppResult},
};

use crate::config::Config;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "region_recorder=debug,region_recorder_core=debug";

/// Application entry point.
#[tokio::main]
async fn main() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config: {:?}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = config.validate() {
        error!("Config validation failed: {:?}", e);
        std::process::exit(1);
    }

    let app = match App::new(config) {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to create App: {:?}", e);
            std::process::exit(1);
        }
    };

    match app.run().await {
        Ok(downloads) => {
            for path in downloads {
                info!(path = ?path, "Saved");
            }
        }
        Err(e) => {
            error!(error = ?e, "Recording session failed");
            std::process::exit(1);
        }
    }
}
