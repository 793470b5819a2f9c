//! Configuration management for region-recorder.
//!
//! Handles loading and saving TOML configuration files with cross-platform
//! paths, validation, and atomic write operations.

use crate::{
    AppError, AppResult,
    config::{GifConfig, OutputConfig, PageConfig, RecordingConfig},
    platform::is_capturable,
    protocol::MAX_RECORDING_SECS,
};

use std::{
    fs,
    io::Write,
    panic::Location,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use error_location::ErrorLocation;
use region_recorder_core::geometry::MIN_SELECTION_EDGE;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Capture setup.
    #[serde(default)]
    pub recording: RecordingConfig,
    /// GIF export settings.
    #[serde(default)]
    pub gif: GifConfig,
    /// Download location.
    #[serde(default)]
    pub output: OutputConfig,
    /// Simulated page.
    #[serde(default)]
    pub page: PageConfig,
}

impl Config {
    /// Load configuration from disk, creating default if not found.
    #[track_caller]
    #[instrument]
    pub fn load() -> AppResult<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from `config_path`, creating default if not found.
    #[track_caller]
    #[instrument]
    pub fn load_from(config_path: &Path) -> AppResult<Self> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path).map_err(|e| AppError::ConfigError {
                reason: format!("Failed to read config: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

            let config: Config = toml::from_str(&contents).map_err(|e| AppError::ConfigError {
                reason: format!("Failed to parse config: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

            info!(config_path = ?config_path, "Configuration loaded");

            Ok(config)
        } else {
            info!("No config found, creating default");
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    /// Check that the configured session can actually be recorded.
    #[track_caller]
    #[instrument(skip(self))]
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |reason: String| AppError::ConfigError {
            reason,
            location: ErrorLocation::from(Location::caller()),
        };

        if !is_capturable(&self.page.url) {
            return Err(invalid(format!(
                "Page URL {:?} cannot be captured. Use a normal website URL.",
                self.page.url
            )));
        }

        if self.page.viewport_width == 0 || self.page.viewport_height == 0 {
            return Err(invalid("Page viewport must not be empty".to_string()));
        }

        if !(self.page.device_pixel_ratio.is_finite() && self.page.device_pixel_ratio > 0.0) {
            return Err(invalid(format!(
                "Device pixel ratio must be positive, got {}",
                self.page.device_pixel_ratio
            )));
        }

        let max_secs = self.recording.max_duration_secs;
        if !(max_secs.is_finite() && max_secs > 0.0 && max_secs <= MAX_RECORDING_SECS) {
            return Err(invalid(format!(
                "Maximum recording duration must be within (0, {MAX_RECORDING_SECS}] seconds, got {max_secs}"
            )));
        }

        let selection = &self.page.selection;
        if selection.width < MIN_SELECTION_EDGE || selection.height < MIN_SELECTION_EDGE {
            return Err(invalid(format!(
                "Selection must be at least {MIN_SELECTION_EDGE}x{MIN_SELECTION_EDGE} pixels"
            )));
        }

        Ok(())
    }

    /// Save configuration to `config_path` using atomic write pattern.
    ///
    /// Writes to a temporary file first, then renames to prevent corruption
    /// if the process crashes during the write.
    #[track_caller]
    #[instrument(skip(self))]
    pub fn save_to(&self, config_path: &Path) -> AppResult<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        // Atomic write: write to temp file then rename
        let temp_path = config_path.with_extension("toml.tmp");

        let mut temp_file = fs::File::create(&temp_path).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to create temp config file: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        temp_file
            .write_all(contents.as_bytes())
            .map_err(|e| AppError::ConfigError {
                reason: format!("Failed to write temp config file: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        temp_file.sync_all().map_err(|e| AppError::ConfigError {
            reason: format!("Failed to sync temp config file: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        fs::rename(&temp_path, config_path).map_err(|e| AppError::ConfigError {
            reason: format!("Failed to rename temp config to final: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?;

        info!(config_path = ?config_path, "Configuration saved (atomic write)");

        Ok(())
    }

    /// Size of captured frames for the configured page, in device pixels.
    pub fn frame_size(&self) -> (u32, u32) {
        let dpr = self.page.device_pixel_ratio;
        let width = (f64::from(self.page.viewport_width) * dpr).round().max(1.0) as u32;
        let height = (f64::from(self.page.viewport_height) * dpr).round().max(1.0) as u32;
        (width, height)
    }

    #[track_caller]
    fn config_path() -> AppResult<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "region-recorder", "Region-Recorder")
            .ok_or_else(|| AppError::ConfigError {
                reason: "Failed to get config directory".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })?;

        let config_dir = proj_dirs.config_dir();

        if !config_dir.exists() {
            fs::create_dir_all(config_dir)?;
            debug!(config_dir = ?config_dir, "Created config directory");
        }

        Ok(config_dir.join("config.toml"))
    }
}
