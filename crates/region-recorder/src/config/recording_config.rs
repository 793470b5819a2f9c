use crate::config::{default_duration_secs, default_max_duration_secs, default_start_delay_ms};

use serde::{Deserialize, Serialize};

/// Capture setup used when the page opens the setup modal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Recording length in seconds; non-positive values fall back to 5.
    #[serde(default = "default_duration_secs")]
    pub duration_secs: f64,
    /// Whether to wait before capture starts.
    #[serde(default)]
    pub start_delay: bool,
    /// Whether the cursor is drawn into the recording.
    #[serde(default)]
    pub capture_cursor: bool,
    /// Length of the start delay in milliseconds.
    #[serde(default = "default_start_delay_ms")]
    pub start_delay_ms: u64,
    /// Upper bound applied to requested durations.
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: f64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            duration_secs: default_duration_secs(),
            start_delay: false,
            capture_cursor: false,
            start_delay_ms: default_start_delay_ms(),
            max_duration_secs: default_max_duration_secs(),
        }
    }
}
