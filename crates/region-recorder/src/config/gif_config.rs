use crate::config::{default_gif_fps, default_gif_width, default_true};

use serde::{Deserialize, Serialize};

/// GIF export performed after the video export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GifConfig {
    /// Whether a GIF is exported at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Target width; absent keeps the recorded width.
    #[serde(default = "default_gif_width")]
    pub width: Option<u32>,
    /// Frames per second.
    #[serde(default = "default_gif_fps")]
    pub fps: u32,
}

impl Default for GifConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            width: default_gif_width(),
            fps: default_gif_fps(),
        }
    }
}
