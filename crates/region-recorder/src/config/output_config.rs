use crate::{AppError, AppResult};

use std::{panic::Location, path::PathBuf};

use directories::{ProjectDirs, UserDirs};
use error_location::ErrorLocation;
use serde::{Deserialize, Serialize};

/// Where exports are saved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Download directory; defaults to the user's download folder.
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
}

impl OutputConfig {
    /// Configured directory, else the user download dir, else the data dir.
    #[track_caller]
    pub fn resolve_download_dir(&self) -> AppResult<PathBuf> {
        if let Some(dir) = &self.download_dir {
            return Ok(dir.clone());
        }

        if let Some(dir) = UserDirs::new().and_then(|dirs| dirs.download_dir().map(PathBuf::from))
        {
            return Ok(dir);
        }

        ProjectDirs::from("com", "region-recorder", "Region-Recorder")
            .map(|dirs| dirs.data_dir().join("downloads"))
            .ok_or_else(|| AppError::ConfigError {
                reason: "Failed to get download directory".to_string(),
                location: ErrorLocation::from(Location::caller()),
            })
    }
}
