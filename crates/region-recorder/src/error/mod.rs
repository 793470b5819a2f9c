use region_recorder_core::MediaError;

use std::{panic::Location, result::Result as StdResult};

use error_location::ErrorLocation;
use thiserror::Error;

/// Application-level errors for the region-recorder binary.
///
/// All variants include `ErrorLocation` for call-site tracking.
#[derive(Error, Debug)]
pub enum AppError {
    /// Media worker error from region-recorder-core.
    #[error("Media error: {source} {location}")]
    Media {
        /// The underlying media error.
        #[source]
        source: MediaError,
        /// Location where this error was created.
        location: ErrorLocation,
    },

    /// The platform refused to grant a tab capture.
    #[error("Tab capture refused: {reason} {location}")]
    CaptureRefused {
        /// Human-readable reason for failure.
        reason: String,
        /// Location where this error was created.
        location: ErrorLocation,
    },

    /// The page UI could not be reached.
    #[error("Page UI unavailable: {reason} {location}")]
    UiUnavailable {
        /// Human-readable reason for failure.
        reason: String,
        /// Location where this error was created.
        location: ErrorLocation,
    },

    /// Saving an export to disk failed.
    #[error("Download failed: {reason} {location}")]
    DownloadFailed {
        /// Human-readable reason for failure.
        reason: String,
        /// Location where this error was created.
        location: ErrorLocation,
    },

    /// The recording session ended with an error notification.
    #[error("Session failed: {reason} {location}")]
    SessionFailed {
        /// Human-readable reason for failure.
        reason: String,
        /// Location where this error was created.
        location: ErrorLocation,
    },

    /// Failed to send message through async channel.
    #[error("Channel send failed: {message} {location}")]
    ChannelSendFailed {
        /// Human-readable error message.
        message: String,
        /// Location where this error was created.
        location: ErrorLocation,
    },

    /// Configuration loading or saving error.
    #[error("Configuration error: {reason} {location}")]
    ConfigError {
        /// Human-readable reason for failure.
        reason: String,
        /// Location where this error was created.
        location: ErrorLocation,
    },

    /// IO error from filesystem operations.
    #[error("IO error: {source} {location}")]
    IoError {
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
        /// Location where this error was created.
        location: ErrorLocation,
    },
}

impl AppError {
    /// Plain reason suitable for a page notification, without location.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Media { source, .. } => source.user_message(),
            AppError::CaptureRefused { reason, .. }
            | AppError::UiUnavailable { reason, .. }
            | AppError::DownloadFailed { reason, .. }
            | AppError::SessionFailed { reason, .. }
            | AppError::ConfigError { reason, .. } => reason.clone(),
            AppError::ChannelSendFailed { message, .. } => message.clone(),
            AppError::IoError { source, .. } => source.to_string(),
        }
    }
}

// Manual From<MediaError> with location tracking.
// Cannot use #[from] because it does not support extra fields.
impl From<MediaError> for AppError {
    #[track_caller]
    fn from(source: MediaError) -> Self {
        AppError::Media {
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

impl From<std::io::Error> for AppError {
    #[track_caller]
    fn from(source: std::io::Error) -> Self {
        AppError::IoError {
            source,
            location: ErrorLocation::from(Location::caller()),
        }
    }
}

/// Convenience type alias for Results using `AppError`.
pub type Result<T> = StdResult<T, AppError>;
