use error_location::ErrorLocation;
use thiserror::Error;

/// Media pipeline errors with source location tracking.
#[derive(Error, Debug)]
pub enum MediaError {
    /// The capture source could not be opened (denied, unsupported or missing id).
    #[error("Capture unavailable: {reason} {location}")]
    CaptureUnavailable {
        /// Description of why capture is unavailable.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Export or preview was requested before anything was recorded.
    #[error("Nothing recorded yet {location}")]
    NothingRecorded {
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// The recording has no finite duration, so frames cannot be resampled.
    #[error("Recording duration is unavailable {location}")]
    DurationUnavailable {
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Loading the recording into a frame player failed.
    #[error("Failed to load recording: {reason} {location}")]
    PlayerLoadFailed {
        /// Description of the decode failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// Seeking to a frame timestamp failed.
    #[error("Seek to {at:.3}s failed: {reason} {location}")]
    SeekFailed {
        /// Requested timestamp in seconds.
        at: f64,
        /// Description of the seek failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// An encoder rejected a frame, aborted or failed to finalize.
    #[error("Encoder error: {reason} {location}")]
    EncoderFailed {
        /// Description of the encoder failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },

    /// The media worker task is gone or dropped a response.
    #[error("Media worker unavailable: {reason} {location}")]
    WorkerUnavailable {
        /// Description of the channel failure.
        reason: String,
        /// Source location where error occurred.
        location: ErrorLocation,
    },
}

impl MediaError {
    /// Plain reason suitable for a user-facing notification.
    pub fn user_message(&self) -> String {
        match self {
            MediaError::CaptureUnavailable { reason, .. } => reason.clone(),
            MediaError::NothingRecorded { .. } => "Nothing recorded yet".to_string(),
            MediaError::DurationUnavailable { .. } => {
                "Recording duration is unavailable for GIF export.".to_string()
            }
            MediaError::PlayerLoadFailed { .. } => "Failed to load recording for GIF".to_string(),
            MediaError::SeekFailed { .. } => "Failed to seek video for GIF".to_string(),
            MediaError::EncoderFailed { reason, .. } => reason.clone(),
            MediaError::WorkerUnavailable { reason, .. } => reason.clone(),
        }
    }
}

/// Result type alias using [`MediaError`].
pub type Result<T> = std::result::Result<T, MediaError>;
