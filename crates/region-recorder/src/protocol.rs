//! Wire messages exchanged between the page UI and the session coordinator.
//!
//! Every message is a JSON object tagged by `"type"` with a kebab-case name;
//! payload fields are camelCase.

use std::fmt;

use region_recorder_core::{
    CoreResult,
    geometry::SelectionRect,
    media::export::{ExportFormat, ExportOptions, Preview},
};
use serde::{Deserialize, Serialize};

/// Identifier of a browser tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub u32);

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capture setup chosen in the setup modal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConfig {
    /// Format preselected in the export modal.
    #[serde(default)]
    pub format_choice: ExportFormat,
    /// Requested length in seconds; missing or non-positive means unbounded.
    #[serde(default)]
    pub duration_sec: Option<f64>,
    /// Wait before capture starts. Absent means yes.
    #[serde(default = "default_start_delay")]
    pub start_delay: bool,
    /// Draw the cursor into the recording.
    #[serde(default)]
    pub capture_cursor: bool,
}

fn default_start_delay() -> bool {
    true
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            format_choice: ExportFormat::Video,
            duration_sec: Some(5.0),
            start_delay: false,
            capture_cursor: false,
        }
    }
}

/// Longest recording any session may ask for, in seconds.
pub const MAX_RECORDING_SECS: f64 = 600.0;

/// Clamp a requested duration to `(0, max_secs]`.
///
/// Zero, negative, non-finite or missing durations mean "record until
/// stopped" and yield `None`. `max_secs` is itself capped at
/// [`MAX_RECORDING_SECS`] and replaced by it when not a positive number.
pub fn normalize_duration(duration_sec: Option<f64>, max_secs: f64) -> Option<f64> {
    let bound = if max_secs.is_finite() && max_secs > 0.0 {
        max_secs.min(MAX_RECORDING_SECS)
    } else {
        MAX_RECORDING_SECS
    };
    duration_sec
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(|secs| secs.min(bound))
}

/// Requests sent by the page UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum UiRequest {
    /// A region was selected; arm a recording.
    SelectionComplete {
        /// Selected region and viewport metrics.
        rect: SelectionRect,
        /// Capture setup.
        config: CaptureConfig,
    },
    /// Stop the recording now.
    StopRecording,
    /// Abort the recording and discard its result.
    CancelRecording,
    /// Export the finished recording.
    Export {
        /// Output container.
        format: ExportFormat,
        /// Requested filename.
        #[serde(default)]
        filename: Option<String>,
        /// GIF options.
        #[serde(default)]
        options: ExportOptions,
    },
    /// Request a playable preview.
    Preview,
    /// Discard the finished recording.
    ClearRecording,
    /// Open the setup modal.
    ShowSetup,
    /// Enter selection mode.
    StartSelection,
}

impl UiRequest {
    /// Wire name of the request.
    pub fn kind(&self) -> &'static str {
        match self {
            UiRequest::SelectionComplete { .. } => "selection-complete",
            UiRequest::StopRecording => "stop-recording",
            UiRequest::CancelRecording => "cancel-recording",
            UiRequest::Export { .. } => "export",
            UiRequest::Preview => "preview",
            UiRequest::ClearRecording => "clear-recording",
            UiRequest::ShowSetup => "show-setup",
            UiRequest::StartSelection => "start-selection",
        }
    }
}

/// Broadcasts sent to the page UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum UiNotification {
    /// Open the setup modal.
    ShowSetup,
    /// Enter selection mode.
    StartSelection,
    /// Capture starts after `delay_ms`.
    RecordingPrep {
        /// Start delay in milliseconds.
        delay_ms: u64,
    },
    /// Capture is running.
    RecordingStarted {
        /// Bounded length in seconds, `null` when recording until stopped.
        duration_sec: Option<f64>,
        /// The region being recorded.
        rect: SelectionRect,
    },
    /// Capture finished; the recording can be exported.
    RecordingReady {
        /// Format chosen at setup.
        format_choice: ExportFormat,
        /// Title of the recorded tab.
        tab_title: String,
    },
    /// Recording was cancelled and discarded.
    RecordingCancelled,
    /// A start or export failed.
    ExportError {
        /// User-facing reason.
        message: String,
        /// Format of the failed export, if an export failed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<ExportFormat>,
    },
    /// An export was saved.
    ExportComplete {
        /// Format that was exported.
        format: ExportFormat,
    },
    /// Result of a preview request.
    PreviewReady {
        /// Preview payload or failure.
        preview: PreviewReport,
    },
}

impl UiNotification {
    /// Wire name of the notification.
    pub fn kind(&self) -> &'static str {
        match self {
            UiNotification::ShowSetup => "show-setup",
            UiNotification::StartSelection => "start-selection",
            UiNotification::RecordingPrep { .. } => "recording-prep",
            UiNotification::RecordingStarted { .. } => "recording-started",
            UiNotification::RecordingReady { .. } => "recording-ready",
            UiNotification::RecordingCancelled => "recording-cancelled",
            UiNotification::ExportError { .. } => "export-error",
            UiNotification::ExportComplete { .. } => "export-complete",
            UiNotification::PreviewReady { .. } => "preview-ready",
        }
    }
}

/// Preview outcome in the structured `{ok, ...}` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewReport {
    /// Whether a preview was produced.
    pub ok: bool,
    /// Base64 data URL of the recording.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
    /// Nominal filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Recording size in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<CoreResult<Preview>> for PreviewReport {
    fn from(result: CoreResult<Preview>) -> Self {
        match result {
            Ok(preview) => PreviewReport {
                ok: true,
                data_url: Some(preview.data_url),
                filename: Some(preview.filename),
                size: Some(preview.size),
                error: None,
            },
            Err(e) => PreviewReport {
                ok: false,
                data_url: None,
                filename: None,
                size: None,
                error: Some(e.user_message()),
            },
        }
    }
}
