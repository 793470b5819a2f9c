//! Page-side controller: local UI state mirrored from coordinator broadcasts.
//!
//! The controller never owns session truth. It keeps just enough state to
//! render the overlay, modals and recording indicator, and to suppress
//! duplicate export requests while one is outstanding.

use crate::{
    AppResult,
    coordinator::CoordinatorHandle,
    protocol::{CaptureConfig, MAX_RECORDING_SECS, PreviewReport, TabId, UiNotification, UiRequest},
};

use chrono::NaiveDateTime;
use region_recorder_core::{
    geometry::{MIN_SELECTION_EDGE, SelectionRect},
    media::export::{ExportFormat, ExportOptions},
};
use tracing::{debug, info, instrument, warn};

/// Upper bound applied to the duration typed into the setup modal.
pub const MAX_SETUP_DURATION_SECS: f64 = MAX_RECORDING_SECS;
/// Duration used when the setup input is empty or invalid.
pub const DEFAULT_SETUP_DURATION_SECS: f64 = 5.0;
/// Progress animation length when no duration is known.
pub const FALLBACK_PROGRESS_SECS: f64 = 5.0;
/// Longest sanitised tab title kept in a default filename.
pub const MAX_TITLE_CHARS: usize = 18;
/// Title used when the tab title sanitises to nothing.
pub const FALLBACK_TITLE: &str = "Recording";
/// Toast shown when a preview could not be produced.
pub const PREVIEW_UNAVAILABLE: &str = "Preview unavailable";
/// Toast shown for an export failure without a reason.
pub const EXPORT_FAILED: &str = "Export failed";
/// GIF width preselected in the export modal.
pub const DEFAULT_GIF_WIDTH: u32 = 720;
/// GIF frame rate preselected in the export modal.
pub const DEFAULT_GIF_FPS: u32 = 12;

const INVALID_FILENAME_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Values entered in the setup modal.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SetupForm {
    /// Raw duration input in seconds.
    pub duration_input: Option<f64>,
    /// Delay checkbox.
    pub start_delay: bool,
    /// Cursor checkbox.
    pub capture_cursor: bool,
}

/// A pointer position in viewport coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PagePoint {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

/// Window metrics reported with a selection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageViewport {
    /// Layout viewport width.
    pub inner_width: f64,
    /// Layout viewport height.
    pub inner_height: f64,
    /// Device pixel ratio.
    pub dpr: f64,
    /// Visual viewport width.
    pub visual_width: f64,
    /// Visual viewport height.
    pub visual_height: f64,
    /// Visual viewport left offset.
    pub offset_x: f64,
    /// Visual viewport top offset.
    pub offset_y: f64,
    /// Outer window width.
    pub outer_width: f64,
    /// Outer window height.
    pub outer_height: f64,
}

impl PageViewport {
    /// Metrics of an unzoomed page with `width` x `height` viewport.
    pub fn plain(width: f64, height: f64, dpr: f64) -> Self {
        Self {
            inner_width: width,
            inner_height: height,
            dpr,
            visual_width: width,
            visual_height: height,
            offset_x: 0.0,
            offset_y: 0.0,
            outer_width: width,
            outer_height: height,
        }
    }
}

/// Status shown by the recording indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorStatus {
    /// Waiting for the start delay or the capture grant.
    Starting,
    /// Capture running.
    Recording,
}

/// The floating recording controls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Indicator {
    /// Current status.
    pub status: IndicatorStatus,
    /// Length of the progress animation in seconds.
    pub progress_secs: Option<f64>,
    /// Outline drawn around the recorded region.
    pub outline: Option<SelectionRect>,
}

/// The export modal opened once a recording is ready.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportModal {
    /// Preselected format.
    pub format_choice: ExportFormat,
    /// Filename offered when the name input is left empty.
    pub default_name: String,
    /// Preview size once the preview arrived.
    pub preview_size: Option<u64>,
    /// GIF width selector; `None` is the source width.
    pub gif_width: Option<u32>,
    /// GIF frame rate selector.
    pub gif_fps: u32,
    /// Whether the large-GIF warning is shown.
    pub gif_warning: bool,
}

/// Keys the page UI reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Confirm.
    Enter,
    /// Dismiss.
    Escape,
}

/// Page UI of one tab.
pub struct UiController {
    tab: TabId,
    coordinator: CoordinatorHandle,
    current_config: CaptureConfig,
    setup_open: bool,
    selecting: bool,
    export_modal: Option<ExportModal>,
    indicator: Option<Indicator>,
    cursor_hidden: bool,
    export_in_progress: bool,
    gif_busy: bool,
    toasts: Vec<String>,
}

impl UiController {
    /// Create the page UI for `tab`.
    pub fn new(tab: TabId, coordinator: CoordinatorHandle) -> Self {
        Self {
            tab,
            coordinator,
            current_config: CaptureConfig::default(),
            setup_open: false,
            selecting: false,
            export_modal: None,
            indicator: None,
            cursor_hidden: false,
            export_in_progress: false,
            gif_busy: false,
            toasts: Vec::new(),
        }
    }

    /// React to a coordinator broadcast.
    #[instrument(skip(self, notification), fields(tab_id = %self.tab, kind = notification.kind()))]
    pub async fn handle_notification(&mut self, notification: UiNotification) -> AppResult<()> {
        match notification {
            UiNotification::ShowSetup => {
                if self.modal_open() {
                    debug!("Setup requested while a modal is open, ignored");
                    return Ok(());
                }
                self.setup_open = true;
            }
            UiNotification::StartSelection => {
                if self.modal_open() {
                    debug!("Selection requested while a modal is open, ignored");
                    return Ok(());
                }
                self.begin_selection();
            }
            UiNotification::RecordingPrep { delay_ms } => {
                debug!(delay_ms, "Recording starting after delay");
                self.indicator = Some(Indicator {
                    status: IndicatorStatus::Starting,
                    progress_secs: None,
                    outline: None,
                });
                self.cursor_hidden = !self.current_config.capture_cursor;
            }
            UiNotification::RecordingStarted { duration_sec, rect } => {
                let progress = duration_sec
                    .or(self.current_config.duration_sec)
                    .filter(|secs| *secs > 0.0)
                    .unwrap_or(FALLBACK_PROGRESS_SECS);
                self.indicator = Some(Indicator {
                    status: IndicatorStatus::Recording,
                    progress_secs: Some(progress),
                    outline: Some(rect),
                });
                self.cursor_hidden = !self.current_config.capture_cursor;
            }
            UiNotification::RecordingReady {
                format_choice,
                tab_title,
            } => {
                self.indicator = None;
                self.cursor_hidden = false;
                if self.export_modal.is_none() {
                    let title = if tab_title.trim().is_empty() {
                        FALLBACK_TITLE
                    } else {
                        tab_title.as_str()
                    };
                    self.export_modal = Some(ExportModal {
                        format_choice,
                        default_name: build_default_name(
                            title,
                            &chrono::Local::now().naive_local(),
                        ),
                        preview_size: None,
                        gif_width: Some(DEFAULT_GIF_WIDTH),
                        gif_fps: DEFAULT_GIF_FPS,
                        gif_warning: gif_warning(
                            Some(DEFAULT_GIF_WIDTH),
                            DEFAULT_GIF_FPS,
                            self.current_config.duration_sec,
                        ),
                    });
                }
                self.send(UiRequest::Preview).await?;
            }
            UiNotification::RecordingCancelled => {
                self.indicator = None;
                self.selecting = false;
                self.cursor_hidden = false;
                self.setup_open = self.export_modal.is_none();
            }
            UiNotification::ExportError { message, format } => {
                if format == Some(ExportFormat::Gif) {
                    self.gif_busy = false;
                }
                self.export_in_progress = false;
                let message = if message.trim().is_empty() {
                    EXPORT_FAILED.to_string()
                } else {
                    message
                };
                warn!(reason = %message, "Export failed");
                self.toasts.push(message);
            }
            UiNotification::ExportComplete { format } => {
                if format == ExportFormat::Gif {
                    self.gif_busy = false;
                }
                self.export_in_progress = false;
                info!(format = format.as_str(), "Export complete");
            }
            UiNotification::PreviewReady { preview } => self.attach_preview(preview),
        }

        Ok(())
    }

    /// Apply the setup modal and enter selection mode.
    pub fn apply_setup(&mut self, form: SetupForm) {
        let duration_sec = form
            .duration_input
            .filter(|secs| secs.is_finite() && *secs > 0.0)
            .map(|secs| secs.min(MAX_SETUP_DURATION_SECS))
            .unwrap_or(DEFAULT_SETUP_DURATION_SECS);

        self.current_config = CaptureConfig {
            format_choice: ExportFormat::Video,
            duration_sec: Some(duration_sec),
            start_delay: form.start_delay,
            capture_cursor: form.capture_cursor,
        };
        self.setup_open = false;
        self.begin_selection();

        debug!(config = ?self.current_config, "Setup applied");
    }

    /// Finish a drag from `start` to `end`.
    ///
    /// Returns whether a selection was sent. Drags under the minimum edge
    /// length leave selection mode without sending anything.
    #[instrument(skip(self, viewport))]
    pub async fn complete_selection(
        &mut self,
        start: PagePoint,
        end: PagePoint,
        viewport: PageViewport,
    ) -> AppResult<bool> {
        if !self.selecting {
            debug!("Pointer released outside selection mode, ignored");
            return Ok(false);
        }
        self.selecting = false;

        let x = start.x.min(end.x).max(0.0);
        let y = start.y.min(end.y).max(0.0);
        let width = (end.x - start.x).abs().min(viewport.inner_width);
        let height = (end.y - start.y).abs().min(viewport.inner_height);

        if width < MIN_SELECTION_EDGE || height < MIN_SELECTION_EDGE {
            debug!(width, height, "Selection too small, discarded");
            return Ok(false);
        }

        let rect = SelectionRect {
            x,
            y,
            width,
            height,
            dpr: if viewport.dpr > 0.0 { viewport.dpr } else { 1.0 },
            viewport_width: viewport.visual_width,
            viewport_height: viewport.visual_height,
            viewport_offset_x: viewport.offset_x,
            viewport_offset_y: viewport.offset_y,
            outer_width: viewport.outer_width,
            outer_height: viewport.outer_height,
        };

        self.send(UiRequest::SelectionComplete {
            rect,
            config: self.current_config,
        })
        .await?;
        Ok(true)
    }

    /// Export the recording as video.
    ///
    /// Returns whether a request was sent; a request while another export
    /// is outstanding is dropped.
    pub async fn export_video(&mut self, name: Option<&str>) -> AppResult<bool> {
        let Some(base_name) = self.export_base_name(name) else {
            return Ok(false);
        };

        self.export_in_progress = true;
        self.send_export(UiRequest::Export {
            format: ExportFormat::Video,
            filename: Some(ensure_ext(&base_name, "mp4")),
            options: ExportOptions::default(),
        })
        .await?;
        Ok(true)
    }

    /// Change the GIF selectors in the export modal and refresh the warning.
    pub fn set_gif_options(&mut self, width: Option<u32>, fps: u32) {
        let duration_sec = self.current_config.duration_sec;
        let Some(modal) = self.export_modal.as_mut() else {
            return;
        };

        modal.gif_width = width;
        modal.gif_fps = fps;
        modal.gif_warning = gif_warning(width, fps, duration_sec);
        if modal.gif_warning {
            warn!(
                width = ?width,
                fps,
                duration_sec = ?duration_sec,
                "Large GIF settings, export may be slow"
            );
        }
    }

    /// Export the recording as GIF at `width` (`None` keeps the source width).
    pub async fn export_gif(
        &mut self,
        name: Option<&str>,
        width: Option<u32>,
        fps: u32,
    ) -> AppResult<bool> {
        self.set_gif_options(width, fps);
        let Some(base_name) = self.export_base_name(name) else {
            return Ok(false);
        };

        self.export_in_progress = true;
        self.gif_busy = true;
        self.send_export(UiRequest::Export {
            format: ExportFormat::Gif,
            filename: Some(ensure_ext(&base_name, "gif")),
            options: ExportOptions {
                width: width.map(f64::from),
                fps: Some(f64::from(fps)),
            },
        })
        .await?;
        Ok(true)
    }

    /// Stop button on the recording indicator.
    pub async fn stop(&mut self) -> AppResult<()> {
        self.send(UiRequest::StopRecording).await
    }

    /// Abort the recording.
    pub async fn cancel(&mut self) -> AppResult<()> {
        self.send(UiRequest::CancelRecording).await
    }

    /// Delete the recording and start over.
    pub async fn reset(&mut self) -> AppResult<()> {
        self.send(UiRequest::ClearRecording).await?;
        self.export_modal = None;
        self.send(UiRequest::ShowSetup).await
    }

    /// Delete the recording and close the export modal.
    pub async fn done(&mut self) -> AppResult<()> {
        self.send(UiRequest::ClearRecording).await?;
        self.export_modal = None;
        Ok(())
    }

    /// Keyboard shortcut handling.
    pub async fn key(&mut self, key: Key) -> AppResult<()> {
        match key {
            Key::Escape if self.export_modal.is_some() => self.reset().await,
            Key::Enter if self.export_modal.is_some() => self.export_video(None).await.map(|_| ()),
            Key::Escape if self.setup_open => {
                self.setup_open = false;
                Ok(())
            }
            Key::Enter if self.setup_open => {
                self.apply_setup(SetupForm {
                    duration_input: self.current_config.duration_sec,
                    start_delay: self.current_config.start_delay,
                    capture_cursor: self.current_config.capture_cursor,
                });
                Ok(())
            }
            Key::Escape if self.indicator.is_some() => self.cancel().await,
            _ => Ok(()),
        }
    }

    /// Capture setup sent with the next selection.
    pub fn current_config(&self) -> CaptureConfig {
        self.current_config
    }

    /// Whether the setup modal is open.
    pub fn setup_open(&self) -> bool {
        self.setup_open
    }

    /// Whether the selection overlay is active.
    pub fn is_selecting(&self) -> bool {
        self.selecting
    }

    /// The export modal, if open.
    pub fn export_modal(&self) -> Option<&ExportModal> {
        self.export_modal.as_ref()
    }

    /// The recording indicator, if shown.
    pub fn indicator(&self) -> Option<&Indicator> {
        self.indicator.as_ref()
    }

    /// Whether the page cursor is hidden.
    pub fn cursor_hidden(&self) -> bool {
        self.cursor_hidden
    }

    /// Whether an export is outstanding.
    pub fn export_in_progress(&self) -> bool {
        self.export_in_progress
    }

    /// Whether the GIF control shows its busy state.
    pub fn gif_busy(&self) -> bool {
        self.gif_busy
    }

    /// Toasts shown so far, oldest first.
    pub fn toasts(&self) -> &[String] {
        &self.toasts
    }

    fn modal_open(&self) -> bool {
        self.setup_open || self.export_modal.is_some()
    }

    fn begin_selection(&mut self) {
        self.indicator = None;
        self.selecting = true;
    }

    fn export_base_name(&self, name: Option<&str>) -> Option<String> {
        if self.export_in_progress {
            debug!("Export already in progress, request dropped");
            return None;
        }

        let typed = name.map(str::trim).filter(|name| !name.is_empty());
        let base = match (typed, &self.export_modal) {
            (Some(name), _) => name.to_string(),
            (None, Some(modal)) => modal.default_name.clone(),
            (None, None) => FALLBACK_TITLE.to_string(),
        };
        Some(base)
    }

    fn attach_preview(&mut self, preview: PreviewReport) {
        if preview.ok && preview.data_url.is_some() {
            let size = preview.size.unwrap_or(0);
            if let Some(modal) = self.export_modal.as_mut() {
                modal.preview_size = Some(size);
            }
            debug!(size = %format_bytes(size), "Preview attached");
        } else {
            self.toasts.push(
                preview
                    .error
                    .filter(|error| !error.trim().is_empty())
                    .unwrap_or_else(|| PREVIEW_UNAVAILABLE.to_string()),
            );
        }
    }

    async fn send(&self, request: UiRequest) -> AppResult<()> {
        self.coordinator.send(Some(self.tab), request).await
    }

    /// Send an export, releasing the in-flight flags if it never left.
    async fn send_export(&mut self, request: UiRequest) -> AppResult<()> {
        let sent = self.send(request).await;
        if sent.is_err() {
            self.export_in_progress = false;
            self.gif_busy = false;
        }
        sent
    }
}

/// Default export name: sanitised tab title followed by a `yyMMdd-HHmmss` stamp.
pub fn build_default_name(tab_title: &str, now: &NaiveDateTime) -> String {
    let stripped: String = tab_title
        .chars()
        .filter(|c| !INVALID_FILENAME_CHARS.contains(c))
        .collect();
    let dashed = stripped
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let safe_title: String = dashed.chars().take(MAX_TITLE_CHARS).collect();
    let safe_title = if safe_title.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        safe_title
    };

    format!("{}{}", safe_title, now.format("%y%m%d-%H%M%S"))
}

/// Strip invalid characters and make sure `name` ends in `.ext`.
pub fn ensure_ext(name: &str, ext: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !INVALID_FILENAME_CHARS.contains(c))
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return format!("recording.{ext}");
    }
    if cleaned.to_lowercase().ends_with(&format!(".{}", ext.to_lowercase())) {
        return cleaned.to_string();
    }
    format!("{cleaned}.{ext}")
}

/// Human-readable size: whole KB below one MB, one decimal above.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    if bytes == 0 {
        return "0 MB".to_string();
    }

    let bytes = bytes as f64;
    if bytes >= MB {
        format!("{:.1} MB", bytes / MB)
    } else {
        format!("{} KB", (bytes / KB).round().max(1.0) as u64)
    }
}

/// Whether GIF settings are likely to produce a slow or failing export.
///
/// `width` of `None` means the source width and always counts as large.
pub fn gif_warning(width: Option<u32>, fps: u32, duration_sec: Option<f64>) -> bool {
    let wide = width.is_none_or(|width| width >= 960);
    let fast = fps >= 15;
    let long = duration_sec.is_some_and(|secs| secs > 10.0);
    wide || fast || long
}
