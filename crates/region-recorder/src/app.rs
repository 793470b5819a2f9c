use crate::{
    AppError, AppResult,
    config::Config,
    coordinator::{Coordinator, CoordinatorHandle, CoordinatorSettings},
    platform::HeadlessPlatform,
    protocol::{TabId, UiNotification},
    ui_controller::{
        DEFAULT_SETUP_DURATION_SECS, Key, PagePoint, PageViewport, SetupForm, UiController,
    },
};

use std::{panic::Location, path::PathBuf, sync::Arc, time::Duration};

use error_location::ErrorLocation;
use region_recorder_core::{
    media::export::ExportFormat,
    synthetic::{TestPatternBackend, TestPatternConfig},
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

/// Tab the headless session records in.
pub const SESSION_TAB: TabId = TabId(1);

/// Longest wait for the next page notification before the session is
/// considered stalled.
const NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Wait for the coordinator loop to exit after shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// One scripted recording session against the headless host.
///
/// Plays the user: opens setup from the toolbar action, drags the configured
/// selection, waits for the auto-stop, then exports video and optionally GIF
/// from the export modal.
pub struct App {
    config: Config,
    platform: Arc<HeadlessPlatform>,
    backend: Arc<TestPatternBackend>,
}

impl App {
    /// Build the host and media backend described by `config`.
    #[track_caller]
    pub fn new(config: Config) -> AppResult<Self> {
        let download_dir = config.output.resolve_download_dir()?;
        Ok(Self::with_download_dir(config, download_dir))
    }

    /// Like [`App::new`] but saving downloads into `download_dir`.
    pub fn with_download_dir(config: Config, download_dir: PathBuf) -> Self {
        let (frame_width, frame_height) = config.frame_size();
        let backend = Arc::new(TestPatternBackend::new(TestPatternConfig {
            frame_width,
            frame_height,
            ..TestPatternConfig::default()
        }));

        let platform = Arc::new(HeadlessPlatform::new(download_dir));
        platform.open_tab(SESSION_TAB, &config.page.url, &config.page.title);

        Self {
            config,
            platform,
            backend,
        }
    }

    /// Run the session and return the saved files.
    #[instrument(skip(self))]
    pub async fn run(self) -> AppResult<Vec<PathBuf>> {
        info!(
            url = %self.config.page.url,
            duration_secs = self.config.recording.duration_secs,
            gif = self.config.gif.enabled,
            "Region recorder starting"
        );

        let settings = CoordinatorSettings {
            start_delay: Duration::from_millis(self.config.recording.start_delay_ms),
            max_duration_secs: self.config.recording.max_duration_secs,
        };
        let (coordinator, coordinator_task) = Coordinator::spawn(
            self.platform.clone(),
            self.backend.clone(),
            settings,
        );

        let page_rx = self.platform.attach_page(SESSION_TAB);
        let mut ui = UiController::new(SESSION_TAB, coordinator.clone());

        let outcome = self.drive(&coordinator, &mut ui, page_rx).await;

        match coordinator.inspect(SESSION_TAB).await {
            Ok(Some(snapshot)) => debug!(
                phase = ?snapshot.phase,
                format_choice = snapshot.format_choice.as_str(),
                pending_timer = ?snapshot.pending_timer,
                epoch = snapshot.epoch,
                "Final session state"
            ),
            Ok(None) => debug!("No session was created"),
            Err(e) => warn!(error = ?e, "Could not read final session state"),
        }

        if let Err(e) = coordinator.shutdown().await {
            warn!(error = ?e, "Coordinator already stopped");
        }
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, coordinator_task).await {
            Ok(Ok(())) => debug!("Coordinator stopped cleanly"),
            Ok(Err(e)) => error!(error = ?e, "Coordinator task panicked"),
            Err(_) => warn!("Coordinator did not stop within timeout"),
        }

        outcome?;

        let downloads = self.platform.downloads();
        info!(files = downloads.len(), "Region recorder finished");
        Ok(downloads)
    }

    async fn drive(
        &self,
        coordinator: &CoordinatorHandle,
        ui: &mut UiController,
        mut page_rx: mpsc::UnboundedReceiver<UiNotification>,
    ) -> AppResult<()> {
        coordinator.action_clicked(SESSION_TAB).await?;

        loop {
            let notification = match tokio::time::timeout(NOTIFICATION_TIMEOUT, page_rx.recv())
                .await
            {
                Ok(Some(notification)) => notification,
                Ok(None) => return Err(session_failed("Page UI detached".to_string())),
                Err(_) => {
                    if ui.indicator().is_some() {
                        // Escape on the indicator cancels the capture.
                        ui.key(Key::Escape).await?;
                    }
                    return Err(session_failed(format!(
                        "No page notification within {}s",
                        NOTIFICATION_TIMEOUT.as_secs()
                    )));
                }
            };

            ui.handle_notification(notification.clone()).await?;
            debug!(
                selecting = ui.is_selecting(),
                indicator = ?ui.indicator(),
                cursor_hidden = ui.cursor_hidden(),
                export_modal = ?ui.export_modal(),
                export_in_progress = ui.export_in_progress(),
                gif_busy = ui.gif_busy(),
                "Page UI updated"
            );

            match notification {
                UiNotification::ShowSetup if ui.setup_open() => self.select_region(ui).await?,
                UiNotification::RecordingStarted {
                    duration_sec: Some(duration_sec),
                    ..
                } => {
                    info!(duration_sec, "Recording, waiting for auto-stop");
                }
                UiNotification::RecordingStarted {
                    duration_sec: None, ..
                } => {
                    let length = Duration::from_secs_f64(DEFAULT_SETUP_DURATION_SECS);
                    info!(
                        length_secs = length.as_secs(),
                        "Unbounded recording, stopping from the indicator"
                    );
                    tokio::time::sleep(length).await;
                    ui.stop().await?;
                }
                UiNotification::PreviewReady { preview } => {
                    if !preview.ok {
                        warn!(error = ?preview.error, "Preview unavailable, exporting anyway");
                    }
                    // Enter in the export modal exports video under the default name.
                    ui.key(Key::Enter).await?;
                }
                UiNotification::ExportComplete {
                    format: ExportFormat::Video,
                } if self.config.gif.enabled => {
                    ui.export_gif(None, self.config.gif.width, self.config.gif.fps)
                        .await?;
                }
                UiNotification::ExportComplete { .. } => {
                    for toast in ui.toasts() {
                        warn!(toast = %toast, "Page showed a toast");
                    }
                    ui.done().await?;
                    return Ok(());
                }
                UiNotification::ExportError { message, .. } => {
                    ui.done().await?;
                    return Err(session_failed(message));
                }
                UiNotification::RecordingCancelled => {
                    return Err(session_failed("Recording was cancelled".to_string()));
                }
                _ => {}
            }
        }
    }

    async fn select_region(&self, ui: &mut UiController) -> AppResult<()> {
        let recording = &self.config.recording;
        ui.apply_setup(SetupForm {
            duration_input: Some(recording.duration_secs),
            start_delay: recording.start_delay,
            capture_cursor: recording.capture_cursor,
        });
        debug!(config = ?ui.current_config(), "Setup confirmed");

        let page = &self.config.page;
        let selection = page.selection;
        let sent = ui
            .complete_selection(
                PagePoint {
                    x: selection.x,
                    y: selection.y,
                },
                PagePoint {
                    x: selection.x + selection.width,
                    y: selection.y + selection.height,
                },
                PageViewport::plain(
                    f64::from(page.viewport_width),
                    f64::from(page.viewport_height),
                    page.device_pixel_ratio,
                ),
            )
            .await?;

        if !sent {
            return Err(session_failed("Selection was too small".to_string()));
        }
        Ok(())
    }
}

#[track_caller]
fn session_failed(reason: String) -> AppError {
    AppError::SessionFailed {
        reason,
        location: ErrorLocation::from(Location::caller()),
    }
}
