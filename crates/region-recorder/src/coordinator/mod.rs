//! The session coordinator: canonical per-tab session table and protocol hub.
//!
//! Runs as one task that owns every [`Session`]. Page requests and internal
//! completions arrive on channels and are handled one at a time. Anything
//! that waits on the media worker or the host runs in a spawned task and
//! reports back as a [`SessionEvent`], so the loop keeps receiving while a
//! capture starts, finalizes or exports.
//!
//! Late completions are matched against the session's epoch and phase;
//! timers are matched against the id in the session's timer slot. Either
//! mismatch means the completion belongs to a superseded attempt.

mod session;

pub use session::{ArmedStart, PendingTimer, Phase, Session, TimerKind};

use crate::{
    AppError, AppResult,
    platform::{NOT_CAPTURABLE_MESSAGE, Platform, is_capturable, sanitize_filename},
    protocol::{
        CaptureConfig, PreviewReport, TabId, UiNotification, UiRequest, normalize_duration,
    },
};

use std::{collections::HashMap, panic::Location, path::PathBuf, sync::Arc, time::Duration};

use error_location::ErrorLocation;
use region_recorder_core::{
    geometry::SelectionRect,
    media::{
        WorkerHandle,
        backend::CaptureBackend,
        export::{ExportFormat, ExportOptions},
    },
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Reason reported when a capture start fails without one.
pub const START_FAILED_MESSAGE: &str = "Error starting tab capture";

/// Reason reported when an export yields nothing to download.
pub const NO_DOWNLOAD_MESSAGE: &str = "Export failed to produce a downloadable file.";

/// Title used when the recorded tab has none.
pub const DEFAULT_TAB_TITLE: &str = "Recording";

/// Timing and bounds applied by the coordinator.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorSettings {
    /// Wait between arming and capture when a start delay is requested.
    pub start_delay: Duration,
    /// Longest bounded recording, in seconds.
    pub max_duration_secs: f64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            start_delay: Duration::from_millis(1000),
            max_duration_secs: 600.0,
        }
    }
}

/// Inputs accepted by the coordinator loop.
#[derive(Debug)]
pub enum CoordinatorInput {
    /// A page request; `tab` is `None` when the sender had no tab.
    Ui {
        /// Sending tab.
        tab: Option<TabId>,
        /// The request.
        request: UiRequest,
    },
    /// The toolbar action was clicked in `tab`.
    ActionClicked {
        /// Tab the action was clicked in.
        tab: TabId,
    },
    /// Report the session state of `tab`.
    Inspect {
        /// Tab to inspect.
        tab: TabId,
        /// Snapshot, if the tab has a session.
        respond_to: oneshot::Sender<Option<SessionSnapshot>>,
    },
    /// Stop the loop.
    Shutdown,
}

/// Read-only view of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSnapshot {
    /// Lifecycle phase.
    pub phase: Phase,
    /// Format preselected for export.
    pub format_choice: ExportFormat,
    /// Kind of the live timer, if any.
    pub pending_timer: Option<TimerKind>,
    /// Current attempt.
    pub epoch: u64,
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            phase: session.phase,
            format_choice: session.format_choice,
            pending_timer: session.pending_timer(),
            epoch: session.epoch,
        }
    }
}

/// Completions reported back to the loop by timers and spawned work.
#[derive(Debug)]
enum SessionEvent {
    TimerFired {
        tab: TabId,
        timer_id: u64,
    },
    StartFinished {
        tab: TabId,
        epoch: u64,
        result: Result<(), String>,
    },
    StopFinished {
        tab: TabId,
        epoch: u64,
        result: Result<String, String>,
    },
    CancelFinished {
        tab: TabId,
        epoch: u64,
    },
    ExportFinished {
        tab: TabId,
        saved: bool,
    },
}

/// Sender side of the coordinator's input channel.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    input_tx: mpsc::Sender<CoordinatorInput>,
}

impl CoordinatorHandle {
    /// Handle whose inputs land in the returned receiver instead of a loop.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::Receiver<CoordinatorInput>) {
        let (input_tx, input_rx) = mpsc::channel(64);
        (Self { input_tx }, input_rx)
    }

    /// Deliver a page request from `tab`.
    pub async fn send(&self, tab: Option<TabId>, request: UiRequest) -> AppResult<()> {
        self.input(CoordinatorInput::Ui { tab, request }).await
    }

    /// Report a toolbar action click in `tab`.
    pub async fn action_clicked(&self, tab: TabId) -> AppResult<()> {
        self.input(CoordinatorInput::ActionClicked { tab }).await
    }

    /// Snapshot of the session of `tab`.
    pub async fn inspect(&self, tab: TabId) -> AppResult<Option<SessionSnapshot>> {
        let (respond_to, response) = oneshot::channel();
        self.input(CoordinatorInput::Inspect { tab, respond_to })
            .await?;
        response.await.map_err(|e| AppError::ChannelSendFailed {
            message: format!("Coordinator dropped the response: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })
    }

    /// Ask the loop to stop.
    pub async fn shutdown(&self) -> AppResult<()> {
        self.input(CoordinatorInput::Shutdown).await
    }

    async fn input(&self, input: CoordinatorInput) -> AppResult<()> {
        self.input_tx
            .send(input)
            .await
            .map_err(|e| AppError::ChannelSendFailed {
                message: format!("Coordinator is not running: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })
    }
}

/// Owner of the session table and the lazily created media worker.
pub struct Coordinator {
    platform: Arc<dyn Platform>,
    backend: Arc<dyn CaptureBackend>,
    settings: CoordinatorSettings,
    worker: Option<WorkerHandle>,
    sessions: HashMap<TabId, Session>,
    active_tab: Option<TabId>,
    next_timer_id: u64,
    input_rx: mpsc::Receiver<CoordinatorInput>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
    event_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Coordinator {
    /// Spawn the coordinator loop.
    ///
    /// The media worker is created on first need over `backend`.
    pub fn spawn(
        platform: Arc<dyn Platform>,
        backend: Arc<dyn CaptureBackend>,
        settings: CoordinatorSettings,
    ) -> (CoordinatorHandle, JoinHandle<()>) {
        let (input_tx, input_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let coordinator = Coordinator {
            platform,
            backend,
            settings,
            worker: None,
            sessions: HashMap::new(),
            active_tab: None,
            next_timer_id: 1,
            input_rx,
            event_tx,
            event_rx,
        };

        let task = tokio::spawn(coordinator.run());
        (CoordinatorHandle { input_tx }, task)
    }

    #[instrument(skip(self))]
    async fn run(mut self) {
        info!(
            start_delay_ms = self.settings.start_delay.as_millis(),
            max_duration_secs = self.settings.max_duration_secs,
            "Session coordinator starting"
        );

        loop {
            tokio::select! {
                input = self.input_rx.recv() => {
                    match input {
                        Some(CoordinatorInput::Shutdown) => {
                            info!("Shutdown requested");
                            break;
                        }
                        Some(input) => self.handle_input(input).await,
                        None => {
                            info!("All coordinator handles dropped, shutting down");
                            break;
                        }
                    }
                }

                Some(event) = self.event_rx.recv() => {
                    self.handle_event(event).await;
                }
            }
        }

        for session in self.sessions.values_mut() {
            session.clear_timer();
        }

        info!("Session coordinator shut down");
    }

    async fn handle_input(&mut self, input: CoordinatorInput) {
        match input {
            CoordinatorInput::Ui { tab, request } => {
                let Some(tab) = tab.or(self.active_tab) else {
                    warn!(kind = request.kind(), "Request without a sender tab, ignored");
                    return;
                };
                self.handle_request(tab, request).await;
            }
            CoordinatorInput::ActionClicked { tab } => self.action_clicked(tab).await,
            CoordinatorInput::Inspect { tab, respond_to } => {
                let _ = respond_to.send(self.sessions.get(&tab).map(SessionSnapshot::from));
            }
            CoordinatorInput::Shutdown => {}
        }
    }

    #[instrument(skip(self, request), fields(kind = request.kind()))]
    async fn handle_request(&mut self, tab: TabId, request: UiRequest) {
        match request {
            UiRequest::SelectionComplete { rect, config } => self.arm(tab, rect, config).await,
            UiRequest::StopRecording => self.stop(tab),
            UiRequest::CancelRecording => self.cancel(tab),
            UiRequest::Export {
                format,
                filename,
                options,
            } => self.export(tab, format, filename, options),
            UiRequest::Preview => self.preview(tab),
            UiRequest::ClearRecording => self.clear(tab),
            UiRequest::ShowSetup => self.relay(tab, UiNotification::ShowSetup).await,
            UiRequest::StartSelection => self.relay(tab, UiNotification::StartSelection).await,
        }
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::TimerFired { tab, timer_id } => self.timer_fired(tab, timer_id),
            SessionEvent::StartFinished { tab, epoch, result } => {
                self.start_finished(tab, epoch, result).await
            }
            SessionEvent::StopFinished { tab, epoch, result } => {
                self.stop_finished(tab, epoch, result).await
            }
            SessionEvent::CancelFinished { tab, epoch } => self.cancel_finished(tab, epoch).await,
            SessionEvent::ExportFinished { tab, saved } => {
                if let Some(session) = self.sessions.get_mut(&tab)
                    && saved
                    && session.phase == Phase::Stopped
                {
                    session.phase = Phase::Exported;
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn action_clicked(&mut self, tab: TabId) {
        let capturable = self
            .platform
            .tab_info(tab)
            .await
            .is_some_and(|info| is_capturable(&info.url));
        if !capturable {
            debug!(tab_id = %tab, "Action clicked on a tab that cannot be captured, ignored");
            return;
        }

        self.active_tab = Some(tab);
        self.relay(tab, UiNotification::ShowSetup).await;
    }

    async fn relay(&self, tab: TabId, notification: UiNotification) {
        if let Err(e) = self.platform.ensure_ui(tab).await {
            warn!(tab_id = %tab, error = ?e, "Failed to attach page UI");
        }
        deliver(self.platform.as_ref(), tab, notification).await;
    }

    #[instrument(skip(self, rect))]
    async fn arm(&mut self, tab: TabId, rect: SelectionRect, config: CaptureConfig) {
        let capturable = self
            .platform
            .tab_info(tab)
            .await
            .is_some_and(|info| is_capturable(&info.url));
        if !capturable {
            warn!(tab_id = %tab, "Selection completed on a tab that cannot be captured");
            deliver(
                self.platform.as_ref(),
                tab,
                UiNotification::ExportError {
                    message: NOT_CAPTURABLE_MESSAGE.to_string(),
                    format: None,
                },
            )
            .await;
            return;
        }

        let duration_sec = normalize_duration(config.duration_sec, self.settings.max_duration_secs);
        self.ensure_worker();

        let session = self
            .sessions
            .entry(tab)
            .or_insert_with(|| Session::new(tab));
        session.clear_timer();
        session.next_epoch();
        session.session_id = Uuid::new_v4();
        session.format_choice = config.format_choice;
        session.phase = Phase::Armed;
        session.armed = Some(ArmedStart {
            rect,
            capture_cursor: config.capture_cursor,
            duration_sec,
        });

        info!(
            tab_id = %tab,
            session_id = %session.session_id,
            duration_sec = ?duration_sec,
            start_delay = config.start_delay,
            capture_cursor = config.capture_cursor,
            "Session armed"
        );

        if config.start_delay {
            let delay = self.settings.start_delay;
            deliver(
                self.platform.as_ref(),
                tab,
                UiNotification::RecordingPrep {
                    delay_ms: delay.as_millis() as u64,
                },
            )
            .await;
            self.schedule_timer(tab, TimerKind::StartDelay, delay);
        } else {
            self.begin_start(tab);
        }
    }

    fn begin_start(&mut self, tab: TabId) {
        let worker = self.ensure_worker();

        let Some(session) = self.sessions.get(&tab) else {
            return;
        };
        let Some(armed) = session.armed else {
            warn!(tab_id = %tab, "Start without armed parameters, ignored");
            return;
        };
        let epoch = session.epoch;
        let platform = Arc::clone(&self.platform);
        let event_tx = self.event_tx.clone();

        debug!(tab_id = %tab, epoch, "Starting capture");

        tokio::spawn(async move {
            let result = start_capture(platform.as_ref(), &worker, tab, armed)
                .await
                .map_err(|e| {
                    let message = e.user_message();
                    if message.trim().is_empty() {
                        START_FAILED_MESSAGE.to_string()
                    } else {
                        message
                    }
                });
            let _ = event_tx.send(SessionEvent::StartFinished { tab, epoch, result });
        });
    }

    async fn start_finished(&mut self, tab: TabId, epoch: u64, result: Result<(), String>) {
        let current = self
            .sessions
            .get(&tab)
            .map(|session| (session.epoch, session.phase));

        match current {
            Some((current_epoch, Phase::Armed)) if current_epoch == epoch => {}
            other => {
                warn!(tab_id = %tab, epoch, current = ?other, "Start completed for a superseded attempt");
                let newer_attempt = matches!(
                    other,
                    Some((_, Phase::Armed)) | Some((_, Phase::Recording { .. }))
                );
                if result.is_ok() && !newer_attempt {
                    self.discard_capture();
                }
                return;
            }
        }

        let Some(session) = self.sessions.get_mut(&tab) else {
            return;
        };

        match result {
            Err(message) => {
                session.phase = Phase::Idle;
                session.armed = None;
                error!(tab_id = %tab, session_id = %session.session_id, reason = %message, "Capture failed to start");
                deliver(
                    self.platform.as_ref(),
                    tab,
                    UiNotification::ExportError {
                        message,
                        format: None,
                    },
                )
                .await;
            }
            Ok(()) => {
                let Some(armed) = session.armed else {
                    return;
                };
                let bound = armed
                    .duration_sec
                    .and_then(|secs| Duration::try_from_secs_f64(secs).ok());
                session.phase = Phase::Recording {
                    deadline: bound.map(|after| Instant::now() + after),
                };
                info!(tab_id = %tab, session_id = %session.session_id, duration_sec = ?armed.duration_sec, "Recording started");

                deliver(
                    self.platform.as_ref(),
                    tab,
                    UiNotification::RecordingStarted {
                        duration_sec: armed.duration_sec,
                        rect: armed.rect,
                    },
                )
                .await;

                if let Some(after) = bound {
                    self.schedule_timer(tab, TimerKind::AutoStop, after);
                }
            }
        }
    }

    fn timer_fired(&mut self, tab: TabId, timer_id: u64) {
        let kind = self
            .sessions
            .get_mut(&tab)
            .and_then(|session| session.take_fired_timer(timer_id));

        match kind {
            Some(TimerKind::StartDelay) => {
                debug!(tab_id = %tab, timer_id, "Start delay elapsed");
                self.begin_start(tab);
            }
            Some(TimerKind::AutoStop) => {
                info!(tab_id = %tab, timer_id, "Duration reached, stopping");
                self.stop(tab);
            }
            None => warn!(tab_id = %tab, timer_id, "Stale timer fired, ignored"),
        }
    }

    fn stop(&mut self, tab: TabId) {
        let Some(session) = self.sessions.get_mut(&tab) else {
            debug!(tab_id = %tab, "Stop for a tab without a session, ignored");
            return;
        };
        if !session.accepts_stop() {
            debug!(tab_id = %tab, phase = ?session.phase, "Stop ignored, nothing to stop");
            return;
        }

        session.clear_timer();
        let epoch = session.next_epoch();
        session.phase = Phase::Stopping;
        info!(tab_id = %tab, session_id = %session.session_id, "Stopping recording");

        let worker = self.worker.clone();
        let platform = Arc::clone(&self.platform);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let stopped = match worker {
                Some(worker) => worker.stop_recording().await.map_err(|e| e.user_message()),
                None => Ok(()),
            };
            let title = platform
                .tab_info(tab)
                .await
                .map(|info| info.title)
                .filter(|title| !title.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TAB_TITLE.to_string());

            let _ = event_tx.send(SessionEvent::StopFinished {
                tab,
                epoch,
                result: stopped.map(|()| title),
            });
        });
    }

    async fn stop_finished(&mut self, tab: TabId, epoch: u64, result: Result<String, String>) {
        let Some(session) = self
            .sessions
            .get_mut(&tab)
            .filter(|session| session.epoch == epoch && session.phase == Phase::Stopping)
        else {
            debug!(tab_id = %tab, epoch, "Stop completed for a superseded attempt");
            return;
        };

        let notification = match result {
            Ok(tab_title) => {
                session.phase = Phase::Stopped;
                info!(tab_id = %tab, session_id = %session.session_id, "Recording ready");
                UiNotification::RecordingReady {
                    format_choice: session.format_choice,
                    tab_title,
                }
            }
            Err(message) => {
                session.phase = Phase::Idle;
                error!(tab_id = %tab, session_id = %session.session_id, reason = %message, "Recording failed to finalize");
                UiNotification::ExportError {
                    message,
                    format: None,
                }
            }
        };

        deliver(self.platform.as_ref(), tab, notification).await;
    }

    fn cancel(&mut self, tab: TabId) {
        let session = self
            .sessions
            .entry(tab)
            .or_insert_with(|| Session::new(tab));
        session.clear_timer();
        let epoch = session.next_epoch();
        session.phase = Phase::Cancelling;
        session.armed = None;
        info!(tab_id = %tab, session_id = %session.session_id, "Cancelling recording");

        let worker = self.worker.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            if let Some(worker) = worker {
                if let Err(e) = worker.stop_recording().await {
                    warn!(error = ?e, "Stop during cancel failed");
                }
                if let Err(e) = worker.clear_recording().await {
                    warn!(error = ?e, "Clear during cancel failed");
                }
            }
            let _ = event_tx.send(SessionEvent::CancelFinished { tab, epoch });
        });
    }

    async fn cancel_finished(&mut self, tab: TabId, epoch: u64) {
        let Some(session) = self
            .sessions
            .get_mut(&tab)
            .filter(|session| session.epoch == epoch && session.phase == Phase::Cancelling)
        else {
            debug!(tab_id = %tab, epoch, "Cancel completed for a superseded attempt");
            return;
        };

        session.phase = Phase::Idle;
        info!(tab_id = %tab, session_id = %session.session_id, "Recording cancelled");
        deliver(
            self.platform.as_ref(),
            tab,
            UiNotification::RecordingCancelled,
        )
        .await;
    }

    fn export(
        &mut self,
        tab: TabId,
        format: ExportFormat,
        filename: Option<String>,
        options: ExportOptions,
    ) {
        let worker = self.ensure_worker();
        let platform = Arc::clone(&self.platform);
        let event_tx = self.event_tx.clone();

        info!(tab_id = %tab, format = format.as_str(), filename = ?filename, "Export requested");

        tokio::spawn(async move {
            let outcome =
                export_and_download(platform.as_ref(), &worker, format, filename, options).await;

            let saved = match outcome {
                Ok(path) => {
                    info!(tab_id = %tab, format = format.as_str(), path = ?path, "Export saved");
                    deliver(
                        platform.as_ref(),
                        tab,
                        UiNotification::ExportComplete { format },
                    )
                    .await;
                    true
                }
                Err(e) => {
                    error!(tab_id = %tab, format = format.as_str(), error = ?e, "Export failed");
                    deliver(
                        platform.as_ref(),
                        tab,
                        UiNotification::ExportError {
                            message: e.user_message(),
                            format: Some(format),
                        },
                    )
                    .await;
                    false
                }
            };

            let _ = event_tx.send(SessionEvent::ExportFinished { tab, saved });
        });
    }

    fn preview(&mut self, tab: TabId) {
        let worker = self.ensure_worker();
        let platform = Arc::clone(&self.platform);

        tokio::spawn(async move {
            let preview = PreviewReport::from(worker.preview().await);
            debug!(tab_id = %tab, ok = preview.ok, size = ?preview.size, "Preview produced");
            deliver(
                platform.as_ref(),
                tab,
                UiNotification::PreviewReady { preview },
            )
            .await;
        });
    }

    fn clear(&mut self, tab: TabId) {
        if let Some(session) = self.sessions.get_mut(&tab)
            && matches!(session.phase, Phase::Stopped | Phase::Exported)
        {
            session.phase = Phase::Idle;
            session.armed = None;
        }

        if let Some(worker) = self.worker.clone() {
            tokio::spawn(async move {
                if let Err(e) = worker.clear_recording().await {
                    warn!(error = ?e, "Clear recording failed");
                }
            });
        }
        debug!(tab_id = %tab, "Recording cleared");
    }

    /// Drop a capture whose start was superseded, keeping the artifact.
    fn discard_capture(&self) {
        let Some(worker) = self.worker.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = worker.discard_recording().await {
                warn!(error = ?e, "Failed to discard superseded capture");
            }
        });
    }

    fn schedule_timer(&mut self, tab: TabId, kind: TimerKind, after: Duration) {
        let timer_id = self.next_timer_id;
        self.next_timer_id += 1;

        let event_tx = self.event_tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = event_tx.send(SessionEvent::TimerFired { tab, timer_id });
        });

        match self.sessions.get_mut(&tab) {
            Some(session) => {
                session.set_timer(PendingTimer {
                    id: timer_id,
                    kind,
                    abort: task.abort_handle(),
                });
                debug!(tab_id = %tab, timer_id, kind = ?kind, after_ms = after.as_millis(), "Timer scheduled");
            }
            None => task.abort(),
        }
    }

    fn ensure_worker(&mut self) -> WorkerHandle {
        if let Some(worker) = self.worker.as_ref().filter(|worker| worker.is_alive()) {
            return worker.clone();
        }

        let worker = WorkerHandle::spawn(Arc::clone(&self.backend));
        self.worker = Some(worker.clone());
        worker
    }
}

async fn start_capture(
    platform: &dyn Platform,
    worker: &WorkerHandle,
    tab: TabId,
    armed: ArmedStart,
) -> AppResult<()> {
    let stream_id = platform.tab_stream_id(tab).await?;
    worker
        .start_recording(stream_id, armed.rect, armed.capture_cursor)
        .await?;
    Ok(())
}

async fn export_and_download(
    platform: &dyn Platform,
    worker: &WorkerHandle,
    format: ExportFormat,
    filename: Option<String>,
    options: ExportOptions,
) -> AppResult<PathBuf> {
    let receipt = worker.export(format, options, filename).await?;

    let blob = if receipt.blob_url.is_empty() {
        None
    } else {
        worker.resolve_blob(receipt.blob_url.clone()).await?
    };
    let Some(blob) = blob else {
        return Err(AppError::DownloadFailed {
            reason: NO_DOWNLOAD_MESSAGE.to_string(),
            location: ErrorLocation::from(Location::caller()),
        });
    };

    let saved = platform
        .download(&blob, &sanitize_filename(&receipt.filename), true)
        .await;

    if let Err(e) = worker.revoke_blob(receipt.blob_url).await {
        warn!(error = ?e, "Failed to revoke blob URL");
    }

    saved
}

async fn deliver(platform: &dyn Platform, tab: TabId, notification: UiNotification) {
    let kind = notification.kind();
    if let Err(e) = platform.notify(tab, notification).await {
        debug!(tab_id = %tab, kind, error = ?e, "Notification not delivered");
    }
}
