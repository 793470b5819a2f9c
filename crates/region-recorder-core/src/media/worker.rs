//! The media worker: single owner of the capture pipeline and the artifact.
//!
//! # Pipeline invariant
//!
//! At most one [`CapturePipeline`] is active at a time. Starting a new one
//! first tears down (discards) any predecessor. The artifact is replaced only
//! when a pipeline finishes finalizing, so a failed or aborted capture never
//! destroys the previous recording.
//!
//! # Stop coalescing
//!
//! Finalizing is asynchronous. The first stop moves the pipeline into a
//! finalizer task and publishes a completion channel; every stop that
//! arrives before the finalizer is done waits on that same channel instead
//! of starting a second finalize.

use crate::{
    CoreResult, MediaError,
    geometry::SelectionRect,
    media::{
        Blob, BlobRegistry,
        backend::{CaptureBackend, CursorMode, StreamId},
        export::{
            ExportFormat, ExportOptions, ExportReceipt, GifSettings, Preview, default_filename,
            render_gif, video_filename,
        },
        pipeline::CapturePipeline,
    },
};

use std::{
    panic::Location,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use error_location::ErrorLocation;
use tokio::sync::{Mutex, watch};
use tracing::{debug, error, info, instrument, warn};

/// Nominal filename attached to previews.
pub const PREVIEW_FILENAME: &str = "preview.webm";

type FinalizeOutcome = Option<Result<(), String>>;

#[derive(Default)]
struct WorkerState {
    active: Option<CapturePipeline>,
    finalizing: Option<watch::Receiver<FinalizeOutcome>>,
    artifact: Option<Blob>,
}

/// Executes capture and export commands; never initiates session changes.
///
/// Cheap to clone: clones share the same pipeline, artifact and blob table.
#[derive(Clone)]
pub struct MediaWorker {
    backend: Arc<dyn CaptureBackend>,
    state: Arc<Mutex<WorkerState>>,
    blobs: Arc<BlobRegistry>,
}

impl MediaWorker {
    /// Create a worker over the given media capabilities.
    pub fn new(backend: Arc<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(WorkerState::default())),
            blobs: Arc::new(BlobRegistry::default()),
        }
    }

    /// Start capturing `rect` from the tab behind `stream_id`.
    ///
    /// Any in-progress capture is discarded first. The current artifact is
    /// kept until this new capture finalizes.
    #[instrument(skip(self, rect))]
    pub async fn start_recording(
        &self,
        stream_id: StreamId,
        rect: SelectionRect,
        capture_cursor: bool,
    ) -> CoreResult<()> {
        self.teardown().await;

        let pipeline = CapturePipeline::start(
            self.backend.as_ref(),
            &stream_id,
            &rect,
            CursorMode::from(capture_cursor),
        )
        .await?;

        let region = pipeline.region();
        let mime_type = pipeline.mime_type().to_string();

        let mut state = self.state.lock().await;
        if let Some(previous) = state.active.replace(pipeline) {
            warn!("Concurrent start superseded a pipeline");
            previous.abort();
        }

        info!(region = ?region, mime_type = %mime_type, "Recording started");

        Ok(())
    }

    /// Finalize the active capture into the artifact.
    ///
    /// No-op when nothing is recording. Overlapping calls share one finalize.
    /// A call that joined an older finalize also finalizes any capture
    /// started meanwhile, so it never returns while a capture is running.
    #[instrument(skip(self))]
    pub async fn stop_recording(&self) -> CoreResult<()> {
        loop {
            let Some((joined, done_rx)) = self.begin_finalize().await else {
                debug!("Stop requested with no active capture");
                return Ok(());
            };

            let outcome = wait_finalized(done_rx).await;

            if joined && self.is_recording().await {
                debug!("Joined finalize done while a newer capture runs, finalizing it too");
                continue;
            }

            return outcome;
        }
    }

    /// Completion of the finalize to wait on, and whether it was already running.
    async fn begin_finalize(&self) -> Option<(bool, watch::Receiver<FinalizeOutcome>)> {
        let mut state = self.state.lock().await;

        if let Some(pending) = &state.finalizing {
            debug!("Stop already finalizing, joining it");
            return Some((true, pending.clone()));
        }

        let pipeline = state.active.take()?;
        let (done_tx, done_rx) = watch::channel::<FinalizeOutcome>(None);
        state.finalizing = Some(done_rx.clone());

        let finalize = pipeline.finalize();
        let shared = Arc::clone(&self.state);

        tokio::spawn(async move {
            let outcome = match finalize.await {
                Ok(Ok(artifact)) => {
                    let mut state = shared.lock().await;
                    info!(bytes = artifact.size(), "Artifact replaced");
                    state.artifact = Some(artifact);
                    state.finalizing = None;
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!(error = ?e, "Finalize failed, keeping previous artifact");
                    shared.lock().await.finalizing = None;
                    Err(e.user_message())
                }
                Err(e) => {
                    error!(error = ?e, "Finalize task did not complete");
                    shared.lock().await.finalizing = None;
                    Err(format!("Recording finalize interrupted: {}", e))
                }
            };
            let _ = done_tx.send(Some(outcome));
        });

        Some((false, done_rx))
    }

    /// Export the artifact as `format`.
    ///
    /// Finalizes an in-flight capture first. Failures leave the artifact in
    /// place so the export can be retried with other options.
    #[instrument(skip(self, options))]
    pub async fn export_recording(
        &self,
        format: ExportFormat,
        options: ExportOptions,
        filename: Option<String>,
    ) -> CoreResult<ExportReceipt> {
        self.stop_recording().await?;

        let artifact = self
            .artifact()
            .await
            .ok_or_else(|| MediaError::NothingRecorded {
                location: ErrorLocation::from(Location::caller()),
            })?;

        let requested = filename.filter(|name| !name.trim().is_empty());
        let now = now_millis();

        let (blob, filename) = match format {
            ExportFormat::Video => {
                let filename = match requested {
                    Some(name) => video_filename(&name, artifact.mime_type()),
                    None => default_filename(format, artifact.mime_type(), now),
                };
                (artifact, filename)
            }
            ExportFormat::Gif => {
                let settings = GifSettings::from_options(&options);
                let gif = render_gif(self.backend.as_ref(), &artifact, settings).await?;
                let filename =
                    requested.unwrap_or_else(|| default_filename(format, gif.mime_type(), now));
                (gif, filename)
            }
        };

        let bytes = blob.size();
        let blob_url = self.blobs.create_url(blob);

        info!(format = format.as_str(), filename = %filename, bytes, "Export ready");

        Ok(ExportReceipt { blob_url, filename })
    }

    /// Data-URL copy of the artifact for playback in the page.
    #[instrument(skip(self))]
    pub async fn preview(&self) -> CoreResult<Preview> {
        self.stop_recording().await?;

        let artifact = self
            .artifact()
            .await
            .ok_or_else(|| MediaError::NothingRecorded {
                location: ErrorLocation::from(Location::caller()),
            })?;

        let data_url = format!(
            "data:{};base64,{}",
            artifact.mime_type(),
            STANDARD.encode(artifact.bytes())
        );

        debug!(size = artifact.size(), "Preview encoded");

        Ok(Preview {
            data_url,
            filename: PREVIEW_FILENAME.to_string(),
            size: artifact.size(),
        })
    }

    /// Drop the running capture without finalizing it; the artifact is kept.
    #[instrument(skip(self))]
    pub async fn discard_recording(&self) {
        self.teardown().await;
    }

    /// Discard the artifact. An in-progress capture keeps running.
    #[instrument(skip(self))]
    pub async fn clear_recording(&self) {
        let mut state = self.state.lock().await;
        if state.artifact.take().is_some() {
            info!("Artifact cleared");
        }
    }

    /// Payload behind a previously returned blob URL.
    pub fn resolve_blob(&self, url: &str) -> Option<Blob> {
        self.blobs.resolve(url)
    }

    /// Release a blob URL once the download no longer needs it.
    pub fn revoke_blob(&self, url: &str) -> bool {
        self.blobs.revoke(url)
    }

    /// Number of blob URLs still registered.
    pub fn live_blob_count(&self) -> usize {
        self.blobs.len()
    }

    /// The current artifact, if any.
    pub async fn artifact(&self) -> Option<Blob> {
        self.state.lock().await.artifact.clone()
    }

    /// Whether a capture is running (not counting one being finalized).
    pub async fn is_recording(&self) -> bool {
        self.state.lock().await.active.is_some()
    }

    async fn teardown(&self) {
        let mut state = self.state.lock().await;
        if let Some(previous) = state.active.take() {
            info!("Tearing down capture without finalizing");
            previous.abort();
        }
    }
}

async fn wait_finalized(mut done_rx: watch::Receiver<FinalizeOutcome>) -> CoreResult<()> {
    let outcome = done_rx
        .wait_for(|outcome| outcome.is_some())
        .await
        .map_err(|e| MediaError::WorkerUnavailable {
            reason: format!("Finalize completion dropped: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })?
        .clone();

    match outcome {
        Some(Err(reason)) => Err(MediaError::EncoderFailed {
            reason,
            location: ErrorLocation::from(Location::caller()),
        }),
        _ => Ok(()),
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}
