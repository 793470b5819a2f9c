//! Message boundary of the media worker context.
//!
//! The worker runs as its own task and is only reachable through
//! [`WorkerCommand`]s. Each command carries a `oneshot` responder; the
//! result travels back as a plain `Result`, never as a panic across the
//! boundary. Commands are received in order and each is handled in its own
//! task, so a long export does not stop the worker from accepting a stop.

use crate::{
    CoreResult, MediaError,
    geometry::SelectionRect,
    media::{
        Blob, MediaWorker,
        backend::{CaptureBackend, StreamId},
        export::{ExportFormat, ExportOptions, ExportReceipt, Preview},
    },
};

use std::{panic::Location, sync::Arc};

use error_location::ErrorLocation;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument};

/// Commands accepted by the media worker.
#[derive(Debug)]
pub enum WorkerCommand {
    /// Begin capturing a tab region.
    StartRecording {
        /// Capture handle for the target tab.
        stream_id: StreamId,
        /// Selected region and viewport metadata.
        rect: SelectionRect,
        /// Whether the cursor is drawn into frames.
        capture_cursor: bool,
        /// Completion of the start.
        respond_to: oneshot::Sender<CoreResult<()>>,
    },
    /// Finalize the active capture.
    StopRecording {
        /// Completion of the finalize.
        respond_to: oneshot::Sender<CoreResult<()>>,
    },
    /// Export the artifact.
    Export {
        /// Output container.
        format: ExportFormat,
        /// Format-specific options.
        options: ExportOptions,
        /// Requested filename, if any.
        filename: Option<String>,
        /// Downloadable reference or failure.
        respond_to: oneshot::Sender<CoreResult<ExportReceipt>>,
    },
    /// Produce a data-URL preview.
    Preview {
        /// Preview or failure.
        respond_to: oneshot::Sender<CoreResult<Preview>>,
    },
    /// Drop the running capture without finalizing it.
    DiscardRecording {
        /// Acknowledgement.
        respond_to: oneshot::Sender<()>,
    },
    /// Discard the artifact.
    ClearRecording {
        /// Acknowledgement.
        respond_to: oneshot::Sender<()>,
    },
    /// Look up the payload behind a blob URL.
    ResolveBlob {
        /// URL returned by an export.
        url: String,
        /// The payload, if still registered.
        respond_to: oneshot::Sender<Option<Blob>>,
    },
    /// Release a blob URL.
    RevokeBlob {
        /// URL to release.
        url: String,
        /// Acknowledgement.
        respond_to: oneshot::Sender<()>,
    },
}

/// Client side of the worker's command channel.
///
/// Cloning yields another sender to the same singleton worker.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    command_tx: mpsc::Sender<WorkerCommand>,
}

impl WorkerHandle {
    /// Spawn the worker loop over `backend` and return its handle.
    ///
    /// The loop ends once every handle has been dropped.
    pub fn spawn(backend: Arc<dyn CaptureBackend>) -> Self {
        let (command_tx, command_rx) = mpsc::channel(32);
        let worker = MediaWorker::new(backend);
        tokio::spawn(run(worker, command_rx));
        info!("Media worker created");
        Self { command_tx }
    }

    /// Whether the worker loop is still accepting commands.
    pub fn is_alive(&self) -> bool {
        !self.command_tx.is_closed()
    }

    /// See [`MediaWorker::start_recording`].
    pub async fn start_recording(
        &self,
        stream_id: StreamId,
        rect: SelectionRect,
        capture_cursor: bool,
    ) -> CoreResult<()> {
        self.request(|respond_to| WorkerCommand::StartRecording {
            stream_id,
            rect,
            capture_cursor,
            respond_to,
        })
        .await?
    }

    /// See [`MediaWorker::stop_recording`].
    pub async fn stop_recording(&self) -> CoreResult<()> {
        self.request(|respond_to| WorkerCommand::StopRecording { respond_to })
            .await?
    }

    /// See [`MediaWorker::export_recording`].
    pub async fn export(
        &self,
        format: ExportFormat,
        options: ExportOptions,
        filename: Option<String>,
    ) -> CoreResult<ExportReceipt> {
        self.request(|respond_to| WorkerCommand::Export {
            format,
            options,
            filename,
            respond_to,
        })
        .await?
    }

    /// See [`MediaWorker::preview`].
    pub async fn preview(&self) -> CoreResult<Preview> {
        self.request(|respond_to| WorkerCommand::Preview { respond_to })
            .await?
    }

    /// See [`MediaWorker::discard_recording`].
    pub async fn discard_recording(&self) -> CoreResult<()> {
        self.request(|respond_to| WorkerCommand::DiscardRecording { respond_to })
            .await
    }

    /// See [`MediaWorker::clear_recording`].
    pub async fn clear_recording(&self) -> CoreResult<()> {
        self.request(|respond_to| WorkerCommand::ClearRecording { respond_to })
            .await
    }

    /// See [`MediaWorker::resolve_blob`].
    pub async fn resolve_blob(&self, url: String) -> CoreResult<Option<Blob>> {
        self.request(|respond_to| WorkerCommand::ResolveBlob { url, respond_to })
            .await
    }

    /// See [`MediaWorker::revoke_blob`].
    pub async fn revoke_blob(&self, url: String) -> CoreResult<()> {
        self.request(|respond_to| WorkerCommand::RevokeBlob { url, respond_to })
            .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> WorkerCommand,
    ) -> CoreResult<T> {
        let (respond_to, response) = oneshot::channel();

        self.command_tx
            .send(build(respond_to))
            .await
            .map_err(|e| MediaError::WorkerUnavailable {
                reason: format!("Failed to send worker command: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        response.await.map_err(|e| MediaError::WorkerUnavailable {
            reason: format!("Worker dropped the response: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })
    }
}

#[instrument(skip_all)]
async fn run(worker: MediaWorker, mut command_rx: mpsc::Receiver<WorkerCommand>) {
    while let Some(command) = command_rx.recv().await {
        let worker = worker.clone();
        tokio::spawn(dispatch(worker, command));
    }
    info!("All worker handles dropped, media worker shutting down");
}

async fn dispatch(worker: MediaWorker, command: WorkerCommand) {
    // A dropped responder means the requester stopped waiting.
    match command {
        WorkerCommand::StartRecording {
            stream_id,
            rect,
            capture_cursor,
            respond_to,
        } => {
            let result = worker
                .start_recording(stream_id, rect, capture_cursor)
                .await;
            let _ = respond_to.send(result);
        }
        WorkerCommand::StopRecording { respond_to } => {
            let _ = respond_to.send(worker.stop_recording().await);
        }
        WorkerCommand::Export {
            format,
            options,
            filename,
            respond_to,
        } => {
            let result = worker.export_recording(format, options, filename).await;
            let _ = respond_to.send(result);
        }
        WorkerCommand::Preview { respond_to } => {
            let _ = respond_to.send(worker.preview().await);
        }
        WorkerCommand::DiscardRecording { respond_to } => {
            worker.discard_recording().await;
            let _ = respond_to.send(());
        }
        WorkerCommand::ClearRecording { respond_to } => {
            worker.clear_recording().await;
            let _ = respond_to.send(());
        }
        WorkerCommand::ResolveBlob { url, respond_to } => {
            let _ = respond_to.send(worker.resolve_blob(&url));
        }
        WorkerCommand::RevokeBlob { url, respond_to } => {
            worker.revoke_blob(&url);
            debug!(url = %url, "Blob URL released");
            let _ = respond_to.send(());
        }
    }
}
