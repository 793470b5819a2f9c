use crate::{
    CoreResult, MediaError,
    geometry::{SelectionRect, SourceRegion},
    media::{
        Blob,
        backend::{CaptureBackend, CursorMode, Encoder, SourceStream, StreamId, pick_supported_mime},
    },
};

use std::{panic::Location, sync::Arc, time::Duration};

use error_location::ErrorLocation;
use image::{RgbaImage, imageops};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, instrument, warn};

/// Interval of the compositing draw step (~30 draws per second).
pub const DRAW_INTERVAL: Duration = Duration::from_millis(33);

/// Frame rate requested from the recorder for the composited surface.
pub const CAPTURE_FRAME_RATE: u32 = 30;

/// Upper bound on waiting for the first decodable frame.
///
/// Metadata sometimes never arrives for a live capture; recording then
/// starts with whatever frame size the source reports.
pub const FIRST_FRAME_TIMEOUT: Duration = Duration::from_millis(200);

/// An in-progress capture: live source, draw loop and recorder.
///
/// The draw task owns the recorder. Signalling `stop_tx` makes it flush,
/// stop the capture tracks and finalize; the task's output is the artifact.
pub(crate) struct CapturePipeline {
    source: Arc<dyn SourceStream>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<CoreResult<Blob>>,
    region: SourceRegion,
    mime_type: String,
}

impl CapturePipeline {
    /// Open the capture and start compositing `rect` into a recorder.
    #[instrument(skip(backend, rect))]
    pub(crate) async fn start(
        backend: &dyn CaptureBackend,
        stream_id: &StreamId,
        rect: &SelectionRect,
        cursor: CursorMode,
    ) -> CoreResult<Self> {
        if stream_id.is_empty() {
            return Err(MediaError::CaptureUnavailable {
                reason: "Missing tab stream id".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let source = backend.open_stream(stream_id, cursor).await?;

        if tokio::time::timeout(FIRST_FRAME_TIMEOUT, source.wait_ready())
            .await
            .is_err()
        {
            warn!(
                timeout_ms = FIRST_FRAME_TIMEOUT.as_millis(),
                "First frame not ready in time, starting anyway"
            );
        }

        let (frame_width, frame_height) = source.frame_size();
        let region = SourceRegion::map(rect, frame_width, frame_height);

        let mime_type = pick_supported_mime(|mime| backend.is_type_supported(mime));
        let encoder = match backend.create_encoder(mime_type, CAPTURE_FRAME_RATE) {
            Ok(encoder) => encoder,
            Err(e) => {
                source.stop_tracks();
                return Err(e);
            }
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_draw_loop(
            Arc::clone(&source),
            encoder,
            region,
            stop_rx,
        ));

        info!(
            frame_width,
            frame_height,
            region = ?region,
            mime_type,
            "Capture pipeline started"
        );

        Ok(Self {
            source,
            stop_tx,
            task,
            region,
            mime_type: mime_type.to_string(),
        })
    }

    /// Region of the captured frame being recorded.
    pub(crate) fn region(&self) -> SourceRegion {
        self.region
    }

    /// Container mime type of the recorder.
    pub(crate) fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Ask the draw task to finalize; the returned handle yields the artifact.
    pub(crate) fn finalize(self) -> JoinHandle<CoreResult<Blob>> {
        // Receiver only disappears once the task has already exited.
        let _ = self.stop_tx.send(true);
        self.task
    }

    /// Drop the capture without producing an artifact.
    pub(crate) fn abort(self) {
        self.task.abort();
        self.source.stop_tracks();
        debug!("Capture pipeline torn down without finalizing");
    }
}

/// Copy the mapped region of the current source frame into `surface`.
///
/// Returns `false` when the source has no decodable frame yet.
pub(crate) fn draw_frame(
    source: &dyn SourceStream,
    region: &SourceRegion,
    surface: &mut RgbaImage,
) -> bool {
    let Some(frame) = source.current_frame() else {
        return false;
    };

    let cropped =
        imageops::crop_imm(&frame, region.x, region.y, region.width, region.height).to_image();

    if cropped.dimensions() == surface.dimensions() {
        imageops::replace(surface, &cropped, 0, 0);
    } else if cropped.width() > 0 && cropped.height() > 0 {
        let scaled = imageops::resize(
            &cropped,
            surface.width(),
            surface.height(),
            imageops::FilterType::Triangle,
        );
        imageops::replace(surface, &scaled, 0, 0);
    }

    true
}

async fn run_draw_loop(
    source: Arc<dyn SourceStream>,
    mut encoder: Box<dyn Encoder>,
    region: SourceRegion,
    mut stop_rx: watch::Receiver<bool>,
) -> CoreResult<Blob> {
    let mut surface = RgbaImage::new(region.width, region.height);
    let mut chunks: Vec<Vec<u8>> = Vec::new();
    let mime_type = encoder.mime_type().to_string();
    let started_at = Instant::now();
    let mut frames: u64 = 0;

    let mut ticker = tokio::time::interval(DRAW_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let drawn = loop {
        tokio::select! {
            biased;

            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break Ok(());
                }
            }

            _ = ticker.tick() => {
                if draw_frame(source.as_ref(), &region, &mut surface) {
                    if let Err(e) = encoder.encode_frame(&surface, started_at.elapsed()) {
                        break Err(e);
                    }
                    frames += 1;
                }
            }
        }
    };

    if let Some(chunk) = encoder.request_data() {
        chunks.push(chunk);
    }
    source.stop_tracks();
    drawn?;

    let tail = encoder.finish().await?;
    if !tail.is_empty() {
        chunks.push(tail);
    }

    let artifact = Blob::new(chunks.concat(), mime_type);

    info!(
        frames,
        bytes = artifact.size(),
        elapsed_ms = started_at.elapsed().as_millis(),
        "Capture finalized"
    );

    Ok(artifact)
}
