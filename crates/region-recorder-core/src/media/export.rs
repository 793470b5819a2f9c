//! Export request types and the frame-resampled GIF export.

use crate::{
    CoreResult, MediaError,
    media::{
        Blob,
        backend::{CaptureBackend, extension_for_mime},
    },
};

use std::{panic::Location, time::Duration};

use error_location::ErrorLocation;
use image::{
    Delay, Frame, RgbaImage,
    codecs::gif::{GifEncoder, Repeat},
    imageops,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument};

/// Default GIF frame rate when none is requested.
pub const DEFAULT_GIF_FPS: f64 = 12.0;
/// Lowest accepted GIF frame rate.
pub const MIN_GIF_FPS: f64 = 4.0;
/// Highest accepted GIF frame rate.
pub const MAX_GIF_FPS: f64 = 30.0;
/// Narrowest accepted explicit GIF width.
pub const MIN_GIF_WIDTH: f64 = 240.0;
/// Widest accepted explicit GIF width.
pub const MAX_GIF_WIDTH: f64 = 1280.0;

/// GIF encoder speed (1 = best quality, 30 = fastest).
const GIF_ENCODER_SPEED: i32 = 10;
/// Sampled frames allowed to wait for the encoder.
const GIF_FRAME_BUFFER: usize = 4;

/// Output container of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Direct-container export of the recorded bytes.
    #[default]
    Video,
    /// Frame-resampled animated GIF.
    Gif,
}

impl ExportFormat {
    /// Lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Video => "video",
            ExportFormat::Gif => "gif",
        }
    }
}

/// Format-specific export options as they arrive on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Target GIF width; `None` keeps the source width.
    #[serde(default)]
    pub width: Option<f64>,
    /// Target GIF frame rate.
    #[serde(default)]
    pub fps: Option<f64>,
}

/// A downloadable export held in the worker's blob registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportReceipt {
    /// `blob:` URL resolvable through the worker.
    pub blob_url: String,
    /// Suggested filename.
    pub filename: String,
}

/// A data-addressable copy of the artifact for in-page playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    /// Base64 `data:` URL of the artifact.
    pub data_url: String,
    /// Nominal filename of the preview.
    pub filename: String,
    /// Artifact size in bytes.
    pub size: u64,
}

/// Normalized GIF parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GifSettings {
    /// Frames per second, within [`MIN_GIF_FPS`, `MAX_GIF_FPS`].
    pub fps: f64,
    /// Explicit width within [`MIN_GIF_WIDTH`, `MAX_GIF_WIDTH`], or `None`.
    pub width: Option<f64>,
}

impl GifSettings {
    /// Clamp wire options into accepted ranges.
    ///
    /// Zero or non-finite values fall back to the defaults.
    pub fn from_options(options: &ExportOptions) -> Self {
        let fps = options
            .fps
            .filter(|fps| fps.is_finite() && *fps != 0.0)
            .unwrap_or(DEFAULT_GIF_FPS)
            .clamp(MIN_GIF_FPS, MAX_GIF_FPS);

        let width = options
            .width
            .filter(|width| width.is_finite() && *width != 0.0)
            .map(|width| width.clamp(MIN_GIF_WIDTH, MAX_GIF_WIDTH));

        Self { fps, width }
    }

    /// Output size for a `source_width` x `source_height` recording.
    ///
    /// Height follows the source aspect ratio.
    pub fn output_size(&self, source_width: u32, source_height: u32) -> (u32, u32) {
        let source_w = f64::from(source_width.max(1));
        let source_h = f64::from(source_height.max(1));
        let target_w = self.width.unwrap_or(source_w);
        let scale = target_w / source_w;

        let width = (source_w * scale).round().max(1.0) as u32;
        let height = (source_h * scale).round().max(1.0) as u32;
        (width, height)
    }

    /// Display time of each frame.
    pub fn frame_delay(&self) -> Duration {
        Duration::from_millis((1000.0 / self.fps).round() as u64)
    }
}

/// Evenly spaced sample timestamps, in seconds, for a `duration` recording.
///
/// Yields `max(1, floor(duration * fps))` timestamps `min(duration, i / fps)`.
pub fn frame_schedule(duration: f64, fps: f64) -> Vec<f64> {
    let count = ((duration * fps).floor() as usize).max(1);
    (0..count)
        .map(|i| (i as f64 / fps).min(duration))
        .collect()
}

/// Default filename for an export started at `now_millis`.
pub fn default_filename(format: ExportFormat, mime_type: &str, now_millis: i64) -> String {
    let extension = match format {
        ExportFormat::Video => extension_for_mime(mime_type),
        ExportFormat::Gif => "gif",
    };
    format!("recording-{now_millis}.{extension}")
}

/// Make sure a requested video filename carries the artifact's real extension.
pub fn video_filename(requested: &str, mime_type: &str) -> String {
    let extension = extension_for_mime(mime_type);
    let lower = requested.to_lowercase();
    if lower.ends_with(&format!(".{extension}")) {
        return requested.to_string();
    }

    let stem = [".mp4", ".webm"]
        .iter()
        .find_map(|ext| {
            if lower.ends_with(ext) {
                requested.get(..requested.len().saturating_sub(ext.len()))
            } else {
                None
            }
        })
        .unwrap_or(requested);
    format!("{stem}.{extension}")
}

/// Re-encode `artifact` as an animated GIF by sampling frames.
///
/// Seeks run strictly one after another and each settled frame is handed to
/// a blocking encoder through a small bounded queue, so only a few frames
/// are held at once. Any failure aborts the export without emitting a
/// partial file; `artifact` itself is never touched.
#[instrument(skip(backend, artifact), fields(bytes = artifact.size()))]
pub async fn render_gif(
    backend: &dyn CaptureBackend,
    artifact: &Blob,
    settings: GifSettings,
) -> CoreResult<Blob> {
    let mut player = backend.open_player(artifact).await?;

    let duration = match player.duration() {
        Some(duration) if duration.is_finite() && duration > 0.0 => duration,
        _ => {
            return Err(MediaError::DurationUnavailable {
                location: ErrorLocation::from(Location::caller()),
            });
        }
    };

    let (source_width, source_height) = player.frame_size();
    let (width, height) = settings.output_size(source_width, source_height);
    let schedule = frame_schedule(duration, settings.fps);
    let delay = Delay::from_saturating_duration(settings.frame_delay());

    debug!(
        duration,
        fps = settings.fps,
        width,
        height,
        frame_count = schedule.len(),
        "Sampling frames for GIF"
    );

    let (frame_tx, frame_rx) = mpsc::channel::<Frame>(GIF_FRAME_BUFFER);
    let encoding = tokio::task::spawn_blocking(move || encode_gif(frame_rx));

    let sampling = async move {
        for at in schedule {
            let sampled = player.seek(at).await?;
            let scaled: RgbaImage = if sampled.dimensions() == (width, height) {
                sampled
            } else {
                imageops::resize(&sampled, width, height, imageops::FilterType::Triangle)
            };
            if frame_tx
                .send(Frame::from_parts(scaled, 0, 0, delay))
                .await
                .is_err()
            {
                debug!("GIF encoder stopped early");
                break;
            }
        }
        Ok::<(), MediaError>(())
    };
    let sampled = sampling.await;

    let encoded = encoding.await.map_err(|e| MediaError::EncoderFailed {
        reason: format!("GIF export aborted: {}", e),
        location: ErrorLocation::from(Location::caller()),
    })?;
    sampled?;
    let (bytes, frame_count) = encoded?;

    info!(frame_count, bytes = bytes.len(), "GIF rendered");

    Ok(Blob::new(bytes, "image/gif"))
}

/// Encode frames as they arrive until the sender side closes.
#[track_caller]
fn encode_gif(mut frame_rx: mpsc::Receiver<Frame>) -> CoreResult<(Vec<u8>, usize)> {
    let encode_failed = |e: image::ImageError| MediaError::EncoderFailed {
        reason: format!("GIF export failed: {}", e),
        location: ErrorLocation::from(Location::caller()),
    };

    let mut bytes = Vec::new();
    let mut frame_count = 0;
    {
        let mut encoder = GifEncoder::new_with_speed(&mut bytes, GIF_ENCODER_SPEED);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(encode_failed)?;
        while let Some(frame) = frame_rx.blocking_recv() {
            encoder.encode_frame(frame).map_err(encode_failed)?;
            frame_count += 1;
        }
    }
    Ok((bytes, frame_count))
}
