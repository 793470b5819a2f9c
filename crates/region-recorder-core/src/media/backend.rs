//! Capability traits for the platform media primitives.
//!
//! Tab capture, the live video element, the native recorder and the
//! decode/seek player are all provided by the host. The pipeline only talks
//! to them through these traits, so a browser binding and the synthetic
//! test-pattern backend are interchangeable.

use crate::{CoreResult, media::Blob};

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Container/codec candidates in descending preference.
///
/// Hardware-accelerated MP4 first, then WebM codec variants, ending in the
/// baseline every recorder supports.
pub const MIME_PREFERENCE: [&str; 4] = [
    "video/mp4;codecs=avc1.42E01E",
    "video/webm;codecs=vp9",
    "video/webm;codecs=vp8",
    "video/webm",
];

/// Mime type used when no candidate is reported as supported.
pub const BASELINE_MIME: &str = "video/webm";

/// Pick the first supported container from [`MIME_PREFERENCE`].
pub fn pick_supported_mime(is_supported: impl Fn(&str) -> bool) -> &'static str {
    MIME_PREFERENCE
        .iter()
        .copied()
        .find(|mime| is_supported(mime))
        .unwrap_or(BASELINE_MIME)
}

/// File extension matching a recorder mime type.
pub fn extension_for_mime(mime: &str) -> &'static str {
    if mime.starts_with("video/mp4") {
        "mp4"
    } else {
        "webm"
    }
}

/// Opaque handle granting capture of one tab.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(pub String);

impl StreamId {
    /// Whether the handle carries no id at all.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cursor visibility requested from the capture source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorMode {
    /// Cursor is composited into captured frames.
    Always,
    /// Cursor is never drawn.
    Never,
}

impl From<bool> for CursorMode {
    fn from(capture_cursor: bool) -> Self {
        if capture_cursor {
            CursorMode::Always
        } else {
            CursorMode::Never
        }
    }
}

/// A live capture of a tab.
#[async_trait]
pub trait SourceStream: Send + Sync {
    /// Resolves once the first decodable frame is available.
    ///
    /// May never resolve if metadata never arrives; callers bound the wait.
    async fn wait_ready(&self);

    /// Intrinsic size of captured frames, `(0, 0)` before metadata arrives.
    fn frame_size(&self) -> (u32, u32);

    /// The current frame, or `None` while no frame data is decodable.
    fn current_frame(&self) -> Option<RgbaImage>;

    /// Stop every underlying capture track.
    fn stop_tracks(&self);
}

/// A recorder turning composited frames into container bytes.
#[async_trait]
pub trait Encoder: Send {
    /// Container mime type being produced.
    fn mime_type(&self) -> &str;

    /// Append one composited frame captured `timestamp` after start.
    fn encode_frame(&mut self, frame: &RgbaImage, timestamp: Duration) -> CoreResult<()>;

    /// Flush buffered data as a chunk, if any is pending.
    fn request_data(&mut self) -> Option<Vec<u8>>;

    /// Stop the recorder and wait for its finalize callback.
    ///
    /// Returns the last chunk; the artifact is not valid until this completes.
    async fn finish(self: Box<Self>) -> CoreResult<Vec<u8>>;
}

/// A throwaway player used to sample frames out of a finished recording.
#[async_trait]
pub trait FramePlayer: Send {
    /// Total duration in seconds, `None` when unknown or not finite.
    fn duration(&self) -> Option<f64>;

    /// Intrinsic frame size.
    fn frame_size(&self) -> (u32, u32);

    /// Seek to `at` seconds and return the settled frame.
    ///
    /// Not safe to call concurrently; each seek must complete before the next.
    async fn seek(&mut self, at: f64) -> CoreResult<RgbaImage>;
}

/// Host-provided media capabilities.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Open a capture stream for `stream_id`.
    async fn open_stream(
        &self,
        stream_id: &StreamId,
        cursor: CursorMode,
    ) -> CoreResult<Arc<dyn SourceStream>>;

    /// Whether the recorder can produce `mime`.
    fn is_type_supported(&self, mime: &str) -> bool;

    /// Create a recorder for `mime` at `frame_rate` frames per second.
    fn create_encoder(&self, mime: &str, frame_rate: u32) -> CoreResult<Box<dyn Encoder>>;

    /// Decode `blob` into a seekable player once its metadata is loaded.
    async fn open_player(&self, blob: &Blob) -> CoreResult<Box<dyn FramePlayer>>;
}
