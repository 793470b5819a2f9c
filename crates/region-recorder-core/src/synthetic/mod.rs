//! Synthetic media backend rendering a moving test pattern.
//!
//! Stands in for the host's tab capture when running headless or under
//! test. Frames are a gradient whose blue channel advances with time, the
//! recorder writes the container described in [`container`], and the player
//! decodes it back into solid frames of each recorded frame's mean color.
//! Failures can be injected for capture denial, missing duration, seeks and
//! recorder finalization, which can also be slowed down.

mod container;

pub use container::{TestPatternEncoder, TestPatternPlayer, mean_color};

use crate::{
    CoreResult, MediaError,
    media::{
        Blob,
        backend::{CaptureBackend, CursorMode, Encoder, FramePlayer, SourceStream, StreamId},
    },
};

use std::{
    panic::Location,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use error_location::ErrorLocation;
use image::{Rgba, RgbaImage};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Side of the square drawn where the cursor would be.
const CURSOR_SIZE: u32 = 8;

/// Shape of the synthetic capture.
#[derive(Debug, Clone)]
pub struct TestPatternConfig {
    /// Width of captured frames.
    pub frame_width: u32,
    /// Height of captured frames.
    pub frame_height: u32,
    /// Delay before the first frame is decodable; `None` never becomes ready.
    pub ready_after: Option<Duration>,
    /// Recorder mime types reported as supported.
    pub supported_mimes: Vec<String>,
}

impl Default for TestPatternConfig {
    fn default() -> Self {
        Self {
            frame_width: 1280,
            frame_height: 720,
            ready_after: Some(Duration::ZERO),
            supported_mimes: vec!["video/webm".to_string()],
        }
    }
}

/// [`CaptureBackend`] producing a deterministic moving gradient.
pub struct TestPatternBackend {
    config: TestPatternConfig,
    denied: Mutex<Option<String>>,
    hide_duration: AtomicBool,
    seek_failures: Arc<AtomicUsize>,
    finish_failures: Arc<AtomicUsize>,
    finish_delay: Mutex<Duration>,
    live_streams: Arc<AtomicUsize>,
    opened: Mutex<Vec<(StreamId, CursorMode)>>,
}

impl TestPatternBackend {
    /// Create a backend capturing frames of the configured size.
    pub fn new(config: TestPatternConfig) -> Self {
        info!(
            frame_width = config.frame_width,
            frame_height = config.frame_height,
            "Test-pattern backend created"
        );

        Self {
            config,
            denied: Mutex::new(None),
            hide_duration: AtomicBool::new(false),
            seek_failures: Arc::new(AtomicUsize::new(0)),
            finish_failures: Arc::new(AtomicUsize::new(0)),
            finish_delay: Mutex::new(Duration::ZERO),
            live_streams: Arc::new(AtomicUsize::new(0)),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Refuse every subsequent capture with `reason`; `None` allows again.
    pub fn deny_capture(&self, reason: Option<&str>) {
        *self.denied.lock().unwrap_or_else(|e| e.into_inner()) = reason.map(str::to_string);
    }

    /// Make players report an unknown duration.
    pub fn hide_duration(&self, hide: bool) {
        self.hide_duration.store(hide, Ordering::Release);
    }

    /// Fail the next `count` player seeks.
    pub fn fail_next_seeks(&self, count: usize) {
        self.seek_failures.store(count, Ordering::Release);
    }

    /// Fail the next `count` recorder finalizations.
    pub fn fail_next_finish(&self, count: usize) {
        self.finish_failures.store(count, Ordering::Release);
    }

    /// Make recorders created from now on take `delay` to finalize.
    pub fn delay_finish(&self, delay: Duration) {
        *self.finish_delay.lock().unwrap_or_else(|e| e.into_inner()) = delay;
    }

    /// Streams whose tracks have not been stopped yet.
    pub fn live_streams(&self) -> usize {
        self.live_streams.load(Ordering::Acquire)
    }

    /// Every stream opened so far, with the cursor mode it was opened with.
    pub fn opened_streams(&self) -> Vec<(StreamId, CursorMode)> {
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for TestPatternBackend {
    fn default() -> Self {
        Self::new(TestPatternConfig::default())
    }
}

#[async_trait]
impl CaptureBackend for TestPatternBackend {
    async fn open_stream(
        &self,
        stream_id: &StreamId,
        cursor: CursorMode,
    ) -> CoreResult<Arc<dyn SourceStream>> {
        let denied = self
            .denied
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(reason) = denied {
            warn!(stream_id = %stream_id, reason = %reason, "Capture denied");
            return Err(MediaError::CaptureUnavailable {
                reason,
                location: ErrorLocation::from(Location::caller()),
            });
        }

        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((stream_id.clone(), cursor));
        self.live_streams.fetch_add(1, Ordering::AcqRel);

        let now = Instant::now();
        debug!(stream_id = %stream_id, cursor = ?cursor, "Test-pattern stream opened");

        Ok(Arc::new(TestPatternStream {
            width: self.config.frame_width,
            height: self.config.frame_height,
            started_at: now,
            ready_at: self.config.ready_after.map(|delay| now + delay),
            cursor,
            stopped: AtomicBool::new(false),
            live_streams: Arc::clone(&self.live_streams),
        }))
    }

    fn is_type_supported(&self, mime: &str) -> bool {
        self.config.supported_mimes.iter().any(|m| m == mime)
    }

    fn create_encoder(&self, mime: &str, frame_rate: u32) -> CoreResult<Box<dyn Encoder>> {
        let delay = *self.finish_delay.lock().unwrap_or_else(|e| e.into_inner());
        Ok(Box::new(
            TestPatternEncoder::new(mime, frame_rate)
                .with_finish(delay, Arc::clone(&self.finish_failures)),
        ))
    }

    async fn open_player(&self, blob: &Blob) -> CoreResult<Box<dyn FramePlayer>> {
        let player = TestPatternPlayer::parse(blob.bytes(), Arc::clone(&self.seek_failures))?;

        if self.hide_duration.load(Ordering::Acquire) {
            Ok(Box::new(player.without_duration()))
        } else {
            Ok(Box::new(player))
        }
    }
}

/// A live test-pattern capture.
pub struct TestPatternStream {
    width: u32,
    height: u32,
    started_at: Instant,
    ready_at: Option<Instant>,
    cursor: CursorMode,
    stopped: AtomicBool,
    live_streams: Arc<AtomicUsize>,
}

impl TestPatternStream {
    fn is_ready(&self) -> bool {
        self.ready_at.is_some_and(|at| Instant::now() >= at)
    }

    /// Whether [`SourceStream::stop_tracks`] has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SourceStream for TestPatternStream {
    async fn wait_ready(&self) {
        match self.ready_at {
            Some(at) => tokio::time::sleep_until(at).await,
            None => std::future::pending().await,
        }
    }

    fn frame_size(&self) -> (u32, u32) {
        if self.is_ready() {
            (self.width, self.height)
        } else {
            (0, 0)
        }
    }

    fn current_frame(&self) -> Option<RgbaImage> {
        if self.is_stopped() || !self.is_ready() || self.width == 0 || self.height == 0 {
            return None;
        }

        let phase = ((self.started_at.elapsed().as_millis() / 10) % 256) as u8;
        let (w, h) = (self.width, self.height);

        let mut frame = RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 255 / w) as u8, (y * 255 / h) as u8, phase, 255])
        });

        if self.cursor == CursorMode::Always {
            let x0 = (w / 2).saturating_sub(CURSOR_SIZE / 2);
            let y0 = (h / 2).saturating_sub(CURSOR_SIZE / 2);
            for y in y0..(y0 + CURSOR_SIZE).min(h) {
                for x in x0..(x0 + CURSOR_SIZE).min(w) {
                    frame.put_pixel(x, y, Rgba([255, 255, 255, 255]));
                }
            }
        }

        Some(frame)
    }

    fn stop_tracks(&self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.live_streams.fetch_sub(1, Ordering::AcqRel);
            debug!("Test-pattern tracks stopped");
        }
    }
}
