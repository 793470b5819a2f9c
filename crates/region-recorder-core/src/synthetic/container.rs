//! Byte format produced by the test-pattern recorder.
//!
//! Layout: `RRTP` magic, version byte, frame width and height (`u32` LE),
//! then one record per frame (`F`, timestamp in microseconds as `u64` LE,
//! mean RGBA of the frame) and finally an `E` record carrying the total
//! duration in microseconds. Chunks split anywhere; only the concatenation
//! is meaningful.

use crate::{
    CoreResult, MediaError,
    media::backend::{Encoder, FramePlayer},
};

use std::{
    panic::Location,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use error_location::ErrorLocation;
use image::{Rgba, RgbaImage};
use tracing::debug;

const MAGIC: &[u8; 4] = b"RRTP";
const VERSION: u8 = 1;
const FRAME_TAG: u8 = b'F';
const END_TAG: u8 = b'E';

/// Recorder writing the test-pattern container.
pub struct TestPatternEncoder {
    mime_type: String,
    frame_interval: Duration,
    pending: Vec<u8>,
    header_written: bool,
    last_timestamp: Option<Duration>,
    finish_delay: Duration,
    finish_failures: Option<Arc<AtomicUsize>>,
}

impl TestPatternEncoder {
    pub(crate) fn new(mime_type: &str, frame_rate: u32) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            frame_interval: Duration::from_secs(1) / frame_rate.max(1),
            pending: Vec::new(),
            header_written: false,
            last_timestamp: None,
            finish_delay: Duration::ZERO,
            finish_failures: None,
        }
    }

    /// Delay `finish` by `delay` and fail it while `failures` is non-zero.
    pub(crate) fn with_finish(mut self, delay: Duration, failures: Arc<AtomicUsize>) -> Self {
        self.finish_delay = delay;
        self.finish_failures = Some(failures);
        self
    }

    fn write_header(&mut self, width: u32, height: u32) {
        self.pending.extend_from_slice(MAGIC);
        self.pending.push(VERSION);
        self.pending.extend_from_slice(&width.to_le_bytes());
        self.pending.extend_from_slice(&height.to_le_bytes());
        self.header_written = true;
    }
}

#[async_trait]
impl Encoder for TestPatternEncoder {
    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn encode_frame(&mut self, frame: &RgbaImage, timestamp: Duration) -> CoreResult<()> {
        if !self.header_written {
            self.write_header(frame.width(), frame.height());
        }

        self.pending.push(FRAME_TAG);
        self.pending
            .extend_from_slice(&(timestamp.as_micros() as u64).to_le_bytes());
        self.pending.extend_from_slice(&mean_color(frame).0);
        self.last_timestamp = Some(timestamp);

        Ok(())
    }

    fn request_data(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    async fn finish(mut self: Box<Self>) -> CoreResult<Vec<u8>> {
        // The finalize callback of a real recorder fires on a later turn.
        tokio::task::yield_now().await;
        if !self.finish_delay.is_zero() {
            tokio::time::sleep(self.finish_delay).await;
        }

        let injected = self.finish_failures.as_ref().is_some_and(|failures| {
            failures
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok()
        });
        if injected {
            return Err(MediaError::EncoderFailed {
                reason: "Recorder failed to finalize".to_string(),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if !self.header_written {
            self.write_header(0, 0);
        }

        let duration = self
            .last_timestamp
            .map(|last| last + self.frame_interval)
            .unwrap_or_default();
        self.pending.push(END_TAG);
        self.pending
            .extend_from_slice(&(duration.as_micros() as u64).to_le_bytes());

        Ok(std::mem::take(&mut self.pending))
    }
}

/// Player decoding the test-pattern container.
pub struct TestPatternPlayer {
    width: u32,
    height: u32,
    frames: Vec<(f64, Rgba<u8>)>,
    duration: Option<f64>,
    seek_failures: Arc<AtomicUsize>,
}

impl TestPatternPlayer {
    /// Parse a complete recording.
    #[track_caller]
    pub(crate) fn parse(bytes: &[u8], seek_failures: Arc<AtomicUsize>) -> CoreResult<Self> {
        let load_failed = |reason: &str| MediaError::PlayerLoadFailed {
            reason: reason.to_string(),
            location: ErrorLocation::from(Location::caller()),
        };

        let mut reader = Reader { bytes, offset: 0 };

        if reader.take::<4>().as_ref() != Some(MAGIC) {
            return Err(load_failed("not a test-pattern recording"));
        }
        if reader.take::<1>() != Some([VERSION]) {
            return Err(load_failed("unsupported container version"));
        }
        let width = reader
            .take::<4>()
            .map(u32::from_le_bytes)
            .ok_or_else(|| load_failed("truncated header"))?;
        let height = reader
            .take::<4>()
            .map(u32::from_le_bytes)
            .ok_or_else(|| load_failed("truncated header"))?;

        let mut frames = Vec::new();
        let mut duration = None;

        while let Some([tag]) = reader.take::<1>() {
            let micros = reader
                .take::<8>()
                .map(u64::from_le_bytes)
                .ok_or_else(|| load_failed("truncated record"))?;
            let seconds = micros as f64 / 1_000_000.0;

            match tag {
                FRAME_TAG => {
                    let color = reader
                        .take::<4>()
                        .ok_or_else(|| load_failed("truncated frame"))?;
                    frames.push((seconds, Rgba(color)));
                }
                END_TAG => {
                    duration = Some(seconds);
                    break;
                }
                _ => return Err(load_failed("unknown record")),
            }
        }

        debug!(
            width,
            height,
            frame_count = frames.len(),
            duration = ?duration,
            "Test-pattern recording parsed"
        );

        Ok(Self {
            width,
            height,
            frames,
            duration,
            seek_failures,
        })
    }

    /// Hide the duration, as a container without a duration header would.
    pub(crate) fn without_duration(mut self) -> Self {
        self.duration = None;
        self
    }

    /// Number of frames in the recording.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

#[async_trait]
impl FramePlayer for TestPatternPlayer {
    fn duration(&self) -> Option<f64> {
        self.duration.filter(|duration| duration.is_finite())
    }

    fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    async fn seek(&mut self, at: f64) -> CoreResult<RgbaImage> {
        tokio::task::yield_now().await;

        let injected = self
            .seek_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();

        let color = self
            .frames
            .iter()
            .rev()
            .find(|(timestamp, _)| *timestamp <= at)
            .or_else(|| self.frames.first())
            .map(|(_, color)| *color);

        match color {
            Some(color) if !injected && self.width > 0 && self.height > 0 => {
                Ok(RgbaImage::from_pixel(self.width, self.height, color))
            }
            _ => Err(MediaError::SeekFailed {
                at,
                reason: if injected {
                    "decoder error".to_string()
                } else {
                    "no frame data".to_string()
                },
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }
}

/// Mean color of a frame, per channel.
pub fn mean_color(frame: &RgbaImage) -> Rgba<u8> {
    let pixel_count = u64::from(frame.width()) * u64::from(frame.height());
    if pixel_count == 0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut sums = [0u64; 4];
    for pixel in frame.pixels() {
        for (sum, channel) in sums.iter_mut().zip(pixel.0) {
            *sum += u64::from(channel);
        }
    }

    Rgba(sums.map(|sum| (sum / pixel_count) as u8))
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.offset.checked_add(N)?;
        let slice = self.bytes.get(self.offset..end)?;
        self.offset = end;
        slice.try_into().ok()
    }
}
