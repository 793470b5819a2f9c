//! Region Recorder Core Library
//!
//! Media side of the region recorder: maps a viewport selection onto the
//! captured tab frame, composites that region into a recorder, keeps the
//! finished artifact and exports it as a video or a frame-resampled GIF.
//!
//! The host's media primitives are reached through
//! [`media::backend::CaptureBackend`]; [`synthetic::TestPatternBackend`] is a
//! self-contained implementation for headless runs and tests.
//!
//! # Example
//!
//! ```no_run
//! use region_recorder_core::{
//!     CoreResult,
//!     geometry::SelectionRect,
//!     media::{WorkerHandle, backend::StreamId, export::{ExportFormat, ExportOptions}},
//!     synthetic::TestPatternBackend,
//! };
//!
//! use std::{sync::Arc, time::Duration};
//!
//! #[tokio::main]
//! async fn main() -> CoreResult<()> {
//!     let worker = WorkerHandle::spawn(Arc::new(TestPatternBackend::default()));
//!     let rect = SelectionRect {
//!         x: 100.0, y: 100.0, width: 320.0, height: 180.0, dpr: 1.0,
//!         viewport_width: 1280.0, viewport_height: 720.0,
//!         viewport_offset_x: 0.0, viewport_offset_y: 0.0,
//!         outer_width: 1280.0, outer_height: 800.0,
//!     };
//!
//!     worker.start_recording(StreamId("tab-1".into()), rect, false).await?;
//!     tokio::time::sleep(Duration::from_secs(2)).await;
//!     worker.stop_recording().await?;
//!
//!     let receipt = worker.export(ExportFormat::Gif, ExportOptions::default(), None).await?;
//!     println!("GIF ready at {}", receipt.blob_url);
//!     Ok(())
//! }
//! ```

mod error;
pub mod geometry;
pub mod media;
pub mod synthetic;

pub use {error::MediaError, error::Result as CoreResult};

#[cfg(test)]
mod tests;
