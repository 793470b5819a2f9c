mod session;
mod ui_controller;

use crate::{
    coordinator::{Coordinator, CoordinatorHandle, CoordinatorSettings},
    platform::HeadlessPlatform,
    protocol::{CaptureConfig, TabId, UiNotification},
};

use std::{sync::Arc, time::Duration};

use region_recorder_core::{
    geometry::SelectionRect,
    media::export::ExportFormat,
    synthetic::{TestPatternBackend, TestPatternConfig},
};
use tempfile::TempDir;
use tokio::sync::mpsc;

pub(crate) const TAB: TabId = TabId(7);
pub(crate) const TAB_TITLE: &str = "Example Domain";

/// Coordinator wired to a headless host and a small synthetic backend.
pub(crate) struct Harness {
    pub(crate) platform: Arc<HeadlessPlatform>,
    pub(crate) backend: Arc<TestPatternBackend>,
    pub(crate) coordinator: CoordinatorHandle,
    pub(crate) page_rx: mpsc::UnboundedReceiver<UiNotification>,
    pub(crate) downloads: TempDir,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self::with_settings(CoordinatorSettings::default())
    }

    #[allow(clippy::unwrap_used)]
    pub(crate) fn with_settings(settings: CoordinatorSettings) -> Self {
        let downloads = tempfile::tempdir().unwrap();
        let backend = Arc::new(TestPatternBackend::new(TestPatternConfig {
            frame_width: 400,
            frame_height: 300,
            ..TestPatternConfig::default()
        }));
        let platform = Arc::new(HeadlessPlatform::new(downloads.path()));
        platform.open_tab(TAB, "https://example.com/", TAB_TITLE);
        let page_rx = platform.attach_page(TAB);

        let (coordinator, _task) =
            Coordinator::spawn(platform.clone(), backend.clone(), settings);

        Self {
            platform,
            backend,
            coordinator,
            page_rx,
            downloads,
        }
    }

    /// Next notification for [`TAB`], or `None` after a minute of silence.
    pub(crate) async fn next(&mut self) -> Option<UiNotification> {
        tokio::time::timeout(Duration::from_secs(60), self.page_rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Skip notifications until one of wire type `kind` arrives.
    pub(crate) async fn next_of(&mut self, kind: &str) -> Option<UiNotification> {
        while let Some(notification) = self.next().await {
            if notification.kind() == kind {
                return Some(notification);
            }
        }
        None
    }

    /// Notifications already delivered and not yet read.
    pub(crate) fn drain(&mut self) -> Vec<UiNotification> {
        let mut pending = Vec::new();
        while let Ok(notification) = self.page_rx.try_recv() {
            pending.push(notification);
        }
        pending
    }
}

/// A 200x100 selection in an 800x600 viewport.
pub(crate) fn selection() -> SelectionRect {
    SelectionRect {
        x: 100.0,
        y: 100.0,
        width: 200.0,
        height: 100.0,
        dpr: 1.0,
        viewport_width: 800.0,
        viewport_height: 600.0,
        viewport_offset_x: 0.0,
        viewport_offset_y: 0.0,
        outer_width: 800.0,
        outer_height: 680.0,
    }
}

pub(crate) fn capture_config(duration_sec: Option<f64>, start_delay: bool) -> CaptureConfig {
    CaptureConfig {
        format_choice: ExportFormat::Video,
        duration_sec,
        start_delay,
        capture_cursor: false,
    }
}
