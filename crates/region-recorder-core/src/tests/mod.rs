mod geometry;
mod pipeline;

use crate::{
    geometry::SelectionRect,
    synthetic::{TestPatternBackend, TestPatternConfig},
};

use std::sync::Arc;

/// 400x300 captured frame of an 800x600 viewport (scale 0.5).
pub(crate) fn small_backend() -> Arc<TestPatternBackend> {
    Arc::new(TestPatternBackend::new(TestPatternConfig {
        frame_width: 400,
        frame_height: 300,
        ..TestPatternConfig::default()
    }))
}

/// 200x100 selection at (100, 100) in an 800x600 viewport.
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
