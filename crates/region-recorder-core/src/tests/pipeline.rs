use crate::{
    MediaError,
    geometry::SourceRegion,
    media::{
        backend::{CaptureBackend, CursorMode, StreamId},
        pipeline::{CapturePipeline, draw_frame},
    },
    synthetic::{TestPatternBackend, TestPatternConfig},
    tests::{selection, small_backend},
};

use image::RgbaImage;

/// WHAT: The draw step copies the mapped region into the surface
/// WHY: Only the selected region may end up in the recording
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used)]
async fn given_ready_stream_when_drawing_then_surface_holds_region() {
    // Given: 400x300 stream and a region starting at (50, 60)
    let backend = small_backend();
    let stream = backend
        .open_stream(&StreamId("tab-1".to_string()), CursorMode::Never)
        .await
        .unwrap();
    let region = SourceRegion {
        x: 50,
        y: 60,
        width: 100,
        height: 50,
    };
    let mut surface = RgbaImage::new(100, 50);

    // When: Drawing one frame
    let drawn = draw_frame(stream.as_ref(), &region, &mut surface);

    // Then: Surface origin shows the gradient value at (50, 60)
    assert!(drawn);
    let origin = surface.get_pixel(0, 0).0;
    assert_eq!(origin[0], (50 * 255 / 400) as u8);
    assert_eq!(origin[1], (60 * 255 / 300) as u8);
}

/// WHAT: Nothing is drawn before the first frame is decodable
/// WHY: The draw step must skip silently until data arrives
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used)]
async fn given_unready_stream_when_drawing_then_skipped() {
    // Given: Stream whose metadata never arrives
    let backend = TestPatternBackend::new(TestPatternConfig {
        ready_after: None,
        ..TestPatternConfig::default()
    });
    let stream = backend
        .open_stream(&StreamId("tab-1".to_string()), CursorMode::Never)
        .await
        .unwrap();
    let region = SourceRegion {
        x: 0,
        y: 0,
        width: 1,
        height: 1,
    };
    let mut surface = RgbaImage::new(1, 1);

    // When: Drawing
    let drawn = draw_frame(stream.as_ref(), &region, &mut surface);

    // Then: Skipped, surface untouched
    assert!(!drawn);
    assert_eq!(surface.get_pixel(0, 0).0, [0, 0, 0, 0]);
}

/// WHAT: Starting without a stream id fails before opening capture
/// WHY: The coordinator may fail to obtain a capture grant
#[tokio::test]
async fn given_empty_stream_id_when_starting_then_capture_unavailable() {
    // Given: Blank stream id
    let backend = small_backend();

    // When: Starting a pipeline
    let result = CapturePipeline::start(
        backend.as_ref(),
        &StreamId(String::new()),
        &selection(),
        CursorMode::Never,
    )
    .await;

    // Then: CaptureUnavailable and no stream opened
    let reason = result.err().map(|e| e.user_message());
    assert_eq!(reason.as_deref(), Some("Missing tab stream id"));
    assert!(backend.opened_streams().is_empty());
}

/// WHAT: A stream that never becomes ready still starts after the timeout
/// WHY: Recording must not hang on missing metadata
#[tokio::test(start_paused = true)]
#[allow(clippy::unwrap_used)]
async fn given_never_ready_stream_when_starting_then_starts_after_timeout() {
    // Given: Stream whose metadata never arrives
    let backend = TestPatternBackend::new(TestPatternConfig {
        ready_after: None,
        ..TestPatternConfig::default()
    });

    // When: Starting a pipeline
    let pipeline = CapturePipeline::start(
        &backend,
        &StreamId("tab-1".to_string()),
        &selection(),
        CursorMode::Never,
    )
    .await
    .unwrap();

    // Then: Region degenerates to a single pixel, recorder uses baseline WebM
    assert_eq!(pipeline.region().width, 1);
    assert_eq!(pipeline.mime_type(), "video/webm");

    // And: Finalizing yields an artifact with no frames in it
    let artifact = pipeline.finalize().await.unwrap().unwrap();
    let player = backend.open_player(&artifact).await;
    assert!(!matches!(player, Err(MediaError::PlayerLoadFailed { .. })));
    assert_eq!(backend.live_streams(), 0);
}
