use crate::{
    coordinator::{CoordinatorHandle, CoordinatorInput},
    protocol::{PreviewReport, TabId, UiNotification, UiRequest},
    tests::selection,
    ui_controller::{
        IndicatorStatus, Key, PagePoint, PageViewport, SetupForm, UiController,
        build_default_name, ensure_ext, format_bytes, gif_warning,
    },
};

use chrono::NaiveDate;
use region_recorder_core::media::export::{ExportFormat, ExportOptions};
use tokio::sync::mpsc;

const PAGE_TAB: TabId = TabId(5);

fn controller() -> (UiController, mpsc::Receiver<CoordinatorInput>) {
    let (handle, input_rx) = CoordinatorHandle::detached();
    (UiController::new(PAGE_TAB, handle), input_rx)
}

/// Requests sent so far, asserting each came from [`PAGE_TAB`].
fn sent(input_rx: &mut mpsc::Receiver<CoordinatorInput>) -> Vec<UiRequest> {
    let mut requests = Vec::new();
    while let Ok(input) = input_rx.try_recv() {
        if let CoordinatorInput::Ui { tab, request } = input {
            assert_eq!(tab, Some(PAGE_TAB));
            requests.push(request);
        }
    }
    requests
}

fn point(x: f64, y: f64) -> PagePoint {
    PagePoint { x, y }
}

fn viewport() -> PageViewport {
    PageViewport::plain(800.0, 600.0, 2.0)
}

fn ready() -> UiNotification {
    UiNotification::RecordingReady {
        format_choice: ExportFormat::Video,
        tab_title: "Example Domain".to_string(),
    }
}

/// WHAT: Drags under 10x10 send nothing
/// WHY: Accidental clicks must not start a recording
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_small_drag_when_completing_selection_then_nothing_sent() {
    // Given: Selection mode after setup
    let (mut ui, mut input_rx) = controller();
    ui.apply_setup(SetupForm::default());

    // When: Dragging 30x9
    let sent_any = ui
        .complete_selection(point(10.0, 10.0), point(40.0, 19.0), viewport())
        .await
        .unwrap();

    // Then: Nothing sent and selection mode left
    assert!(!sent_any);
    assert!(sent(&mut input_rx).is_empty());
    assert!(!ui.is_selecting());
}

/// WHAT: A drag is normalized, clamped and sent with viewport metrics
/// WHY: The worker maps the rect using those metrics
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_reverse_drag_when_completing_selection_then_normalized_rect_sent() {
    // Given: Setup applied with a 3 second duration and cursor capture
    let (mut ui, mut input_rx) = controller();
    ui.apply_setup(SetupForm {
        duration_input: Some(3.0),
        start_delay: true,
        capture_cursor: true,
    });

    // When: Dragging from bottom-right to above the top-left corner
    let sent_any = ui
        .complete_selection(point(300.0, 200.0), point(100.0, -20.0), viewport())
        .await
        .unwrap();

    // Then: Origin clamped at 0, size from the drag, metrics attached
    assert!(sent_any);
    let requests = sent(&mut input_rx);
    let [UiRequest::SelectionComplete { rect, config }] = requests.as_slice() else {
        return assert_eq!(requests.len(), 1);
    };
    assert_eq!((rect.x, rect.y, rect.width, rect.height), (100.0, 0.0, 200.0, 220.0));
    assert_eq!(rect.dpr, 2.0);
    assert_eq!(rect.viewport_width, 800.0);
    assert_eq!(config.duration_sec, Some(3.0));
    assert!(config.start_delay);
    assert!(config.capture_cursor);
}

/// WHAT: Setup durations are normalized
/// WHY: Invalid input falls back to 5 s, large input caps at 600 s
#[test]
fn given_setup_inputs_when_applying_then_duration_normalized() {
    // Given: A controller
    let (mut ui, _input_rx) = controller();

    // When/Then: Each input yields the expected duration
    let cases = [
        (None, 5.0),
        (Some(0.0), 5.0),
        (Some(-2.0), 5.0),
        (Some(f64::NAN), 5.0),
        (Some(12.5), 12.5),
        (Some(7200.0), 600.0),
    ];
    for (input, expected) in cases {
        ui.apply_setup(SetupForm {
            duration_input: input,
            ..SetupForm::default()
        });
        assert_eq!(ui.current_config().duration_sec, Some(expected));
        assert_eq!(ui.current_config().format_choice, ExportFormat::Video);
    }
}

/// WHAT: A second export while one is in flight is dropped
/// WHY: Only one export may be outstanding
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_export_in_flight_when_exporting_again_then_suppressed() {
    // Given: Export modal open and a video export sent
    let (mut ui, mut input_rx) = controller();
    ui.handle_notification(ready()).await.unwrap();
    let first = ui.export_video(Some("clip")).await.unwrap();

    // When: Exporting video and GIF before any reply
    let second = ui.export_video(Some("clip")).await.unwrap();
    let gif = ui.export_gif(None, Some(720), 12).await.unwrap();

    // Then: Only the preview and the first export went out
    assert!(first);
    assert!(!second);
    assert!(!gif);
    assert!(!ui.gif_busy());
    assert_eq!(
        sent(&mut input_rx),
        vec![
            UiRequest::Preview,
            UiRequest::Export {
                format: ExportFormat::Video,
                filename: Some("clip.mp4".to_string()),
                options: ExportOptions::default(),
            },
        ]
    );
}

/// WHAT: Export replies clear the in-flight flag and GIF busy state
/// WHY: The user must be able to export again after a result
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_gif_export_when_error_arrives_then_flags_cleared_and_toast_shown() {
    // Given: A GIF export in flight
    let (mut ui, mut input_rx) = controller();
    ui.handle_notification(ready()).await.unwrap();
    ui.export_gif(Some("loop"), None, 15).await.unwrap();
    let busy = ui.gif_busy();

    // When: The export fails
    ui.handle_notification(UiNotification::ExportError {
        message: "Failed to seek video for GIF".to_string(),
        format: Some(ExportFormat::Gif),
    })
    .await
    .unwrap();

    // Then: Flags cleared, toast shown, request carried null width
    assert!(busy);
    assert!(!ui.gif_busy());
    assert!(!ui.export_in_progress());
    assert_eq!(ui.toasts(), ["Failed to seek video for GIF".to_string()]);
    let requests = sent(&mut input_rx);
    assert_eq!(
        requests.last(),
        Some(&UiRequest::Export {
            format: ExportFormat::Gif,
            filename: Some("loop.gif".to_string()),
            options: ExportOptions {
                width: None,
                fps: Some(15.0),
            },
        })
    );
}

/// WHAT: A failed export send releases the in-flight flags
/// WHY: A closed coordinator channel must not block later exports
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_closed_coordinator_when_exporting_then_flags_released() {
    // Given: Export modal open, then the coordinator goes away
    let (mut ui, input_rx) = controller();
    ui.handle_notification(ready()).await.unwrap();
    drop(input_rx);

    // When: Exporting GIF, then video
    let gif = ui.export_gif(Some("loop"), Some(720), 12).await;
    let gif_busy = ui.gif_busy();
    let video = ui.export_video(Some("clip")).await;

    // Then: Both fail and nothing is left marked in flight
    assert!(gif.is_err());
    assert!(!gif_busy);
    assert!(video.is_err());
    assert!(!ui.export_in_progress());
    assert!(!ui.gif_busy());
}

/// WHAT: The export modal tracks GIF selectors and the large-GIF warning
/// WHY: Users are warned before a slow export, based on the recorded length
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_export_modal_when_changing_gif_options_then_warning_follows() {
    // Given: A 5 second recording ready
    let (mut ui, _input_rx) = controller();
    ui.apply_setup(SetupForm {
        duration_input: Some(5.0),
        ..SetupForm::default()
    });
    ui.handle_notification(ready()).await.unwrap();
    let opened = ui.export_modal().cloned().unwrap();

    // When: Switching to source width, then back to 720 at 15 fps, then 12 fps
    ui.set_gif_options(None, 12);
    let source_width = ui.export_modal().map(|m| m.gif_warning);
    ui.set_gif_options(Some(720), 15);
    let fast = ui.export_modal().map(|m| m.gif_warning);
    ui.set_gif_options(Some(720), 12);
    let modest = ui.export_modal().cloned().unwrap();

    // Then: Defaults are quiet, large settings warn, selectors stored
    assert_eq!(opened.gif_width, Some(720));
    assert_eq!(opened.gif_fps, 12);
    assert!(!opened.gif_warning);
    assert_eq!(source_width, Some(true));
    assert_eq!(fast, Some(true));
    assert!(!modest.gif_warning);
    assert_eq!(modest.gif_fps, 12);
}

/// WHAT: Long recordings open the export modal with the warning shown
/// WHY: Duration alone makes a GIF large
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_twenty_second_recording_when_ready_then_gif_warning_shown() {
    // Given: Setup for 20 seconds
    let (mut ui, _input_rx) = controller();
    ui.apply_setup(SetupForm {
        duration_input: Some(20.0),
        ..SetupForm::default()
    });

    // When: The recording is ready
    ui.handle_notification(ready()).await.unwrap();

    // Then: Default selectors but the warning is on
    let modal = ui.export_modal().cloned().unwrap();
    assert_eq!(modal.gif_width, Some(720));
    assert!(modal.gif_warning);
}

/// WHAT: recording-ready opens the export modal and asks for a preview
/// WHY: The preview fills the modal
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_recording_when_ready_then_indicator_removed_and_preview_requested() {
    // Given: A recording in progress
    let (mut ui, mut input_rx) = controller();
    ui.handle_notification(UiNotification::RecordingStarted {
        duration_sec: Some(5.0),
        rect: selection(),
    })
    .await
    .unwrap();
    let indicator = ui.indicator().copied();

    // When: The recording is ready
    ui.handle_notification(ready()).await.unwrap();

    // Then: Indicator gone, modal open, preview requested
    let indicator = indicator.unwrap();
    assert_eq!(indicator.status, IndicatorStatus::Recording);
    assert_eq!(indicator.progress_secs, Some(5.0));
    assert_eq!(indicator.outline, Some(selection()));
    assert!(ui.indicator().is_none());
    assert!(!ui.cursor_hidden());
    let modal = ui.export_modal().unwrap();
    assert!(modal.default_name.starts_with("Example-Domain"));
    assert_eq!(sent(&mut input_rx), vec![UiRequest::Preview]);
}

/// WHAT: Preview results update the modal or show a toast
/// WHY: A failed preview must not block exporting
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_export_modal_when_preview_arrives_then_size_or_toast() {
    // Given: Export modal open
    let (mut ui, _input_rx) = controller();
    ui.handle_notification(ready()).await.unwrap();

    // When: A good preview, then a failed one without a reason
    ui.handle_notification(UiNotification::PreviewReady {
        preview: PreviewReport {
            ok: true,
            data_url: Some("data:video/webm;base64,AA".to_string()),
            filename: Some("preview.webm".to_string()),
            size: Some(2048),
            error: None,
        },
    })
    .await
    .unwrap();
    ui.handle_notification(UiNotification::PreviewReady {
        preview: PreviewReport {
            ok: false,
            data_url: None,
            filename: None,
            size: None,
            error: None,
        },
    })
    .await
    .unwrap();

    // Then: Size recorded and fallback toast shown
    assert_eq!(ui.export_modal().unwrap().preview_size, Some(2048));
    assert_eq!(ui.toasts(), ["Preview unavailable".to_string()]);
}

/// WHAT: Setup and selection broadcasts are ignored while a modal is open
/// WHY: They must not stack on top of the export modal
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_export_modal_when_setup_requested_then_ignored() {
    // Given: Export modal open
    let (mut ui, _input_rx) = controller();
    ui.handle_notification(ready()).await.unwrap();

    // When: show-setup and start-selection arrive
    ui.handle_notification(UiNotification::ShowSetup).await.unwrap();
    ui.handle_notification(UiNotification::StartSelection)
        .await
        .unwrap();

    // Then: Neither took effect
    assert!(!ui.setup_open());
    assert!(!ui.is_selecting());
}

/// WHAT: Cancel tears down the recording UI and reopens setup
/// WHY: The user starts over from setup after cancelling
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_recording_prep_when_cancelled_then_setup_reopened() {
    // Given: A delayed start without cursor capture
    let (mut ui, _input_rx) = controller();
    ui.handle_notification(UiNotification::RecordingPrep { delay_ms: 1000 })
        .await
        .unwrap();
    let starting = ui.indicator().map(|i| i.status);
    let hidden = ui.cursor_hidden();

    // When: The recording is cancelled
    ui.handle_notification(UiNotification::RecordingCancelled)
        .await
        .unwrap();

    // Then: Indicator gone, cursor back, setup open
    assert_eq!(starting, Some(IndicatorStatus::Starting));
    assert!(hidden);
    assert!(ui.indicator().is_none());
    assert!(!ui.cursor_hidden());
    assert!(ui.setup_open());
}

/// WHAT: Keyboard shortcuts map to reset, export and cancel
/// WHY: Escape and Enter mirror the modal buttons
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_modals_when_pressing_keys_then_matching_requests_sent() {
    // Given: Export modal open
    let (mut ui, mut input_rx) = controller();
    ui.handle_notification(ready()).await.unwrap();

    // When: Enter, then Escape, then Escape during a recording
    ui.key(Key::Enter).await.unwrap();
    let default_name = ui.export_modal().map(|m| m.default_name.clone()).unwrap();
    ui.key(Key::Escape).await.unwrap();
    ui.handle_notification(UiNotification::RecordingStarted {
        duration_sec: None,
        rect: selection(),
    })
    .await
    .unwrap();
    ui.key(Key::Escape).await.unwrap();

    // Then: Video export under the default name, reset, then cancel
    assert_eq!(
        sent(&mut input_rx),
        vec![
            UiRequest::Preview,
            UiRequest::Export {
                format: ExportFormat::Video,
                filename: Some(format!("{default_name}.mp4")),
                options: ExportOptions::default(),
            },
            UiRequest::ClearRecording,
            UiRequest::ShowSetup,
            UiRequest::CancelRecording,
        ]
    );
    assert!(ui.export_modal().is_none());
}

/// WHAT: Done clears the recording and closes the modal
/// WHY: Closing the modal discards the artifact
#[tokio::test]
#[allow(clippy::unwrap_used)]
async fn given_export_modal_when_done_then_cleared_and_closed() {
    // Given: Export modal open
    let (mut ui, mut input_rx) = controller();
    ui.handle_notification(ready()).await.unwrap();

    // When: Done
    ui.done().await.unwrap();

    // Then: clear-recording sent, no show-setup
    assert_eq!(
        sent(&mut input_rx),
        vec![UiRequest::Preview, UiRequest::ClearRecording]
    );
    assert!(ui.export_modal().is_none());
}

/// WHAT: Default names combine a cleaned title and a timestamp
/// WHY: Suggested filenames must be valid and recognizable
#[test]
#[allow(clippy::unwrap_used)]
fn given_titles_when_building_default_name_then_cleaned_and_stamped() {
    // Given: A fixed clock
    let now = NaiveDate::from_ymd_opt(2026, 3, 4)
        .unwrap()
        .and_hms_opt(5, 6, 7)
        .unwrap();

    // When/Then: Titles are cleaned, capped at 18 chars, or replaced
    assert_eq!(build_default_name("My  Page", &now), "My-Page260304-050607");
    assert_eq!(
        build_default_name("A very long page title indeed", &now),
        "A-very-long-page-t260304-050607"
    );
    assert_eq!(build_default_name(" - a:b - ", &now), "ab260304-050607");
    assert_eq!(build_default_name("???", &now), "Recording260304-050607");
}

/// WHAT: Extensions are added once and names are cleaned
/// WHY: Download names must be valid
#[test]
fn given_names_when_ensuring_extension_then_single_extension() {
    // Given/When/Then
    assert_eq!(ensure_ext("clip", "gif"), "clip.gif");
    assert_eq!(ensure_ext("clip.GIF", "gif"), "clip.GIF");
    assert_eq!(ensure_ext(" a/b ", "mp4"), "ab.mp4");
    assert_eq!(ensure_ext("***", "gif"), "recording.gif");
}

/// WHAT: Sizes render as whole KB or one-decimal MB
/// WHY: Preview sizes are shown next to the export buttons
#[test]
fn given_sizes_when_formatting_then_kb_or_mb() {
    // Given/When/Then
    assert_eq!(format_bytes(0), "0 MB");
    assert_eq!(format_bytes(100), "1 KB");
    assert_eq!(format_bytes(2048), "2 KB");
    assert_eq!(format_bytes(1024 * 1024), "1.0 MB");
    assert_eq!(format_bytes(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
}

/// WHAT: Large GIF settings raise a warning
/// WHY: Wide, fast or long GIFs may fail or take a long time
#[test]
fn given_gif_settings_when_checking_warning_then_large_flagged() {
    // Given/When/Then
    assert!(!gif_warning(Some(720), 12, Some(5.0)));
    assert!(gif_warning(Some(960), 12, Some(5.0)));
    assert!(gif_warning(None, 12, Some(5.0)));
    assert!(gif_warning(Some(720), 15, Some(5.0)));
    assert!(gif_warning(Some(720), 12, Some(10.5)));
    assert!(!gif_warning(Some(720), 12, None));
}
