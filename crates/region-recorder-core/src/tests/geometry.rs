use crate::{
    geometry::{SelectionRect, SourceRegion},
    tests::selection,
};

fn viewport(width: f64, height: f64) -> SelectionRect {
    SelectionRect {
        viewport_width: width,
        viewport_height: height,
        ..selection()
    }
}

/// WHAT: A selection maps through the uniform frame/viewport scale
/// WHY: Captured frames are device pixels while selections are CSS pixels
#[test]
fn given_half_scale_frame_when_mapping_then_region_is_scaled() {
    // Given: 800x600 viewport captured at 400x300
    let rect = selection();

    // When: Mapping the selection
    let region = SourceRegion::map(&rect, 400, 300);

    // Then: Every edge is halved
    assert_eq!(
        region,
        SourceRegion {
            x: 50,
            y: 50,
            width: 100,
            height: 50
        }
    );
}

/// WHAT: High-DPR captures scale selections up
/// WHY: A 2x display produces frames twice the viewport size
#[test]
fn given_double_density_frame_when_mapping_then_region_is_doubled() {
    // Given: 800x600 viewport captured at 1600x1200
    let rect = SelectionRect {
        dpr: 2.0,
        ..selection()
    };

    // When: Mapping the selection
    let region = SourceRegion::map(&rect, 1600, 1200);

    // Then: Every edge is doubled
    assert_eq!(
        region,
        SourceRegion {
            x: 200,
            y: 200,
            width: 400,
            height: 200
        }
    );
}

/// WHAT: Letterbox bars shift the region by the centering offset
/// WHY: The capture may pad the viewport when aspect ratios differ
#[test]
fn given_wider_frame_when_mapping_then_horizontal_offset_applied() {
    // Given: 800x600 viewport inside a 1000x600 frame (100px bars each side)
    let rect = SelectionRect {
        x: 0.0,
        y: 0.0,
        ..selection()
    };

    // When: Mapping the selection
    let region = SourceRegion::map(&rect, 1000, 600);

    // Then: Region starts after the left bar at unit scale
    assert_eq!(region.x, 100);
    assert_eq!(region.y, 0);
    assert_eq!(region.width, 200);
}

/// WHAT: Pinch-zoom viewport offsets are added before scaling
/// WHY: The visual viewport may be panned inside the layout viewport
#[test]
fn given_viewport_offset_when_mapping_then_region_shifted() {
    // Given: Visual viewport panned by (40, 20)
    let rect = SelectionRect {
        viewport_offset_x: 40.0,
        viewport_offset_y: 20.0,
        ..selection()
    };

    // When: Mapping at half scale
    let region = SourceRegion::map(&rect, 400, 300);

    // Then: Offsets are scaled along with the rectangle
    assert_eq!(region.x, 70);
    assert_eq!(region.y, 60);
}

/// WHAT: Regions overflowing the frame are clipped to its edges
/// WHY: Cropping outside the frame would read pixels that do not exist
#[test]
fn given_selection_past_right_edge_when_mapping_then_width_clipped() {
    // Given: Selection starting 10px before the right edge
    let rect = SelectionRect {
        x: 790.0,
        width: 100.0,
        ..viewport(800.0, 600.0)
    };

    // When: Mapping at unit scale
    let region = SourceRegion::map(&rect, 800, 600);

    // Then: Width stops at the frame edge
    assert_eq!(region.x, 790);
    assert_eq!(region.width, 10);
}

/// WHAT: Selections entirely outside the frame still produce a 1px region
/// WHY: Recording must never be started with an empty surface
#[test]
fn given_selection_outside_frame_when_mapping_then_clamped_to_last_pixel() {
    // Given: Selection far beyond the viewport
    let rect = SelectionRect {
        x: 5000.0,
        y: 5000.0,
        ..viewport(800.0, 600.0)
    };

    // When: Mapping at unit scale
    let region = SourceRegion::map(&rect, 800, 600);

    // Then: Region is the bottom-right pixel
    assert_eq!(
        region,
        SourceRegion {
            x: 799,
            y: 599,
            width: 1,
            height: 1
        }
    );
}

/// WHAT: Missing viewport metadata does not produce NaN regions
/// WHY: Selections from pages without visualViewport report zeros
#[test]
fn given_zero_viewport_when_mapping_then_region_within_frame() {
    // Given: Selection without viewport size
    let rect = viewport(0.0, 0.0);

    // When: Mapping into a 400x300 frame
    let region = SourceRegion::map(&rect, 400, 300);

    // Then: Region lies inside the frame and is non-empty
    assert!(region.x < 400 && region.y < 300);
    assert!(region.width >= 1 && region.height >= 1);
    assert!(region.x + region.width <= 400);
    assert!(region.y + region.height <= 300);
}

/// WHAT: Both selection edges must reach the minimum size
/// WHY: Accidental clicks should not start recordings
#[test]
fn given_selection_sizes_when_checking_minimum_then_threshold_is_ten() {
    // Given: Selections around the threshold
    let tiny = SelectionRect {
        width: 9.9,
        ..selection()
    };
    let flat = SelectionRect {
        height: 4.0,
        ..selection()
    };
    let exact = SelectionRect {
        width: 10.0,
        height: 10.0,
        ..selection()
    };

    // When/Then: Only the selection reaching 10x10 qualifies
    assert!(!tiny.meets_minimum());
    assert!(!flat.meets_minimum());
    assert!(exact.meets_minimum());
}

/// WHAT: Selections decode from the camelCase wire shape
/// WHY: The page sends viewport metadata with browser field names
#[test]
#[allow(clippy::unwrap_used)]
fn given_wire_json_without_dpr_when_deserializing_then_defaults_applied() {
    // Given: Selection JSON without dpr or viewport offsets
    let json = r#"{"x":1,"y":2,"width":30,"height":40,"viewportWidth":800,"viewportHeight":600}"#;

    // When: Deserializing
    let rect: SelectionRect = serde_json::from_str(json).unwrap();

    // Then: Missing fields take their defaults
    assert_eq!(rect.dpr, 1.0);
    assert_eq!(rect.viewport_width, 800.0);
    assert_eq!(rect.viewport_offset_x, 0.0);
}
