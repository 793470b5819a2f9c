use crate::config::{
    default_device_pixel_ratio, default_page_title, default_page_url, default_viewport_height,
    default_viewport_width,
};

use serde::{Deserialize, Serialize};

/// The page the headless session records from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    /// Tab URL; must be a capturable page.
    #[serde(default = "default_page_url")]
    pub url: String,
    /// Tab title, used for export filenames.
    #[serde(default = "default_page_title")]
    pub title: String,
    /// Inner window width in CSS pixels.
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    /// Inner window height in CSS pixels.
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
    /// Device pixel ratio; captured frames are the viewport times this.
    #[serde(default = "default_device_pixel_ratio")]
    pub device_pixel_ratio: f64,
    /// Region dragged out by the simulated user.
    #[serde(default)]
    pub selection: SelectionConfig,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            url: default_page_url(),
            title: default_page_title(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            device_pixel_ratio: default_device_pixel_ratio(),
            selection: SelectionConfig::default(),
        }
    }
}

/// A drag rectangle in viewport coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            x: 320.0,
            y: 180.0,
            width: 640.0,
            height: 360.0,
        }
    }
}
