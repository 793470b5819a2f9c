mod gif_config;
#[allow(clippy::module_inception)]
mod config;
mod output_config;
mod page_config;
mod recording_config;

pub(crate) use {
    config::Config,
    gif_config::GifConfig,
    output_config::OutputConfig,
    page_config::PageConfig,
    recording_config::RecordingConfig,
};

pub(crate) const DEFAULT_DURATION_SECS: f64 = 5.0;
pub(crate) const DEFAULT_START_DELAY_MS: u64 = 1000;
pub(crate) const DEFAULT_MAX_DURATION_SECS: f64 = crate::protocol::MAX_RECORDING_SECS;
pub(crate) const DEFAULT_GIF_WIDTH: u32 = 720;
pub(crate) const DEFAULT_GIF_FPS: u32 = 12;
pub(crate) const DEFAULT_PAGE_URL: &str = "https://example.com/";
pub(crate) const DEFAULT_PAGE_TITLE: &str = "Example Domain";
pub(crate) const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;
pub(crate) const DEFAULT_VIEWPORT_HEIGHT: u32 = 720;

pub(crate) fn default_duration_secs() -> f64 {
    DEFAULT_DURATION_SECS
}

pub(crate) fn default_start_delay_ms() -> u64 {
    DEFAULT_START_DELAY_MS
}

pub(crate) fn default_max_duration_secs() -> f64 {
    DEFAULT_MAX_DURATION_SECS
}

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_gif_width() -> Option<u32> {
    Some(DEFAULT_GIF_WIDTH)
}

pub(crate) fn default_gif_fps() -> u32 {
    DEFAULT_GIF_FPS
}

pub(crate) fn default_page_url() -> String {
    DEFAULT_PAGE_URL.to_string()
}

pub(crate) fn default_page_title() -> String {
    DEFAULT_PAGE_TITLE.to_string()
}

pub(crate) fn default_viewport_width() -> u32 {
    DEFAULT_VIEWPORT_WIDTH
}

pub(crate) fn default_viewport_height() -> u32 {
    DEFAULT_VIEWPORT_HEIGHT
}

pub(crate) fn default_device_pixel_ratio() -> f64 {
    1.0
}
