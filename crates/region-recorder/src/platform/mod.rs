//! Browser-host capabilities used by the session coordinator.
//!
//! Tab metadata, capture grants, page-script injection, message delivery to
//! the page and file downloads all belong to the host. The coordinator only
//! sees them through [`Platform`].

mod headless;

pub(crate) use headless::HeadlessPlatform;

use crate::{AppResult, protocol::{TabId, UiNotification}};

use std::path::PathBuf;

use async_trait::async_trait;
use region_recorder_core::media::{Blob, backend::StreamId};

/// Message shown when the user tries to record a browser-internal page.
pub const NOT_CAPTURABLE_MESSAGE: &str =
    "Cannot capture chrome:// pages. Open a normal website tab.";

/// Fallback filename for downloads whose name sanitizes to nothing.
pub const FALLBACK_FILENAME: &str = "recording";

/// Metadata of a browser tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    /// Current URL.
    pub url: String,
    /// Current title.
    pub title: String,
}

/// Host services available to the coordinator.
#[async_trait]
pub trait Platform: Send + Sync {
    /// URL and title of `tab`, or `None` if the tab is gone.
    async fn tab_info(&self, tab: TabId) -> Option<TabInfo>;

    /// Obtain a capture grant for `tab`.
    async fn tab_stream_id(&self, tab: TabId) -> AppResult<StreamId>;

    /// Make sure the page UI is present in `tab`.
    async fn ensure_ui(&self, tab: TabId) -> AppResult<()>;

    /// Deliver `notification` to the page UI of `tab`.
    async fn notify(&self, tab: TabId, notification: UiNotification) -> AppResult<()>;

    /// Save `blob` as `filename`, prompting for a location when `save_as`.
    async fn download(&self, blob: &Blob, filename: &str, save_as: bool) -> AppResult<PathBuf>;
}

/// Whether pages at `url` may be captured.
///
/// Browser-internal and extension pages, and tabs without a URL, are not.
pub fn is_capturable(url: &str) -> bool {
    let url = url.trim();
    !url.is_empty() && !url.starts_with("chrome://") && !url.starts_with("chrome-extension://")
}

/// Strip characters that are invalid in filenames.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        cleaned.to_string()
    }
}
