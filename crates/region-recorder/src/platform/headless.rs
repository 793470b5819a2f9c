use crate::{
    AppError, AppResult,
    platform::{Platform, TabInfo},
    protocol::{TabId, UiNotification},
};

use std::{
    collections::{HashMap, HashSet},
    fs,
    io::Write,
    panic::Location,
    path::{Path, PathBuf},
    sync::{
        Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use error_location::ErrorLocation;
use region_recorder_core::media::{Blob, backend::StreamId};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// In-process browser host.
///
/// Tabs are registered up front, page UIs attach by taking a notification
/// receiver, and downloads are written into a fixed directory. A "save as"
/// download never overwrites an existing file and picks the next free name.
pub struct HeadlessPlatform {
    download_dir: PathBuf,
    tabs: Mutex<HashMap<TabId, TabInfo>>,
    pages: Mutex<HashMap<TabId, mpsc::UnboundedSender<UiNotification>>>,
    injected: Mutex<HashSet<TabId>>,
    downloads: Mutex<Vec<PathBuf>>,
    next_stream: AtomicU64,
}

impl HeadlessPlatform {
    /// Create a host saving downloads into `download_dir`.
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            tabs: Mutex::new(HashMap::new()),
            pages: Mutex::new(HashMap::new()),
            injected: Mutex::new(HashSet::new()),
            downloads: Mutex::new(Vec::new()),
            next_stream: AtomicU64::new(1),
        }
    }

    /// Open a tab showing `url`.
    pub fn open_tab(&self, tab: TabId, url: &str, title: &str) {
        lock(&self.tabs).insert(
            tab,
            TabInfo {
                url: url.to_string(),
                title: title.to_string(),
            },
        );
        debug!(tab_id = %tab, url, "Tab opened");
    }

    /// Close `tab`, detaching its page UI.
    #[cfg(test)]
    pub fn close_tab(&self, tab: TabId) {
        lock(&self.tabs).remove(&tab);
        lock(&self.pages).remove(&tab);
        lock(&self.injected).remove(&tab);
        debug!(tab_id = %tab, "Tab closed");
    }

    /// Attach a page UI to `tab` and return its notification stream.
    ///
    /// A second attach replaces the first, as a page reload would.
    pub fn attach_page(&self, tab: TabId) -> mpsc::UnboundedReceiver<UiNotification> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.pages).insert(tab, tx);
        rx
    }

    /// Tabs the page UI was injected into.
    #[cfg(test)]
    pub fn injected_tabs(&self) -> Vec<TabId> {
        let mut tabs: Vec<TabId> = lock(&self.injected).iter().copied().collect();
        tabs.sort();
        tabs
    }

    /// Every file saved so far, in order.
    pub fn downloads(&self) -> Vec<PathBuf> {
        lock(&self.downloads).clone()
    }
}

#[async_trait]
impl Platform for HeadlessPlatform {
    async fn tab_info(&self, tab: TabId) -> Option<TabInfo> {
        lock(&self.tabs).get(&tab).cloned()
    }

    async fn tab_stream_id(&self, tab: TabId) -> AppResult<StreamId> {
        if !lock(&self.tabs).contains_key(&tab) {
            return Err(AppError::CaptureRefused {
                reason: format!("No tab with id {tab}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let n = self.next_stream.fetch_add(1, Ordering::Relaxed);
        Ok(StreamId(format!("headless-tab-{tab}-stream-{n}")))
    }

    async fn ensure_ui(&self, tab: TabId) -> AppResult<()> {
        if !lock(&self.pages).contains_key(&tab) {
            return Err(AppError::UiUnavailable {
                reason: format!("No page attached to tab {tab}"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if lock(&self.injected).insert(tab) {
            debug!(tab_id = %tab, "Page UI injected");
        }
        Ok(())
    }

    async fn notify(&self, tab: TabId, notification: UiNotification) -> AppResult<()> {
        let kind = notification.kind();
        let sender = lock(&self.pages).get(&tab).cloned();

        let Some(sender) = sender else {
            return Err(AppError::UiUnavailable {
                reason: format!("No page attached to tab {tab}"),
                location: ErrorLocation::from(Location::caller()),
            });
        };

        sender
            .send(notification)
            .map_err(|e| AppError::ChannelSendFailed {
                message: format!("Page for tab {tab} is gone: {}", e),
                location: ErrorLocation::from(Location::caller()),
            })?;

        debug!(tab_id = %tab, kind, "Notification delivered");
        Ok(())
    }

    #[instrument(skip(self, blob), fields(bytes = blob.size()))]
    async fn download(&self, blob: &Blob, filename: &str, save_as: bool) -> AppResult<PathBuf> {
        let dir = self.download_dir.clone();
        let filename = filename.to_string();
        let bytes = blob.clone();

        let path = tokio::task::spawn_blocking(move || {
            write_download(&dir, &filename, bytes.bytes(), save_as)
        })
        .await
        .map_err(|e| AppError::DownloadFailed {
            reason: format!("Download interrupted: {}", e),
            location: ErrorLocation::from(Location::caller()),
        })??;

        lock(&self.downloads).push(path.clone());
        info!(path = ?path, "Download saved");

        Ok(path)
    }
}

/// Write `bytes` into `dir` atomically: temp file, sync, rename.
#[track_caller]
fn write_download(dir: &Path, filename: &str, bytes: &[u8], save_as: bool) -> AppResult<PathBuf> {
    let failed = |reason: String| AppError::DownloadFailed {
        reason,
        location: ErrorLocation::from(Location::caller()),
    };

    fs::create_dir_all(dir).map_err(|e| failed(format!("Failed to create {:?}: {}", dir, e)))?;

    let mut target = dir.join(filename);
    if target.exists() {
        if save_as {
            target = next_free_path(dir, filename);
        } else {
            warn!(path = ?target, "Overwriting existing download");
        }
    }

    let temp_path = dir.join(format!(".{filename}.{}.part", Uuid::new_v4().simple()));
    if let Err(e) = write_synced(&temp_path, bytes).and_then(|()| fs::rename(&temp_path, &target))
    {
        if let Err(cleanup) = fs::remove_file(&temp_path) {
            debug!(path = ?temp_path, error = %cleanup, "No partial download to remove");
        }
        return Err(failed(format!("Failed to save download: {}", e)));
    }

    Ok(target)
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// `name (1).ext`, `name (2).ext`, ... until one does not exist.
fn next_free_path(dir: &Path, filename: &str) -> PathBuf {
    let (stem, extension) = match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (filename, None),
    };

    (1u32..)
        .map(|n| match extension {
            Some(ext) => dir.join(format!("{stem} ({n}).{ext}")),
            None => dir.join(format!("{stem} ({n})")),
        })
        .find(|path| !path.exists())
        .unwrap_or_else(|| dir.join(filename))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
