use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tracing::{debug, error};
use uuid::Uuid;

/// Immutable binary payload plus its container mime type.
///
/// Cloning shares the underlying bytes, so handing a blob across contexts
/// never copies or re-encodes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    bytes: Arc<[u8]>,
    mime_type: String,
}

impl Blob {
    /// Wrap `bytes` with the given mime type.
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: Arc::from(bytes),
            mime_type: mime_type.into(),
        }
    }

    /// Raw bytes of the blob.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Container mime type, including any codecs parameter.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether two blobs share the same allocation.
    pub fn shares_bytes_with(&self, other: &Blob) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}

/// The most recently completed capture.
pub type RecordingArtifact = Blob;

/// Object-URL table mapping `blob:` references to payloads.
///
/// Lives in the media worker; other contexts only ever see the URL.
#[derive(Debug, Default)]
pub struct BlobRegistry {
    entries: Mutex<HashMap<String, Blob>>,
}

impl BlobRegistry {
    /// Register `blob` and return a fresh URL for it.
    pub fn create_url(&self, blob: Blob) -> String {
        let url = format!("blob:region-recorder/{}", Uuid::new_v4());
        self.lock().insert(url.clone(), blob);
        debug!(url = %url, "Blob URL created");
        url
    }

    /// Look up the blob behind `url`.
    pub fn resolve(&self, url: &str) -> Option<Blob> {
        self.lock().get(url).cloned()
    }

    /// Forget `url`. Returns whether it was registered.
    pub fn revoke(&self, url: &str) -> bool {
        let removed = self.lock().remove(url).is_some();
        debug!(url = %url, removed, "Blob URL revoked");
        removed
    }

    /// Number of live URLs.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no URLs are live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Blob>> {
        // A poisoned table still holds valid entries.
        self.entries.lock().unwrap_or_else(|e| {
            error!("Blob registry lock poisoned, recovering: {}", e);
            e.into_inner()
        })
    }
}
