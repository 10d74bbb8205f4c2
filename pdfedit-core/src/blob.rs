use std::collections::HashMap;
use std::fmt;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const URL_PREFIX: &str = "blob:pdfedit/";

/// Disposable reference to a registered byte blob, handed to the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisplayUrl(String);

impl DisplayUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn key(&self) -> Option<Uuid> {
        self.0
            .strip_prefix(URL_PREFIX)
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }
}

impl fmt::Display for DisplayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Blob {
    pub bytes: Bytes,
    pub mime: String,
}

pub trait BlobRegistry: Send + Sync {
    fn create(&self, bytes: Bytes, mime: &str) -> DisplayUrl;
    fn resolve(&self, url: &DisplayUrl) -> Option<Blob>;
    fn revoke(&self, url: &DisplayUrl);
    fn live_count(&self) -> usize;
}

#[derive(Default)]
pub struct MemoryBlobRegistry {
    inner: Mutex<HashMap<Uuid, Blob>>,
}

impl MemoryBlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobRegistry for MemoryBlobRegistry {
    fn create(&self, bytes: Bytes, mime: &str) -> DisplayUrl {
        let key = Uuid::new_v4();
        self.inner.lock().insert(
            key,
            Blob {
                bytes,
                mime: mime.to_string(),
            },
        );
        DisplayUrl(format!("{URL_PREFIX}{key}"))
    }

    fn resolve(&self, url: &DisplayUrl) -> Option<Blob> {
        let key = url.key()?;
        self.inner.lock().get(&key).cloned()
    }

    fn revoke(&self, url: &DisplayUrl) {
        if let Some(key) = url.key() {
            self.inner.lock().remove(&key);
        }
    }

    fn live_count(&self) -> usize {
        self.inner.lock().len()
    }
}
