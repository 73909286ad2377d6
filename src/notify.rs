//! Outbound collaborators: realtime fan-out, view cache invalidation and
//! object storage for model files.
//!
//! All of them run after the workflow write has committed. A failing
//! collaborator is logged and never undoes the write.
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

pub const CLINIC_VIEW: &str = "/clinic";
pub const LABORATORY_VIEW: &str = "/laboratory";
pub const CLINIC_OFFERS_VIEW: &str = "/clinic/offers";
pub const LABORATORY_OFFERS_VIEW: &str = "/laboratory/offers";

pub fn order_view(order_id: &str) -> String {
    format!("/orders/{order_id}")
}

/// Realtime channel carrying an order's message thread.
pub fn order_channel(order_id: &str) -> String {
    format!("order-{order_id}")
}

pub trait RealtimeTransport: Send + Sync {
    fn publish(&self, channel: &str, event: &str, payload: Vec<u8>) -> anyhow::Result<()>;
}

pub trait ViewCache: Send + Sync {
    fn invalidate(&self, key: &str);
}

pub trait ObjectStorage: Send + Sync {
    /// Stores `bytes` under `key` and returns the public url.
    fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl RealtimeTransport for NullTransport {
    fn publish(&self, _channel: &str, _event: &str, _payload: Vec<u8>) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullViewCache;

impl ViewCache for NullViewCache {
    fn invalidate(&self, _key: &str) {}
}

/// Records invalidated keys, handy for asserting which views went stale.
#[derive(Debug, Default)]
pub struct RecordingViewCache {
    keys: Mutex<Vec<String>>,
}

impl RecordingViewCache {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn drain(&self) -> Vec<String> {
        self.keys
            .lock()
            .map(|mut keys| std::mem::take(&mut *keys))
            .unwrap_or_default()
    }
}

impl ViewCache for RecordingViewCache {
    fn invalidate(&self, key: &str) {
        if let Ok(mut keys) = self.keys.lock() {
            keys.push(key.to_string());
        }
    }
}

pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub struct InMemoryObjectStorage {
    base_url: String,
    objects: RwLock<HashMap<String, StoredObject>>,
}

impl InMemoryObjectStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub fn content_type_of(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .ok()
            .and_then(|objects| objects.get(key).map(|o| o.content_type.clone()))
    }

    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryObjectStorage {
    fn default() -> Self {
        Self::new("memory://objects")
    }
}

impl ObjectStorage for InMemoryObjectStorage {
    fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> anyhow::Result<String> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| anyhow::anyhow!("object table lock poisoned"))?;
        objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), key))
    }
}
