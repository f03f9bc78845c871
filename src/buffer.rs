//! Shared sample buffers
//!
//! Buffers are registered by name in a [`BufferTable`]. Consumers hold a
//! [`BufferRef`] that may still be pending; a loader fulfills it from any
//! thread and the consumer sees the data on its next block. A rejected load
//! leaves the last good buffer attached.

use crate::error::{Error, Result};
use arc_swap::{ArcSwapOption, Guard};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferFormat {
    pub sample_rate: f64,
    pub num_channels: usize,
    pub num_sample_frames: usize,
    /// Seconds
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferData {
    pub channels: Vec<Vec<f32>>,
}

/// Decoded audio in the shape loaders hand to the engine
///
/// # Example
/// ```json
/// { "format": { "sampleRate": 44100, "numChannels": 1,
///               "numSampleFrames": 4, "duration": 0.00009 },
///   "data": { "channels": [[0.0, 0.5, 1.0, 0.5]] } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferDesc {
    pub format: BufferFormat,
    pub data: BufferData,
}

impl BufferDesc {
    /// Build a desc from raw channels, deriving the format block
    pub fn from_channels(sample_rate: f64, channels: Vec<Vec<f32>>) -> Self {
        let num_sample_frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        let duration = if sample_rate > 0.0 {
            num_sample_frames as f64 / sample_rate
        } else {
            0.0
        };
        Self {
            format: BufferFormat {
                sample_rate,
                num_channels: channels.len(),
                num_sample_frames,
                duration,
            },
            data: BufferData { channels },
        }
    }

    pub fn channel(&self, idx: usize) -> Option<&[f32]> {
        self.data.channels.get(idx).map(Vec::as_slice)
    }

    pub fn num_frames(&self) -> usize {
        self.format.num_sample_frames
    }

    pub fn sample_rate(&self) -> f64 {
        self.format.sample_rate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferStatus {
    Pending,
    Ready,
    Failed,
}

impl BufferStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => BufferStatus::Ready,
            2 => BufferStatus::Failed,
            _ => BufferStatus::Pending,
        }
    }
}

#[derive(Debug, Default)]
struct BufferCell {
    desc: ArcSwapOption<BufferDesc>,
    status: AtomicU8,
    error: ArcSwapOption<String>,
}

/// Handle to a possibly not yet loaded buffer
#[derive(Debug, Clone, Default)]
pub struct BufferRef(Arc<BufferCell>);

impl BufferRef {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn ready(desc: BufferDesc) -> Self {
        let buffer = Self::default();
        buffer.fulfill(desc);
        buffer
    }

    /// Attach loaded data. Readers pick it up on their next block.
    pub fn fulfill(&self, desc: BufferDesc) {
        self.0.desc.store(Some(Arc::new(desc)));
        self.0.error.store(None);
        self.0.status.store(1, Ordering::Release);
    }

    /// Mark the load as failed. Any previously attached data stays.
    pub fn reject(&self, msg: impl Into<String>) {
        self.0.error.store(Some(Arc::new(msg.into())));
        self.0.status.store(2, Ordering::Release);
    }

    pub fn status(&self) -> BufferStatus {
        BufferStatus::from_u8(self.0.status.load(Ordering::Acquire))
    }

    pub fn error(&self) -> Option<String> {
        self.0.error.load_full().map(|msg| msg.as_ref().clone())
    }

    /// Current data, if any has been attached. Lock-free.
    pub fn load(&self) -> Guard<Option<Arc<BufferDesc>>> {
        self.0.desc.load()
    }

    pub fn same_as(&self, other: &BufferRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Off-thread producer of buffer data
pub trait BufferSource: Send + 'static {
    fn load_buffer(&self, id: &str) -> Result<BufferDesc>;
}

impl<F> BufferSource for F
where
    F: Fn(&str) -> Result<BufferDesc> + Send + 'static,
{
    fn load_buffer(&self, id: &str) -> Result<BufferDesc> {
        self(id)
    }
}

/// Name -> buffer registry shared by an environment and its synths
#[derive(Debug, Clone, Default)]
pub struct BufferTable {
    entries: Arc<Mutex<HashMap<String, BufferRef>>>,
}

impl BufferTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, BufferRef>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, id: &str) -> Option<BufferRef> {
        self.lock().get(id).cloned()
    }

    /// Existing ref for `id`, or a new pending one
    pub fn get_or_pending(&self, id: &str) -> BufferRef {
        self.lock().entry(id.to_string()).or_default().clone()
    }

    /// Attach data under `id`. Nodes already waiting on `id` see it.
    pub fn register(&self, id: &str, desc: BufferDesc) -> BufferRef {
        let buffer = self.get_or_pending(id);
        buffer.fulfill(desc);
        debug!(id, "buffer registered");
        buffer
    }

    pub fn remove(&self, id: &str) -> Option<BufferRef> {
        self.lock().remove(id)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Load `id` on a background thread
    pub fn load_async<S: BufferSource>(&self, id: &str, source: S) -> JoinHandle<()> {
        let buffer = self.get_or_pending(id);
        let id = id.to_string();
        std::thread::spawn(move || match source.load_buffer(&id) {
            Ok(desc) => {
                buffer.fulfill(desc);
                debug!(id = %id, "buffer loaded");
            }
            Err(e) => {
                warn!(id = %id, error = %e, "buffer load failed");
                buffer.reject(e.to_string());
            }
        })
    }

    /// Resolve the value of a `buffer` input: a name, `{"id": name}`, or
    /// an inline desc (registered under its `id` when it has one).
    pub fn resolve(&self, value: &Value) -> Result<BufferRef> {
        match value {
            Value::String(id) => Ok(self.get_or_pending(id)),
            Value::Object(obj) if obj.contains_key("data") => {
                let desc: BufferDesc = serde_json::from_value(value.clone())?;
                match obj.get("id").and_then(Value::as_str) {
                    Some(id) => Ok(self.register(id, desc)),
                    None => Ok(BufferRef::ready(desc)),
                }
            }
            Value::Object(obj) => match obj.get("id").and_then(Value::as_str) {
                Some(id) => Ok(self.get_or_pending(id)),
                None => Err(Error::InvalidDef(format!("bad buffer reference: {}", value))),
            },
            other => Err(Error::InvalidDef(format!("bad buffer reference: {}", other))),
        }
    }
}
