//! Where build output goes.
mod complete;
pub use complete::CompleteLog;

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::ServiceError;

/// Append-only, named log channels read by an external viewer.
///
/// Consumers receive the raw lines in order; nothing else is added to them.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn publish(&self, channel: &str, line: &str) -> Result<(), ServiceError>;
}

/// In-process [`LogSink`] fanning every channel out to its subscribers.
///
/// Lines published while nobody is subscribed are dropped; a slow subscriber loses the
/// oldest lines once `capacity` is exceeded.
#[derive(Clone)]
pub struct LogHub {
    capacity: usize,
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<String>>>>,
}

impl LogHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drop channels without subscribers.
    pub fn prune(&self) {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, tx| tx.receiver_count() > 0);
    }
}

impl Default for LogHub {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl LogSink for LogHub {
    async fn publish(&self, channel: &str, line: &str) -> Result<(), ServiceError> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = channels.get(channel) {
            // No receivers is not an error: the viewer may simply not be attached.
            let _ = tx.send(line.to_string());
        }
        Ok(())
    }
}
