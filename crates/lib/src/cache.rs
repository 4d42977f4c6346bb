//! Conversation cache: phone identifier -> open conversation id.
//!
//! No per-entry expiry. A sweep task clears the whole map on a fixed interval, so an entry
//! can outlive the conversation it points to by up to one interval.

use crate::inbox::ConversationId;
use crate::phone::PhoneIdentifier;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Shared in-memory cache. Clones share the same map.
#[derive(Clone)]
pub struct ConversationCache {
    inner: Arc<RwLock<HashMap<PhoneIdentifier, ConversationId>>>,
    sweep_interval: Duration,
}

impl Default for ConversationCache {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_INTERVAL)
    }
}

impl ConversationCache {
    pub fn new(sweep_interval: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            sweep_interval,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    pub async fn get(&self, id: &PhoneIdentifier) -> Option<ConversationId> {
        self.inner.read().await.get(id).copied()
    }

    pub async fn put(&self, id: PhoneIdentifier, conversation_id: ConversationId) {
        self.inner.write().await.insert(id, conversation_id);
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        let mut g = self.inner.write().await;
        let n = g.len();
        g.clear();
        log::debug!("conversation cache cleared ({} entries)", n);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Spawn the periodic sweep. The caller owns the handle and aborts it to stop sweeping.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let cache = self.clone();
        let period = self.sweep_interval;
        log::info!("conversation cache: sweeping every {}s", period.as_secs());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.clear().await;
            }
        })
    }
}
