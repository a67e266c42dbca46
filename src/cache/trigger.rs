//! Cache trigger service.
//!
//! Turns write events into eviction plans and applies each plan as one
//! batched delete. Invalidation never fails the write that caused it.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::events::{EpochCounter, WriteEvent};
use super::kv::KvStore;
use super::metrics::{self, Tier};
use super::planner::EvictionPlan;

/// Invalidation coordinator, called after each successful write.
///
/// # Usage
///
/// ```ignore
/// // After a reply is stored:
/// trigger.invalidate(&WriteEvent::ReplyCreated { topic_id, reply_id, author_id }).await;
/// ```
pub struct CacheTrigger {
    config: CacheConfig,
    kv: Arc<dyn KvStore>,
    epochs: EpochCounter,
}

impl CacheTrigger {
    pub fn new(config: CacheConfig, kv: Arc<dyn KvStore>) -> Self {
        Self {
            config,
            kv,
            epochs: EpochCounter::new(),
        }
    }

    /// Evict every key `event` can stale.
    pub async fn invalidate(&self, event: &WriteEvent) {
        self.apply(event.name(), EvictionPlan::from_event(event))
            .await;
    }

    /// Evict the merged key set of `events` in a single batch.
    pub async fn invalidate_all(&self, events: &[WriteEvent]) {
        let Some(first) = events.first() else {
            return;
        };
        let name = if events.len() == 1 {
            first.name()
        } else {
            "batch"
        };
        self.apply(name, EvictionPlan::from_events(events)).await;
    }

    async fn apply(&self, name: &'static str, plan: EvictionPlan) {
        let epoch = self.epochs.next_epoch();
        if plan.is_empty() {
            debug!(event = name, event_epoch = epoch, "Nothing to invalidate");
            return;
        }

        let started_at = Instant::now();
        let keys = plan.render(&self.config.key_prefix);

        match self.kv.delete_many(&keys).await {
            Ok(()) => {
                let (entities, indexes) = plan.counts();
                metrics::evict(Tier::Entity, entities);
                metrics::evict(Tier::Index, indexes);
                info!(
                    event = name,
                    event_epoch = epoch,
                    %plan,
                    "Cache invalidated"
                );
            }
            Err(err) => {
                warn!(
                    event = name,
                    event_epoch = epoch,
                    keys = ?keys,
                    error = %err,
                    "Cache invalidation incomplete; stale entries expire by TTL"
                );
            }
        }

        metrics::invalidate_latency(name, started_at.elapsed().as_secs_f64() * 1000.0);
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}
