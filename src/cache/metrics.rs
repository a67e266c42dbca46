use ::metrics::{counter, histogram};

pub(crate) const METRIC_CACHE_HIT: &str = "board_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "board_cache_miss_total";
pub(crate) const METRIC_CACHE_FILL: &str = "board_cache_fill_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "board_cache_evict_total";
pub(crate) const METRIC_CACHE_DEGRADED: &str = "board_cache_degraded_total";
pub(crate) const METRIC_CACHE_DECODE_ERROR: &str = "board_cache_decode_error_total";
pub(crate) const METRIC_CACHE_INVALIDATE_MS: &str = "board_cache_invalidate_ms";

/// Which cache tier emitted a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Tier {
    Entity,
    Index,
}

impl Tier {
    fn label(self) -> &'static str {
        match self {
            Tier::Entity => "entity",
            Tier::Index => "index",
        }
    }
}

pub(crate) fn hit(tier: Tier) {
    counter!(METRIC_CACHE_HIT, "tier" => tier.label()).increment(1);
}

pub(crate) fn miss(tier: Tier) {
    counter!(METRIC_CACHE_MISS, "tier" => tier.label()).increment(1);
}

pub(crate) fn fill(tier: Tier) {
    counter!(METRIC_CACHE_FILL, "tier" => tier.label()).increment(1);
}

pub(crate) fn evict(tier: Tier, count: usize) {
    counter!(METRIC_CACHE_EVICT, "tier" => tier.label()).increment(count as u64);
}

pub(crate) fn degraded(tier: Tier) {
    counter!(METRIC_CACHE_DEGRADED, "tier" => tier.label()).increment(1);
}

pub(crate) fn decode_error(tier: Tier) {
    counter!(METRIC_CACHE_DECODE_ERROR, "tier" => tier.label()).increment(1);
}

pub(crate) fn invalidate_latency(event: &'static str, millis: f64) {
    histogram!(METRIC_CACHE_INVALIDATE_MS, "event" => event).record(millis);
}
