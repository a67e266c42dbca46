//! Logging bootstrap and metric descriptions.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, Registry, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::metrics::{
    METRIC_CACHE_DECODE_ERROR, METRIC_CACHE_DEGRADED, METRIC_CACHE_EVICT, METRIC_CACHE_FILL,
    METRIC_CACHE_HIT, METRIC_CACHE_INVALIDATE_MS, METRIC_CACHE_MISS,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

const COUNTERS: [(&str, &str); 6] = [
    (METRIC_CACHE_HIT, "Reads answered from the cache, by tier."),
    (METRIC_CACHE_MISS, "Reads that fell through to the entity store, by tier."),
    (METRIC_CACHE_FILL, "Entries written back after a miss, by tier."),
    (METRIC_CACHE_EVICT, "Keys deleted by write-path invalidation, by tier."),
    (
        METRIC_CACHE_DEGRADED,
        "Reads served from the entity store while the cache was unreachable.",
    ),
    (
        METRIC_CACHE_DECODE_ERROR,
        "Cached values discarded because they failed to decode.",
    ),
];

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays machine-readable.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(output_layer(logging.format))
        .with(env_filter)
        .with(ErrorLayer::default())
        .try_init()
        .map_err(|err| InfraError::Telemetry(err.to_string()))
}

fn output_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .boxed(),
    }
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        for (name, description) in COUNTERS {
            describe_counter!(name, Unit::Count, description);
        }
        describe_histogram!(
            METRIC_CACHE_INVALIDATE_MS,
            Unit::Milliseconds,
            "Time to apply one invalidation batch."
        );
    });
}
