use crate::metrics_names::{CACHE_HIT, CACHE_MISS, CACHE_STALE_OR_CORRUPT};
use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::{global, KeyValue};
use std::borrow::Cow;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Error types for metrics operations
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("Invalid tag: {0}")]
    InvalidTag(String),
}

/// Type-safe wrapper for metric tags
#[derive(Debug, Clone)]
pub struct MetricTag {
    key: &'static str,
    value: String,
}

impl MetricTag {
    pub fn new(key: &'static str, value: impl Into<String>) -> Result<Self, MetricError> {
        let value = value.into();
        if key.is_empty() {
            return Err(MetricError::InvalidTag("Tag key cannot be empty".into()));
        }
        if value.is_empty() {
            return Err(MetricError::InvalidTag("Tag value cannot be empty".into()));
        }
        Ok(Self { key, value })
    }

    fn into_key_value(self) -> KeyValue {
        KeyValue::new(self.key, self.value)
    }
}

/// Tagged metric wrapper that automatically handles labels
#[derive(Debug, Clone)]
pub struct TaggedMetric<T> {
    metric: T,
    default_tags: Vec<MetricTag>,
}

impl<T> TaggedMetric<T> {
    fn new(metric: T, name: &'static str) -> Self {
        Self {
            metric,
            default_tags: vec![MetricTag {
                key: "name",
                value: name.to_string(),
            }],
        }
    }

    fn with_tags(&self, tags: &[MetricTag]) -> Vec<KeyValue> {
        self.default_tags
            .iter()
            .cloned()
            .chain(tags.iter().cloned())
            .map(|tag| tag.into_key_value())
            .collect()
    }
}

/// Outcome of a cache lookup, recorded as the `outcome` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Hit,
    Miss,
    StaleOrCorrupt,
}

impl CacheOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOutcome::Hit => CACHE_HIT,
            CacheOutcome::Miss => CACHE_MISS,
            CacheOutcome::StaleOrCorrupt => CACHE_STALE_OR_CORRUPT,
        }
    }
}

/// Metrics for the decryption authorization flow
#[derive(Debug, Clone)]
pub struct AuthMetrics {
    // Counters
    request_counter: TaggedMetric<Counter<u64>>,
    error_counter: TaggedMetric<Counter<u64>>,
    cache_counter: TaggedMetric<Counter<u64>>,
    // Histograms
    duration_histogram: TaggedMetric<Histogram<f64>>,
}

impl Default for AuthMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthMetrics {
    pub fn new() -> Self {
        Self::with_config(MetricsConfig::default())
    }

    pub fn with_config(config: MetricsConfig) -> Self {
        let meter = global::meter("fhe_challenge");

        let operations: Cow<'static, str> = format!("{}_operations", config.prefix).into();
        let operation_errors: Cow<'static, str> =
            format!("{}_operation_errors", config.prefix).into();
        let cache_lookups: Cow<'static, str> = format!("{}_cache_lookups", config.prefix).into();
        let duration_metric: Cow<'static, str> =
            format!("{}_operation_duration_ms", config.prefix).into();

        let request_counter = meter
            .u64_counter(operations)
            .with_description("Total number of operations processed")
            .with_unit("operations")
            .build();
        //Increment by 0 just to make sure the counter is exported
        request_counter.add(0, &[]);

        let error_counter = meter
            .u64_counter(operation_errors)
            .with_description("Total number of operation errors")
            .with_unit("errors")
            .build();
        error_counter.add(0, &[]);

        let cache_counter = meter
            .u64_counter(cache_lookups)
            .with_description("Authorization cache lookups by outcome")
            .with_unit("lookups")
            .build();
        cache_counter.add(0, &[]);

        let duration_histogram = meter
            .f64_histogram(duration_metric)
            .with_description("Duration of authorization operations, signer wait included")
            .with_unit("milliseconds")
            .build();

        Self {
            request_counter: TaggedMetric::new(request_counter, "operations"),
            error_counter: TaggedMetric::new(error_counter, "errors"),
            cache_counter: TaggedMetric::new(cache_counter, "cache"),
            duration_histogram: TaggedMetric::new(duration_histogram, "duration"),
        }
    }

    fn create_operation_tag(operation: impl Into<String>) -> Result<MetricTag, MetricError> {
        MetricTag::new("operation", operation)
    }

    pub fn increment_request_counter(
        &self,
        operation: impl Into<String>,
    ) -> Result<(), MetricError> {
        let tags = vec![Self::create_operation_tag(operation)?];
        self.request_counter
            .metric
            .add(1, &self.request_counter.with_tags(&tags));
        Ok(())
    }

    pub fn increment_error_counter(
        &self,
        operation: impl Into<String>,
        error: impl Into<String>,
    ) -> Result<(), MetricError> {
        let mut tags = vec![Self::create_operation_tag(operation)?];
        tags.push(MetricTag::new("error", error)?);
        self.error_counter
            .metric
            .add(1, &self.error_counter.with_tags(&tags));
        Ok(())
    }

    pub fn increment_cache_counter(&self, outcome: CacheOutcome) {
        let tags = [MetricTag {
            key: "outcome",
            value: outcome.as_str().to_string(),
        }];
        self.cache_counter
            .metric
            .add(1, &self.cache_counter.with_tags(&tags));
    }

    pub fn observe_duration(
        &self,
        operation: impl Into<String>,
        duration: Duration,
    ) -> Result<(), MetricError> {
        let tags = vec![Self::create_operation_tag(operation)?];
        self.duration_histogram.metric.record(
            duration.as_millis() as f64,
            &self.duration_histogram.with_tags(&tags),
        );
        Ok(())
    }

    /// Start timing an operation; the duration is recorded when the guard is dropped.
    pub fn time_operation(&self, operation: &'static str) -> DurationGuard<'_> {
        DurationGuard {
            metrics: self,
            operation,
            start: Instant::now(),
        }
    }
}

/// RAII guard that records operation duration when dropped
#[derive(Debug)]
pub struct DurationGuard<'a> {
    metrics: &'a AuthMetrics,
    operation: &'static str,
    start: Instant,
}

impl DurationGuard<'_> {
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for DurationGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self
            .metrics
            .observe_duration(self.operation, self.start.elapsed())
        {
            tracing::warn!("Failed to record duration of {}: {e}", self.operation);
        }
    }
}

// Global metrics instance
lazy_static::lazy_static! {
    pub static ref METRICS: AuthMetrics = AuthMetrics::new();
}

/// Configuration for metrics initialization
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub prefix: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            prefix: "fhe_challenge".to_string(),
        }
    }
}
