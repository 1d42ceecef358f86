//! # Metrics
//!
//! Per-operation counters and latencies in a `prometheus-client`
//! registry, rendered in the text exposition format for `/metrics`.

use std::fmt;
use std::time::Duration;

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OperationLabels {
    pub service: String,
    pub operation: String,
    pub status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct LatencyLabels {
    pub service: String,
    pub operation: String,
}

type LatencyFamily = Family<LatencyLabels, Histogram, fn() -> Histogram>;

pub struct Metrics {
    registry: Registry,
    operations: Family<OperationLabels, Counter>,
    latency: LatencyFamily,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("social_graph");

        let operations = Family::<OperationLabels, Counter>::default();
        registry.register(
            "operations",
            "Dispatched operations by outcome",
            operations.clone(),
        );

        let latency: LatencyFamily = Family::new_with_constructor(|| {
            Histogram::new(exponential_buckets(0.001, 2.0, 14))
        });
        registry.register(
            "operation_duration_seconds",
            "Operation handling time",
            latency.clone(),
        );

        Self {
            registry,
            operations,
            latency,
        }
    }

    pub fn observe(&self, service: &str, operation: &str, status: u16, elapsed: Duration) {
        self.operations
            .get_or_create(&OperationLabels {
                service: service.to_string(),
                operation: operation.to_string(),
                status: status.to_string(),
            })
            .inc();
        self.latency
            .get_or_create(&LatencyLabels {
                service: service.to_string(),
                operation: operation.to_string(),
            })
            .observe(elapsed.as_secs_f64());
    }

    pub fn render(&self) -> Result<String, fmt::Error> {
        let mut out = String::new();
        encode(&mut out, &self.registry)?;
        Ok(out)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_show_up_in_the_exposition() {
        let metrics = Metrics::new();
        metrics.observe("follow", "addFollow", 200, Duration::from_millis(3));
        metrics.observe("follow", "addFollow", 200, Duration::from_millis(5));
        metrics.observe("follow", "addFollow", 400, Duration::from_millis(1));

        let text = metrics.render().unwrap();
        assert!(text.contains(
            r#"social_graph_operations_total{service="follow",operation="addFollow",status="200"} 2"#
        ));
        assert!(text.contains("social_graph_operation_duration_seconds_count"));
        assert!(text.ends_with("# EOF\n"));
    }
}
