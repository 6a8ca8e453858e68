use prometheus_client::{
    encoding::{EncodeLabelSet, EncodeLabelValue},
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::Registry,
};
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ReconcileMetrics {
    reconciles: Family<OutcomeLabels, Counter>,
    policy_writes: Family<WriteLabels, Counter>,
    duration: Histogram,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Outcome {
    Synced,
    TornDown,
    Invalid,
    Failed,
}

#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Op {
    Create,
    Update,
    Delete,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    outcome: Outcome,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct WriteLabels {
    op: Op,
}

// === impl ReconcileMetrics ===

impl ReconcileMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let reconciles = Family::default();
        prom.register(
            "reconciles",
            "Count of security group reconciliations by outcome",
            reconciles.clone(),
        );

        let policy_writes = Family::default();
        prom.register(
            "policy_writes",
            "Count of network policy writes",
            policy_writes.clone(),
        );

        let duration = Histogram::new([0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0].into_iter());
        prom.register(
            "reconcile_duration_seconds",
            "Time spent reconciling a security group",
            duration.clone(),
        );

        Self {
            reconciles,
            policy_writes,
            duration,
        }
    }

    pub(crate) fn reconciled(&self, outcome: Outcome, elapsed: Duration) {
        self.reconciles
            .get_or_create(&OutcomeLabels { outcome })
            .inc();
        self.duration.observe(elapsed.as_secs_f64());
    }

    pub(crate) fn wrote(&self, op: Op) {
        self.policy_writes.get_or_create(&WriteLabels { op }).inc();
    }
}

impl Default for ReconcileMetrics {
    /// Metrics that are not exported anywhere.
    fn default() -> Self {
        Self::register(&mut Registry::default())
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => "create".fmt(f),
            Self::Update => "update".fmt(f),
            Self::Delete => "delete".fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus_client::encoding::text::encode;

    #[test]
    fn encodes_families() {
        let mut registry = Registry::with_prefix("security_group");
        let metrics = ReconcileMetrics::register(&mut registry);
        metrics.reconciled(Outcome::Synced, Duration::from_millis(20));
        metrics.wrote(Op::Create);
        metrics.wrote(Op::Create);

        let mut text = String::new();
        encode(&mut text, &registry).unwrap();
        assert!(
            text.contains("security_group_reconciles_total{outcome=\"Synced\"} 1"),
            "{text}"
        );
        assert!(
            text.contains("security_group_policy_writes_total{op=\"Create\"} 2"),
            "{text}"
        );
        assert!(
            text.contains("security_group_reconcile_duration_seconds_count 1"),
            "{text}"
        );
    }
}
