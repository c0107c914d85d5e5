//! Prometheus metrics for the reconciler
//!
//! # Exported metrics
//! - `ltm_reconcile_duration_seconds` (histogram): operation duration labeled by controller.
//! - `ltm_reconcile_errors_total` (counter): failed operations labeled by controller and kind.
//! - `ltm_membership_changes_total` (counter): member add/remove calls labeled by pool and action.
//! - `ltm_node_delete_remediations_total` (counter): remediation rounds labeled by partition.

use std::sync::atomic::AtomicU64;

use once_cell::sync::Lazy;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use crate::error::Error;

/// Labels for reconcile metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReconcileLabels {
    /// Controller name, e.g. "pool"
    pub controller: String,
}

/// Labels for error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ErrorLabels {
    pub controller: String,
    /// Error kind, e.g. "store", "http", "exhausted"
    pub kind: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct MembershipLabels {
    pub partition: String,
    pub pool: String,
    /// "add" or "remove"
    pub action: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PartitionLabels {
    pub partition: String,
}

pub static RECONCILE_DURATION_SECONDS: Lazy<Family<ReconcileLabels, Histogram>> = Lazy::new(|| {
    fn reconcile_histogram() -> Histogram {
        // 1ms .. ~32s across 16 buckets.
        Histogram::new(exponential_buckets(0.001, 2.0, 16))
    }

    Family::new_with_constructor(reconcile_histogram)
});

pub static RECONCILE_ERRORS_TOTAL: Lazy<Family<ErrorLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static MEMBERSHIP_CHANGES_TOTAL: Lazy<Family<MembershipLabels, Counter<u64, AtomicU64>>> =
    Lazy::new(Family::default);

pub static NODE_DELETE_REMEDIATIONS_TOTAL: Lazy<
    Family<PartitionLabels, Counter<u64, AtomicU64>>,
> = Lazy::new(Family::default);

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();

    registry.register(
        "ltm_reconcile_duration_seconds",
        "Duration of controller operations in seconds",
        RECONCILE_DURATION_SECONDS.clone(),
    );
    registry.register(
        "ltm_reconcile_errors",
        "Total number of failed controller operations",
        RECONCILE_ERRORS_TOTAL.clone(),
    );
    registry.register(
        "ltm_membership_changes",
        "Pool member add/remove calls issued",
        MEMBERSHIP_CHANGES_TOTAL.clone(),
    );
    registry.register(
        "ltm_node_delete_remediations",
        "Remediation rounds run while deleting referenced nodes",
        NODE_DELETE_REMEDIATIONS_TOTAL.clone(),
    );

    registry
});

pub fn observe_reconcile_duration_seconds(controller: &str, seconds: f64) {
    let labels = ReconcileLabels {
        controller: controller.to_string(),
    };
    RECONCILE_DURATION_SECONDS
        .get_or_create(&labels)
        .observe(seconds);
}

pub fn inc_reconcile_error(controller: &str, error: &Error) {
    let kind = match error {
        Error::Store { .. } => "store",
        Error::HttpError(_) => "http",
        Error::SerializationError(_) => "serialization",
        Error::ConfigError(_) => "config",
        Error::ValidationError(_) | Error::ManifestError(_) => "validation",
        Error::DeletionExhausted { .. } => "exhausted",
    };
    let labels = ErrorLabels {
        controller: controller.to_string(),
        kind: kind.to_string(),
    };
    RECONCILE_ERRORS_TOTAL.get_or_create(&labels).inc();
}

pub fn inc_membership_change(partition: &str, pool: &str, action: &str) {
    let labels = MembershipLabels {
        partition: partition.to_string(),
        pool: pool.to_string(),
        action: action.to_string(),
    };
    MEMBERSHIP_CHANGES_TOTAL.get_or_create(&labels).inc();
}

pub fn inc_node_delete_remediation(partition: &str) {
    let labels = PartitionLabels {
        partition: partition.to_string(),
    };
    NODE_DELETE_REMEDIATIONS_TOTAL.get_or_create(&labels).inc();
}

/// Render the registry in the text exposition format
pub fn encode_metrics() -> String {
    let mut buffer = String::new();
    if encode(&mut buffer, &REGISTRY).is_err() {
        buffer.clear();
    }
    buffer
}
