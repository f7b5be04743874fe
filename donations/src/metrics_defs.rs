//! Metrics definitions for the donation relay.

use shared::metrics_defs::{MetricDef, MetricType};

pub const WEBHOOKS_RECEIVED: MetricDef = MetricDef {
    name: "webhook.received",
    metric_type: MetricType::Counter,
    description: "Webhook deliveries, tagged with outcome and platform",
};

pub const DEDUPE_HITS: MetricDef = MetricDef {
    name: "webhook.duplicate",
    metric_type: MetricType::Counter,
    description: "Webhook deliveries dropped as rapid duplicates",
};

pub const DONATIONS_PROMOTED: MetricDef = MetricDef {
    name: "donation.promoted",
    metric_type: MetricType::Counter,
    description: "Queued donations moved into the active slot",
};

pub const DONATIONS_EXPIRED: MetricDef = MetricDef {
    name: "donation.expired",
    metric_type: MetricType::Counter,
    description: "Active donations cleared by the janitor after the timeout",
};

pub const QUEUED_DONATIONS: MetricDef = MetricDef {
    name: "donation.queued",
    metric_type: MetricType::Gauge,
    description: "Donations waiting in tenant queues, measured each janitor sweep",
};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds. Tagged with handler and status.",
};

pub const JANITOR_SWEEP_DURATION: MetricDef = MetricDef {
    name: "janitor.sweep.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete one janitor sweep in seconds",
};

pub const ALL_METRICS: &[MetricDef] = &[
    WEBHOOKS_RECEIVED,
    DEDUPE_HITS,
    DONATIONS_PROMOTED,
    DONATIONS_EXPIRED,
    QUEUED_DONATIONS,
    REQUEST_DURATION,
    JANITOR_SWEEP_DURATION,
];
