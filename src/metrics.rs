//! Prometheus counters for the webhook pipeline and background jobs.
//!
//! - `webhook_events_total{stage}` - webhook invocations by stage (`start`, `end`, `fail`)
//! - `webhook_events_processed_total{kind}` - events handled, by `object_kind`
//! - `compass_events_sent_total{kind}` - build/deployment events and metric values sent to Compass
//! - `jobs_total{kind,outcome}` - background jobs by outcome

use anyhow::Result;
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static WEBHOOK_EVENTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("webhook_events_total", "Webhook invocations by stage"),
        &["stage"],
    )
    .expect("Failed to create WEBHOOK_EVENTS_TOTAL metric - this should never happen")
});

static WEBHOOK_EVENTS_PROCESSED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "webhook_events_processed_total",
            "Webhook events processed, by event kind",
        ),
        &["kind"],
    )
    .expect("Failed to create WEBHOOK_EVENTS_PROCESSED_TOTAL metric - this should never happen")
});

static COMPASS_EVENTS_SENT_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("compass_events_sent_total", "Events and metric values sent to Compass"),
        &["kind"],
    )
    .expect("Failed to create COMPASS_EVENTS_SENT_TOTAL metric - this should never happen")
});

static JOBS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("jobs_total", "Background jobs by kind and outcome"),
        &["kind", "outcome"],
    )
    .expect("Failed to create JOBS_TOTAL metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(WEBHOOK_EVENTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WEBHOOK_EVENTS_PROCESSED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(COMPASS_EVENTS_SENT_TOTAL.clone()))?;
    REGISTRY.register(Box::new(JOBS_TOTAL.clone()))?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookStage {
    Start,
    End,
    Fail,
}

impl WebhookStage {
    fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Fail => "fail",
        }
    }
}

pub fn increment_webhook_stage(stage: WebhookStage) {
    WEBHOOK_EVENTS_TOTAL.with_label_values(&[stage.as_str()]).inc();
}

pub fn increment_webhook_processed(kind: &str) {
    WEBHOOK_EVENTS_PROCESSED_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_compass_events(kind: &str, count: u64) {
    COMPASS_EVENTS_SENT_TOTAL.with_label_values(&[kind]).inc_by(count);
}

pub fn increment_jobs(kind: &str, succeeded: bool) {
    let outcome = if succeeded { "success" } else { "failure" };
    JOBS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

pub fn webhook_stage_count(stage: WebhookStage) -> u64 {
    WEBHOOK_EVENTS_TOTAL.with_label_values(&[stage.as_str()]).get()
}

pub fn webhook_processed_count(kind: &str) -> u64 {
    WEBHOOK_EVENTS_PROCESSED_TOTAL.with_label_values(&[kind]).get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increase_by_label() {
        let before = webhook_processed_count("tag_push");
        increment_webhook_processed("tag_push");
        increment_webhook_processed("tag_push");
        assert_eq!(webhook_processed_count("tag_push"), before + 2);

        let start = webhook_stage_count(WebhookStage::Start);
        increment_webhook_stage(WebhookStage::Start);
        assert!(webhook_stage_count(WebhookStage::Start) > start);
    }
}
