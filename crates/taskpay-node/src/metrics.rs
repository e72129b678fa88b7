use prometheus::{Encoder, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    pub tasks_started: IntCounter,
    pub tasks_submitted: IntCounter,
    pub tasks_approved: IntCounter,
    pub quota_rejections: IntCounter,

    pub withdrawals_accepted: IntCounter,
    pub withdrawals_blocked: IntCounter,

    pub payments_initiated: IntCounter,
    pub upgrades_activated: IntCounter,
    pub referral_bonuses: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let c = IntCounter::new(name, help).expect("valid metric name");
    registry
        .register(Box::new(c.clone()))
        .expect("metric registered once");
    c
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let tasks_started = counter(
            &registry,
            "taskpay_tasks_started_total",
            "Task attempts started",
        );
        let tasks_submitted = counter(
            &registry,
            "taskpay_tasks_submitted_total",
            "Task attempts submitted for review",
        );
        let tasks_approved = counter(
            &registry,
            "taskpay_tasks_approved_total",
            "Task attempts approved and credited",
        );
        let quota_rejections = counter(
            &registry,
            "taskpay_quota_rejections_total",
            "Task starts refused by the daily quota",
        );
        let withdrawals_accepted = counter(
            &registry,
            "taskpay_withdrawals_accepted_total",
            "Withdrawal requests accepted",
        );
        let withdrawals_blocked = counter(
            &registry,
            "taskpay_withdrawals_blocked_total",
            "Withdrawal requests blocked by eligibility gates",
        );
        let payments_initiated = counter(
            &registry,
            "taskpay_payments_initiated_total",
            "Push payments forwarded to the provider",
        );
        let upgrades_activated = counter(
            &registry,
            "taskpay_upgrades_activated_total",
            "VIP tier upgrades finalized",
        );
        let referral_bonuses = counter(
            &registry,
            "taskpay_referral_bonuses_total",
            "Referral bonuses credited",
        );

        Self {
            registry: Arc::new(registry),
            tasks_started,
            tasks_submitted,
            tasks_approved,
            quota_rejections,
            withdrawals_accepted,
            withdrawals_blocked,
            payments_initiated,
            upgrades_activated,
            referral_bonuses,
        }
    }

    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder
            .encode(&self.registry.gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
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
    fn test_counters_show_up_in_exposition() {
        let metrics = Metrics::new();
        metrics.tasks_started.inc();
        metrics.tasks_started.inc();
        metrics.withdrawals_accepted.inc();

        let text = metrics.gather();
        assert!(text.contains("taskpay_tasks_started_total 2"));
        assert!(text.contains("taskpay_withdrawals_accepted_total 1"));
    }
}
