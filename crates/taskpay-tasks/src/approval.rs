use crate::catalog::TaskCatalog;
use crate::instance::{InstanceStatus, TaskInstance};
use crate::store::InstanceStore;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::sync::Arc;
use taskpay_ledger::{EventBus, LedgerStorage, PlatformEvent, WalletManager};
use taskpay_types::{Result, TaskPayError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Review window sampled at submission time: one to five minutes.
pub const MIN_APPROVAL_DELAY_SECS: i64 = 60;
pub const MAX_APPROVAL_DELAY_SECS: i64 = 300;

/// How often the background pass re-evaluates in-flight instances.
pub const DEFAULT_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Auto-approval engine.
///
/// A periodic pass over unapproved instances: backfills missing review
/// schedules, approves instances whose window has elapsed, and handles the
/// onboarding task's immediate approval. The ledger credit and the status
/// flip are one transaction — a failed write leaves the instance
/// unapproved and the balance untouched.
pub struct ApprovalEngine {
    catalog: Arc<TaskCatalog>,
    store: Arc<dyn InstanceStore>,
    ledger_storage: Arc<dyn LedgerStorage>,
    wallet: Arc<WalletManager>,
    events: EventBus,
}

impl ApprovalEngine {
    pub fn new(
        catalog: Arc<TaskCatalog>,
        store: Arc<dyn InstanceStore>,
        ledger_storage: Arc<dyn LedgerStorage>,
        wallet: Arc<WalletManager>,
        events: EventBus,
    ) -> Self {
        Self {
            catalog,
            store,
            ledger_storage,
            wallet,
            events,
        }
    }

    /// One evaluation pass. Only `Completed` instances are acted on, so the
    /// pass is safe to run concurrently with user-driven submissions.
    /// Returns the number of approvals performed.
    pub async fn process_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut approvals = 0;

        for mut instance in self.store.unapproved().await? {
            if instance.status != InstanceStatus::Completed {
                continue;
            }

            let result = self.process_instance(&mut instance, now).await;
            match result {
                Ok(true) => approvals += 1,
                Ok(false) => {}
                Err(e) => {
                    // Leave the instance for the next pass rather than
                    // killing the whole sweep.
                    warn!(
                        instance_id = %instance.instance_id,
                        error = %e,
                        "Approval pass skipped instance"
                    );
                }
            }
        }

        Ok(approvals)
    }

    async fn process_instance(
        &self,
        instance: &mut TaskInstance,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        // The onboarding task approves immediately: it is the gate that
        // unlocks the catalog, so no review delay applies.
        let is_onboarding = self.catalog.onboarding_task_id() == Some(instance.task_id.as_str());
        if is_onboarding {
            let profile = self.wallet.get_profile(&instance.user).await?;
            if !profile.has_done_onboarding_task {
                self.approve(instance, now, true).await?;
                return Ok(true);
            }
        }

        match instance.approval_scheduled {
            None => {
                // Submissions always carry a schedule; backfill defensively
                // for instances persisted before one was assigned.
                let delay = rand::thread_rng()
                    .gen_range(MIN_APPROVAL_DELAY_SECS..=MAX_APPROVAL_DELAY_SECS);
                instance.approval_scheduled = Some(now + Duration::seconds(delay));
                self.store.put(instance).await?;
                debug!(
                    instance_id = %instance.instance_id,
                    delay_secs = delay,
                    "Backfilled review schedule"
                );
                Ok(false)
            }
            Some(scheduled) if scheduled <= now => {
                self.approve(instance, now, false).await?;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    /// Credit the wallet and flip the instance inside one ledger
    /// transaction. Exactly one `TaskApproved` event fires per transition.
    async fn approve(
        &self,
        instance: &mut TaskInstance,
        now: DateTime<Utc>,
        onboarding: bool,
    ) -> Result<()> {
        self.ledger_storage.begin_transaction().await?;

        let result = async {
            self.wallet
                .credit_task_earnings(&instance.user, instance.payment)
                .await?;
            if onboarding {
                self.wallet.mark_onboarding_complete(&instance.user).await?;
            }
            instance.approve(now)?;
            self.store.put(instance).await?;
            Ok::<_, TaskPayError>(())
        }
        .await;

        match result {
            Ok(()) => {
                self.ledger_storage.commit_transaction().await?;
                info!(
                    instance_id = %instance.instance_id,
                    user = %instance.user,
                    amount = instance.payment.to_usd(),
                    onboarding,
                    "✅ Task approved and credited"
                );
                self.events.emit(PlatformEvent::TaskApproved {
                    user: instance.user.clone(),
                    instance_id: instance.instance_id.clone(),
                    amount: instance.payment,
                    timestamp: now,
                });
                if onboarding {
                    self.events.emit(PlatformEvent::OnboardingCompleted {
                        user: instance.user.clone(),
                        timestamp: now,
                    });
                }
                Ok(())
            }
            Err(e) => {
                self.ledger_storage.rollback_transaction().await?;
                self.wallet.invalidate(&instance.user).await;
                warn!(
                    instance_id = %instance.instance_id,
                    error = %e,
                    "❌ Approval rolled back"
                );
                Err(e)
            }
        }
    }

    /// Spawn the recurring background pass.
    pub fn start_polling(self: Arc<Self>, interval: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match self.process_due(Utc::now()).await {
                    Ok(0) => {}
                    Ok(n) => debug!(approvals = n, "Approval pass completed"),
                    Err(e) => warn!(error = %e, "Approval pass failed"),
                }
            }
        })
    }
}
