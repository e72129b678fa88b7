use crate::gateway::{PushGateway, PushRequest, TransactionStatus};
use crate::rate::{self, ExchangeRateProvider};
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use taskpay_ledger::{EventBus, PlatformEvent, ReferralManager, Tier, TierPlan, WalletManager};
use taskpay_types::{phone, Result, TaskPayError, UserId};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct UpgradeConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UpgradeOutcome {
    Activated { tier: Tier, daily_tasks: u32 },
    Failed { status: TransactionStatus },
    TimedOut,
    Cancelled,
}

/// Paid tier upgrade over a push payment.
///
/// Tier and quota mutate only after the provider reports `Success`; a
/// failed, cancelled or timed-out payment leaves the profile untouched.
/// Polling stops at the first terminal outcome, the timeout, or an explicit
/// cancel — whichever comes first — with no side effects afterwards.
pub struct UpgradeFlow {
    gateway: Arc<dyn PushGateway>,
    wallet: Arc<WalletManager>,
    referrals: Arc<ReferralManager>,
    rate: Arc<dyn ExchangeRateProvider>,
    events: EventBus,
    config: UpgradeConfig,
    /// Per-user latch: one upgrade attempt at a time, so a double-click
    /// cannot issue two pushes for the same logical purchase.
    in_flight: Mutex<HashSet<UserId>>,
}

impl UpgradeFlow {
    pub fn new(
        gateway: Arc<dyn PushGateway>,
        wallet: Arc<WalletManager>,
        referrals: Arc<ReferralManager>,
        rate: Arc<dyn ExchangeRateProvider>,
        events: EventBus,
        config: UpgradeConfig,
    ) -> Self {
        Self {
            gateway,
            wallet,
            referrals,
            rate,
            events,
            config,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub async fn initiate(
        &self,
        user: &UserId,
        tier: Tier,
        phone_number: &str,
        cancel: watch::Receiver<bool>,
    ) -> Result<UpgradeOutcome> {
        let plan = self
            .wallet
            .tiers()
            .plan(tier)
            .cloned()
            .ok_or_else(|| TaskPayError::Validation("Select a VIP tier to upgrade".to_string()))?;
        let msisdn = phone::normalize_msisdn(phone_number).ok_or_else(|| {
            TaskPayError::Validation(format!("Invalid mobile money number: {}", phone_number))
        })?;

        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(user.clone()) {
                return Err(TaskPayError::Validation(
                    "An upgrade is already in progress for this account".to_string(),
                ));
            }
        }

        let result = self.run(user, tier, &plan, msisdn, cancel).await;
        self.in_flight.lock().await.remove(user);
        result
    }

    async fn run(
        &self,
        user: &UserId,
        tier: Tier,
        plan: &TierPlan,
        msisdn: String,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<UpgradeOutcome> {
        let rate_now = self.rate.current_rate();
        let amount_kes = rate::to_kes(plan.price, rate_now);

        // Fresh reference per attempt; retries never reuse one.
        let reference = format!(
            "VIP_{}_{}_{:04}",
            user,
            Utc::now().timestamp_millis(),
            rand::thread_rng().gen_range(0..10_000u32)
        );

        let push = PushRequest {
            phone: msisdn,
            amount_kes,
            reference: reference.clone(),
            description: Some(format!(
                "{} upgrade ({} at {:.2} KES/USD)",
                tier, plan.price, rate_now
            )),
        };
        let ack = self.gateway.initiate_push(&push).await?;
        let poll_reference = ack.provider_reference.unwrap_or(reference);

        info!(
            user = %user,
            tier = %tier,
            amount_kes,
            reference = %poll_reference,
            "⏳ Push sent, awaiting payment confirmation"
        );

        let deadline = tokio::time::Instant::now() + self.config.timeout;
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut cancel_closed = false;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.gateway.transaction_status(&poll_reference).await {
                        Ok(TransactionStatus::Success) => {
                            return self.finalize(user, tier).await;
                        }
                        Ok(status) if status.is_terminal() => {
                            warn!(user = %user, ?status, "Payment did not complete");
                            return Ok(UpgradeOutcome::Failed { status });
                        }
                        Ok(TransactionStatus::Queued) => {}
                        Ok(_) => unreachable!("all terminal statuses are handled above"),
                        // Transient poll failures are retried on the next tick
                        Err(e) => debug!(error = %e, "Status poll failed"),
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(user = %user, reference = %poll_reference, "Payment confirmation timed out");
                    return Ok(UpgradeOutcome::TimedOut);
                }
                changed = cancel.changed(), if !cancel_closed => {
                    match changed {
                        Ok(()) => {
                            if *cancel.borrow() {
                                info!(user = %user, "Upgrade cancelled by user");
                                return Ok(UpgradeOutcome::Cancelled);
                            }
                        }
                        Err(_) => cancel_closed = true,
                    }
                }
            }
        }
    }

    async fn finalize(&self, user: &UserId, tier: Tier) -> Result<UpgradeOutcome> {
        let now = Utc::now();
        let profile = self.wallet.activate_vip(user, tier, now).await?;
        let daily_tasks = self.wallet.tiers().quota(tier);

        self.events.emit(PlatformEvent::VipActivated {
            user: user.clone(),
            tier,
            daily_tasks,
            timestamp: now,
        });

        // The referrer's VIP bonus rides on the upgrade; idempotent per
        // referred user.
        self.referrals.record_vip_upgrade(&profile).await?;

        Ok(UpgradeOutcome::Activated { tier, daily_tasks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::PushAck;
    use crate::rate::FixedRateProvider;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use taskpay_ledger::{
        LedgerStorage, MemoryLedgerStorage, ReferralPolicy, SignupRequest, TierPolicy,
    };
    use taskpay_types::UsdAmount;

    struct MockGateway {
        statuses: StdMutex<VecDeque<TransactionStatus>>,
        pushes: StdMutex<Vec<PushRequest>>,
    }

    impl MockGateway {
        fn with_statuses(statuses: &[TransactionStatus]) -> Arc<Self> {
            Arc::new(Self {
                statuses: StdMutex::new(statuses.iter().copied().collect()),
                pushes: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl PushGateway for MockGateway {
        async fn initiate_push(&self, request: &PushRequest) -> Result<PushAck> {
            self.pushes.lock().unwrap().push(request.clone());
            Ok(PushAck {
                success: true,
                provider_reference: Some(format!("prov_{}", request.reference)),
                message: None,
            })
        }

        async fn transaction_status(&self, _reference: &str) -> Result<TransactionStatus> {
            let mut statuses = self.statuses.lock().unwrap();
            Ok(if statuses.len() > 1 {
                statuses.pop_front().unwrap()
            } else {
                *statuses.front().unwrap_or(&TransactionStatus::Queued)
            })
        }
    }

    struct Fixture {
        wallet: Arc<WalletManager>,
        flow: UpgradeFlow,
        gateway: Arc<MockGateway>,
    }

    fn fixture(statuses: &[TransactionStatus], config: UpgradeConfig) -> Fixture {
        let storage: Arc<dyn LedgerStorage> = Arc::new(MemoryLedgerStorage::new());
        let wallet = Arc::new(WalletManager::new(storage.clone(), TierPolicy::default()));
        let events = EventBus::new();
        let referrals = Arc::new(ReferralManager::new(
            storage,
            wallet.clone(),
            ReferralPolicy::default(),
            events.clone(),
        ));
        let gateway = MockGateway::with_statuses(statuses);
        let flow = UpgradeFlow::new(
            gateway.clone(),
            wallet.clone(),
            referrals,
            Arc::new(FixedRateProvider(130.0)),
            events,
            config,
        );
        Fixture {
            wallet,
            flow,
            gateway,
        }
    }

    fn fast_config() -> UpgradeConfig {
        UpgradeConfig {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_millis(300),
        }
    }

    async fn make_user(fx: &Fixture, referred_by: Option<String>) -> UserId {
        fx.wallet
            .create_profile(
                SignupRequest {
                    name: "Upgrader".to_string(),
                    email: format!("up{}@example.com", rand::random::<u32>()),
                    phone: "0712345678".to_string(),
                    referred_by,
                },
                Utc::now(),
            )
            .await
            .unwrap()
            .user_id
    }

    fn idle_cancel() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        // Keep the sender alive for the duration of the test process
        std::mem::forget(tx);
        rx
    }

    #[tokio::test]
    async fn test_success_finalizes_tier_and_quota() {
        let fx = fixture(
            &[
                TransactionStatus::Queued,
                TransactionStatus::Queued,
                TransactionStatus::Success,
            ],
            fast_config(),
        );
        let user = make_user(&fx, None).await;

        let outcome = fx
            .flow
            .initiate(&user, Tier::Silver, "0712345678", idle_cancel())
            .await
            .unwrap();
        match outcome {
            UpgradeOutcome::Activated { tier, daily_tasks } => {
                assert_eq!(tier, Tier::Silver);
                assert_eq!(daily_tasks, 20);
            }
            other => panic!("expected activation, got {:?}", other),
        }

        let profile = fx.wallet.get_profile(&user).await.unwrap();
        assert!(profile.is_vip);
        assert_eq!(profile.tier, Tier::Silver);
        assert_eq!(profile.daily_tasks_remaining, 20);

        // The push carried the converted local amount: $20 at 130.0
        let pushes = fx.gateway.pushes.lock().unwrap();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].amount_kes, 2600);
        assert_eq!(pushes[0].phone, "254712345678");
    }

    #[tokio::test]
    async fn test_failed_payment_leaves_profile_unchanged() {
        let fx = fixture(&[TransactionStatus::Failed], fast_config());
        let user = make_user(&fx, None).await;

        let outcome = fx
            .flow
            .initiate(&user, Tier::Gold, "0712345678", idle_cancel())
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            UpgradeOutcome::Failed {
                status: TransactionStatus::Failed
            }
        ));

        let profile = fx.wallet.get_profile(&user).await.unwrap();
        assert!(!profile.is_vip);
        assert_eq!(profile.tier, Tier::Standard);
        assert_eq!(profile.daily_tasks_remaining, 2);
        assert!(profile.vip_upgraded_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_aborts_without_mutation() {
        let fx = fixture(
            &[TransactionStatus::Queued],
            UpgradeConfig {
                poll_interval: Duration::from_secs(3),
                timeout: Duration::from_secs(120),
            },
        );
        let user = make_user(&fx, None).await;

        let outcome = fx
            .flow
            .initiate(&user, Tier::Bronze, "0712345678", idle_cancel())
            .await
            .unwrap();
        assert!(matches!(outcome, UpgradeOutcome::TimedOut));

        let profile = fx.wallet.get_profile(&user).await.unwrap();
        assert!(!profile.is_vip);
    }

    #[tokio::test]
    async fn test_cancellation_stops_polling() {
        let fx = fixture(&[TransactionStatus::Queued], fast_config());
        let user = make_user(&fx, None).await;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let _ = cancel_tx.send(true);
        });

        let outcome = fx
            .flow
            .initiate(&user, Tier::Bronze, "0712345678", cancel_rx)
            .await
            .unwrap();
        assert!(matches!(outcome, UpgradeOutcome::Cancelled));

        let profile = fx.wallet.get_profile(&user).await.unwrap();
        assert!(!profile.is_vip);
    }

    #[tokio::test]
    async fn test_invalid_inputs_rejected_before_any_push() {
        let fx = fixture(&[TransactionStatus::Success], fast_config());
        let user = make_user(&fx, None).await;

        assert!(fx
            .flow
            .initiate(&user, Tier::Standard, "0712345678", idle_cancel())
            .await
            .is_err());
        assert!(fx
            .flow
            .initiate(&user, Tier::Bronze, "0812345678", idle_cancel())
            .await
            .is_err());
        assert!(fx.gateway.pushes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_referrer_earns_vip_bonus_on_activation() {
        let fx = fixture(&[TransactionStatus::Success], fast_config());
        let referrer_id = make_user(&fx, None).await;
        let referrer = fx.wallet.get_profile(&referrer_id).await.unwrap();
        let user = make_user(&fx, Some(referrer.referral_code.clone())).await;

        fx.flow
            .initiate(&user, Tier::Bronze, "0712345678", idle_cancel())
            .await
            .unwrap();

        let referrer = fx.wallet.get_profile(&referrer_id).await.unwrap();
        assert_eq!(referrer.vip_referrals, 1);
        assert_eq!(referrer.balance, UsdAmount::from_usd(10.0));
    }

    #[tokio::test]
    async fn test_in_flight_latch_blocks_double_submission() {
        let fx = Arc::new(fixture(&[TransactionStatus::Queued], fast_config()));
        let user = make_user(&fx, None).await;

        let first = {
            let fx = fx.clone();
            let user = user.clone();
            let (tx, rx) = watch::channel(false);
            let handle = tokio::spawn(async move {
                fx.flow.initiate(&user, Tier::Bronze, "0712345678", rx).await
            });
            (handle, tx)
        };

        // Give the first attempt time to take the latch
        tokio::time::sleep(Duration::from_millis(30)).await;

        let err = fx
            .flow
            .initiate(&user, Tier::Bronze, "0712345678", idle_cancel())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskPayError::Validation(_)));

        // Cancel the first attempt and make sure the latch releases
        let _ = first.1.send(true);
        let outcome = first.0.await.unwrap().unwrap();
        assert!(matches!(outcome, UpgradeOutcome::Cancelled));

        let fresh = fx
            .flow
            .initiate(&user, Tier::Bronze, "0712345678", idle_cancel())
            .await;
        assert!(fresh.is_ok());
    }
}
