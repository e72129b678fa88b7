use crate::events::{EventBus, PlatformEvent};
use crate::storage::LedgerStorage;
use crate::types::{UserProfile, WithdrawalMethod, WithdrawalRequest};
use crate::wallet::WalletManager;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taskpay_types::{Result, TaskPayError, UsdAmount, UserId};
use tracing::{info, warn};

const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralGates {
    pub min_total_referrals: u32,
    pub min_vip_referrals: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalPolicy {
    /// Minimum payout after the fee is taken.
    pub min_net_payout: UsdAmount,
    pub fee_percent: f64,
    pub min_approved_tasks: u32,
    /// Social-growth gates. Off by default.
    pub referral_gates: Option<ReferralGates>,
}

impl Default for WithdrawalPolicy {
    fn default() -> Self {
        Self {
            min_net_payout: UsdAmount::from_usd(10.0),
            fee_percent: 2.0,
            min_approved_tasks: 15,
            referral_gates: None,
        }
    }
}

impl WithdrawalPolicy {
    /// Smallest balance that can clear the net-payout floor:
    /// `floor / (1 - fee)`.
    pub fn min_balance_required(&self) -> UsdAmount {
        UsdAmount::from_usd(self.min_net_payout.to_usd() / (1.0 - self.fee_percent / 100.0))
    }
}

/// One eligibility condition with the user's progress toward it. The
/// report is the UX contract: callers render every gate, met or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gate {
    pub name: String,
    pub met: bool,
    pub current: f64,
    pub required: f64,
}

impl Gate {
    fn new(name: &str, met: bool, current: f64, required: f64) -> Self {
        Self {
            name: name.to_string(),
            met,
            current,
            required,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityReport {
    pub gates: Vec<Gate>,
    pub fee: UsdAmount,
    pub net: UsdAmount,
}

impl EligibilityReport {
    pub fn is_eligible(&self) -> bool {
        self.gates.iter().all(|g| g.met)
    }

    pub fn unmet(&self) -> Vec<&Gate> {
        self.gates.iter().filter(|g| !g.met).collect()
    }

    pub fn summary(&self) -> String {
        self.unmet()
            .iter()
            .map(|g| g.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalReceipt {
    pub request: WithdrawalRequest,
    pub balance_after: UsdAmount,
}

/// Outcome of a submission attempt. Ineligibility is an ordinary outcome
/// carrying the full checklist, not an error.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WithdrawalOutcome {
    Accepted(WithdrawalReceipt),
    Ineligible(EligibilityReport),
}

pub struct WithdrawalManager {
    storage: Arc<dyn LedgerStorage>,
    wallet: Arc<WalletManager>,
    policy: WithdrawalPolicy,
    events: EventBus,
}

impl WithdrawalManager {
    pub fn new(
        storage: Arc<dyn LedgerStorage>,
        wallet: Arc<WalletManager>,
        policy: WithdrawalPolicy,
        events: EventBus,
    ) -> Self {
        Self {
            storage,
            wallet,
            policy,
            events,
        }
    }

    pub fn policy(&self) -> &WithdrawalPolicy {
        &self.policy
    }

    /// Evaluate every gate against the profile and the requested amount.
    pub fn check_eligibility(&self, profile: &UserProfile, amount: UsdAmount) -> EligibilityReport {
        let fee = amount.percent(self.policy.fee_percent);
        let net = amount.saturating_sub(fee);

        let mut gates = vec![
            Gate::new(
                "onboarding",
                profile.has_done_onboarding_task,
                if profile.has_done_onboarding_task {
                    1.0
                } else {
                    0.0
                },
                1.0,
            ),
            Gate::new(
                "amount",
                net >= self.policy.min_net_payout,
                net.to_usd(),
                self.policy.min_net_payout.to_usd(),
            ),
            Gate::new(
                "balance",
                profile.balance >= amount,
                profile.balance.to_usd(),
                amount.to_usd(),
            ),
            Gate::new(
                "approved_tasks",
                profile.approved_tasks >= self.policy.min_approved_tasks,
                profile.approved_tasks as f64,
                self.policy.min_approved_tasks as f64,
            ),
        ];

        if let Some(ref social) = self.policy.referral_gates {
            gates.push(Gate::new(
                "referrals",
                profile.total_referrals >= social.min_total_referrals,
                profile.total_referrals as f64,
                social.min_total_referrals as f64,
            ));
            gates.push(Gate::new(
                "vip_referrals",
                profile.vip_referrals >= social.min_vip_referrals,
                profile.vip_referrals as f64,
                social.min_vip_referrals as f64,
            ));
        }

        EligibilityReport { gates, fee, net }
    }

    /// Submit a withdrawal. The ledger debits the gross requested amount;
    /// the fee is informational, taken on the payment rail. The balance
    /// re-check and the debit are one atomic step, so a concurrent double
    /// submission cannot double-debit.
    pub async fn submit(
        &self,
        user: &UserId,
        amount: UsdAmount,
        method: WithdrawalMethod,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalOutcome> {
        if amount.is_zero() {
            return Err(TaskPayError::Validation(
                "Withdrawal amount must be positive".to_string(),
            ));
        }
        let method = method.validated()?;

        let profile = self.wallet.get_profile(user).await?;
        let report = self.check_eligibility(&profile, amount);
        if !report.is_eligible() {
            warn!(
                user = %user,
                amount = amount.to_usd(),
                unmet = %report.summary(),
                "Withdrawal blocked by eligibility gates"
            );
            return Ok(WithdrawalOutcome::Ineligible(report));
        }

        let request = WithdrawalRequest::new(user.clone(), amount, report.fee, method, now);

        // Record + debit inside one storage transaction. The debit re-reads
        // the balance from storage, closing the race against a stale
        // display balance.
        self.storage.begin_transaction().await?;
        let debited = async {
            let profile = self.wallet.debit_balance(user, amount).await?;
            self.storage.record_withdrawal(&request).await?;
            Ok::<_, TaskPayError>(profile)
        }
        .await;

        match debited {
            Ok(profile) => {
                self.storage.commit_transaction().await?;
                info!(
                    user = %user,
                    request_id = %request.id,
                    amount = amount.to_usd(),
                    fee = report.fee.to_usd(),
                    net = report.net.to_usd(),
                    "✅ Withdrawal submitted"
                );
                self.events.emit(PlatformEvent::WithdrawalSubmitted {
                    user: user.clone(),
                    request_id: request.id.clone(),
                    amount,
                    timestamp: now,
                });
                Ok(WithdrawalOutcome::Accepted(WithdrawalReceipt {
                    request,
                    balance_after: profile.balance,
                }))
            }
            Err(e) => {
                self.storage.rollback_transaction().await?;
                self.wallet.invalidate(user).await;
                warn!(user = %user, error = %e, "❌ Withdrawal rolled back");
                Err(e)
            }
        }
    }

    /// Most recent requests first, capped for display.
    pub async fn history(&self, user: &UserId) -> Result<Vec<WithdrawalRequest>> {
        let mut withdrawals = self.storage.withdrawals_for_user(user).await?;
        withdrawals.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        withdrawals.truncate(HISTORY_LIMIT);
        Ok(withdrawals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryLedgerStorage;
    use crate::types::{SignupRequest, TierPolicy};

    struct Fixture {
        wallet: Arc<WalletManager>,
        withdrawals: WithdrawalManager,
    }

    fn fixture() -> Fixture {
        let storage: Arc<dyn LedgerStorage> = Arc::new(MemoryLedgerStorage::new());
        let wallet = Arc::new(WalletManager::new(storage.clone(), TierPolicy::default()));
        let withdrawals = WithdrawalManager::new(
            storage,
            wallet.clone(),
            WithdrawalPolicy::default(),
            EventBus::new(),
        );
        Fixture {
            wallet,
            withdrawals,
        }
    }

    async fn eligible_user(fx: &Fixture, balance: f64) -> UserId {
        let profile = fx
            .wallet
            .create_profile(
                SignupRequest {
                    name: "Wendy".to_string(),
                    email: "wendy@example.com".to_string(),
                    phone: "0712345678".to_string(),
                    referred_by: None,
                },
                Utc::now(),
            )
            .await
            .unwrap();
        let user = profile.user_id;

        fx.wallet
            .update_profile(&user, |p| {
                p.has_done_onboarding_task = true;
                p.approved_tasks = 20;
                p.balance = UsdAmount::from_usd(balance);
                Ok(())
            })
            .await
            .unwrap();
        user
    }

    fn mobile_money() -> WithdrawalMethod {
        WithdrawalMethod::MobileMoney {
            phone: "0712345678".to_string(),
        }
    }

    #[tokio::test]
    async fn test_net_below_floor_is_rejected() {
        let fx = fixture();
        let user = eligible_user(&fx, 100.0).await;

        // $10.00 gross -> $9.80 net, below the $10.00 floor
        let outcome = fx
            .withdrawals
            .submit(&user, UsdAmount::from_usd(10.0), mobile_money(), Utc::now())
            .await
            .unwrap();
        match outcome {
            WithdrawalOutcome::Ineligible(report) => {
                assert!(report.unmet().iter().any(|g| g.name == "amount"));
            }
            WithdrawalOutcome::Accepted(_) => panic!("should be rejected"),
        }

        // Balance untouched
        let profile = fx.wallet.get_profile(&user).await.unwrap();
        assert_eq!(profile.balance, UsdAmount::from_usd(100.0));
    }

    #[tokio::test]
    async fn test_net_above_floor_is_accepted_and_debits_gross() {
        let fx = fixture();
        let user = eligible_user(&fx, 100.0).await;

        // $10.21 gross -> net ≈ $10.006, just over the floor
        let outcome = fx
            .withdrawals
            .submit(
                &user,
                UsdAmount::from_cents(1021),
                mobile_money(),
                Utc::now(),
            )
            .await
            .unwrap();
        let receipt = match outcome {
            WithdrawalOutcome::Accepted(receipt) => receipt,
            WithdrawalOutcome::Ineligible(r) => panic!("unexpected rejection: {}", r.summary()),
        };

        assert!(receipt.request.net > UsdAmount::from_usd(10.0));
        // Ledger debits the gross amount, not gross minus fee
        let profile = fx.wallet.get_profile(&user).await.unwrap();
        assert_eq!(
            profile.balance,
            UsdAmount::from_usd(100.0)
                .checked_sub(UsdAmount::from_cents(1021))
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_gates_block_onboarding_and_task_count() {
        let fx = fixture();
        let user = eligible_user(&fx, 100.0).await;
        fx.wallet
            .update_profile(&user, |p| {
                p.has_done_onboarding_task = false;
                p.approved_tasks = 3;
                Ok(())
            })
            .await
            .unwrap();

        let outcome = fx
            .withdrawals
            .submit(&user, UsdAmount::from_usd(20.0), mobile_money(), Utc::now())
            .await
            .unwrap();
        let WithdrawalOutcome::Ineligible(report) = outcome else {
            panic!("should be rejected");
        };

        let unmet: Vec<&str> = report.unmet().iter().map(|g| g.name.as_str()).collect();
        assert!(unmet.contains(&"onboarding"));
        assert!(unmet.contains(&"approved_tasks"));
        // Progress is reported toward each unmet gate
        let tasks_gate = report
            .gates
            .iter()
            .find(|g| g.name == "approved_tasks")
            .unwrap();
        assert_eq!(tasks_gate.current, 3.0);
        assert_eq!(tasks_gate.required, 15.0);
    }

    #[tokio::test]
    async fn test_referral_gates_when_enabled() {
        let storage: Arc<dyn LedgerStorage> = Arc::new(MemoryLedgerStorage::new());
        let wallet = Arc::new(WalletManager::new(storage.clone(), TierPolicy::default()));
        let withdrawals = WithdrawalManager::new(
            storage,
            wallet.clone(),
            WithdrawalPolicy {
                referral_gates: Some(ReferralGates {
                    min_total_referrals: 5,
                    min_vip_referrals: 2,
                }),
                ..WithdrawalPolicy::default()
            },
            EventBus::new(),
        );
        let fx = Fixture {
            wallet,
            withdrawals,
        };
        let user = eligible_user(&fx, 100.0).await;

        let profile = fx.wallet.get_profile(&user).await.unwrap();
        let report = fx
            .withdrawals
            .check_eligibility(&profile, UsdAmount::from_usd(20.0));
        assert!(!report.is_eligible());
        assert!(report.unmet().iter().any(|g| g.name == "referrals"));
        assert!(report.unmet().iter().any(|g| g.name == "vip_referrals"));
    }

    #[tokio::test]
    async fn test_invalid_destination_is_rejected_without_side_effects() {
        let fx = fixture();
        let user = eligible_user(&fx, 100.0).await;

        let err = fx
            .withdrawals
            .submit(
                &user,
                UsdAmount::from_usd(20.0),
                WithdrawalMethod::MobileMoney {
                    phone: "12345".to_string(),
                },
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TaskPayError::Validation(_)));

        let profile = fx.wallet.get_profile(&user).await.unwrap();
        assert_eq!(profile.balance, UsdAmount::from_usd(100.0));
        assert!(fx.withdrawals.history(&user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_history_is_sorted_and_capped() {
        let fx = fixture();
        let user = eligible_user(&fx, 1000.0).await;

        let base = Utc::now();
        for i in 0..12 {
            let at = base + chrono::Duration::seconds(i);
            let outcome = fx
                .withdrawals
                .submit(&user, UsdAmount::from_usd(11.0), mobile_money(), at)
                .await
                .unwrap();
            assert!(matches!(outcome, WithdrawalOutcome::Accepted(_)));
        }

        let history = fx.withdrawals.history(&user).await.unwrap();
        assert_eq!(history.len(), 10);
        assert!(history[0].requested_at > history[9].requested_at);
    }
}
