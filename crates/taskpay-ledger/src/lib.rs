pub mod events;
pub mod referral;
pub mod storage;
pub mod types;
pub mod wallet;
pub mod withdrawal;

pub use events::{EventBus, PlatformEvent};
pub use referral::{ReferralManager, ReferralPolicy};
pub use storage::{LedgerStorage, MemoryLedgerStorage};
pub use types::{
    ReferralEntry, SignupRequest, Tier, TierPlan, TierPolicy, UserProfile, WithdrawalMethod,
    WithdrawalRequest, WithdrawalStatus,
};
pub use wallet::WalletManager;
pub use withdrawal::{
    EligibilityReport, Gate, ReferralGates, WithdrawalManager, WithdrawalOutcome,
    WithdrawalPolicy, WithdrawalReceipt,
};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use taskpay_types::Result;

/// Everything that touches user balances, wired together.
pub struct LedgerEngine {
    pub storage: Arc<dyn LedgerStorage>,
    pub wallet: Arc<WalletManager>,
    pub referrals: Arc<ReferralManager>,
    pub withdrawals: Arc<WithdrawalManager>,
    pub events: EventBus,
}

impl LedgerEngine {
    pub fn new(
        storage: Arc<dyn LedgerStorage>,
        tiers: TierPolicy,
        referral_policy: ReferralPolicy,
        withdrawal_policy: WithdrawalPolicy,
    ) -> Self {
        let events = EventBus::new();
        let wallet = Arc::new(WalletManager::new(storage.clone(), tiers));
        let referrals = Arc::new(ReferralManager::new(
            storage.clone(),
            wallet.clone(),
            referral_policy,
            events.clone(),
        ));
        let withdrawals = Arc::new(WithdrawalManager::new(
            storage.clone(),
            wallet.clone(),
            withdrawal_policy,
            events.clone(),
        ));

        Self {
            storage,
            wallet,
            referrals,
            withdrawals,
            events,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryLedgerStorage::new()),
            TierPolicy::default(),
            ReferralPolicy::default(),
            WithdrawalPolicy::default(),
        )
    }

    /// Create a profile and apply the referral signup bonus in one step.
    pub async fn signup(&self, request: SignupRequest, now: DateTime<Utc>) -> Result<UserProfile> {
        let profile = self.wallet.create_profile(request, now).await?;
        self.referrals.record_signup(&profile).await?;
        Ok(profile)
    }
}
