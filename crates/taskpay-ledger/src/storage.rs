use crate::types::{UserProfile, WithdrawalRequest, WithdrawalStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use taskpay_types::{Result, TaskPayError, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info};

type ProfileMap = HashMap<UserId, UserProfile>;
type WithdrawalMap = HashMap<String, WithdrawalRequest>;
type TransactionBackup = Option<(ProfileMap, WithdrawalMap)>;

/// Persistence seam for profiles and withdrawal records.
///
/// Balance-affecting flows wrap their writes in
/// begin/commit/rollback so a failed write never leaves the ledger and the
/// task state disagreeing with each other.
#[async_trait]
pub trait LedgerStorage: Send + Sync {
    async fn get_profile(&self, user: &UserId) -> Result<Option<UserProfile>>;
    async fn put_profile(&self, profile: &UserProfile) -> Result<()>;
    async fn find_by_referral_code(&self, code: &str) -> Result<Option<UserProfile>>;
    async fn all_profiles(&self) -> Result<Vec<UserProfile>>;

    async fn record_withdrawal(&self, request: &WithdrawalRequest) -> Result<()>;
    async fn withdrawals_for_user(&self, user: &UserId) -> Result<Vec<WithdrawalRequest>>;
    async fn set_withdrawal_status(&self, id: &str, status: WithdrawalStatus) -> Result<()>;

    async fn begin_transaction(&self) -> Result<()>;
    async fn commit_transaction(&self) -> Result<()>;
    async fn rollback_transaction(&self) -> Result<()>;
}

/// In-memory store with snapshot-based transactions.
///
/// Only one transaction may be open at a time; `begin_transaction` blocks
/// until the previous one settles. Both the approval engine and the
/// withdrawal flow drive this store, so the gate is load-bearing.
pub struct MemoryLedgerStorage {
    profiles: Arc<RwLock<ProfileMap>>,
    withdrawals: Arc<RwLock<WithdrawalMap>>,
    backup: Arc<RwLock<TransactionBackup>>,
    txn_gate: Arc<Mutex<()>>,
    txn_hold: Mutex<Option<OwnedMutexGuard<()>>>,
}

impl MemoryLedgerStorage {
    pub fn new() -> Self {
        Self {
            profiles: Arc::new(RwLock::new(HashMap::new())),
            withdrawals: Arc::new(RwLock::new(HashMap::new())),
            backup: Arc::new(RwLock::new(None)),
            txn_gate: Arc::new(Mutex::new(())),
            txn_hold: Mutex::new(None),
        }
    }
}

impl Default for MemoryLedgerStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStorage for MemoryLedgerStorage {
    async fn get_profile(&self, user: &UserId) -> Result<Option<UserProfile>> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(user).cloned())
    }

    async fn put_profile(&self, profile: &UserProfile) -> Result<()> {
        let mut profiles = self.profiles.write().await;
        debug!(
            user = %profile.user_id,
            balance = profile.balance.to_usd(),
            storage_type = "memory",
            "💾 Profile stored"
        );
        profiles.insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn find_by_referral_code(&self, code: &str) -> Result<Option<UserProfile>> {
        let profiles = self.profiles.read().await;
        Ok(profiles
            .values()
            .find(|p| p.referral_code == code)
            .cloned())
    }

    async fn all_profiles(&self) -> Result<Vec<UserProfile>> {
        let profiles = self.profiles.read().await;
        Ok(profiles.values().cloned().collect())
    }

    async fn record_withdrawal(&self, request: &WithdrawalRequest) -> Result<()> {
        let mut withdrawals = self.withdrawals.write().await;
        if withdrawals.contains_key(&request.id) {
            return Err(TaskPayError::Storage(format!(
                "Duplicate withdrawal id: {}",
                request.id
            )));
        }
        info!(
            request_id = %request.id,
            user = %request.user_id,
            amount = request.amount.to_usd(),
            storage_type = "memory",
            "📦 Withdrawal recorded"
        );
        withdrawals.insert(request.id.clone(), request.clone());
        Ok(())
    }

    async fn withdrawals_for_user(&self, user: &UserId) -> Result<Vec<WithdrawalRequest>> {
        let withdrawals = self.withdrawals.read().await;
        Ok(withdrawals
            .values()
            .filter(|w| &w.user_id == user)
            .cloned()
            .collect())
    }

    async fn set_withdrawal_status(&self, id: &str, status: WithdrawalStatus) -> Result<()> {
        let mut withdrawals = self.withdrawals.write().await;
        let request = withdrawals
            .get_mut(id)
            .ok_or_else(|| TaskPayError::NotFound(format!("withdrawal {}", id)))?;
        request.status = status;
        Ok(())
    }

    async fn begin_transaction(&self) -> Result<()> {
        let guard = self.txn_gate.clone().lock_owned().await;

        let profiles = self.profiles.read().await;
        let withdrawals = self.withdrawals.read().await;
        let mut backup = self.backup.write().await;
        *backup = Some((profiles.clone(), withdrawals.clone()));

        *self.txn_hold.lock().await = Some(guard);
        debug!(
            profile_count = profiles.len(),
            storage_type = "memory",
            "📝 Transaction began (snapshot created)"
        );
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        let mut backup = self.backup.write().await;
        let had_backup = backup.take().is_some();
        drop(backup);
        self.txn_hold.lock().await.take();

        if had_backup {
            debug!(
                storage_type = "memory",
                "✅ Transaction committed (snapshot discarded)"
            );
        }
        Ok(())
    }

    async fn rollback_transaction(&self) -> Result<()> {
        let mut backup = self.backup.write().await;
        if let Some((profile_backup, withdrawal_backup)) = backup.take() {
            let mut profiles = self.profiles.write().await;
            let mut withdrawals = self.withdrawals.write().await;
            *profiles = profile_backup;
            *withdrawals = withdrawal_backup;
            info!(
                storage_type = "memory",
                "❌ Transaction rolled back (snapshot restored)"
            );
        }
        drop(backup);
        self.txn_hold.lock().await.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Tier, WithdrawalMethod};
    use chrono::Utc;
    use taskpay_types::UsdAmount;

    fn test_profile(id: &str) -> UserProfile {
        UserProfile {
            user_id: UserId::new(id),
            name: "Test User".to_string(),
            email: format!("{}@example.com", id),
            phone: "0712345678".to_string(),
            referral_code: format!("REF{}", id.to_uppercase()),
            referred_by: None,
            balance: UsdAmount::ZERO,
            this_month_earned: UsdAmount::ZERO,
            total_earned: UsdAmount::ZERO,
            approved_tasks: 0,
            has_done_onboarding_task: false,
            is_vip: false,
            tier: Tier::Standard,
            daily_tasks_remaining: 2,
            last_task_reset_date: Utc::now().date_naive(),
            total_referrals: 0,
            vip_referrals: 0,
            referral_earnings: UsdAmount::ZERO,
            recent_referrals: Vec::new(),
            created_at: Utc::now(),
            vip_upgraded_at: None,
        }
    }

    #[tokio::test]
    async fn test_profile_round_trip() {
        let storage = MemoryLedgerStorage::new();
        let profile = test_profile("alice");

        storage.put_profile(&profile).await.unwrap();
        let loaded = storage.get_profile(&profile.user_id).await.unwrap();
        assert_eq!(loaded.unwrap().email, "alice@example.com");

        let by_code = storage.find_by_referral_code("REFALICE").await.unwrap();
        assert_eq!(by_code.unwrap().user_id, profile.user_id);
        assert!(storage
            .find_by_referral_code("NOPE")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_transaction_rollback_restores_state() {
        let storage = MemoryLedgerStorage::new();
        let mut profile = test_profile("bob");
        storage.put_profile(&profile).await.unwrap();

        storage.begin_transaction().await.unwrap();
        profile.balance = UsdAmount::from_usd(40.0);
        storage.put_profile(&profile).await.unwrap();
        storage.rollback_transaction().await.unwrap();

        let restored = storage
            .get_profile(&profile.user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(restored.balance, UsdAmount::ZERO);
    }

    #[tokio::test]
    async fn test_duplicate_withdrawal_rejected() {
        let storage = MemoryLedgerStorage::new();
        let request = WithdrawalRequest::new(
            UserId::new("carol"),
            UsdAmount::from_usd(20.0),
            UsdAmount::from_usd(0.4),
            WithdrawalMethod::MobileMoney {
                phone: "254712345678".to_string(),
            },
            Utc::now(),
        );
        storage.record_withdrawal(&request).await.unwrap();
        assert!(storage.record_withdrawal(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_settlement_status_updates() {
        let storage = MemoryLedgerStorage::new();
        let user = UserId::new("dana");
        let request = WithdrawalRequest::new(
            user.clone(),
            UsdAmount::from_usd(15.0),
            UsdAmount::from_usd(0.3),
            WithdrawalMethod::MobileMoney {
                phone: "254712345678".to_string(),
            },
            Utc::now(),
        );
        storage.record_withdrawal(&request).await.unwrap();

        storage
            .set_withdrawal_status(&request.id, WithdrawalStatus::Completed)
            .await
            .unwrap();
        let stored = storage.withdrawals_for_user(&user).await.unwrap();
        assert_eq!(stored[0].status, WithdrawalStatus::Completed);

        assert!(storage
            .set_withdrawal_status("missing", WithdrawalStatus::Failed)
            .await
            .is_err());
    }
}
