use crate::storage::LedgerStorage;
use crate::types::{SignupRequest, Tier, TierPolicy, UserProfile};
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use taskpay_types::{Result, TaskPayError, UsdAmount, UserId};
use tokio::sync::RwLock;
use tracing::{debug, info};

const REFERRAL_CODE_ATTEMPTS: usize = 8;

/// Per-user wallet and profile manager.
///
/// All mutations go through [`WalletManager::update_profile`], which holds
/// the cache write lock across the read-check-write sequence so racing
/// credits and debits serialize instead of losing updates.
pub struct WalletManager {
    storage: Arc<dyn LedgerStorage>,
    cache: Arc<RwLock<HashMap<UserId, UserProfile>>>,
    tiers: TierPolicy,
}

impl WalletManager {
    pub fn new(storage: Arc<dyn LedgerStorage>, tiers: TierPolicy) -> Self {
        Self {
            storage,
            cache: Arc::new(RwLock::new(HashMap::new())),
            tiers,
        }
    }

    pub fn tiers(&self) -> &TierPolicy {
        &self.tiers
    }

    pub async fn create_profile(
        &self,
        signup: SignupRequest,
        now: DateTime<Utc>,
    ) -> Result<UserProfile> {
        if signup.name.trim().is_empty() {
            return Err(TaskPayError::Validation("Name is required".to_string()));
        }
        if !signup.email.contains('@') {
            return Err(TaskPayError::Validation(format!(
                "Invalid email: {}",
                signup.email
            )));
        }
        let digits = signup.phone.chars().filter(|c| c.is_ascii_digit()).count();
        if !(10..=15).contains(&digits) {
            return Err(TaskPayError::Validation(format!(
                "Invalid phone number: {}",
                signup.phone
            )));
        }

        let user_id = generate_user_id(&signup.email, now);
        let referral_code = self.generate_unique_referral_code().await?;

        let profile = UserProfile {
            user_id: user_id.clone(),
            name: signup.name.trim().to_string(),
            email: signup.email.trim().to_lowercase(),
            phone: signup.phone.trim().to_string(),
            referral_code,
            referred_by: signup.referred_by,
            balance: UsdAmount::ZERO,
            this_month_earned: UsdAmount::ZERO,
            total_earned: UsdAmount::ZERO,
            approved_tasks: 0,
            has_done_onboarding_task: false,
            is_vip: false,
            tier: Tier::Standard,
            daily_tasks_remaining: self.tiers.quota(Tier::Standard),
            last_task_reset_date: now.date_naive(),
            total_referrals: 0,
            vip_referrals: 0,
            referral_earnings: UsdAmount::ZERO,
            recent_referrals: Vec::new(),
            created_at: now,
            vip_upgraded_at: None,
        };

        self.storage.put_profile(&profile).await?;
        let mut cache = self.cache.write().await;
        cache.insert(user_id.clone(), profile.clone());

        info!(
            user = %user_id,
            referral_code = %profile.referral_code,
            "🧬 Profile created"
        );
        Ok(profile)
    }

    pub async fn get_profile(&self, user: &UserId) -> Result<UserProfile> {
        {
            let cache = self.cache.read().await;
            if let Some(profile) = cache.get(user) {
                return Ok(profile.clone());
            }
        }

        let profile = self
            .storage
            .get_profile(user)
            .await?
            .ok_or_else(|| TaskPayError::NotFound(format!("user {}", user)))?;

        let mut cache = self.cache.write().await;
        cache.insert(user.clone(), profile.clone());
        Ok(profile)
    }

    /// Drop a cached profile so the next read goes back to storage. Called
    /// after a transaction rollback leaves the cache ahead of the store.
    pub async fn invalidate(&self, user: &UserId) {
        let mut cache = self.cache.write().await;
        cache.remove(user);
    }

    /// Read-modify-write a profile under the write lock. The read is always
    /// fresh from storage, not the cache, so decisions made inside `mutate`
    /// see the authoritative state.
    pub async fn update_profile<F>(&self, user: &UserId, mutate: F) -> Result<UserProfile>
    where
        F: FnOnce(&mut UserProfile) -> Result<()>,
    {
        let mut cache = self.cache.write().await;

        let mut profile = self
            .storage
            .get_profile(user)
            .await?
            .ok_or_else(|| TaskPayError::NotFound(format!("user {}", user)))?;

        mutate(&mut profile)?;

        self.storage.put_profile(&profile).await?;
        cache.insert(user.clone(), profile.clone());
        Ok(profile)
    }

    /// Credit approved task earnings: balance, monthly and lifetime totals,
    /// and the approved-task counter move together.
    pub async fn credit_task_earnings(
        &self,
        user: &UserId,
        amount: UsdAmount,
    ) -> Result<UserProfile> {
        let profile = self
            .update_profile(user, |p| {
                p.balance = p
                    .balance
                    .checked_add(amount)
                    .ok_or_else(|| TaskPayError::Storage("Balance overflow".to_string()))?;
                p.this_month_earned = p.this_month_earned.saturating_add(amount);
                p.total_earned = p.total_earned.saturating_add(amount);
                p.approved_tasks += 1;
                Ok(())
            })
            .await?;

        info!(
            user = %user,
            amount = amount.to_usd(),
            balance_after = profile.balance.to_usd(),
            approved_tasks = profile.approved_tasks,
            "💰 Task earnings credited"
        );
        Ok(profile)
    }

    /// Debit the gross withdrawal amount. Fails without side effects when
    /// the freshly-read balance is insufficient; the balance can never go
    /// negative.
    pub async fn debit_balance(&self, user: &UserId, amount: UsdAmount) -> Result<UserProfile> {
        let profile = self
            .update_profile(user, |p| {
                p.balance = p.balance.checked_sub(amount).ok_or_else(|| {
                    TaskPayError::Validation(format!(
                        "Insufficient balance: has {}, needs {}",
                        p.balance, amount
                    ))
                })?;
                Ok(())
            })
            .await?;

        info!(
            user = %user,
            amount = amount.to_usd(),
            balance_after = profile.balance.to_usd(),
            "💸 Balance debited"
        );
        Ok(profile)
    }

    /// Reset the daily quota when the calendar day has rolled over.
    pub async fn ensure_daily_reset(&self, user: &UserId, today: NaiveDate) -> Result<UserProfile> {
        let profile = self.get_profile(user).await?;
        if profile.last_task_reset_date == today {
            return Ok(profile);
        }

        let quota = self.tiers.quota(profile.tier);
        let profile = self
            .update_profile(user, |p| {
                p.daily_tasks_remaining = quota;
                p.last_task_reset_date = today;
                Ok(())
            })
            .await?;

        debug!(
            user = %user,
            quota,
            date = %today,
            "🔄 Daily task quota reset"
        );
        Ok(profile)
    }

    /// Consume one daily task slot, or fail with `QuotaExhausted`.
    pub async fn consume_daily_slot(&self, user: &UserId) -> Result<UserProfile> {
        self.update_profile(user, |p| {
            if p.daily_tasks_remaining == 0 {
                return Err(TaskPayError::QuotaExhausted);
            }
            p.daily_tasks_remaining -= 1;
            Ok(())
        })
        .await
    }

    pub async fn mark_onboarding_complete(&self, user: &UserId) -> Result<UserProfile> {
        let profile = self
            .update_profile(user, |p| {
                p.has_done_onboarding_task = true;
                Ok(())
            })
            .await?;
        info!(user = %user, "🎯 Onboarding task completed, full catalog unlocked");
        Ok(profile)
    }

    /// Finalize a paid tier upgrade. The daily quota is raised immediately
    /// rather than waiting for the next calendar reset.
    pub async fn activate_vip(
        &self,
        user: &UserId,
        tier: Tier,
        now: DateTime<Utc>,
    ) -> Result<UserProfile> {
        let quota = self.tiers.quota(tier);
        let profile = self
            .update_profile(user, |p| {
                p.is_vip = true;
                p.tier = tier;
                p.daily_tasks_remaining = quota;
                p.last_task_reset_date = now.date_naive();
                p.vip_upgraded_at = Some(now);
                Ok(())
            })
            .await?;

        info!(
            user = %user,
            tier = %tier,
            daily_tasks = quota,
            "👑 VIP tier activated"
        );
        Ok(profile)
    }

    async fn generate_unique_referral_code(&self) -> Result<String> {
        for _ in 0..REFERRAL_CODE_ATTEMPTS {
            let code = generate_referral_code();
            if self.storage.find_by_referral_code(&code).await?.is_none() {
                return Ok(code);
            }
        }
        Err(TaskPayError::Storage(
            "Could not allocate a unique referral code".to_string(),
        ))
    }
}

fn generate_user_id(email: &str, now: DateTime<Utc>) -> UserId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(email.as_bytes());
    hasher.update(&now.timestamp_millis().to_le_bytes());
    let digest = hasher.finalize();
    UserId::new(format!("usr_{}", hex::encode(&digest.as_bytes()[..8])))
}

/// Two letters, four digits, one letter — short enough to share by voice.
fn generate_referral_code() -> String {
    const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    let mut rng = rand::thread_rng();
    let mut code = String::with_capacity(7);
    for _ in 0..2 {
        code.push(LETTERS[rng.gen_range(0..LETTERS.len())] as char);
    }
    for _ in 0..4 {
        code.push(char::from_digit(rng.gen_range(0..10), 10).unwrap());
    }
    code.push(LETTERS[rng.gen_range(0..LETTERS.len())] as char);
    code
}
