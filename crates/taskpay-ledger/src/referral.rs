use crate::events::{EventBus, PlatformEvent};
use crate::storage::LedgerStorage;
use crate::types::{ReferralEntry, UserProfile};
use crate::wallet::WalletManager;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use taskpay_types::{Result, UsdAmount, UserId};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralPolicy {
    pub signup_bonus: UsdAmount,
    pub vip_bonus: UsdAmount,
}

impl Default for ReferralPolicy {
    fn default() -> Self {
        Self {
            signup_bonus: UsdAmount::from_usd(5.0),
            vip_bonus: UsdAmount::from_usd(10.0),
        }
    }
}

/// Credits referrers when their referral code is used at signup and when a
/// referred user buys a VIP tier.
pub struct ReferralManager {
    storage: Arc<dyn LedgerStorage>,
    wallet: Arc<WalletManager>,
    policy: ReferralPolicy,
    events: EventBus,
}

impl ReferralManager {
    pub fn new(
        storage: Arc<dyn LedgerStorage>,
        wallet: Arc<WalletManager>,
        policy: ReferralPolicy,
        events: EventBus,
    ) -> Self {
        Self {
            storage,
            wallet,
            policy,
            events,
        }
    }

    pub fn policy(&self) -> &ReferralPolicy {
        &self.policy
    }

    /// Apply the signup bonus for a newly created profile that carries a
    /// referral code. Returns the credited referrer, if any.
    pub async fn record_signup(&self, new_profile: &UserProfile) -> Result<Option<UserId>> {
        let Some(referrer) = self.resolve_referrer(new_profile).await? else {
            return Ok(None);
        };

        let bonus = self.policy.signup_bonus;
        let referred_phone = new_profile.phone.clone();
        let now = Utc::now();

        self.wallet
            .update_profile(&referrer, |p| {
                p.total_referrals += 1;
                p.referral_earnings = p.referral_earnings.saturating_add(bonus);
                p.balance = p.balance.saturating_add(bonus);
                p.recent_referrals.push(ReferralEntry {
                    phone: referred_phone.clone(),
                    is_vip: false,
                    date: now,
                });
                Ok(())
            })
            .await?;

        info!(
            referrer = %referrer,
            referred = %new_profile.user_id,
            bonus = bonus.to_usd(),
            "🤝 Referral signup bonus credited"
        );
        self.events.emit(PlatformEvent::ReferralBonus {
            referrer: referrer.clone(),
            amount: bonus,
            vip: false,
            timestamp: now,
        });
        Ok(Some(referrer))
    }

    /// Apply the VIP bonus after a referred user's upgrade. Idempotent per
    /// (referrer, referred phone): the recent-referrals entry is the
    /// dedup record, so repeated invocations credit at most once.
    pub async fn record_vip_upgrade(&self, upgraded: &UserProfile) -> Result<bool> {
        let Some(referrer) = self.resolve_referrer(upgraded).await? else {
            return Ok(false);
        };

        let bonus = self.policy.vip_bonus;
        let referred_phone = upgraded.phone.clone();
        let now = Utc::now();
        let mut credited = false;

        self.wallet
            .update_profile(&referrer, |p| {
                let already_vip = p
                    .recent_referrals
                    .iter()
                    .any(|r| r.phone == referred_phone && r.is_vip);
                if already_vip {
                    return Ok(());
                }

                if let Some(entry) = p
                    .recent_referrals
                    .iter_mut()
                    .find(|r| r.phone == referred_phone)
                {
                    entry.is_vip = true;
                } else {
                    p.recent_referrals.push(ReferralEntry {
                        phone: referred_phone.clone(),
                        is_vip: true,
                        date: now,
                    });
                }

                p.vip_referrals += 1;
                p.referral_earnings = p.referral_earnings.saturating_add(bonus);
                p.balance = p.balance.saturating_add(bonus);
                credited = true;
                Ok(())
            })
            .await?;

        if credited {
            info!(
                referrer = %referrer,
                referred = %upgraded.user_id,
                bonus = bonus.to_usd(),
                "🤝 Referral VIP bonus credited"
            );
            self.events.emit(PlatformEvent::ReferralBonus {
                referrer,
                amount: bonus,
                vip: true,
                timestamp: now,
            });
        } else {
            debug!(
                referrer = %referrer,
                referred = %upgraded.user_id,
                "Referral VIP bonus already credited, skipping"
            );
        }
        Ok(credited)
    }

    async fn resolve_referrer(&self, profile: &UserProfile) -> Result<Option<UserId>> {
        let Some(code) = profile.referred_by.as_deref() else {
            return Ok(None);
        };

        match self.storage.find_by_referral_code(code).await? {
            Some(referrer) if referrer.user_id != profile.user_id => Ok(Some(referrer.user_id)),
            Some(_) => {
                debug!(user = %profile.user_id, "Self-referral ignored");
                Ok(None)
            }
            None => {
                debug!(code, "Referral code does not resolve to a user");
                Ok(None)
            }
        }
    }
}
