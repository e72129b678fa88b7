use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use taskpay_types::{UsdAmount, UserId};

/// Paid entitlement level. Each tier above Standard raises the daily task
/// quota in exchange for a one-time upgrade price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Standard,
    Bronze,
    Silver,
    Gold,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Tier::Standard => "Standard",
            Tier::Bronze => "Bronze VIP",
            Tier::Silver => "Silver VIP",
            Tier::Gold => "Gold VIP",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierPlan {
    pub price: UsdAmount,
    pub daily_tasks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierPolicy {
    pub standard_daily_tasks: u32,
    pub bronze: TierPlan,
    pub silver: TierPlan,
    pub gold: TierPlan,
}

impl Default for TierPolicy {
    fn default() -> Self {
        Self {
            standard_daily_tasks: 2,
            bronze: TierPlan {
                price: UsdAmount::from_usd(10.0),
                daily_tasks: 10,
            },
            silver: TierPlan {
                price: UsdAmount::from_usd(20.0),
                daily_tasks: 20,
            },
            gold: TierPlan {
                price: UsdAmount::from_usd(50.0),
                daily_tasks: 50,
            },
        }
    }
}

impl TierPolicy {
    pub fn quota(&self, tier: Tier) -> u32 {
        match tier {
            Tier::Standard => self.standard_daily_tasks,
            Tier::Bronze => self.bronze.daily_tasks,
            Tier::Silver => self.silver.daily_tasks,
            Tier::Gold => self.gold.daily_tasks,
        }
    }

    /// Purchase plan for a paid tier. Standard is not purchasable.
    pub fn plan(&self, tier: Tier) -> Option<&TierPlan> {
        match tier {
            Tier::Standard => None,
            Tier::Bronze => Some(&self.bronze),
            Tier::Silver => Some(&self.silver),
            Tier::Gold => Some(&self.gold),
        }
    }
}

/// One entry in a referrer's recent-referrals list. The phone number is the
/// identity used for VIP-bonus deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralEntry {
    pub phone: String,
    pub is_vip: bool,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub referral_code: String,
    pub referred_by: Option<String>,

    pub balance: UsdAmount,
    pub this_month_earned: UsdAmount,
    pub total_earned: UsdAmount,
    pub approved_tasks: u32,

    pub has_done_onboarding_task: bool,
    pub is_vip: bool,
    pub tier: Tier,
    pub daily_tasks_remaining: u32,
    pub last_task_reset_date: NaiveDate,

    pub total_referrals: u32,
    pub vip_referrals: u32,
    pub referral_earnings: UsdAmount,
    pub recent_referrals: Vec<ReferralEntry>,

    pub created_at: DateTime<Utc>,
    pub vip_upgraded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub referred_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum WithdrawalMethod {
    MobileMoney {
        phone: String,
    },
    Paypal {
        email: String,
    },
    Bank {
        bank_name: String,
        account_name: String,
        account_number: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        swift_code: Option<String>,
    },
}

impl WithdrawalMethod {
    /// Validate and normalize the destination. Mobile-money numbers are
    /// rewritten to international format.
    pub fn validated(self) -> taskpay_types::Result<Self> {
        use taskpay_types::TaskPayError;
        match self {
            WithdrawalMethod::MobileMoney { phone } => {
                let normalized = taskpay_types::phone::normalize_msisdn(&phone).ok_or_else(|| {
                    TaskPayError::Validation(format!("Invalid mobile money number: {}", phone))
                })?;
                Ok(WithdrawalMethod::MobileMoney { phone: normalized })
            }
            WithdrawalMethod::Paypal { email } => {
                if !email.contains('@') {
                    return Err(TaskPayError::Validation(format!(
                        "Invalid PayPal email: {}",
                        email
                    )));
                }
                Ok(WithdrawalMethod::Paypal { email })
            }
            WithdrawalMethod::Bank {
                bank_name,
                account_name,
                account_number,
                swift_code,
            } => {
                if bank_name.trim().is_empty()
                    || account_name.trim().is_empty()
                    || account_number.trim().is_empty()
                {
                    return Err(TaskPayError::Validation(
                        "Incomplete bank details".to_string(),
                    ));
                }
                Ok(WithdrawalMethod::Bank {
                    bank_name,
                    account_name,
                    account_number,
                    swift_code,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Append-only withdrawal record. Created as `Pending`; later transitions
/// are driven by the external settlement process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: String,
    pub user_id: UserId,
    pub amount: UsdAmount,
    pub fee: UsdAmount,
    pub net: UsdAmount,
    pub method: WithdrawalMethod,
    pub status: WithdrawalStatus,
    pub requested_at: DateTime<Utc>,
}

impl WithdrawalRequest {
    pub fn new(
        user_id: UserId,
        amount: UsdAmount,
        fee: UsdAmount,
        method: WithdrawalMethod,
        requested_at: DateTime<Utc>,
    ) -> Self {
        let id = format!("{}_{}", user_id, requested_at.timestamp_millis());
        Self {
            id,
            user_id,
            amount,
            fee,
            net: amount.saturating_sub(fee),
            method,
            status: WithdrawalStatus::Pending,
            requested_at,
        }
    }
}
