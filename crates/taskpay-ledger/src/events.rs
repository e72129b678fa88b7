//! Notification event bus.
//!
//! Balance-affecting state transitions emit exactly one event each, which
//! the node surfaces to clients. The bus is a plain tokio broadcast channel;
//! events are dropped when nobody is listening.

use crate::types::Tier;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskpay_types::{UsdAmount, UserId};
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PlatformEvent {
    TaskApproved {
        user: UserId,
        instance_id: String,
        amount: UsdAmount,
        timestamp: DateTime<Utc>,
    },
    OnboardingCompleted {
        user: UserId,
        timestamp: DateTime<Utc>,
    },
    WithdrawalSubmitted {
        user: UserId,
        request_id: String,
        amount: UsdAmount,
        timestamp: DateTime<Utc>,
    },
    VipActivated {
        user: UserId,
        tier: Tier,
        daily_tasks: u32,
        timestamp: DateTime<Utc>,
    },
    ReferralBonus {
        referrer: UserId,
        amount: UsdAmount,
        vip: bool,
        timestamp: DateTime<Utc>,
    },
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PlatformEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUFFER);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: PlatformEvent) {
        debug!(?event, "📣 Platform event");
        // A send error only means there are no subscribers right now.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
