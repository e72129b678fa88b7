use crate::config::NodeConfig;
use crate::metrics::Metrics;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use taskpay_ledger::{LedgerEngine, LedgerStorage, MemoryLedgerStorage, PlatformEvent};
use taskpay_payments::{
    ExchangeRateProvider, HttpGateway, PushGateway, SimulatedRateProvider, UpgradeConfig,
    UpgradeFlow,
};
use taskpay_tasks::{
    ApprovalEngine, InstanceStore, MemoryInstanceStore, TaskCatalog, TaskTracker,
};
use tokio::task::JoinHandle;
use tracing::info;

/// The wired platform: storages, managers, engines.
#[derive(Clone)]
pub struct TaskPayNode {
    pub config: NodeConfig,
    pub ledger: Arc<LedgerEngine>,
    pub catalog: Arc<TaskCatalog>,
    pub tracker: Arc<TaskTracker>,
    pub approval: Arc<ApprovalEngine>,
    pub gateway: Arc<dyn PushGateway>,
    pub rate: Arc<dyn ExchangeRateProvider>,
    pub upgrade: Arc<UpgradeFlow>,
}

impl TaskPayNode {
    pub fn new(config: NodeConfig) -> Result<Self> {
        let storage: Arc<dyn LedgerStorage> = Arc::new(MemoryLedgerStorage::new());
        let ledger = Arc::new(LedgerEngine::new(
            storage.clone(),
            config.tiers.clone(),
            config.referral.clone(),
            config.withdrawal.clone(),
        ));

        let catalog = Arc::new(TaskCatalog::builtin());
        let instances: Arc<dyn InstanceStore> = Arc::new(MemoryInstanceStore::new());
        let tracker = Arc::new(TaskTracker::new(
            catalog.clone(),
            instances.clone(),
            ledger.wallet.clone(),
        ));
        let approval = Arc::new(ApprovalEngine::new(
            catalog.clone(),
            instances.clone(),
            storage,
            ledger.wallet.clone(),
            ledger.events.clone(),
        ));

        let gateway: Arc<dyn PushGateway> = Arc::new(HttpGateway::new(config.gateway.clone())?);
        let rate: Arc<dyn ExchangeRateProvider> = Arc::new(SimulatedRateProvider::new(
            config.exchange.base_rate,
            config.exchange.spread,
        ));
        let upgrade = Arc::new(UpgradeFlow::new(
            gateway.clone(),
            ledger.wallet.clone(),
            ledger.referrals.clone(),
            rate.clone(),
            ledger.events.clone(),
            UpgradeConfig {
                poll_interval: Duration::from_secs(config.tasks.upgrade_poll_secs),
                timeout: Duration::from_secs(config.tasks.upgrade_timeout_secs),
            },
        ));

        info!(
            node = %config.node.name,
            catalog_tasks = catalog.all().len(),
            "✨ Node initialized"
        );

        Ok(Self {
            config,
            ledger,
            catalog,
            tracker,
            approval,
            gateway,
            rate,
            upgrade,
        })
    }

    /// Spawn the recurring engines: the auto-approval sweep and the
    /// event-to-metrics pump.
    pub fn start_background(&self, metrics: &Metrics) -> Vec<JoinHandle<()>> {
        let approval_handle = self
            .approval
            .clone()
            .start_polling(Duration::from_secs(self.config.tasks.approval_poll_secs));

        let mut events = self.ledger.events.subscribe();
        let metrics = metrics.clone();
        let pump_handle = tokio::spawn(async move {
            use tokio::sync::broadcast::error::RecvError;
            loop {
                match events.recv().await {
                    Ok(PlatformEvent::TaskApproved { .. }) => metrics.tasks_approved.inc(),
                    Ok(PlatformEvent::WithdrawalSubmitted { .. }) => {
                        metrics.withdrawals_accepted.inc()
                    }
                    Ok(PlatformEvent::VipActivated { .. }) => metrics.upgrades_activated.inc(),
                    Ok(PlatformEvent::ReferralBonus { .. }) => metrics.referral_bonuses.inc(),
                    Ok(PlatformEvent::OnboardingCompleted { .. }) => {}
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });

        vec![approval_handle, pump_handle]
    }
}
