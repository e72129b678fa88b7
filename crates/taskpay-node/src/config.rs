use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use taskpay_ledger::{ReferralPolicy, TierPolicy, WithdrawalPolicy};
use taskpay_payments::GatewayConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub node: NodeSettings,
    pub api: ApiConfig,
    pub gateway: GatewayConfig,
    pub tiers: TierPolicy,
    pub referral: ReferralPolicy,
    pub withdrawal: WithdrawalPolicy,
    pub tasks: TaskSettings,
    pub exchange: ExchangeSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// The single origin allowed to call the gateway proxy and the API.
    pub allowed_origin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSettings {
    /// Auto-approval sweep interval.
    pub approval_poll_secs: u64,
    /// Payment-confirmation poll interval for tier upgrades.
    pub upgrade_poll_secs: u64,
    /// Hard timeout on payment confirmation.
    pub upgrade_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeSettings {
    pub base_rate: f64,
    pub spread: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json"
    pub format: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node: NodeSettings {
                name: "taskpay-node".to_string(),
            },
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                allowed_origin: "https://taskpay.example.com".to_string(),
            },
            gateway: GatewayConfig::default(),
            tiers: TierPolicy::default(),
            referral: ReferralPolicy::default(),
            withdrawal: WithdrawalPolicy::default(),
            tasks: TaskSettings {
                approval_poll_secs: 5,
                upgrade_poll_secs: 3,
                upgrade_timeout_secs: 120,
            },
            exchange: ExchangeSettings {
                base_rate: taskpay_payments::DEFAULT_BASE_RATE,
                spread: 2.5,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

impl NodeConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Environment overrides. Provider credentials are secrets and should
    /// come from the environment, never the config file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(username) = env::var("TASKPAY_GATEWAY_USERNAME") {
            self.gateway.api_username = username;
        }
        if let Ok(password) = env::var("TASKPAY_GATEWAY_PASSWORD") {
            self.gateway.api_password = password;
        }
        if let Ok(url) = env::var("TASKPAY_GATEWAY_URL") {
            self.gateway.base_url = url;
        }
        if let Ok(origin) = env::var("TASKPAY_ALLOWED_ORIGIN") {
            self.api.allowed_origin = origin;
        }
        if let Ok(port) = env::var("TASKPAY_API_PORT") {
            if let Ok(port) = port.parse() {
                self.api.port = port;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: NodeConfig = toml::from_str(&toml).unwrap();

        assert_eq!(parsed.api.port, 8080);
        assert_eq!(parsed.tasks.approval_poll_secs, 5);
        assert_eq!(parsed.tiers.silver.daily_tasks, 20);
        assert_eq!(parsed.withdrawal.min_approved_tasks, 15);
        assert!(parsed.withdrawal.referral_gates.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskpay.toml");

        let config = NodeConfig::default();
        config.save_to_file(&path).unwrap();
        let loaded = NodeConfig::from_file(&path).unwrap();
        assert_eq!(loaded.node.name, "taskpay-node");
        assert_eq!(loaded.exchange.base_rate, config.exchange.base_rate);
    }
}
