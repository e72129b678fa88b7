pub mod gateway;
pub mod rate;
pub mod upgrade;

pub use gateway::{
    GatewayConfig, HttpGateway, PushAck, PushGateway, PushRequest, TransactionStatus,
};
pub use rate::{
    format_kes, to_kes, ExchangeRateProvider, FixedRateProvider, SimulatedRateProvider,
    DEFAULT_BASE_RATE,
};
pub use upgrade::{UpgradeConfig, UpgradeFlow, UpgradeOutcome};
