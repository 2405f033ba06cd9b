pub mod config;
pub mod rabbit;

pub use config::BrokerConfig;
pub use rabbit::{RabbitBroker, RabbitDelivery};
