pub mod config;
pub mod opendota;

pub use config::OpenDotaConfig;
pub use opendota::OpenDotaClient;
