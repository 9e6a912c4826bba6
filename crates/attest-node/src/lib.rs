pub mod cli;
pub mod config;
pub mod logging;
pub mod service;

pub use config::NodeConfig;
pub use service::RewardService;
