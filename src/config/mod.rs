pub mod allowlist;
pub mod cli;
pub mod config;
pub mod types;

pub use allowlist::{Allowlist, AllowlistError};
pub use config::Config;
pub use types::{ClientConfig, GatewayConfig, LogLevel, Mode};
