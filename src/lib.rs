pub mod client;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod net;
pub mod protocol;
pub mod tls;

pub use config::{Allowlist, Config};
pub use gateway::{Admission, Gateway, GatewaySettings};
