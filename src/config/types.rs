use std::{net::SocketAddr, path::PathBuf, time::Duration};

// -------------------------------------------------------------------------------------------------
// ---- LogLevel -----------------------------------------------------------------------------------

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// -------------------------------------------------------------------------------------------------
// ---- Mode ---------------------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub enum Mode {
    Gateway(GatewayConfig),
    Client(ClientConfig),
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub target_addr: SocketAddr,
    pub link_addr: SocketAddr,
    pub tls_cert: PathBuf,
    pub tls_key: PathBuf,
    /// Present means enforcement is on.
    pub allowlist_file: Option<PathBuf>,
    pub capacity: usize,
    pub pair_timeout: Duration,
    pub handshake_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub link_addr: String,
    pub target_addr: String,
    pub server_name: String,
    pub ca_file: Option<PathBuf>,
    pub insecure: bool,
    pub handshake_timeout: Duration,
}

// -------------------------------------------------------------------------------------------------
// -------------------------------------------------------------------------------------------------
