use clap::{Parser, Subcommand};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

use super::types::{ClientConfig, GatewayConfig, LogLevel, Mode};
use crate::gateway::DEFAULT_CAPACITY;

// -----------------------------------------------------------------------------
// ----- Args ------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "backhaul", version, about = "Reverse TCP tunnel")]
pub(super) struct Args {
    // Not required via CLI or ENV (defaults to info).
    #[arg(long = "log", global = true, env = "BACKHAUL_LOG", default_value = "info")]
    pub(super) log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Public side: accept target clients and broker them to the relay.
    Gateway(GatewayArgs),
    /// Private side: hold the control channel and dial back on every signal.
    Client(ClientArgs),
}

#[derive(clap::Args, Debug)]
struct GatewayArgs {
    // Public listen address for target clients.
    #[arg(long, env = "BACKHAUL_TARGET")]
    target: SocketAddr,

    // Listen address for the control channel and dial-backs.
    #[arg(long, env = "BACKHAUL_LINK")]
    link: SocketAddr,

    // Must exist; no defaults.
    #[arg(long, env = "BACKHAUL_TLS_CERT")]
    tls_cert: PathBuf,

    #[arg(long, env = "BACKHAUL_TLS_KEY")]
    tls_key: PathBuf,

    // Enables allowlist enforcement.
    #[arg(long, env = "BACKHAUL_ALLOWLIST")]
    allowlist: Option<PathBuf>,

    #[arg(long, env = "BACKHAUL_CAPACITY", default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    #[arg(long, env = "BACKHAUL_PAIR_TIMEOUT", default_value = "30s", value_parser = humantime::parse_duration)]
    pair_timeout: Duration,

    #[arg(long, env = "BACKHAUL_HANDSHAKE_TIMEOUT", default_value = "10s", value_parser = humantime::parse_duration)]
    handshake_timeout: Duration,
}

#[derive(clap::Args, Debug)]
struct ClientArgs {
    // Gateway link address, host:port.
    #[arg(long, env = "BACKHAUL_LINK")]
    link: String,

    // Local service to expose, host:port.
    #[arg(long, env = "BACKHAUL_TARGET")]
    target: String,

    // Defaults to the host part of --link.
    #[arg(long, env = "BACKHAUL_SERVER_NAME")]
    server_name: Option<String>,

    #[arg(long, env = "BACKHAUL_CA_FILE")]
    ca_file: Option<PathBuf>,

    // Skip certificate verification on the link.
    #[arg(long, env = "BACKHAUL_INSECURE")]
    insecure: bool,

    #[arg(long, env = "BACKHAUL_HANDSHAKE_TIMEOUT", default_value = "10s", value_parser = humantime::parse_duration)]
    handshake_timeout: Duration,
}

// -----------------------------------------------------------------------------
// ----- Args: Conversion ------------------------------------------------------

impl Args {
    pub(super) fn into_mode(self) -> Mode {
        match self.command {
            Command::Gateway(g) => Mode::Gateway(GatewayConfig {
                target_addr: g.target,
                link_addr: g.link,
                tls_cert: g.tls_cert,
                tls_key: g.tls_key,
                allowlist_file: g.allowlist,
                capacity: g.capacity,
                pair_timeout: g.pair_timeout,
                handshake_timeout: g.handshake_timeout,
            }),

            Command::Client(c) => {
                let server_name = c
                    .server_name
                    .unwrap_or_else(|| host_of(&c.link).to_string());

                Mode::Client(ClientConfig {
                    link_addr: c.link,
                    target_addr: c.target,
                    server_name,
                    ca_file: c.ca_file,
                    insecure: c.insecure,
                    handshake_timeout: c.handshake_timeout,
                })
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Private Utils ---------------------------------------------------------

/// Host part of `host:port`, brackets stripped from IPv6 literals.
fn host_of(addr: &str) -> &str {
    let host = addr.rsplit_once(':').map_or(addr, |(host, _)| host);
    host.trim_start_matches('[').trim_end_matches(']')
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
