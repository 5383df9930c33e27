use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use backhaul::client::{self, RelaySettings};
use backhaul::config::{ClientConfig, GatewayConfig, Mode};
use backhaul::errors::GatewayError;
use backhaul::gateway::{LinkAcceptor, LinkSettings, SignalChannel};
use backhaul::net::{self, CopyPump, Shutdown, ShutdownTrigger};
use backhaul::tls::{self, LinkConnector, ServerVerification};
use backhaul::{Admission, Allowlist, Config, Gateway, GatewaySettings};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const APP_NAME: &str = "backhaul";

// -----------------------------------------------------------------------------
// ----- Main ------------------------------------------------------------------

#[tokio::main]
async fn main() -> io::Result<()> {
    setup();
    run().await
}

// -----------------------------------------------------------------------------
// ----- Setup -----------------------------------------------------------------

fn setup() {
    // This has to be the first thing we do, because it initializes the config
    Config::init();

    init_tracing();
}

fn init_tracing() {
    let config = Config::snapshot();
    let filter = EnvFilter::try_new(config.log_level.as_str())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

async fn run() -> io::Result<()> {
    let config = Config::snapshot();

    let (trigger, shutdown) = net::shutdown::channel();
    spawn_ctrl_c(trigger);

    match config.mode {
        Mode::Gateway(g) => run_gateway(g, shutdown).await,
        Mode::Client(c) => run_client(c, shutdown).await,
    }
}

async fn run_gateway(config: GatewayConfig, mut shutdown: Shutdown) -> io::Result<()> {
    let acceptor = tls::acceptor_from_pem(&config.tls_cert, &config.tls_key)
        .unwrap_or_else(|e| panic!("invalid tls identity: {e}"));

    let admission = match &config.allowlist_file {
        Some(path) => {
            let list = Allowlist::from_file(path)
                .await
                .unwrap_or_else(|e| panic!("failed to load allowlist from {:?}: {e}", path));
            info!("allowlist enforced: {} entries", list.len());
            spawn_reload_on_hangup(list.clone(), path.clone());
            Admission::Allowlist(list)
        }
        None => Admission::Open,
    };

    let link_settings = LinkSettings {
        handshake_timeout: config.handshake_timeout,
        ..LinkSettings::default()
    };

    let link_listener = net::bind(config.link_addr)?;
    info!("{APP_NAME} waiting for relay on {}", config.link_addr);

    let control = match LinkAcceptor::accept_control(
        &link_listener,
        &acceptor,
        &link_settings,
        &mut shutdown,
    )
    .await
    {
        Ok(control) => control,
        Err(GatewayError::Shutdown) => {
            info!("{APP_NAME} shutting down");
            return Ok(());
        }
        Err(e) => return Err(io::Error::other(e)),
    };

    let signals = SignalChannel::spawn(control);
    let links = LinkAcceptor::spawn(link_listener, acceptor, link_settings, shutdown.clone());

    let target_listener = net::bind(config.target_addr)?;
    info!("{APP_NAME} listening on {}", config.target_addr);

    let settings = GatewaySettings {
        capacity: config.capacity,
        pair_timeout: config.pair_timeout,
        ..GatewaySettings::default()
    };

    Gateway::new(links, signals, admission, settings)
        .serve(target_listener, shutdown)
        .await
        .map_err(io::Error::other)?;

    info!("{APP_NAME} shutting down");
    Ok(())
}

async fn run_client(config: ClientConfig, shutdown: Shutdown) -> io::Result<()> {
    let verification = ServerVerification::from_flags(config.ca_file, config.insecure)
        .unwrap_or_else(|e| panic!("{e}"));
    let connector = LinkConnector::new(&verification, &config.server_name)
        .unwrap_or_else(|e| panic!("invalid tls client setup: {e}"))
        .with_handshake_timeout(config.handshake_timeout);

    let settings = RelaySettings {
        link_addr: config.link_addr,
        target_addr: config.target_addr,
    };

    if let Err(e) = client::control::run(settings, connector, Arc::new(CopyPump), shutdown).await {
        error!("control channel failed: {e}");
        return Err(e);
    }

    info!("{APP_NAME} shutting down");
    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Signals ---------------------------------------------------------------

fn spawn_ctrl_c(trigger: ShutdownTrigger) {
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            trigger.trigger();
        }
    });
}

#[cfg(unix)]
fn spawn_reload_on_hangup(list: Allowlist, path: PathBuf) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            error!("allowlist reload on SIGHUP unavailable: {e}");
            return;
        }
    };

    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            list.reload(&path).await;
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_list: Allowlist, _path: PathBuf) {}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
