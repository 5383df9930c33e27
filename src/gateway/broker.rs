use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::Allowlist;
use crate::errors::GatewayError;
use crate::net::{BytePump, CopyPump, Shutdown};

use super::link::LinkRegistry;
use super::session::{GatewaySession, SessionContext};
use super::signal::SignalSender;

// -----------------------------------------------------------------------------
// ----- Admission -------------------------------------------------------------

/// Whether target clients are checked against an allowlist.
#[derive(Clone, Debug, Default)]
pub enum Admission {
    #[default]
    Open,
    Allowlist(Allowlist),
}

impl Admission {
    pub fn admits(&self, ip: &IpAddr) -> bool {
        match self {
            Admission::Open => true,
            Admission::Allowlist(list) => list.contains(ip),
        }
    }

    /// Decide on one accepted connection. `peer` is only consulted when an
    /// allowlist is enforced.
    pub(crate) fn screen<F>(&self, peer: F) -> Screening
    where
        F: FnOnce() -> io::Result<SocketAddr>,
    {
        if let Admission::Open = self {
            return Screening::Admit;
        }

        match peer() {
            Ok(addr) => {
                let ip = addr.ip().to_canonical();
                if self.admits(&ip) {
                    Screening::Admit
                } else {
                    Screening::Reject(ip)
                }
            }
            Err(e) => Screening::Unidentified(e),
        }
    }
}

/// Outcome of screening a target connection.
#[derive(Debug)]
pub(crate) enum Screening {
    Admit,
    /// Not on the allowlist: close now, no backoff.
    Reject(IpAddr),
    /// Client ip could not be extracted: close, then back off.
    Unidentified(io::Error),
}

// -----------------------------------------------------------------------------
// ----- GatewaySettings -------------------------------------------------------

pub const DEFAULT_CAPACITY: usize = 1024;

#[derive(Clone, Debug)]
pub struct GatewaySettings {
    /// Upper bound on sessions between signal and pump completion.
    pub capacity: usize,
    pub pair_timeout: Duration,
    pub accept_backoff: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            pair_timeout: Duration::from_secs(30),
            accept_backoff: Duration::from_secs(1),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Gateway ---------------------------------------------------------------

pub struct Gateway<P = CopyPump> {
    ctx: Arc<SessionContext<P>>,
    admission: Admission,
    slots: Arc<Semaphore>,
    accept_backoff: Duration,
}

impl Gateway<CopyPump> {
    pub fn new(
        links: LinkRegistry,
        signals: SignalSender,
        admission: Admission,
        settings: GatewaySettings,
    ) -> Self {
        Self::with_pump(links, signals, admission, settings, CopyPump)
    }
}

impl<P: BytePump> Gateway<P> {
    pub fn with_pump(
        links: LinkRegistry,
        signals: SignalSender,
        admission: Admission,
        settings: GatewaySettings,
        pump: P,
    ) -> Self {
        let capacity = settings.capacity.max(1);

        Self {
            ctx: Arc::new(SessionContext {
                links,
                signals,
                pump,
                pair_timeout: settings.pair_timeout,
            }),
            admission,
            slots: Arc::new(Semaphore::new(capacity)),
            accept_backoff: settings.accept_backoff,
        }
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    /// Accept target connections until `shutdown` fires.
    ///
    /// In-flight sessions are not cancelled; they finish on their own.
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown: Shutdown,
    ) -> Result<(), GatewayError> {
        let local = listener.local_addr()?;
        info!("accepting target connections on {local}");

        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                res = listener.accept() => res,
            };

            let (target, peer) = match accepted {
                Ok(v) => v,
                Err(e) => {
                    error!("unable to accept connections from target address: [{local}] {e}");
                    if shutdown.sleep(self.accept_backoff).await {
                        break;
                    }
                    continue;
                }
            };

            info!("target connection established from: [{peer}]");

            match self.admission.screen(|| target.peer_addr()) {
                Screening::Admit => {}
                Screening::Reject(ip) => {
                    warn!("unauthorized ip address blocked: [{ip}]");
                    continue;
                }
                Screening::Unidentified(e) => {
                    error!("unable to extract client ip address: [{peer}] {e}");
                    drop(target);
                    if shutdown.sleep(self.accept_backoff).await {
                        break;
                    }
                    continue;
                }
            }

            // Backpressure: with every slot taken, stop accepting.
            let slot = tokio::select! {
                biased;
                _ = shutdown.triggered() => break,
                permit = self.slots.clone().acquire_owned() => {
                    permit.map_err(|_| GatewayError::SlotsClosed)?
                }
            };

            let _ = target.set_nodelay(true);
            let session = GatewaySession::new(target, peer, slot, self.ctx.clone());

            tokio::spawn(async move {
                let end = session.run().await;
                debug!("session for [{peer}] finished: {end:?}");
            });
        }

        info!("stopped accepting target connections on {local}");
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
