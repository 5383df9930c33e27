use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;
use tokio::time::timeout;
use tracing::{error, info};

use crate::errors::SignalError;
use crate::net::BytePump;
use crate::net::pump::{Closure, report};
use crate::protocol::SessionToken;

use super::link::LinkRegistry;
use super::signal::SignalSender;

// -----------------------------------------------------------------------------
// ----- SessionContext --------------------------------------------------------

/// What every session of one gateway shares.
#[derive(Debug)]
pub(crate) struct SessionContext<P> {
    pub(crate) links: LinkRegistry,
    pub(crate) signals: SignalSender,
    pub(crate) pump: P,
    pub(crate) pair_timeout: Duration,
}

// -----------------------------------------------------------------------------
// ----- GatewaySession --------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    SignalFailed,
    Unpaired,
    Exchanged(Closure),
}

/// One brokered connection pair. Owns the target socket, later the link
/// socket, and its slot; all three go away when `run` returns.
#[derive(Debug)]
pub(crate) struct GatewaySession<P> {
    target: TcpStream,
    client: SocketAddr,
    _slot: OwnedSemaphorePermit,
    ctx: Arc<SessionContext<P>>,
}

impl<P: BytePump> GatewaySession<P> {
    pub(crate) fn new(
        target: TcpStream,
        client: SocketAddr,
        slot: OwnedSemaphorePermit,
        ctx: Arc<SessionContext<P>>,
    ) -> Self {
        Self {
            target,
            client,
            _slot: slot,
            ctx,
        }
    }

    pub(crate) async fn run(self) -> SessionEnd {
        let token = SessionToken::generate();
        let pending = self.ctx.links.register(token);

        let limit = self.ctx.pair_timeout;
        let signalled = match timeout(limit, self.ctx.signals.signal(token)).await {
            Ok(res) => res,
            Err(_) => Err(SignalError::Timeout(limit)),
        };

        if let Err(e) = signalled {
            error!("unable to send signal for [{}]: {e}", self.client);
            return SessionEnd::SignalFailed;
        }

        let link = match pending.wait(self.ctx.pair_timeout).await {
            Ok(link) => link,
            Err(e) => {
                error!("unable to pair dial-back for [{}]: {e}", self.client);
                return SessionEnd::Unpaired;
            }
        };

        let relay = link
            .get_ref()
            .0
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "?".into());
        info!("starting data exchange: [{}] <-> [{relay}]", self.client);

        let outcome = self.ctx.pump.exchange(link, self.target).await;

        SessionEnd::Exchanged(report(&outcome))
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
