use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::errors::{GatewayError, PairError};
use crate::net::Shutdown;
use crate::protocol::{SessionToken, read_token_line};

// -----------------------------------------------------------------------------
// ----- Types -----------------------------------------------------------------

pub type LinkStream = tokio_rustls::server::TlsStream<TcpStream>;

/// `None` once the acceptor has stopped; nothing can be paired after that.
type Waiting = Arc<Mutex<Option<HashMap<SessionToken, oneshot::Sender<LinkStream>>>>>;

#[derive(Clone, Debug)]
pub struct LinkSettings {
    pub handshake_timeout: Duration,
    pub accept_backoff: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            accept_backoff: Duration::from_secs(1),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- LinkAcceptor ----------------------------------------------------------

pub struct LinkAcceptor;

impl LinkAcceptor {
    /// Take the first connection that completes a TLS handshake as the
    /// control channel.
    pub async fn accept_control(
        listener: &TcpListener,
        tls: &TlsAcceptor,
        settings: &LinkSettings,
        shutdown: &mut Shutdown,
    ) -> Result<LinkStream, GatewayError> {
        loop {
            let accepted = tokio::select! {
                biased;
                _ = shutdown.triggered() => return Err(GatewayError::Shutdown),
                res = listener.accept() => res,
            };

            let (stream, peer) = match accepted {
                Ok(v) => v,
                Err(e) => {
                    error!("unable to accept control connection: {e}");
                    if shutdown.sleep(settings.accept_backoff).await {
                        return Err(GatewayError::Shutdown);
                    }
                    continue;
                }
            };

            let _ = stream.set_nodelay(true);

            match handshake(stream, tls, settings.handshake_timeout).await {
                Ok(control) => {
                    info!("control channel established from: [{peer}]");
                    return Ok(control);
                }
                Err(e) => error!("tls handshake failed for control connection [{peer}]: {e}"),
            }
        }
    }

    /// Own `listener` from now on and pair each dial-back with the session
    /// whose token it echoes.
    pub fn spawn(
        listener: TcpListener,
        tls: TlsAcceptor,
        settings: LinkSettings,
        shutdown: Shutdown,
    ) -> LinkRegistry {
        let waiting: Waiting = Arc::new(Mutex::new(Some(HashMap::new())));

        tokio::spawn(accept_loop(
            listener,
            tls,
            settings,
            waiting.clone(),
            shutdown,
        ));

        LinkRegistry { waiting }
    }
}

// -----------------------------------------------------------------------------
// ----- LinkRegistry ----------------------------------------------------------

#[derive(Clone, Debug)]
pub struct LinkRegistry {
    waiting: Waiting,
}

impl LinkRegistry {
    /// Register interest in the dial-back for `token`. Do this before the
    /// signal goes out, or a quick relay can beat the registration.
    pub fn register(&self, token: SessionToken) -> PendingLink {
        let (tx, rx) = oneshot::channel();

        if let Some(map) = self.waiting.lock().as_mut() {
            map.insert(token, tx);
        }

        PendingLink {
            token,
            rx,
            waiting: self.waiting.clone(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- PendingLink -----------------------------------------------------------

#[derive(Debug)]
pub struct PendingLink {
    token: SessionToken,
    rx: oneshot::Receiver<LinkStream>,
    waiting: Waiting,
}

impl PendingLink {
    pub async fn wait(mut self, limit: Duration) -> Result<LinkStream, PairError> {
        match timeout(limit, &mut self.rx).await {
            Ok(Ok(link)) => Ok(link),
            Ok(Err(_)) => Err(PairError::AcceptorGone),
            Err(_) => Err(PairError::Timeout(limit)),
        }
    }
}

impl Drop for PendingLink {
    fn drop(&mut self) {
        if let Some(map) = self.waiting.lock().as_mut() {
            map.remove(&self.token);
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: Accept loop -------------------------------------------------

async fn accept_loop(
    listener: TcpListener,
    tls: TlsAcceptor,
    settings: LinkSettings,
    waiting: Waiting,
    mut shutdown: Shutdown,
) {
    let local = listener
        .local_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "?".into());

    loop {
        let accepted = tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            res = listener.accept() => res,
        };

        let (stream, peer) = match accepted {
            Ok(v) => v,
            Err(e) => {
                error!("unable to accept connections from link address: [{local}] {e}");
                if shutdown.sleep(settings.accept_backoff).await {
                    break;
                }
                continue;
            }
        };

        let _ = stream.set_nodelay(true);

        let tls = tls.clone();
        let waiting = waiting.clone();
        let limit = settings.handshake_timeout;

        tokio::spawn(async move {
            deliver(stream, peer, &tls, limit, &waiting).await;
        });
    }

    // Dropping every sender wakes the sessions still waiting.
    waiting.lock().take();
    debug!("link acceptor on [{local}] stopped");
}

async fn deliver(
    stream: TcpStream,
    peer: SocketAddr,
    tls: &TlsAcceptor,
    limit: Duration,
    waiting: &Waiting,
) {
    let mut link = match handshake(stream, tls, limit).await {
        Ok(link) => link,
        Err(e) => {
            error!("tls handshake failed for dial-back [{peer}]: {e}");
            return;
        }
    };

    let token = match timeout(limit, read_token_line(&mut link)).await {
        Ok(Ok(token)) => token,
        Ok(Err(e)) => {
            warn!("dial-back [{peer}] sent no valid session token: {e}");
            return;
        }
        Err(_) => {
            warn!("dial-back [{peer}] sent no session token within {limit:?}");
            return;
        }
    };

    let session = waiting.lock().as_mut().and_then(|map| map.remove(&token));

    match session {
        Some(tx) => {
            if tx.send(link).is_err() {
                warn!("session {token} stopped waiting before its dial-back [{peer}] arrived");
            }
        }
        None => warn!("dial-back [{peer}] carries unknown session token {token}; dropping"),
    }
}

/// Explicit handshake with a deadline. A peer that does not speak TLS fails here.
async fn handshake(stream: TcpStream, tls: &TlsAcceptor, limit: Duration) -> io::Result<LinkStream> {
    match timeout(limit, tls.accept(stream)).await {
        Ok(res) => res,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("no handshake within {limit:?}"),
        )),
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> LinkRegistry {
        LinkRegistry {
            waiting: Arc::new(Mutex::new(Some(HashMap::new()))),
        }
    }

    fn waiting(links: &LinkRegistry) -> usize {
        links.waiting.lock().as_ref().map_or(0, HashMap::len)
    }

    #[tokio::test]
    async fn abandoned_wait_leaves_no_entry() {
        let links = registry();
        let pending = links.register(SessionToken::generate());
        assert_eq!(waiting(&links), 1);

        let err = pending.wait(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, PairError::Timeout(_)));
        assert_eq!(waiting(&links), 0);
    }

    #[tokio::test]
    async fn stopped_acceptor_fails_waiters() {
        let links = registry();
        let pending = links.register(SessionToken::generate());

        links.waiting.lock().take();

        let err = pending.wait(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, PairError::AcceptorGone));

        let late = links.register(SessionToken::generate());
        let err = late.wait(Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, PairError::AcceptorGone));
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
