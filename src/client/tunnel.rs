use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{error, info};

use crate::net::BytePump;
use crate::net::pump::report;
use crate::protocol::{SessionToken, token_line};
use crate::tls::LinkConnector;

// -----------------------------------------------------------------------------
// ----- Direct tunnel ---------------------------------------------------------

/// Dial both ends and join them.
///
/// With a `token` this is a dial-back: the token line goes out right after the
/// handshake so the gateway can pair it. Nothing is returned; every outcome
/// is logged and nothing is retried.
pub async fn relay<P: BytePump>(
    target_addr: &str,
    link_addr: &str,
    connector: &LinkConnector,
    token: Option<SessionToken>,
    pump: &P,
) {
    let target = match TcpStream::connect(target_addr).await {
        Ok(stream) => stream,
        Err(e) => {
            error!("unable to dial target address: [{target_addr}] {e}");
            return;
        }
    };

    let _ = target.set_nodelay(true);
    info!("target connection established: [{target_addr}]");

    let mut link = match connector.connect(link_addr).await {
        Ok(link) => link,
        Err(e) => {
            error!("unable to dial link address: [{link_addr}] {e}");
            return;
        }
    };

    if let Some(token) = token {
        let sent = async {
            link.write_all(token_line(&token).as_bytes()).await?;
            link.flush().await
        }
        .await;

        if let Err(e) = sent {
            error!("unable to send session token {token}: {e}");
            return;
        }
    }

    info!("starting data exchange: [{link_addr}] <-> [{target_addr}]");

    let outcome = pump.exchange(link, target).await;
    report(&outcome);
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
