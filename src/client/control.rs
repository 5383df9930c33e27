use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::net::{BytePump, Shutdown};
use crate::protocol::parse_signal_line;
use crate::tls::LinkConnector;

use super::tunnel;

// -----------------------------------------------------------------------------
// ----- RelaySettings ---------------------------------------------------------

#[derive(Clone, Debug)]
pub struct RelaySettings {
    pub link_addr: String,
    pub target_addr: String,
}

// -----------------------------------------------------------------------------
// ----- Control loop ----------------------------------------------------------

/// Hold the control channel and answer every signal with a dial-back.
///
/// Returns when the gateway closes the channel or on shutdown. Reconnecting is
/// left to whoever runs this.
pub async fn run<P: BytePump>(
    settings: RelaySettings,
    connector: LinkConnector,
    pump: Arc<P>,
    mut shutdown: Shutdown,
) -> io::Result<()> {
    let control = connector.connect(&settings.link_addr).await?;
    info!("control channel established: [{}]", settings.link_addr);

    let settings = Arc::new(settings);
    let mut lines = BufReader::new(control).lines();

    loop {
        let line = tokio::select! {
            biased;
            _ = shutdown.triggered() => return Ok(()),
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            warn!("control channel closed by gateway");
            return Ok(());
        };

        let Some(token) = parse_signal_line(&line) else {
            warn!("ignoring unrecognised control line: {line:?}");
            continue;
        };

        let settings = settings.clone();
        let connector = connector.clone();
        let pump = pump.clone();

        tokio::spawn(async move {
            tunnel::relay(
                &settings.target_addr,
                &settings.link_addr,
                &connector,
                Some(token),
                pump.as_ref(),
            )
            .await;
        });
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
