use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::errors::SignalError;
use crate::protocol::{SessionToken, signal_line};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const SIGNAL_QUEUE_DEPTH: usize = 256;

const SCRATCH_CAPACITY: usize = 512;

// -----------------------------------------------------------------------------
// ----- SignalChannel ---------------------------------------------------------

/// Owner of the control connection.
///
/// One task holds both halves of the control stream. Sessions never touch the
/// stream; they queue a request and wait for the write result, so signal lines
/// reach the relay whole and one at a time.
pub struct SignalChannel;

impl SignalChannel {
    pub fn spawn<C>(control: C) -> SignalSender
    where
        C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(control);
        let (tx, rx) = mpsc::channel(SIGNAL_QUEUE_DEPTH);

        tokio::spawn(run(reader, writer, rx));

        SignalSender { tx }
    }
}

// -----------------------------------------------------------------------------
// ----- SignalSender ----------------------------------------------------------

#[derive(Clone, Debug)]
pub struct SignalSender {
    tx: mpsc::Sender<SignalRequest>,
}

impl SignalSender {
    /// Ask the relay for a dial-back carrying `token`.
    pub async fn signal(&self, token: SessionToken) -> Result<(), SignalError> {
        let (done, written) = oneshot::channel();

        self.tx
            .send(SignalRequest { token, done })
            .await
            .map_err(|_| SignalError::ChannelClosed)?;

        written
            .await
            .map_err(|_| SignalError::ChannelClosed)?
            .map_err(SignalError::Write)
    }
}

#[derive(Debug)]
struct SignalRequest {
    token: SessionToken,
    done: oneshot::Sender<io::Result<()>>,
}

// -----------------------------------------------------------------------------
// ----- Internal: Actor -------------------------------------------------------

async fn run<C>(
    mut reader: ReadHalf<C>,
    mut writer: WriteHalf<C>,
    mut rx: mpsc::Receiver<SignalRequest>,
) where
    C: AsyncRead + AsyncWrite + Send + Unpin,
{
    let mut scratch = [0u8; SCRATCH_CAPACITY];

    loop {
        tokio::select! {
            request = rx.recv() => {
                let Some(request) = request else { break };

                let line = signal_line(&request.token);
                let written = async {
                    writer.write_all(line.as_bytes()).await?;
                    writer.flush().await
                }
                .await;

                let _ = request.done.send(written);
            }

            // The relay has nothing to say on this channel; reading is how we
            // notice it went away.
            read = reader.read(&mut scratch) => {
                match read {
                    Ok(0) => {
                        warn!("control channel closed by relay");
                        break;
                    }
                    Ok(n) => debug!("ignoring {n} bytes from control channel"),
                    Err(e) => {
                        error!("control channel read failed: {e}");
                        break;
                    }
                }
            }
        }
    }

    let _ = writer.shutdown().await;
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
