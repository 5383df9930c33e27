use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

// -----------------------------------------------------------------------------
// ----- Outcome ---------------------------------------------------------------

/// Bytes moved in each direction of an exchange.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Transferred {
    pub a_to_b: u64,
    pub b_to_a: u64,
}

/// `Ok` means one side ended the stream; `Err` is any other termination.
pub type PumpOutcome = io::Result<Transferred>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Closure {
    Graceful,
    Unexpected,
}

impl Closure {
    pub fn of(outcome: &PumpOutcome) -> Self {
        match outcome {
            Ok(_) => Closure::Graceful,
            Err(_) => Closure::Unexpected,
        }
    }
}

/// Log how an exchange ended and hand back its classification.
pub fn report(outcome: &PumpOutcome) -> Closure {
    let closure = Closure::of(outcome);

    match outcome {
        Ok(t) => info!(
            "connection closed successfully: sent={} received={}",
            t.a_to_b, t.b_to_a
        ),
        Err(e) => warn!("connection closed unexpectedly: {e}"),
    }

    closure
}

// -----------------------------------------------------------------------------
// ----- BytePump --------------------------------------------------------------

/// Joins two duplex streams until one of them ends.
pub trait BytePump: Send + Sync + 'static {
    fn exchange<A, B>(&self, a: A, b: B) -> impl Future<Output = PumpOutcome> + Send
    where
        A: AsyncRead + AsyncWrite + Unpin + Send,
        B: AsyncRead + AsyncWrite + Unpin + Send;
}

const PIPE_BUFFER: usize = 16 * 1024;

/// Copies both directions at once and stops as soon as either one ends.
#[derive(Clone, Copy, Debug, Default)]
pub struct CopyPump;

impl BytePump for CopyPump {
    async fn exchange<A, B>(&self, a: A, b: B) -> PumpOutcome
    where
        A: AsyncRead + AsyncWrite + Unpin + Send,
        B: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let (mut a_read, mut a_write) = tokio::io::split(a);
        let (mut b_read, mut b_write) = tokio::io::split(b);

        let mut transferred = Transferred::default();

        let ended = tokio::select! {
            res = pipe(&mut a_read, &mut b_write, &mut transferred.a_to_b) => res,
            res = pipe(&mut b_read, &mut a_write, &mut transferred.b_to_a) => res,
        };

        let _ = a_write.shutdown().await;
        let _ = b_write.shutdown().await;

        ended.map(|()| transferred)
    }
}

/// One direction. `Ok` on end of stream from `reader`.
async fn pipe<R, W>(reader: &mut R, writer: &mut W, count: &mut u64) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; PIPE_BUFFER];

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        writer.write_all(&buf[..n]).await?;
        *count += n as u64;
        writer.flush().await?;
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
