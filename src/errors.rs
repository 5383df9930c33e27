use std::path::PathBuf;

use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- TlsError --------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to open {what} {path:?}: {source}")]
    Open {
        what: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read {what} {path:?}: {source}")]
    Read {
        what: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no {what} found in {path:?}")]
    Missing { what: &'static str, path: PathBuf },

    #[error("invalid tls configuration: {0}")]
    Config(#[from] rustls::Error),

    #[error("invalid server name '{0}'")]
    ServerName(String),

    #[error("certificate verification needs a --ca-file (or --insecure to disable it)")]
    NoTrustRoots,
}

// -----------------------------------------------------------------------------
// ----- SignalError -----------------------------------------------------------

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("control channel write failed: {0}")]
    Write(#[from] std::io::Error),

    #[error("control channel closed")]
    ChannelClosed,

    #[error("signal not written within {0:?}")]
    Timeout(std::time::Duration),
}

// -----------------------------------------------------------------------------
// ----- PairError -------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PairError {
    #[error("no dial-back within {0:?}")]
    Timeout(std::time::Duration),

    #[error("link acceptor is gone")]
    AcceptorGone,
}

// -----------------------------------------------------------------------------
// ----- GatewayError ----------------------------------------------------------

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("session slots closed")]
    SlotsClosed,

    #[error("shutdown before the control channel was established")]
    Shutdown,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
