//! Line formats exchanged between gateway and relay.
//!
//! The gateway writes a signal line on the control channel for every session
//! it wants bridged. The line carries a fresh session token. The relay echoes
//! that token as the first line of its dial-back, inside TLS, so the gateway
//! can hand the dial-back to the session that asked for it.

use std::fmt;
use std::io;

use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

pub const SIGNAL_PREFIX: &str = "[PASSPORT]<TCP>";

const TOKEN_HEX_LEN: usize = 32;

/// Upper bound for a token line, newline included.
const MAX_TOKEN_LINE: usize = 64;

// -----------------------------------------------------------------------------
// ----- SessionToken ----------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionToken(u128);

impl SessionToken {
    pub fn generate() -> Self {
        Self(rand::random())
    }

    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != TOKEN_HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }

        u128::from_str_radix(s, 16).ok().map(Self)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

// -----------------------------------------------------------------------------
// ----- Signal line -----------------------------------------------------------

pub fn signal_line(token: &SessionToken) -> String {
    format!("{SIGNAL_PREFIX} {token}\n")
}

/// Accepts a line with or without its trailing newline.
pub fn parse_signal_line(line: &str) -> Option<SessionToken> {
    let line = line.trim_end_matches(['\r', '\n']);
    let token = line.strip_prefix(SIGNAL_PREFIX)?.strip_prefix(' ')?;

    SessionToken::parse(token)
}

// -----------------------------------------------------------------------------
// ----- Token line ------------------------------------------------------------

pub fn token_line(token: &SessionToken) -> String {
    format!("{token}\n")
}

/// Read the dial-back's token line.
///
/// Reads one byte at a time so nothing past the newline is consumed; whatever
/// follows belongs to the exchange.
pub async fn read_token_line<R>(reader: &mut R) -> io::Result<SessionToken>
where
    R: AsyncRead + Unpin,
{
    let mut line = BytesMut::with_capacity(MAX_TOKEN_LINE);

    loop {
        let byte = reader.read_u8().await?;
        if byte == b'\n' {
            break;
        }

        if line.len() + 1 >= MAX_TOKEN_LINE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "token line too long",
            ));
        }

        line.put_u8(byte);
    }

    if line.last() == Some(&b'\r') {
        line.truncate(line.len() - 1);
    }

    std::str::from_utf8(&line)
        .ok()
        .and_then(SessionToken::parse)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed token line"))
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
