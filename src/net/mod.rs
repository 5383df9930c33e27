// net/mod.rs
//! Networking layer: listeners, the byte pump, and shutdown plumbing.
//! Everything in here is protocol-agnostic.

pub mod pump;
pub mod shutdown;

pub use pump::{BytePump, Closure, CopyPump, PumpOutcome, Transferred};
pub use shutdown::{Shutdown, ShutdownTrigger};

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpSocket};

const LISTEN_BACKLOG: u32 = 1024;

pub fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;

    socket.listen(LISTEN_BACKLOG)
}
