pub mod broker;
pub mod link;
pub mod session;
pub mod signal;

pub use broker::{Admission, DEFAULT_CAPACITY, Gateway, GatewaySettings};
pub use link::{LinkAcceptor, LinkRegistry, LinkSettings, LinkStream, PendingLink};
pub use session::SessionEnd;
pub use signal::{SignalChannel, SignalSender};

// Gateway side of the tunnel: target accept loop, control signaling, dial-back pairing.
