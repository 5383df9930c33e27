pub mod control;
pub mod tunnel;

pub use control::RelaySettings;

// Relay side of the tunnel: control channel, dial-backs, and the direct tunnel.
