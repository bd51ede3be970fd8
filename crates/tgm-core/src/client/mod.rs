//! Remote platform client abstractions.
//!
//! The session/auth handshake lives behind `RemoteClient`; the core only sees
//! typed messages decoded at the adapter boundary.

pub mod port;
pub mod throttled;
pub mod types;
