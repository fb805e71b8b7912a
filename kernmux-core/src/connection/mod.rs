//! Client connection capability
//!
//! The transport (socket framing, authentication) lives outside this crate.
//! It hands the multiplexer [`Connection`]s through [`ConnectionEvent`]s.

pub mod channel;
pub mod traits;

pub use channel::ChannelConnection;
pub use traits::{Connection, ConnectionEvent, ConnectionId, ConnectionRef};
