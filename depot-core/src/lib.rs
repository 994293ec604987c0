//! Depot protocol reference implementation.
//! Host-driven: no sockets here; the host owns the streams, the lock and the threads,
//! and feeds protocol lines into [`Depot::dispatch`].

pub mod connection;
pub mod depot;
pub mod deferral;
pub mod identity;
pub mod inventory;
pub mod protocol;
pub mod report;
pub mod wire;

pub use connection::{PeerConnection, PeerWriter, Registry};
pub use depot::{Connector, Depot};
pub use deferral::Deferrals;
pub use identity::{is_valid_name, parse_int, Introduction, IntroductionError, HANDSHAKE_TAG};
pub use inventory::{Inventory, Item};
pub use protocol::{Command, ProtocolError};
pub use report::Report;
