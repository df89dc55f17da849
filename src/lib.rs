//! Cryptographic core of an OTRv4-style secure messaging session: the DAKE
//! handshake, the double ratchet, data-message/TLV framing, and wire armor.
//! Host applications supply storage and transport through [`session::HostCallbacks`]
//! and drive a conversation through [`session::Session`].

pub mod armor;
pub mod constants;
pub mod dake;
pub mod errors;
pub mod message;
pub mod primitives;
pub mod profile;
pub mod ratchet;
pub mod ring_sig;
pub mod session;

pub use errors::OtrError;
pub use session::{HostCallbacks, Policy, Session, SessionOutput, SessionState};
