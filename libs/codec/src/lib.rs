//! # Lamport Machines Wire Codec
//!
//! ## Purpose
//!
//! The "rules" layer shared by every machine: what a frame looks like on a
//! byte stream and how to turn bytes back into typed values.
//!
//! - [`ActorId`] and [`Message`], the values machines exchange
//! - [`Frame`] encoding with a length prefix, magic, version and checksum
//! - [`ProtocolError`] for everything that can be wrong with received bytes
//!
//! ## What This Crate Does NOT Contain
//!
//! - Socket management or connection handling (belongs in `network`)
//! - Clock rules (belong in `machine-actors`)
//!
//! ## Architecture Role
//!
//! ```text
//! machine-actors → [codec] → network
//!       ↑            ↓          ↓
//!   Message      Frame bytes   Sockets
//! ```

pub mod constants;
pub mod error;
pub mod frame;

pub use constants::*;
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{check_frame_len, ActorId, Frame, FrameKind, Message};
