//! # Wire Constants
//!
//! Values that define the frame layout shared by every machine. They must
//! stay stable across builds that talk to each other.
//!
//! ```text
//! ┌──────────────┬────────────────────────────────────────────────┐
//! │ length (u32) │ body                                           │
//! │              │ ┌───────┬─────────┬──────┬──────────┬────────┐ │
//! │              │ │ magic │ version │ kind │ checksum │payload │ │
//! │              │ │  u16  │   u8    │  u8  │   u32    │  ...   │ │
//! │              │ └───────┴─────────┴──────┴──────────┴────────┘ │
//! └──────────────┴────────────────────────────────────────────────┘
//! ```
//!
//! All integers are big-endian.

/// Magic number at the start of every frame body
pub const FRAME_MAGIC: u16 = 0x1A4C;

/// Current wire version
pub const PROTOCOL_VERSION: u8 = 1;

/// Size of the length prefix preceding each frame body
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Size of the fixed body header (magic + version + kind + checksum)
pub const HEADER_SIZE: usize = 8;

/// Largest body a reader will accept. Anything bigger means the stream is
/// out of sync and cannot be trusted.
pub const MAX_FRAME_LEN: usize = 1024;

/// Payload size of a `Hello` frame (actor id)
pub const HELLO_PAYLOAD_SIZE: usize = 4;

/// Payload size of a `Clock` frame (sender id + logical clock)
pub const CLOCK_PAYLOAD_SIZE: usize = 12;
