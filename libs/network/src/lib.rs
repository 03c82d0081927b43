//! Network Infrastructure
//!
//! Point-to-point TCP links between Lamport machines.
//!
//! - [`transports`]: length-prefixed frame reader/writer and transport tunables
//! - [`PeerSession`]: one identified link, writes serialized per peer
//! - [`PeerTransport`]: accept loop, startup dialing with backoff, session
//!   table, read loops and bounded shutdown
//! - [`Inbox`]: where read loops hand decoded messages to the machine
//!
//! ## Usage
//!
//! ```rust,no_run
//! use codec::{ActorId, Message};
//! use machine_config::Peer;
//! use network::{Inbox, PeerTransport, TransportConfig};
//! use std::sync::Arc;
//!
//! struct Print;
//! impl Inbox for Print {
//!     fn deliver(&self, message: Message) {
//!         println!("{} sent clock {}", message.sender(), message.clock());
//!     }
//! }
//!
//! # async fn run() -> network::Result<()> {
//! let peers = vec![Peer::new(ActorId::new(2), "127.0.0.1", 5002)];
//! let transport = PeerTransport::new(ActorId::new(1), peers, Arc::new(Print), TransportConfig::default());
//! transport.listen("127.0.0.1:5001").await?;
//! transport.establish_links().await?;
//! transport.send(ActorId::new(2), Message::new(ActorId::new(1), 1)).await?;
//! transport.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod inbox;
pub mod peer_transport;
pub mod session;
pub mod transports;

// Re-export commonly used types
pub use error::{Result, TransportError};
pub use inbox::Inbox;
pub use peer_transport::{PeerTransport, TransportStatsSnapshot};
pub use session::{initiates_link, LinkRole, PeerSession};
pub use transports::{RetryConfig, TransportConfig};
