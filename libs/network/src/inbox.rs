//! Delivery seam between read loops and the owning machine.

use codec::Message;

/// Destination for messages decoded by read loops.
///
/// Called concurrently from every read loop of a transport, so implementors
/// must make `deliver` atomic with respect to each other and to their
/// consumer. Messages from one link are delivered in wire order.
pub trait Inbox: Send + Sync + 'static {
    fn deliver(&self, message: Message);
}
