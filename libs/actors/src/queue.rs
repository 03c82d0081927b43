//! Inbound Queue
//!
//! Unbounded FIFO of received messages. Read loops push through cloned
//! [`QueueProducer`] handles; only the owning tick loop pops.

use codec::Message;
use network::Inbox;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

type Shared = Arc<Mutex<VecDeque<Message>>>;

/// Consumer side, owned by the scheduler
#[derive(Debug, Default)]
pub struct InboundQueue {
    messages: Shared,
}

/// Producer side handed to read loops
#[derive(Debug, Clone)]
pub struct QueueProducer {
    messages: Shared,
}

impl InboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn producer(&self) -> QueueProducer {
        QueueProducer {
            messages: Arc::clone(&self.messages),
        }
    }

    pub fn enqueue(&self, message: Message) {
        self.messages.lock().push_back(message);
    }

    /// Pop the oldest message, never blocking
    pub fn dequeue_if_any(&self) -> Option<Message> {
        self.messages.lock().pop_front()
    }

    /// Pop the oldest message together with the number still pending
    pub fn dequeue_with_len(&self) -> Option<(Message, usize)> {
        let mut messages = self.messages.lock();
        messages.pop_front().map(|message| (message, messages.len()))
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

impl QueueProducer {
    pub fn enqueue(&self, message: Message) {
        self.messages.lock().push_back(message);
    }
}

impl Inbox for QueueProducer {
    fn deliver(&self, message: Message) {
        self.enqueue(message);
    }
}
