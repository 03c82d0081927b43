//! Lamport Clock Engine
//!
//! The three update rules of Lamport's logical clock. Every rule returns the
//! new value and moves the clock forward by at least one; nothing here can
//! decrease it. The clock is owned by one scheduler and is not synchronized.

use codec::Message;

/// Logical clock of one machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct LamportClock {
    value: u64,
}

impl LamportClock {
    pub const fn new() -> Self {
        Self { value: 0 }
    }

    /// Start at an arbitrary value
    pub const fn with_value(value: u64) -> Self {
        Self { value }
    }

    pub const fn value(&self) -> u64 {
        self.value
    }

    /// Local step: `clock + 1`
    pub fn advance_internal(&mut self) -> u64 {
        self.value = self.value.saturating_add(1);
        self.value
    }

    /// Send step: `clock + 1`, and the result is the outgoing timestamp
    pub fn advance_on_send(&mut self) -> u64 {
        self.value = self.value.saturating_add(1);
        self.value
    }

    /// Receive step: `max(clock, peer_clock) + 1`
    pub fn advance_on_receive(&mut self, peer_clock: u64) -> u64 {
        self.value = self.value.max(peer_clock).saturating_add(1);
        self.value
    }
}

/// The receive rule as a pure function
pub fn lamport_receive(local: u64, message: &Message) -> u64 {
    local.max(message.clock()).saturating_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::ActorId;
    use proptest::prelude::*;

    fn message(clock: u64) -> Message {
        Message::new(ActorId::new(2), clock)
    }

    #[test]
    fn test_receive_rule() {
        // Peer ahead
        assert_eq!(lamport_receive(5, &message(10)), 11);
        // Local ahead
        assert_eq!(lamport_receive(12, &message(10)), 13);
        // Equal
        assert_eq!(lamport_receive(10, &message(10)), 11);
    }

    #[test]
    fn test_each_rule_advances_by_one() {
        let mut clock = LamportClock::new();
        assert_eq!(clock.advance_internal(), 1);
        assert_eq!(clock.advance_on_send(), 2);
        assert_eq!(clock.advance_on_receive(0), 3);
        assert_eq!(clock.value(), 3);
    }

    #[test]
    fn test_receive_jumps_past_peer() {
        let mut clock = LamportClock::with_value(1);
        assert_eq!(clock.advance_on_receive(5), 6);
    }

    #[test]
    fn test_saturates_at_max() {
        let mut clock = LamportClock::new();
        assert_eq!(clock.advance_on_receive(u64::MAX), u64::MAX);
        assert_eq!(clock.advance_internal(), u64::MAX);
    }

    proptest! {
        #[test]
        fn prop_receive_exceeds_both(local in 0u64..u64::MAX / 2, peer in 0u64..u64::MAX / 2) {
            let mut clock = LamportClock::with_value(local);
            let next = clock.advance_on_receive(peer);

            prop_assert_eq!(next, local.max(peer) + 1);
            prop_assert!(next > local);
            prop_assert!(next > peer);
            prop_assert_eq!(next, lamport_receive(local, &message(peer)));
        }

        #[test]
        fn prop_clock_strictly_increases(
            start in 0u64..1_000_000,
            steps in prop::collection::vec((0u8..3, 0u64..2_000_000), 1..64),
        ) {
            let mut clock = LamportClock::with_value(start);
            let mut previous = clock.value();

            for (rule, peer_clock) in steps {
                let next = match rule {
                    0 => clock.advance_internal(),
                    1 => clock.advance_on_send(),
                    _ => clock.advance_on_receive(peer_clock),
                };
                prop_assert!(next > previous);
                previous = next;
            }
        }
    }
}
