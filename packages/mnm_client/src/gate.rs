//! Pending gate: holds push payloads back while fetches are outstanding.
//!
//! Payloads that arrive while the pending count is non-zero wait in a FIFO
//! queue and are released, oldest first, once it returns to zero. A payload
//! never overtakes one that is already waiting, even if it arrives at a
//! moment when nothing is pending.

use std::collections::VecDeque;
use std::time::Instant;

use tracing::{debug, warn};

/// A push payload with the instant it was first received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deferred {
    pub payload: String,
    pub received_at: Instant,
}

#[derive(Debug, Default)]
pub struct PendingGate {
    pending: usize,
    deferred: VecDeque<Deferred>,
}

impl PendingGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    pub fn begin_fetch(&mut self) {
        self.pending += 1;
    }

    /// Record a completed fetch. Never takes the count below zero.
    pub fn finish_fetch(&mut self) {
        match self.pending.checked_sub(1) {
            Some(n) => self.pending = n,
            None => warn!("fetch completion with no fetch pending"),
        }
    }

    /// Offer a newly received payload.
    ///
    /// Returns it back when it may be processed now; otherwise it is queued.
    pub fn admit(&mut self, payload: String, received_at: Instant) -> Option<Deferred> {
        let item = Deferred {
            payload,
            received_at,
        };
        if self.pending == 0 && self.deferred.is_empty() {
            return Some(item);
        }
        debug!(
            pending = self.pending,
            queued = self.deferred.len(),
            "ws message deferred for pending fetch"
        );
        self.deferred.push_back(item);
        None
    }

    /// Next queued payload, if nothing is pending.
    pub fn next_ready(&mut self) -> Option<Deferred> {
        if self.pending > 0 {
            return None;
        }
        self.deferred.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admit(gate: &mut PendingGate, payload: &str) -> Option<Deferred> {
        gate.admit(payload.to_string(), Instant::now())
    }

    #[test]
    fn idle_gate_admits_immediately() {
        let mut gate = PendingGate::new();
        let item = admit(&mut gate, "[\"/t\"]").unwrap();
        assert_eq!(item.payload, "[\"/t\"]");
        assert_eq!(gate.deferred_len(), 0);
    }

    #[test]
    fn pending_fetch_defers_until_zero() {
        let mut gate = PendingGate::new();
        gate.begin_fetch();
        gate.begin_fetch();
        assert!(admit(&mut gate, "a").is_none());
        assert!(gate.next_ready().is_none());

        gate.finish_fetch();
        assert!(gate.next_ready().is_none());

        gate.finish_fetch();
        assert_eq!(gate.next_ready().unwrap().payload, "a");
        assert!(gate.next_ready().is_none());
    }

    #[test]
    fn deferred_payloads_release_in_arrival_order() {
        let mut gate = PendingGate::new();
        gate.begin_fetch();
        let first = Instant::now();
        assert!(gate.admit("a".into(), first).is_none());
        assert!(admit(&mut gate, "b").is_none());
        gate.finish_fetch();

        // Arrives with nothing pending but must still wait behind "a" and "b".
        assert!(admit(&mut gate, "c").is_none());

        let a = gate.next_ready().unwrap();
        assert_eq!(a.payload, "a");
        assert_eq!(a.received_at, first);

        // Processing "a" starts a fetch; the rest wait again.
        gate.begin_fetch();
        assert!(gate.next_ready().is_none());
        gate.finish_fetch();

        assert_eq!(gate.next_ready().unwrap().payload, "b");
        assert_eq!(gate.next_ready().unwrap().payload, "c");
        assert!(gate.next_ready().is_none());
    }

    #[test]
    fn count_never_goes_negative() {
        let mut gate = PendingGate::new();
        gate.finish_fetch();
        assert_eq!(gate.pending(), 0);
        gate.begin_fetch();
        gate.finish_fetch();
        gate.finish_fetch();
        assert_eq!(gate.pending(), 0);
    }
}
