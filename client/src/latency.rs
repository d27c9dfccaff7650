//! Artificial inbound latency.
//!
//! Inbound state updates sit here until `enqueue time + latency` has passed,
//! which lets the rest of the client be exercised under a simulated ping.

use log::warn;
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq)]
pub struct DelayedMessage<T> {
    pub payload: T,
    pub delivery_time: i64,
}

/// Delay queue releasing messages in arrival order.
///
/// Depth is not bounded. A warning is logged once when it crosses
/// `warn_depth`, since a stalled tick loop would otherwise grow it silently.
#[derive(Debug)]
pub struct LatencyBuffer<T> {
    queue: VecDeque<DelayedMessage<T>>,
    latency_ms: i64,
    warn_depth: usize,
    warned: bool,
    // False once latency was lowered with messages still queued, which can
    // put a later message's delivery time before an earlier one's.
    ordered: bool,
}

impl<T> LatencyBuffer<T> {
    pub fn new(latency_ms: i64, warn_depth: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            latency_ms: latency_ms.max(0),
            warn_depth,
            warned: false,
            ordered: true,
        }
    }

    pub fn push(&mut self, payload: T, now: i64) {
        self.queue.push_back(DelayedMessage {
            payload,
            delivery_time: now + self.latency_ms,
        });

        if !self.warned && self.queue.len() >= self.warn_depth {
            warn!(
                "Latency buffer holds {} undelivered messages (latency {}ms)",
                self.queue.len(),
                self.latency_ms
            );
            self.warned = true;
        }
    }

    /// Removes and returns every message due at `now`, oldest first.
    pub fn pop_ready(&mut self, now: i64) -> Vec<T> {
        let mut ready = Vec::new();

        if self.ordered {
            while self.queue.front().is_some_and(|m| m.delivery_time <= now) {
                if let Some(message) = self.queue.pop_front() {
                    ready.push(message.payload);
                }
            }
        } else {
            let mut pending = VecDeque::with_capacity(self.queue.len());
            for message in self.queue.drain(..) {
                if message.delivery_time <= now {
                    ready.push(message.payload);
                } else {
                    pending.push_back(message);
                }
            }
            self.queue = pending;
        }

        if self.queue.is_empty() {
            self.ordered = true;
        }
        if self.queue.len() < self.warn_depth {
            self.warned = false;
        }
        ready
    }

    /// Applies to messages pushed from now on.
    pub fn set_latency(&mut self, latency_ms: i64) {
        let latency_ms = latency_ms.max(0);
        if latency_ms < self.latency_ms && !self.queue.is_empty() {
            self.ordered = false;
        }
        self.latency_ms = latency_ms;
    }

    pub fn latency(&self) -> i64 {
        self.latency_ms
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.warned = false;
        self.ordered = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_released_exactly_at_delivery_time() {
        let mut buffer = LatencyBuffer::new(80, 64);
        buffer.push("state", 1_000);

        assert!(buffer.pop_ready(1_079).is_empty());
        assert_eq!(buffer.pop_ready(1_080), vec!["state"]);
        assert!(buffer.pop_ready(1_080).is_empty());
        assert!(buffer.pop_ready(5_000).is_empty());
    }

    #[test]
    fn test_zero_latency_is_fifo_passthrough() {
        let mut buffer = LatencyBuffer::new(0, 64);
        buffer.push(1, 10);
        buffer.push(2, 10);
        buffer.push(3, 11);
        assert_eq!(buffer.pop_ready(11), vec![1, 2, 3]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_arrival_order_kept_after_latency_change() {
        let mut buffer = LatencyBuffer::new(200, 64);
        buffer.push("slow", 0);
        buffer.set_latency(50);
        buffer.push("fast", 10);

        assert_eq!(buffer.pop_ready(60), vec!["fast"]);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.pop_ready(200), vec!["slow"]);
    }

    #[test]
    fn test_negative_latency_clamped() {
        let mut buffer = LatencyBuffer::new(-30, 64);
        assert_eq!(buffer.latency(), 0);
        buffer.push('a', 5);
        assert_eq!(buffer.pop_ready(5), vec!['a']);
    }
}
