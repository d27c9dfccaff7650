//! Round-trip time statistics for network diagnostics

use std::collections::VecDeque;

/// One round-trip measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttSample {
    pub rtt_ms: f32,
    pub timestamp: i64,
}

/// Rolling window of round-trip samples
#[derive(Debug, Clone)]
pub struct NetworkStats {
    // Historical data storage
    samples: VecDeque<RttSample>,
    max_samples: usize,

    // Counters since the session started
    frames_received: u64,
    decode_failures: u64,
    reconnects: u32,
}

impl NetworkStats {
    pub fn new() -> Self {
        Self::with_capacity(100)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
            frames_received: 0,
            decode_failures: 0,
            reconnects: 0,
        }
    }

    /// Record a pong echoing `sent_at`. Negative results (clock skew or a
    /// forged timestamp) are ignored.
    pub fn record_pong(&mut self, sent_at: i64, now: i64) -> Option<f32> {
        let rtt = now - sent_at;
        if rtt < 0 {
            return None;
        }
        let rtt_ms = rtt as f32;
        self.samples.push_back(RttSample {
            rtt_ms,
            timestamp: now,
        });

        // Maintain max samples
        while self.samples.len() > self.max_samples {
            self.samples.pop_front();
        }
        Some(rtt_ms)
    }

    pub fn record_frame(&mut self) {
        self.frames_received += 1;
    }

    pub fn record_decode_failure(&mut self) {
        self.decode_failures += 1;
    }

    pub fn record_reconnect(&mut self) {
        self.reconnects += 1;
    }

    pub fn latest_rtt(&self) -> Option<f32> {
        self.samples.back().map(|s| s.rtt_ms)
    }

    pub fn average_rtt(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        let total: f32 = self.samples.iter().map(|s| s.rtt_ms).sum();
        Some(total / self.samples.len() as f32)
    }

    /// Mean absolute difference between consecutive samples.
    pub fn jitter(&self) -> Option<f32> {
        if self.samples.len() < 2 {
            return None;
        }
        let total: f32 = self
            .samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .map(|(a, b)| (b.rtt_ms - a.rtt_ms).abs())
            .sum();
        Some(total / (self.samples.len() - 1) as f32)
    }

    pub fn max_rtt(&self) -> Option<f32> {
        self.samples.iter().map(|s| s.rtt_ms).reduce(f32::max)
    }

    pub fn samples(&self) -> impl Iterator<Item = &RttSample> {
        self.samples.iter()
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn decode_failures(&self) -> u64 {
        self.decode_failures
    }

    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }
}

impl Default for NetworkStats {
    fn default() -> Self {
        Self::new()
    }
}
