//! Traffic counters behind the `stats` event.
//!
//! Only granted messages are counted: `in` is what clients were allowed to
//! publish, `out` is what subscribers were allowed to receive.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::arbiter::Direction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub messages_in: u64,
    pub bytes_in: u64,
    pub messages_out: u64,
    pub bytes_out: u64,
}

#[derive(Debug, Default)]
pub struct TrafficStats {
    messages_in: AtomicU64,
    bytes_in: AtomicU64,
    messages_out: AtomicU64,
    bytes_out: AtomicU64,
}

impl TrafficStats {
    pub fn record(&self, direction: Direction, payload_len: usize) {
        let (messages, bytes) = match direction {
            Direction::Inbound => (&self.messages_in, &self.bytes_in),
            Direction::Outbound => (&self.messages_out, &self.bytes_out),
        };
        messages.fetch_add(1, Ordering::Relaxed);
        bytes.fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_in: self.messages_in.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            messages_out: self.messages_out.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
        }
    }
}
