//! Drop-edge ingest: debounce, bounded timestamp ring, per-tick rate
//! extraction.
//!
//! The producer side is the edge-interrupt context; it must never block,
//! so the ring is a bounded channel with drop-oldest overflow plus two
//! atomic words (`last_edge`, `last_drip`). The consumer side is the tick
//! orchestrator, which drains the ring once per tick and keeps the last
//! timestamp as the seed for the next window.

use crossbeam_channel as xch;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Two edges closer than this are treated as sensor bounce.
pub const DEBOUNCE_MS: u64 = 50;

/// Interval window considered physical when computing the per-tick rate.
/// Shorter is bounce that slipped through, longer is a sensor gap.
pub const MIN_INTERVAL_MS: f32 = 50.0;
pub const MAX_INTERVAL_MS: f32 = 5000.0;

/// Default ring capacity; must cover the largest expected burst per tick.
pub const DEFAULT_RING_CAPACITY: usize = 20;

/// Create a connected producer/consumer pair over a ring of `capacity`
/// timestamps.
pub fn drop_channel(capacity: usize) -> (DropEdgeHandle, DropDrain) {
    let (tx, rx) = xch::bounded(capacity.max(1));
    let last_edge = Arc::new(AtomicU64::new(0));
    let last_drip = Arc::new(AtomicU64::new(0));
    let handle = DropEdgeHandle {
        tx,
        rx: rx.clone(),
        last_edge_ms: last_edge,
        last_drip_ms: last_drip.clone(),
    };
    let drain = DropDrain {
        rx,
        head: None,
        last_drip_ms: last_drip,
    };
    (handle, drain)
}

/// Producer handle for the edge-interrupt context. Cloneable; every write
/// is a channel send or an atomic store, so the handler runs in bounded
/// time.
#[derive(Clone)]
pub struct DropEdgeHandle {
    tx: xch::Sender<u64>,
    rx: xch::Receiver<u64>,
    last_edge_ms: Arc<AtomicU64>,
    last_drip_ms: Arc<AtomicU64>,
}

impl DropEdgeHandle {
    /// Record one detected edge. Returns false when the edge was discarded
    /// as bounce.
    pub fn record_edge(&self, now_ms: u64) -> bool {
        let last = self.last_edge_ms.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) <= DEBOUNCE_MS {
            return false;
        }
        if self.tx.try_send(now_ms).is_err() {
            // Ring full: drop the oldest timestamp, never block.
            let _ = self.rx.try_recv();
            let _ = self.tx.try_send(now_ms);
        }
        self.last_edge_ms.store(now_ms, Ordering::Relaxed);
        self.last_drip_ms.store(now_ms, Ordering::Relaxed);
        true
    }

    /// Timestamp of the most recent accepted edge (0 before the first).
    pub fn last_drip_ms(&self) -> u64 {
        self.last_drip_ms.load(Ordering::Relaxed)
    }
}

/// What one tick extracted from the ring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickDrops {
    /// Rate over the accepted intervals; `None` when fewer than two
    /// timestamps were available, in which case no rate exists this tick.
    pub measured_rate_dps: Option<f32>,
    /// Count of accepted intervals, i.e. drops accounted for this tick.
    pub new_drops: u32,
}

/// Consumer side, owned by the tick orchestrator.
pub struct DropDrain {
    rx: xch::Receiver<u64>,
    head: Option<u64>,
    last_drip_ms: Arc<AtomicU64>,
}

impl DropDrain {
    /// Drain everything queued since the previous tick and reduce it to a
    /// measured rate. The last timestamp is retained to seed the next
    /// window, so intervals spanning tick boundaries are not lost.
    pub fn drain(&mut self) -> TickDrops {
        let mut ts: Vec<u64> = Vec::with_capacity(DEFAULT_RING_CAPACITY + 1);
        if let Some(h) = self.head.take() {
            ts.push(h);
        }
        ts.extend(self.rx.try_iter());

        if ts.len() <= 1 {
            self.head = ts.pop();
            return TickDrops {
                measured_rate_dps: None,
                new_drops: 0,
            };
        }

        let mut total_ms = 0.0f32;
        let mut accepted = 0u32;
        for pair in ts.windows(2) {
            let interval_ms = pair[1].saturating_sub(pair[0]) as f32;
            if interval_ms > MIN_INTERVAL_MS && interval_ms < MAX_INTERVAL_MS {
                total_ms += interval_ms;
                accepted += 1;
            }
        }

        let rate = if accepted > 0 {
            1000.0 / (total_ms / accepted as f32)
        } else {
            0.0
        };
        self.head = ts.last().copied();

        TickDrops {
            measured_rate_dps: Some(rate),
            new_drops: accepted,
        }
    }

    /// Timestamp of the most recent accepted edge (0 before the first).
    pub fn last_drip_ms(&self) -> u64 {
        self.last_drip_ms.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debounce_discards_close_edges() {
        let (h, mut d) = drop_channel(8);
        assert!(h.record_edge(100));
        assert!(!h.record_edge(120)); // 20 ms after previous
        assert!(!h.record_edge(150)); // exactly at the debounce bound
        assert!(h.record_edge(151));
        let out = d.drain();
        // two edges, one interval of 51 ms -> accepted
        assert_eq!(out.new_drops, 1);
    }

    #[test]
    fn single_edge_carries_over_to_next_tick() {
        let (h, mut d) = drop_channel(8);
        h.record_edge(1000);
        let out = d.drain();
        assert_eq!(out.measured_rate_dps, None);
        assert_eq!(out.new_drops, 0);
        // next tick the retained head pairs with the new edge
        h.record_edge(1500);
        let out = d.drain();
        assert_eq!(out.new_drops, 1);
        let rate = out.measured_rate_dps.expect("rate");
        assert!((rate - 2.0).abs() < 1e-3);
    }

    #[test]
    fn rate_is_inverse_mean_of_accepted_intervals() {
        let (h, mut d) = drop_channel(16);
        for t in [0u64, 500, 1000, 1500, 2000] {
            h.record_edge(t);
        }
        let out = d.drain();
        // first edge at 0 is debounced against last_edge==0
        assert_eq!(out.new_drops, 3);
        assert!((out.measured_rate_dps.unwrap() - 2.0).abs() < 1e-3);
    }

    #[test]
    fn long_gaps_are_excluded_from_the_mean() {
        let (h, mut d) = drop_channel(16);
        for t in [100u64, 600, 7000, 7500] {
            h.record_edge(t);
        }
        let out = d.drain();
        // intervals: 500 (ok), 6400 (gap), 500 (ok)
        assert_eq!(out.new_drops, 2);
        assert!((out.measured_rate_dps.unwrap() - 2.0).abs() < 1e-3);
    }

    #[test]
    fn overflow_drops_the_oldest_timestamp() {
        let (h, mut d) = drop_channel(4);
        for i in 0..8u64 {
            h.record_edge(100 + i * 500);
        }
        let out = d.drain();
        // capacity 4 retains the newest four edges -> three intervals
        assert_eq!(out.new_drops, 3);
    }

    #[test]
    fn last_drip_tracks_accepted_edges_only() {
        let (h, d) = drop_channel(8);
        h.record_edge(1000);
        h.record_edge(1010); // bounce
        assert_eq!(h.last_drip_ms(), 1000);
        assert_eq!(d.last_drip_ms(), 1000);
    }
}
