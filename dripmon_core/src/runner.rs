//! Paced tick loop for hosts: sleeps one period on the engine's clock,
//! lets the caller inject drop edges, ticks, and hands every report to a
//! sink. With a `ManualClock` the sleep advances virtual time, so the same
//! loop drives real devices and deterministic simulations.

use std::time::Duration;

use crate::drop_ring::DropEdgeHandle;
use crate::monitor::{Monitor, TickReport};
use crate::snapshot::Snapshot;

/// Run `ticks` iterations of the main loop.
///
/// `before_tick(now_ms, edges)` runs after the period sleep and before the
/// tick, which is where a simulation feeds due drop edges; `sink` receives
/// every report. Returns the final snapshot.
pub fn run_ticks(
    monitor: &mut Monitor,
    ticks: u64,
    mut before_tick: impl FnMut(u64, &DropEdgeHandle),
    mut sink: impl FnMut(&TickReport),
) -> Snapshot {
    let period = Duration::from_millis(monitor.tick_period_ms());
    let clock = monitor.clock();
    let edges = monitor.drop_edge_handle();

    for _ in 0..ticks {
        clock.sleep(period);
        before_tick(monitor.now_ms(), &edges);
        let report = monitor.tick();
        sink(&report);
    }
    monitor.snapshot().clone()
}
