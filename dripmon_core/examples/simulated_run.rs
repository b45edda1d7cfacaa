//! Example: drive the engine against a simulated bag and drip chamber.
//!
//! Runs 180 virtual seconds of a 500 g infusion at 2 drops/s and prints a
//! snapshot every 30 s. Uses a manually-advanced clock, so it finishes
//! immediately.

use std::sync::Arc;

use dripmon_core::Monitor;
use dripmon_hardware::sim::{DripSchedule, SimulatedBag};
use dripmon_traits::clock::ManualClock;

fn main() -> eyre::Result<()> {
    let clock = ManualClock::new();
    // 500 g of liquid plus the 72 g fixture/bag tare, draining at the
    // rate the drip schedule implies (2 dps x 0.05 g/drop).
    let bag = SimulatedBag::new(572.0, 0.1).with_clock(Arc::new(clock.clone()));

    let mut monitor = Monitor::builder()
        .with_weight_sensor(bag)
        .with_clock(Box::new(clock.clone()))
        .build()?;
    monitor.begin();

    let mut schedule = DripSchedule::new(0, 2.0);
    let edges = monitor.drop_edge_handle();
    for second in 1..=180u64 {
        clock.advance_ms(1000);
        for edge in schedule.edges_until(monitor.now_ms()) {
            edges.record_edge(edge);
        }
        let report = monitor.tick();
        for event in &report.events {
            println!("t={second:>3}s event: {event:?}");
        }
        if second % 30 == 0 {
            let s = &report.snapshot;
            println!(
                "t={second:>3}s state={:?} mass={:.1}g flow={:.3}g/s wpd={:.4}g/drop remaining={:.0}s",
                s.state, s.filtered_mass_g, s.fused_flow_gps, s.wpd_gpd, s.remaining_time_fused_s
            );
        }
    }
    Ok(())
}
