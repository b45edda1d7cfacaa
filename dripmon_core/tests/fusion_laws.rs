//! Fusion-stage laws exercised through the full engine: convergence under
//! agreement, per-sensor dropout, and exact restoration of every
//! measurement variance after fast convergence.

use std::error::Error;
use std::time::Duration;

use dripmon_core::{DripFilterCfg, FusionCfg, Monitor, WeightFilterCfg, WpdCfg};
use dripmon_traits::clock::{Clock, ManualClock};
use dripmon_traits::WeightSensor;
use rstest::rstest;

const TARE_G: f32 = 72.0;

struct SteadyBag {
    clock: ManualClock,
    epoch: std::time::Instant,
    initial_liquid_g: f32,
    drain_gps: f32,
}

impl SteadyBag {
    fn new(clock: &ManualClock, initial_liquid_g: f32, drain_gps: f32) -> Self {
        Self {
            clock: clock.clone(),
            epoch: clock.now(),
            initial_liquid_g,
            drain_gps,
        }
    }
}

impl WeightSensor for SteadyBag {
    fn read(&mut self, _timeout: Duration) -> Result<f32, Box<dyn Error + Send + Sync>> {
        let t_s = self.clock.ms_since(self.epoch) as f32 / 1000.0;
        Ok((self.initial_liquid_g - self.drain_gps * t_s).max(0.0) + TARE_G)
    }
}

fn drive_seconds(monitor: &mut Monitor, clock: &ManualClock, dps: f32, seconds: u64) {
    let handle = monitor.drop_edge_handle();
    let period_ms = if dps > 0.0 { (1000.0 / dps) as u64 } else { 0 };
    let start = monitor.now_ms();
    for s in 0..seconds {
        clock.advance_ms(1000);
        if period_ms > 0 {
            let tick_end = start + (s + 1) * 1000;
            let mut t = (start + s * 1000) / period_ms * period_ms + period_ms;
            while t <= tick_end {
                handle.record_edge(t);
                t += period_ms;
            }
        }
        monitor.tick();
    }
}

#[rstest]
#[case(0.10, 2.0)]
#[case(0.05, 1.0)]
fn fused_flow_converges_when_channels_agree(#[case] drain_gps: f32, #[case] dps: f32) {
    let clock = ManualClock::new();
    let bag = SteadyBag::new(&clock, 500.0, drain_gps);
    let mut monitor = Monitor::builder()
        .with_weight_sensor(bag)
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("build");
    monitor.begin();

    drive_seconds(&mut monitor, &clock, dps, 150);
    let snap = monitor.snapshot();
    assert!(
        (snap.fused_flow_gps - drain_gps).abs() <= 0.01,
        "fused {} vs true {}",
        snap.fused_flow_gps,
        drain_gps
    );
}

#[test]
fn detached_weight_channel_leaves_drop_estimate() {
    let clock = ManualClock::new();
    let bag = SteadyBag::new(&clock, 500.0, 0.1);
    // Weight-channel flow variance so large the sensor is effectively off.
    let mut monitor = Monitor::builder()
        .with_weight_sensor(bag)
        .with_clock(Box::new(clock.clone()))
        .with_fusion(FusionCfg {
            r_flow_weight: 1e9,
            ..FusionCfg::default()
        })
        .build()
        .expect("build");
    monitor.begin();

    drive_seconds(&mut monitor, &clock, 2.0, 150);
    let snap = monitor.snapshot();
    assert!(
        (snap.fused_flow_gps - snap.flow_drip_gps).abs() <= 0.01,
        "fused {} should sit on the drip estimate {}",
        snap.fused_flow_gps,
        snap.flow_drip_gps
    );
}

#[test]
fn fast_convergence_shrinks_then_restores_every_r_exactly() {
    let clock = ManualClock::new();
    let bag = SteadyBag::new(&clock, 500.0, 0.0);
    let weight_cfg = WeightFilterCfg::default();
    let drip_cfg = DripFilterCfg::default();
    let wpd_cfg = WpdCfg::default();
    let fusion_cfg = FusionCfg::default();
    let mut monitor = Monitor::builder()
        .with_weight_sensor(bag)
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("build");

    monitor.begin();
    // During fast convergence every R is the original divided by 10.
    assert_eq!(monitor.weight_measurement_noise(), weight_cfg.r / 10.0);
    assert_eq!(monitor.drip_measurement_noise(), drip_cfg.r / 10.0);
    assert_eq!(monitor.wpd_measurement_noise(), wpd_cfg.r / 10.0);
    assert_eq!(
        monitor.fusion_flow_noises(),
        (fusion_cfg.r_flow_weight / 10.0, fusion_cfg.r_flow_drip / 10.0)
    );

    drive_seconds(&mut monitor, &clock, 2.0, 61);

    // After T_fc each R equals the value captured at startup, exactly.
    assert_eq!(monitor.weight_measurement_noise(), weight_cfg.r);
    assert_eq!(monitor.drip_measurement_noise(), drip_cfg.r);
    assert_eq!(monitor.wpd_measurement_noise(), wpd_cfg.r);
    assert_eq!(
        monitor.fusion_flow_noises(),
        (fusion_cfg.r_flow_weight, fusion_cfg.r_flow_drip)
    );
    assert_eq!(
        monitor.fusion_remaining_noises(),
        (fusion_cfg.r_remaining_weight, fusion_cfg.r_remaining_drip)
    );
}

#[test]
fn repeated_reinit_does_not_corrupt_saved_originals() {
    let clock = ManualClock::new();
    let bag = SteadyBag::new(&clock, 500.0, 0.0);
    let mut monitor = Monitor::builder()
        .with_weight_sensor(bag)
        .with_clock(Box::new(clock.clone()))
        .build()
        .expect("build");

    // Three reinits in a row keep shrinking from the *original*, never
    // from the already-shrunken value.
    for _ in 0..3 {
        monitor.begin();
        assert_eq!(
            monitor.weight_measurement_noise(),
            WeightFilterCfg::default().r / 10.0
        );
    }
    drive_seconds(&mut monitor, &clock, 0.0, 61);
    assert_eq!(
        monitor.weight_measurement_noise(),
        WeightFilterCfg::default().r
    );
}
