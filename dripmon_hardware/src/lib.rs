//! dripmon_hardware: simulation backends behind `dripmon_traits`.
//!
//! The physical load-cell driver lives with the device firmware; this crate
//! provides the typed error vocabulary shared with the core plus
//! deterministic simulated sensors used by the CLI and the test suites.

pub mod error;

pub mod sim {
    use crate::error::HwError;
    use dripmon_traits::clock::Clock;
    use dripmon_traits::WeightSensor;
    use std::error::Error;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    /// Simulated draining infusion bag on a load cell.
    ///
    /// Gross mass starts at `gross_g` and falls by `drain_gps` per elapsed
    /// second. Time comes either from an attached [`Clock`] (so a
    /// `ManualClock` shared with the engine drives the drain) or from
    /// explicit [`advance`](Self::advance) calls. An optional noise
    /// sequence is added sample-by-sample, cycling when exhausted, so runs
    /// stay reproducible.
    pub struct SimulatedBag {
        base_gross_g: f32,
        drain_gps: f32,
        base_elapsed_s: f32,
        clock: Option<(Arc<dyn Clock + Send + Sync>, Instant)>,
        manual_elapsed: Duration,
        noise_seq: Vec<f32>,
        noise_idx: usize,
        fail_reads: u32,
    }

    impl SimulatedBag {
        pub fn new(gross_g: f32, drain_gps: f32) -> Self {
            Self {
                base_gross_g: gross_g,
                drain_gps,
                base_elapsed_s: 0.0,
                clock: None,
                manual_elapsed: Duration::ZERO,
                noise_seq: Vec::new(),
                noise_idx: 0,
                fail_reads: 0,
            }
        }

        /// Drive the drain from a shared clock instead of `advance`.
        pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
            let epoch = clock.now();
            self.clock = Some((clock, epoch));
            self
        }

        /// Additive noise applied per read, cycling over the sequence.
        pub fn with_noise(mut self, seq: Vec<f32>) -> Self {
            self.noise_seq = seq;
            self
        }

        /// Make the next `n` reads fail with `HwError::NotReady`.
        pub fn fail_for(&mut self, n: u32) {
            self.fail_reads = n;
        }

        /// Change the drain rate mid-run (e.g. simulate an occlusion).
        /// The mass already drained stays drained.
        pub fn set_drain_gps(&mut self, gps: f32) {
            let now = self.elapsed_s();
            self.base_gross_g = self.gross_at(now);
            self.base_elapsed_s = now;
            self.drain_gps = gps;
        }

        /// Advance the simulated timeline (manual mode only).
        pub fn advance(&mut self, dt: Duration) {
            self.manual_elapsed += dt;
        }

        fn elapsed_s(&self) -> f32 {
            match &self.clock {
                Some((clock, epoch)) => clock.ms_since(*epoch) as f32 / 1000.0,
                None => self.manual_elapsed.as_secs_f32(),
            }
        }

        fn gross_at(&self, elapsed_s: f32) -> f32 {
            let drained = self.drain_gps * (elapsed_s - self.base_elapsed_s).max(0.0);
            (self.base_gross_g - drained).max(0.0)
        }

        pub fn gross_g(&self) -> f32 {
            self.gross_at(self.elapsed_s())
        }
    }

    impl WeightSensor for SimulatedBag {
        fn read(&mut self, _timeout: Duration) -> Result<f32, Box<dyn Error + Send + Sync>> {
            if self.fail_reads > 0 {
                self.fail_reads -= 1;
                return Err(Box::new(HwError::NotReady));
            }
            let noise = if self.noise_seq.is_empty() {
                0.0
            } else {
                let v = self.noise_seq[self.noise_idx % self.noise_seq.len()];
                self.noise_idx += 1;
                v
            };
            Ok(self.gross_g() + noise)
        }
    }

    /// Deterministic drop-edge timeline at a fixed drops-per-second rate.
    ///
    /// Yields the millisecond timestamps of successive drop edges starting
    /// from `start_ms`; the caller feeds them to the engine's edge handle.
    #[derive(Debug, Clone)]
    pub struct DripSchedule {
        next_ms: u64,
        period_ms: u64,
        running: bool,
    }

    impl DripSchedule {
        /// `dps == 0.0` produces a schedule that never fires.
        pub fn new(start_ms: u64, dps: f32) -> Self {
            let period_ms = if dps > 0.0 {
                ((1000.0 / dps).round() as u64).max(1)
            } else {
                0
            };
            Self {
                next_ms: start_ms + period_ms,
                period_ms,
                running: dps > 0.0,
            }
        }

        /// Stop emitting edges (simulate occlusion or sensor outage).
        pub fn stop(&mut self) {
            self.running = false;
        }

        /// Drain all edges due at or before `now_ms`.
        pub fn edges_until(&mut self, now_ms: u64) -> Vec<u64> {
            let mut out = Vec::new();
            if !self.running || self.period_ms == 0 {
                return out;
            }
            while self.next_ms <= now_ms {
                out.push(self.next_ms);
                self.next_ms += self.period_ms;
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::sim::{DripSchedule, SimulatedBag};
    use dripmon_traits::clock::ManualClock;
    use dripmon_traits::WeightSensor;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn bag_drains_and_floors_at_zero() {
        let mut bag = SimulatedBag::new(10.0, 1.0);
        bag.advance(Duration::from_secs(4));
        assert!((bag.gross_g() - 6.0).abs() < 1e-4);
        bag.advance(Duration::from_secs(100));
        assert_eq!(bag.gross_g(), 0.0);
    }

    #[test]
    fn bag_follows_an_attached_clock() {
        let clock = ManualClock::new();
        let bag = SimulatedBag::new(100.0, 0.5).with_clock(Arc::new(clock.clone()));
        clock.advance_ms(10_000);
        assert!((bag.gross_g() - 95.0).abs() < 1e-3);
    }

    #[test]
    fn drain_rate_change_keeps_drained_mass() {
        let mut bag = SimulatedBag::new(100.0, 1.0);
        bag.advance(Duration::from_secs(10));
        bag.set_drain_gps(0.0);
        bag.advance(Duration::from_secs(50));
        assert!((bag.gross_g() - 90.0).abs() < 1e-3);
    }

    #[test]
    fn bag_fail_window_then_recovers() {
        let mut bag = SimulatedBag::new(100.0, 0.0);
        bag.fail_for(2);
        assert!(bag.read(Duration::from_millis(10)).is_err());
        assert!(bag.read(Duration::from_millis(10)).is_err());
        let v = bag.read(Duration::from_millis(10)).expect("recovered");
        assert!((v - 100.0).abs() < 1e-4);
    }

    #[test]
    fn schedule_emits_edges_at_rate() {
        // 2 dps -> every 500 ms
        let mut sched = DripSchedule::new(0, 2.0);
        let edges = sched.edges_until(2000);
        assert_eq!(edges, vec![500, 1000, 1500, 2000]);
        assert!(sched.edges_until(2000).is_empty());
    }

    #[test]
    fn stopped_schedule_goes_quiet() {
        let mut sched = DripSchedule::new(0, 2.0);
        let _ = sched.edges_until(1000);
        sched.stop();
        assert!(sched.edges_until(60_000).is_empty());
    }
}
