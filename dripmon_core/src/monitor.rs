//! The estimation engine: per-tick orchestration of the weight filter,
//! drop-rate filter, WPD estimator and fusion stage, plus the supervisory
//! state machine driving reinitialization, fast convergence, stall and
//! completion detection.
//!
//! Tick-path failures never escape this type: sensor trouble is
//! substituted and logged, non-physical readings are replaced by the last
//! filtered value, and everything operator-relevant surfaces as
//! [`MonitorEvent`]s and state transitions.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dripmon_traits::clock::{Clock, MonotonicClock};
use dripmon_traits::WeightSensor;

use crate::command::{ButtonEvent, ButtonKind, Command};
use crate::config::{
    DripFilterCfg, FusionCfg, TareCfg, TimingCfg, WeightFilterCfg, WpdCalibrationCfg, WpdCfg,
};
use crate::drip_filter::DripRateFilter;
use crate::drop_ring::{drop_channel, DropDrain, DropEdgeHandle, DEFAULT_RING_CAPACITY};
use crate::error::{BuildError, Result};
use crate::events::MonitorEvent;
use crate::fusion::FlowFusion;
use crate::hw_error::map_sensor_error;
use crate::snapshot::{Snapshot, MAX_TIME_S, UNDEFINED_TIME_S};
use crate::state::{StateMachine, SystemState};
use crate::weight_filter::WeightKalmanFilter;
use crate::wpd::WpdEstimator;

/// Liquid mass below this at reinit means an empty or missing bag.
const MIN_INITIAL_LIQUID_G: f32 = 10.0;
/// Reinit readings beyond this magnitude are rejected outright.
const MAX_PLAUSIBLE_INIT_G: f32 = 5000.0;
/// Completion margin over the target empty mass.
const COMPLETION_EPSILON_G: f32 = 1.0;
/// Fast-convergence floor for any shrunken measurement variance.
const MIN_FAST_R: f32 = 1e-7;

/// Result of one tick: the published snapshot plus any discrete events.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub snapshot: Snapshot,
    pub events: Vec<MonitorEvent>,
}

/// Measurement variances captured exactly once at construction, so the
/// fast-convergence swap stays reversible no matter how often the
/// operator reinitializes.
#[derive(Debug, Clone, Copy)]
struct SavedNoises {
    weight_r: f32,
    drip_r: f32,
    wpd_r: f32,
    flow_weight_r: f32,
    flow_drip_r: f32,
    remaining_weight_r: f32,
    remaining_drip_r: f32,
}

pub struct Monitor {
    sensor: Box<dyn WeightSensor>,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,

    timing: TimingCfg,
    tare: TareCfg,
    wpd_cal_cfg: WpdCalibrationCfg,
    target_empty_g: f32,

    weight_kf: WeightKalmanFilter,
    drip_kf: DripRateFilter,
    wpd: WpdEstimator,
    fusion: FlowFusion,

    edges: DropEdgeHandle,
    drain: DropDrain,

    saved: SavedNoises,
    sm: StateMachine,

    total_volume_ml: f32,
    prev_raw_g: f32,
    last_tick_ms: u64,
    /// Rebased on reinit, fast-convergence exit and abnormality reset so
    /// the stall timer never measures across a supervisory boundary.
    last_drip_floor_ms: u64,
    snapshot: Snapshot,
}

impl core::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Monitor")
            .field("state", &self.sm.state())
            .field("filtered_mass_g", &self.weight_kf.mass_g())
            .field("fused_flow_gps", &self.fusion.flow_gps())
            .field("wpd_gpd", &self.wpd.wpd_gpd())
            .finish()
    }
}

impl Monitor {
    /// Start building a Monitor.
    pub fn builder() -> MonitorBuilder<Missing> {
        MonitorBuilder::default()
    }

    /// Milliseconds elapsed on the engine's clock since construction.
    pub fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    /// Perform the initial (re)initialization: capture the baseline mass,
    /// reset every filter and enter fast convergence. Call once before
    /// ticking and again on operator request.
    pub fn begin(&mut self) -> Vec<MonitorEvent> {
        let now = self.now_ms();
        self.reinitialize(now)
    }

    fn reinitialize(&mut self, now_ms: u64) -> Vec<MonitorEvent> {
        let mut events = Vec::new();

        // Three consecutive failures lock the system in InitError; while
        // latched, Init presses are ignored and only the reset path (which
        // clears the counter first) may re-attempt.
        if self.sm.init_locked() {
            tracing::warn!(
                failures = self.sm.init_failures(),
                "reinitialization refused: locked in init error until reset"
            );
            self.sync_snapshot_state(now_ms);
            return events;
        }

        self.sm
            .transition_to(SystemState::Initializing, now_ms, &mut events);

        let timeout = Duration::from_millis(self.timing.sensor_timeout_ms);
        let liquid = match self.sensor.read(timeout) {
            Ok(gross) => gross - self.tare.total_g(),
            Err(e) => {
                let mapped = map_sensor_error(&*e);
                tracing::warn!(error = %mapped, "initial mass read failed");
                f32::NAN
            }
        };

        if !liquid.is_finite()
            || liquid.abs() > MAX_PLAUSIBLE_INIT_G
            || liquid <= MIN_INITIAL_LIQUID_G
        {
            let failures = self.sm.note_init_failure();
            tracing::warn!(liquid, failures, "reinitialization rejected");
            if self.sm.init_locked() {
                tracing::warn!(failures, "init error latched: operator reset required");
            }
            self.sm
                .transition_to(SystemState::InitError, now_ms, &mut events);
            self.sync_snapshot_state(now_ms);
            return events;
        }
        self.sm.clear_init_failures();

        tracing::info!(initial_g = liquid, "reinitialized with new baseline");
        self.wpd.reset();
        self.wpd.set_initial_mass(liquid);
        self.wpd.start();
        self.total_volume_ml = (liquid / 100.0).ceil() * 100.0;
        self.weight_kf.init(liquid, 0.0, 0.0);
        self.drip_kf.init(0.0);
        self.fusion.init(0.0, liquid);
        self.prev_raw_g = liquid;
        self.sm.stop_long_cal();
        self.apply_fast_convergence_noises();
        self.last_drip_floor_ms = now_ms;
        self.last_tick_ms = now_ms;

        self.snapshot = Snapshot {
            timestamp_ms: now_ms,
            raw_mass_g: liquid,
            filtered_mass_g: liquid,
            remaining_drop_g: liquid,
            fused_remaining_g: liquid,
            initial_total_mass_g: liquid,
            wpd_gpd: self.wpd.wpd_gpd(),
            wpd_calibrating: true,
            progress_percent: 0.0,
            total_volume_ml: self.total_volume_ml,
            ..Snapshot::default()
        };

        self.sm
            .transition_to(SystemState::FastConvergence, now_ms, &mut events);
        self.sm.begin_fast_convergence(now_ms);
        self.sync_snapshot_state(now_ms);
        events
    }

    /// One orchestrated tick. Uses the measured elapsed time, so jitter in
    /// the caller's pacing is tolerated; a zero or negative interval makes
    /// every filter update a no-op.
    pub fn tick(&mut self) -> TickReport {
        let now = self.now_ms();
        let mut events = Vec::new();

        // Fast-convergence expiry is a pure timer; it runs before the
        // processing gate so a stalled pipeline cannot pin the swapped Rs.
        if self.sm.state() == SystemState::FastConvergence
            && self
                .sm
                .fast_convergence_expired(now, self.timing.fast_convergence_ms)
        {
            self.restore_original_noises();
            self.sm.end_fast_convergence();
            tracing::info!("fast convergence ended, measurement noises restored");
            events.push(MonitorEvent::FastConvergenceEnded);
            self.sm.transition_to(SystemState::Normal, now, &mut events);
            self.last_drip_floor_ms = now;
        }

        let state = self.sm.state();
        let skip = matches!(
            state,
            SystemState::Initializing | SystemState::InitError | SystemState::InfusionError
        );
        let dt_ms = now.saturating_sub(self.last_tick_ms);
        let dt_s = dt_ms as f32 / 1000.0;
        if skip || dt_s <= 0.0 {
            self.sync_snapshot_state(now);
            return TickReport {
                snapshot: self.snapshot.clone(),
                events,
            };
        }
        self.last_tick_ms = now;

        // ── weight channel ───────────────────────────────────────────────
        let prev_filt = self.weight_kf.mass_g();
        let timeout = Duration::from_millis(self.timing.sensor_timeout_ms);
        let (raw_g, raw_for_flow) = match self.sensor.read(timeout) {
            Ok(gross) => {
                let liquid = gross - self.tare.total_g();
                if !liquid.is_finite()
                    || (liquid.abs() > 2000.0 && prev_filt.abs() < 1000.0)
                {
                    tracing::warn!(
                        reading = liquid,
                        substitute = prev_filt,
                        "implausible mass reading replaced"
                    );
                    (prev_filt, prev_filt)
                } else {
                    (liquid, liquid)
                }
            }
            Err(e) => {
                let mapped = map_sensor_error(&*e);
                tracing::warn!(error = %mapped, "mass read failed, using last filtered value");
                // Raw flow sees no change this tick.
                (prev_filt, self.prev_raw_g)
            }
        };

        let raw_flow_weight = ((self.prev_raw_g - raw_for_flow) / dt_s).max(0.0);
        self.prev_raw_g = raw_for_flow;

        let filt = self.weight_kf.update(raw_g, dt_s);
        let flow_weight = (-self.weight_kf.velocity_gps()).max(0.0);

        // ── drop channel ─────────────────────────────────────────────────
        let drained = self.drain.drain();
        let mut raw_drip_rate = self.snapshot.raw_drip_rate_dps;
        let mut raw_flow_drip = self.snapshot.raw_flow_drip_gps;
        if let Some(rate) = drained.measured_rate_dps {
            self.drip_kf.update(rate, dt_s);
            self.wpd.add_drops(u64::from(drained.new_drops));
            self.sm.accumulate_long_cal_drops(drained.new_drops);
            raw_drip_rate = rate;
            raw_flow_drip = (rate * self.wpd.wpd_gpd()).max(0.0);
        }

        if self.wpd.is_active() && state == SystemState::Normal {
            self.wpd.calibrate(filt);
        }

        if let Some((elapsed_ms, drops)) = self.sm.long_cal_progress(now) {
            let duration_met = elapsed_ms >= self.wpd_cal_cfg.duration_ms;
            let drops_met = drops >= self.wpd_cal_cfg.min_drops;
            if duration_met && drops_met {
                self.wpd.stop();
                self.sm.stop_long_cal();
                let wpd_gpd = self.wpd.wpd_gpd();
                tracing::info!(wpd_gpd, drops, "wpd long calibration completed");
                events.push(MonitorEvent::WpdCalibrationCompleted {
                    wpd_gpd,
                    drops,
                    duration_s: elapsed_ms as f32 / 1000.0,
                });
            } else if duration_met && self.sm.long_cal_take_low_drops_report() {
                tracing::warn!(drops, "wpd calibration window elapsed with too few drops");
                events.push(MonitorEvent::WpdCalibrationTimedOutLowDrops);
            }
        }

        let wpd_gpd = self.wpd.wpd_gpd();
        let flow_drip = if wpd_gpd > 1e-6 {
            self.drip_kf.rate_dps() * wpd_gpd
        } else {
            0.0
        };
        let remaining_drop = if self.wpd.initial_set() {
            self.wpd.remaining_by_drops_g()
        } else {
            filt
        };

        // ── fusion ───────────────────────────────────────────────────────
        self.fusion
            .update(flow_weight, flow_drip, filt, remaining_drop, dt_s);
        let fused_flow = self.fusion.flow_gps();
        let fused_remaining = self.fusion.remaining_g();

        // ── derived scalars ──────────────────────────────────────────────
        let target = self.target_empty_g;
        let initial = self.wpd.initial_total_mass_g();
        let progress_percent = if self.wpd.initial_set() {
            let total = initial - target;
            if total > 1e-3 {
                let infused = (initial - fused_remaining).clamp(0.0, total);
                infused / total * 100.0
            } else {
                0.0
            }
        } else {
            -1.0
        };
        let density = self.wpd.density_g_per_ml();
        let flow_ml_per_hour = if density > 1e-6 {
            (fused_flow / density * 3600.0).max(0.0)
        } else {
            0.0
        };

        self.snapshot = Snapshot {
            timestamp_ms: now,
            raw_mass_g: raw_g,
            filtered_mass_g: filt.max(0.0),
            raw_flow_weight_gps: raw_flow_weight,
            flow_weight_gps: flow_weight,
            drops_this_tick: drained.new_drops,
            raw_drip_rate_dps: raw_drip_rate,
            filtered_drip_rate_dps: self.drip_kf.rate_dps(),
            raw_flow_drip_gps: raw_flow_drip,
            flow_drip_gps: flow_drip,
            wpd_gpd,
            wpd_calibrating: self.wpd.is_active(),
            wpd_long_cal_active: self.sm.long_cal_active(),
            remaining_drop_g: remaining_drop,
            fused_flow_gps: fused_flow,
            fused_remaining_g: fused_remaining,
            remaining_time_raw_weight_s: remaining_time_s(raw_g, target, raw_flow_weight),
            remaining_time_filt_weight_s: remaining_time_s(filt, target, flow_weight),
            remaining_time_raw_drip_s: remaining_time_s(remaining_drop, target, raw_flow_drip),
            remaining_time_filt_drip_s: remaining_time_s(remaining_drop, target, flow_drip),
            remaining_time_fused_s: remaining_time_s(fused_remaining, target, fused_flow),
            total_drops: self.wpd.cumulative_drops(),
            initial_total_mass_g: initial,
            progress_percent,
            state: self.sm.state(),
            auto_clamp: self.sm.auto_clamp(),
            total_volume_ml: self.total_volume_ml,
            flow_ml_per_hour,
        };

        // ── supervision (Normal only) ────────────────────────────────────
        if self.sm.state() == SystemState::Normal
            && self.sm.stall_check_due(now, self.timing.stall_check_ms)
        {
            let last_drip = self.drain.last_drip_ms().max(self.last_drip_floor_ms);
            if now.saturating_sub(last_drip) >= self.timing.no_drip_timeout_ms {
                tracing::warn!(
                    quiet_ms = now.saturating_sub(last_drip),
                    "no drops detected, declaring infusion abnormality"
                );
                self.sm
                    .transition_to(SystemState::InfusionError, now, &mut events);
                events.push(MonitorEvent::InfusionAbnormalityDetected);
            }
        }
        if self.sm.state() == SystemState::Normal
            && fused_remaining <= target + COMPLETION_EPSILON_G
        {
            tracing::info!(fused_remaining, "infusion completed");
            self.sm
                .transition_to(SystemState::Completed, now, &mut events);
            events.push(MonitorEvent::InfusionCompleted);
        }

        self.sync_snapshot_state(now);
        TickReport {
            snapshot: self.snapshot.clone(),
            events,
        }
    }

    /// Operator button input from the GPIO collaborator.
    pub fn handle_button(&mut self, kind: ButtonKind, event: ButtonEvent) -> Vec<MonitorEvent> {
        let now = self.now_ms();
        let mut events = Vec::new();
        match (kind, event) {
            (ButtonKind::Init, ButtonEvent::ShortPress) => {
                return self.reinitialize(now);
            }
            (ButtonKind::Reset, ButtonEvent::ShortPress) => match self.sm.state() {
                SystemState::InfusionError => {
                    self.sm.clear_auto_clamp();
                    self.last_drip_floor_ms = now;
                    self.sm.transition_to(SystemState::Normal, now, &mut events);
                    events.push(MonitorEvent::InfusionAbnormalityCleared);
                }
                SystemState::Completed => {
                    self.sm.clear_auto_clamp();
                    self.last_drip_floor_ms = now;
                    self.sm.transition_to(SystemState::Normal, now, &mut events);
                }
                SystemState::InitError => {
                    self.sm.clear_init_failures();
                    return self.reinitialize(now);
                }
                _ => {}
            },
            // Long presses are reserved for the clamp-motor toggle at the
            // collaborator; not consumed here.
            (_, ButtonEvent::LongPress) => {}
        }
        self.sync_snapshot_state(now);
        events
    }

    /// Text command from the transport collaborator.
    pub fn handle_command(&mut self, raw: &str) -> Vec<MonitorEvent> {
        let now = self.now_ms();
        let mut events = Vec::new();
        match raw.parse::<Command>() {
            Ok(Command::CalibrateWpdStart) => {
                if self.sm.long_cal_active() {
                    tracing::info!("wpd calibration already running");
                } else {
                    self.wpd.start();
                    self.sm.start_long_cal(now);
                    events.push(MonitorEvent::WpdCalibrationStarted);
                }
            }
            Ok(Command::CalibrateWpdStop) => {
                if self.sm.long_cal_active() {
                    self.wpd.stop();
                    self.sm.stop_long_cal();
                    tracing::info!(wpd_gpd = self.wpd.wpd_gpd(), "wpd calibration stopped");
                }
            }
            Ok(Command::SetTotalVolume(ml)) => {
                if ml > 0.0 {
                    self.total_volume_ml = ml;
                    self.snapshot.total_volume_ml = ml;
                }
            }
            Err(e) => {
                tracing::warn!(raw, "unknown command rejected");
                events.push(MonitorEvent::CommandRejected { raw: e.0 });
            }
        }
        events
    }

    /// Cloneable producer handle for the edge-interrupt context.
    pub fn drop_edge_handle(&self) -> DropEdgeHandle {
        self.edges.clone()
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn state(&self) -> SystemState {
        self.sm.state()
    }

    pub fn init_failures(&self) -> u32 {
        self.sm.init_failures()
    }

    pub fn total_volume_ml(&self) -> f32 {
        self.total_volume_ml
    }

    pub fn tick_period_ms(&self) -> u64 {
        self.timing.tick_ms
    }

    pub fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        Arc::clone(&self.clock)
    }

    // Measurement-noise introspection, mainly for verifying that the
    // fast-convergence swap is reversible.
    pub fn weight_measurement_noise(&self) -> f32 {
        self.weight_kf.measurement_noise()
    }

    pub fn drip_measurement_noise(&self) -> f32 {
        self.drip_kf.measurement_noise()
    }

    pub fn wpd_measurement_noise(&self) -> f32 {
        self.wpd.measurement_noise()
    }

    pub fn fusion_flow_noises(&self) -> (f32, f32) {
        self.fusion.flow_noises()
    }

    pub fn fusion_remaining_noises(&self) -> (f32, f32) {
        self.fusion.remaining_noises()
    }

    fn sync_snapshot_state(&mut self, now_ms: u64) {
        self.snapshot.timestamp_ms = now_ms;
        self.snapshot.state = self.sm.state();
        self.snapshot.auto_clamp = self.sm.auto_clamp();
        self.snapshot.wpd_calibrating = self.wpd.is_active();
        self.snapshot.wpd_long_cal_active = self.sm.long_cal_active();
    }

    fn apply_fast_convergence_noises(&mut self) {
        let shrink = |r: f32| (r / 10.0).max(MIN_FAST_R);
        self.weight_kf
            .set_measurement_noise(shrink(self.saved.weight_r));
        self.drip_kf.set_measurement_noise(shrink(self.saved.drip_r));
        self.wpd.set_measurement_noise(shrink(self.saved.wpd_r));
        self.fusion.set_flow_noises(
            shrink(self.saved.flow_weight_r),
            shrink(self.saved.flow_drip_r),
        );
        self.fusion.set_remaining_noises(
            shrink(self.saved.remaining_weight_r),
            shrink(self.saved.remaining_drip_r),
        );
    }

    fn restore_original_noises(&mut self) {
        self.weight_kf.set_measurement_noise(self.saved.weight_r);
        self.drip_kf.set_measurement_noise(self.saved.drip_r);
        self.wpd.set_measurement_noise(self.saved.wpd_r);
        self.fusion
            .set_flow_noises(self.saved.flow_weight_r, self.saved.flow_drip_r);
        self.fusion.set_remaining_noises(
            self.saved.remaining_weight_r,
            self.saved.remaining_drip_r,
        );
    }
}

/// Remaining-time estimate for one (mass, flow) pair.
///
/// At or below target (with a small tolerance) the answer is 0; with no
/// meaningful flow the sentinel stands in for "undefined".
fn remaining_time_s(liquid_g: f32, target_empty_g: f32, flow_gps: f32) -> f32 {
    let to_infuse = liquid_g - target_empty_g;
    if to_infuse <= 0.01 {
        return 0.0;
    }
    if flow_gps > 1e-5 {
        (to_infuse / flow_gps).clamp(0.0, MAX_TIME_S)
    } else {
        UNDEFINED_TIME_S
    }
}

// Type-state markers for the builder.
pub struct Missing;
pub struct Set;

/// Builder for [`Monitor`]. The weight sensor is the only mandatory
/// component; everything else defaults to the reference tunings.
pub struct MonitorBuilder<S> {
    sensor: Option<Box<dyn WeightSensor>>,
    weight_filter: WeightFilterCfg,
    drip_filter: DripFilterCfg,
    wpd: WpdCfg,
    fusion: FusionCfg,
    timing: TimingCfg,
    tare: TareCfg,
    wpd_calibration: WpdCalibrationCfg,
    target_empty_g: f32,
    ring_capacity: usize,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    _s: PhantomData<S>,
}

impl Default for MonitorBuilder<Missing> {
    fn default() -> Self {
        Self {
            sensor: None,
            weight_filter: WeightFilterCfg::default(),
            drip_filter: DripFilterCfg::default(),
            wpd: WpdCfg::default(),
            fusion: FusionCfg::default(),
            timing: TimingCfg::default(),
            tare: TareCfg::default(),
            wpd_calibration: WpdCalibrationCfg::default(),
            target_empty_g: 0.0,
            ring_capacity: DEFAULT_RING_CAPACITY,
            clock: None,
            _s: PhantomData,
        }
    }
}

/// Chainable setters that do not affect type-state.
impl<S> MonitorBuilder<S> {
    pub fn with_weight_filter(mut self, cfg: WeightFilterCfg) -> Self {
        self.weight_filter = cfg;
        self
    }
    pub fn with_drip_filter(mut self, cfg: DripFilterCfg) -> Self {
        self.drip_filter = cfg;
        self
    }
    pub fn with_wpd(mut self, cfg: WpdCfg) -> Self {
        self.wpd = cfg;
        self
    }
    pub fn with_fusion(mut self, cfg: FusionCfg) -> Self {
        self.fusion = cfg;
        self
    }
    pub fn with_timing(mut self, cfg: TimingCfg) -> Self {
        self.timing = cfg;
        self
    }
    pub fn with_tare(mut self, cfg: TareCfg) -> Self {
        self.tare = cfg;
        self
    }
    pub fn with_wpd_calibration(mut self, cfg: WpdCalibrationCfg) -> Self {
        self.wpd_calibration = cfg;
        self
    }
    pub fn with_target_empty_g(mut self, grams: f32) -> Self {
        self.target_empty_g = grams;
        self
    }
    pub fn with_ring_capacity(mut self, capacity: usize) -> Self {
        self.ring_capacity = capacity;
        self
    }
    /// Provide a custom clock; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Fallible build available in any type-state; reports missing pieces
    /// as typed `BuildError`s.
    pub fn try_build(self) -> Result<Monitor> {
        let MonitorBuilder {
            sensor,
            weight_filter,
            drip_filter,
            wpd,
            fusion,
            timing,
            tare,
            wpd_calibration,
            target_empty_g,
            ring_capacity,
            clock,
            _s: _,
        } = self;

        let sensor = sensor.ok_or_else(|| eyre::Report::new(BuildError::MissingWeightSensor))?;

        let invalid = |msg: &'static str| eyre::Report::new(BuildError::InvalidConfig(msg));
        if !(weight_filter.r.is_finite() && weight_filter.r > 0.0) {
            return Err(invalid("weight filter R must be finite and > 0"));
        }
        if !(drip_filter.r.is_finite() && drip_filter.r > 0.0) {
            return Err(invalid("drip filter R must be finite and > 0"));
        }
        if !(wpd.q.is_finite() && wpd.q >= 0.0 && wpd.r.is_finite() && wpd.r > 0.0) {
            return Err(invalid("wpd noise parameters out of range"));
        }
        if wpd.drops_per_ml == 0 {
            return Err(invalid("drops_per_ml must be > 0"));
        }
        for r in [
            fusion.r_flow_weight,
            fusion.r_flow_drip,
            fusion.r_remaining_weight,
            fusion.r_remaining_drip,
        ] {
            if !(r.is_finite() && r >= 0.0) {
                return Err(invalid("fusion measurement variances must be finite and >= 0"));
            }
        }
        if timing.tick_ms == 0 {
            return Err(invalid("tick_ms must be >= 1"));
        }
        if timing.sensor_timeout_ms == 0 {
            return Err(invalid("sensor_timeout_ms must be >= 1"));
        }
        if !(target_empty_g.is_finite() && target_empty_g >= 0.0) {
            return Err(invalid("target_empty_g must be finite and >= 0"));
        }
        if ring_capacity < 8 {
            return Err(invalid("ring capacity must be >= 8"));
        }

        let clock: Arc<dyn Clock + Send + Sync> = match clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };
        let epoch = clock.now();

        let saved = SavedNoises {
            weight_r: weight_filter.r,
            drip_r: drip_filter.r,
            wpd_r: wpd.r,
            flow_weight_r: fusion.r_flow_weight,
            flow_drip_r: fusion.r_flow_drip,
            remaining_weight_r: fusion.r_remaining_weight,
            remaining_drip_r: fusion.r_remaining_drip,
        };

        let weight_kf = WeightKalmanFilter::new(&weight_filter);
        let drip_kf = DripRateFilter::new(&drip_filter);
        let wpd_est = WpdEstimator::new(&wpd);
        let fusion_kf = FlowFusion::new(&fusion);
        let (edges, drain) = drop_channel(ring_capacity);

        Ok(Monitor {
            sensor,
            clock,
            epoch,
            timing,
            tare,
            wpd_cal_cfg: wpd_calibration,
            target_empty_g,
            weight_kf,
            drip_kf,
            wpd: wpd_est,
            fusion: fusion_kf,
            edges,
            drain,
            saved,
            sm: StateMachine::new(),
            total_volume_ml: 0.0,
            prev_raw_g: 0.0,
            last_tick_ms: 0,
            last_drip_floor_ms: 0,
            snapshot: Snapshot {
                progress_percent: -1.0,
                ..Snapshot::default()
            },
        })
    }
}

impl MonitorBuilder<Missing> {
    pub fn with_weight_sensor(
        self,
        sensor: impl WeightSensor + 'static,
    ) -> MonitorBuilder<Set> {
        let MonitorBuilder {
            sensor: _,
            weight_filter,
            drip_filter,
            wpd,
            fusion,
            timing,
            tare,
            wpd_calibration,
            target_empty_g,
            ring_capacity,
            clock,
            _s: _,
        } = self;
        MonitorBuilder {
            sensor: Some(Box::new(sensor)),
            weight_filter,
            drip_filter,
            wpd,
            fusion,
            timing,
            tare,
            wpd_calibration,
            target_empty_g,
            ring_capacity,
            clock,
            _s: PhantomData,
        }
    }
}

impl MonitorBuilder<Set> {
    /// Validate and build the Monitor. Only available once the weight
    /// sensor is set.
    pub fn build(self) -> Result<Monitor> {
        self.try_build()
    }
}
