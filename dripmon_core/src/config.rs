//! Tuning, timing and tare configuration for the estimation engine.
//!
//! Defaults carry the reference tunings of the physical device: a 20
//! drops/mL giving-set, water-density liquid, a 12 g fixture plus 60 g
//! empty-bag tare, and a 1 s main tick.

/// Weight-channel Kalman filter tuning (three-state constant-jerk model).
#[derive(Debug, Clone)]
pub struct WeightFilterCfg {
    /// Process noise std dev for the velocity channel.
    pub sigma_a: f32,
    /// Process noise std dev for the acceleration (jerk) channel.
    pub sigma_j: f32,
    /// Load-cell measurement variance.
    pub r: f32,
}

impl Default for WeightFilterCfg {
    fn default() -> Self {
        Self {
            sigma_a: 0.0005,
            sigma_j: 1e-6,
            r: 50.0,
        }
    }
}

/// Drop-rate Kalman filter tuning (two-state model).
#[derive(Debug, Clone)]
pub struct DripFilterCfg {
    pub sigma_a: f32,
    pub r: f32,
}

impl Default for DripFilterCfg {
    fn default() -> Self {
        Self {
            sigma_a: 1e-5,
            r: 0.05,
        }
    }
}

/// Grams-per-drop estimator tuning and giving-set defaults.
#[derive(Debug, Clone)]
pub struct WpdCfg {
    pub q: f32,
    pub r: f32,
    pub drops_per_ml: u32,
    pub density_g_per_ml: f32,
}

impl Default for WpdCfg {
    fn default() -> Self {
        Self {
            q: 1e-8,
            r: 1e-4,
            drops_per_ml: 20,
            density_g_per_ml: 1.0,
        }
    }
}

/// Fusion-stage tuning: two decoupled scalar estimators.
///
/// The relative size of the weight/drip measurement variances decides how
/// much each sensor is trusted per channel.
#[derive(Debug, Clone)]
pub struct FusionCfg {
    pub q_flow: f32,
    pub r_flow_weight: f32,
    pub r_flow_drip: f32,
    pub q_remaining: f32,
    pub r_remaining_weight: f32,
    pub r_remaining_drip: f32,
}

impl Default for FusionCfg {
    fn default() -> Self {
        Self {
            q_flow: 1e-7,
            r_flow_weight: 0.01,
            r_flow_drip: 0.0005,
            q_remaining: 0.01,
            r_remaining_weight: 1.0,
            r_remaining_drip: 1.0,
        }
    }
}

/// Tick cadence and supervisory timeouts.
#[derive(Debug, Clone)]
pub struct TimingCfg {
    /// Main tick period; filter math uses the measured elapsed time, so
    /// jitter around this value is tolerated.
    pub tick_ms: u64,
    /// Max sensor wait per read (ms).
    pub sensor_timeout_ms: u64,
    pub fast_convergence_ms: u64,
    /// No drop edge for this long while Normal counts as a stall.
    pub no_drip_timeout_ms: u64,
    /// Cadence of the stall check while Normal.
    pub stall_check_ms: u64,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            sensor_timeout_ms: 150,
            fast_convergence_ms: 60_000,
            no_drip_timeout_ms: 10_000,
            stall_check_ms: 10_000,
        }
    }
}

/// Fixed masses subtracted from the gross reading to obtain liquid mass.
#[derive(Debug, Clone)]
pub struct TareCfg {
    pub equipment_g: f32,
    pub empty_bag_g: f32,
}

impl TareCfg {
    pub fn total_g(&self) -> f32 {
        self.equipment_g + self.empty_bag_g
    }
}

impl Default for TareCfg {
    fn default() -> Self {
        Self {
            equipment_g: 12.0,
            empty_bag_g: 60.0,
        }
    }
}

/// Operator-triggered long WPD calibration window: completion requires
/// both the duration and the minimum drop count.
#[derive(Debug, Clone)]
pub struct WpdCalibrationCfg {
    pub duration_ms: u64,
    pub min_drops: u32,
}

impl Default for WpdCalibrationCfg {
    fn default() -> Self {
        Self {
            duration_ms: 60_000,
            min_drops: 30,
        }
    }
}
