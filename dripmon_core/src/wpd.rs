//! Scalar Kalman estimator for the grams-per-drop of the installed
//! giving-set, coupled to the weight channel through cumulative totals.
//!
//! The measurement is `Δmass / Δdrops` taken over the whole run since the
//! last reinitialization, not per tick, so a long baseline averages out
//! single-tick noise. The posterior is hard-clamped to the physical range
//! of a 20 drops/mL set with water-density liquid.

use crate::config::WpdCfg;

/// Physical clamp applied after every update.
pub const WPD_CLAMP_MIN_GPD: f32 = 0.04;
pub const WPD_CLAMP_MAX_GPD: f32 = 0.06;

/// Outlier gate on the raw measurement, deliberately wider than the clamp:
/// accept a wild sample into the update, then clamp the posterior.
pub const WPD_GATE_MIN_GPD: f32 = 0.01;
pub const WPD_GATE_MAX_GPD: f32 = 0.20;

/// Minimum accumulated drops before any calibration sample is folded in.
const MIN_DROPS_FOR_SAMPLE: u64 = 5;
/// Minimum measurable mass loss for a calibration sample.
const MIN_DELTA_MASS_G: f32 = 0.01;

/// Run-scoped totals the estimator measures against.
#[derive(Debug, Clone, Default)]
pub struct CalibrationContext {
    pub initial_total_mass_g: f32,
    pub cumulative_drops: u64,
    pub initial_set: bool,
}

#[derive(Debug, Clone)]
pub struct WpdEstimator {
    wpd_gpd: f32,
    p: f32,
    q: f32,
    r: f32,
    active: bool,
    drops_per_ml: f32,
    density_g_per_ml: f32,
    ctx: CalibrationContext,
}

impl WpdEstimator {
    pub fn new(cfg: &WpdCfg) -> Self {
        let mut est = Self {
            wpd_gpd: 0.0,
            p: 1.0,
            q: cfg.q,
            r: cfg.r,
            active: false,
            drops_per_ml: cfg.drops_per_ml as f32,
            density_g_per_ml: cfg.density_g_per_ml,
            ctx: CalibrationContext::default(),
        };
        est.wpd_gpd = est.default_wpd();
        est
    }

    /// Nominal grams per drop from the giving-set spec.
    fn default_wpd(&self) -> f32 {
        (1.0 / self.drops_per_ml) * self.density_g_per_ml
    }

    /// Reset to the seeded default; deactivates calibration.
    pub fn reset(&mut self) {
        self.wpd_gpd = self
            .default_wpd()
            .clamp(WPD_CLAMP_MIN_GPD, WPD_CLAMP_MAX_GPD);
        self.p = 0.01;
        self.active = false;
    }

    /// Record the liquid mass the cumulative totals measure against and
    /// zero the drop count.
    pub fn set_initial_mass(&mut self, mass_g: f32) {
        self.ctx.initial_total_mass_g = mass_g;
        self.ctx.cumulative_drops = 0;
        self.ctx.initial_set = true;
    }

    /// Accumulate drops counted this tick. Ignored until the initial mass
    /// is set so the denominator matches the Δmass baseline.
    pub fn add_drops(&mut self, drops: u64) {
        if self.ctx.initial_set && drops > 0 {
            self.ctx.cumulative_drops += drops;
        }
    }

    /// Arm calibration; the covariance is re-inflated so fresh data is
    /// absorbed quickly.
    pub fn start(&mut self) {
        self.active = true;
        self.p = 0.25;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Fold one cumulative measurement into the estimate. A no-op unless
    /// calibration is armed, the baseline exists, enough drops have
    /// accumulated, the mass loss is measurable, and the raw sample passes
    /// the outlier gate.
    pub fn calibrate(&mut self, current_mass_g: f32) {
        if !self.active || !self.ctx.initial_set {
            return;
        }
        if self.ctx.cumulative_drops < MIN_DROPS_FOR_SAMPLE {
            return;
        }

        let delta_mass = self.ctx.initial_total_mass_g - current_mass_g;
        if delta_mass < MIN_DELTA_MASS_G {
            return;
        }

        let measured = delta_mass / self.ctx.cumulative_drops as f32;
        if !(WPD_GATE_MIN_GPD..=WPD_GATE_MAX_GPD).contains(&measured) {
            tracing::trace!(measured, "wpd sample outside gate, ignored");
            return;
        }

        // 1-D Kalman update
        let p_pred = self.p + self.q;
        let mut s = p_pred + self.r;
        if s.abs() < 1e-9 {
            s = if s >= 0.0 { 1e-9 } else { -1e-9 };
        }
        let k = p_pred / s;
        self.wpd_gpd += k * (measured - self.wpd_gpd);
        self.p = (1.0 - k) * p_pred;

        self.wpd_gpd = self
            .wpd_gpd
            .clamp(WPD_CLAMP_MIN_GPD, WPD_CLAMP_MAX_GPD);
    }

    pub fn wpd_gpd(&self) -> f32 {
        self.wpd_gpd
    }

    pub fn cumulative_drops(&self) -> u64 {
        self.ctx.cumulative_drops
    }

    pub fn initial_total_mass_g(&self) -> f32 {
        self.ctx.initial_total_mass_g
    }

    pub fn initial_set(&self) -> bool {
        self.ctx.initial_set
    }

    /// Mass inferred from the drop count alone.
    pub fn infused_mass_g(&self) -> f32 {
        if !self.ctx.initial_set {
            return 0.0;
        }
        // Guard against a degenerate estimate; fall back to the set spec.
        let wpd = if self.wpd_gpd > 0.001 {
            self.wpd_gpd
        } else {
            self.default_wpd().max(0.05)
        };
        self.ctx.cumulative_drops as f32 * wpd
    }

    /// Remaining mass on the drop-count path, clamped at 0.
    pub fn remaining_by_drops_g(&self) -> f32 {
        if !self.ctx.initial_set {
            return 0.0;
        }
        (self.ctx.initial_total_mass_g - self.infused_mass_g()).max(0.0)
    }

    pub fn set_measurement_noise(&mut self, r: f32) {
        self.r = r;
    }

    pub fn measurement_noise(&self) -> f32 {
        self.r
    }

    pub fn density_g_per_ml(&self) -> f32 {
        self.density_g_per_ml
    }
}
