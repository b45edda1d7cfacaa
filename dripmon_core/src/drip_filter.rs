//! Two-state Kalman filter over the drop-rate channel.
//!
//! State vector: [drop rate (drops/s), rate change (drops/s²)]. The
//! measurement is the per-tick rate derived from edge timestamps (§ drop
//! ring), so H = [1, 0].

use crate::config::DripFilterCfg;

#[derive(Debug, Clone)]
pub struct DripRateFilter {
    x: [f32; 2],
    p: [[f32; 2]; 2],
    sigma_a: f32,
    r: f32,
}

impl DripRateFilter {
    pub fn new(cfg: &DripFilterCfg) -> Self {
        Self {
            x: [0.0; 2],
            p: [[1.0, 0.0], [0.0, 1.0]],
            sigma_a: cfg.sigma_a,
            r: cfg.r,
        }
    }

    pub fn init(&mut self, rate_dps: f32) {
        self.x = [rate_dps, 0.0];
        self.p = [[0.25, 0.0], [0.0, 0.25]];
    }

    /// One predict+update cycle; `dt_s <= 1e-6` is a no-op.
    pub fn update(&mut self, measured_rate_dps: f32, dt_s: f32) {
        if dt_s <= 1e-6 {
            return;
        }

        let dt = dt_s;
        let dt2 = dt * dt;
        let dt3 = dt2 * dt;
        let dt4 = dt3 * dt;
        let sa2 = self.sigma_a * self.sigma_a;

        let q = [
            [sa2 * dt4 / 4.0, sa2 * dt3 / 2.0],
            [sa2 * dt3 / 2.0, sa2 * dt2],
        ];

        // Predict with F = [[1, dt], [0, 1]].
        let xp = [self.x[0] + dt * self.x[1], self.x[1]];
        let p = &self.p;
        let fp = [
            [p[0][0] + dt * p[1][0], p[0][1] + dt * p[1][1]],
            [p[1][0], p[1][1]],
        ];
        let pp = [
            [
                fp[0][0] + fp[0][1] * dt + q[0][0],
                fp[0][1] + q[0][1],
            ],
            [
                fp[1][0] + fp[1][1] * dt + q[1][0],
                fp[1][1] + q[1][1],
            ],
        ];

        let mut s = pp[0][0] + self.r;
        if s.abs() < 1e-9 {
            s = if s >= 0.0 { 1e-9 } else { -1e-9 };
        }
        let k = [pp[0][0] / s, pp[1][0] / s];
        let innovation = measured_rate_dps - xp[0];

        self.x = [xp[0] + k[0] * innovation, xp[1] + k[1] * innovation];
        self.p = [
            [(1.0 - k[0]) * pp[0][0], (1.0 - k[0]) * pp[0][1]],
            [-k[1] * pp[0][0] + pp[1][0], -k[1] * pp[0][1] + pp[1][1]],
        ];

        debug_assert!(
            self.x.iter().all(|v| v.is_finite()),
            "drip filter state diverged: {:?}",
            self.x
        );
    }

    /// Filtered drop rate, floored at 0 for publication.
    pub fn rate_dps(&self) -> f32 {
        self.x[0].max(0.0)
    }

    pub fn set_measurement_noise(&mut self, r: f32) {
        self.r = r;
    }

    pub fn measurement_noise(&self) -> f32 {
        self.r
    }

    pub fn covariance(&self) -> [[f32; 2]; 2] {
        self.p
    }
}
