//! Three-state Kalman filter over the weight channel.
//!
//! State vector: [mass (g), velocity (g/s), acceleration (g/s²)].
//! Constant-jerk continuous model discretized per tick; the measurement is
//! the raw liquid mass, so H = [1, 0, 0] and all the matrix algebra
//! collapses to first-column operations in the update step.

use crate::config::WeightFilterCfg;

#[derive(Debug, Clone)]
pub struct WeightKalmanFilter {
    x: [f32; 3],
    p: [[f32; 3]; 3],
    sigma_a: f32,
    sigma_j: f32,
    r: f32,
}

impl WeightKalmanFilter {
    /// Fresh filter with zero state and inflated covariance; call
    /// [`init`](Self::init) once a trustworthy mass reading exists.
    pub fn new(cfg: &WeightFilterCfg) -> Self {
        Self {
            x: [0.0; 3],
            p: [
                [100.0, 0.0, 0.0],
                [0.0, 10.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
            sigma_a: cfg.sigma_a,
            sigma_j: cfg.sigma_j,
            r: cfg.r,
        }
    }

    /// Re-seed the state. Covariance is reset small but non-zero so the
    /// filter keeps learning from subsequent measurements.
    pub fn init(&mut self, mass_g: f32, velocity_gps: f32, accel_gps2: f32) {
        self.x = [mass_g, velocity_gps, accel_gps2];
        self.p = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 0.1]];
    }

    /// One predict+update cycle. Returns the filtered mass estimate.
    ///
    /// `dt_s <= 1e-6` skips both steps (a zero interval would make Q
    /// singular) and returns the current estimate unchanged.
    pub fn update(&mut self, measurement_g: f32, dt_s: f32) -> f32 {
        if dt_s <= 1e-6 {
            return self.x[0];
        }

        let dt = dt_s;
        let dt2 = dt * dt;
        let dt3 = dt2 * dt;
        let dt4 = dt3 * dt;
        let sa2 = self.sigma_a * self.sigma_a;
        let sj2 = self.sigma_j * self.sigma_j;

        let f = [
            [1.0, dt, dt2 / 2.0],
            [0.0, 1.0, dt],
            [0.0, 0.0, 1.0],
        ];

        // Constant-acceleration process noise block, with the (3,3) entry
        // replaced by the jerk variance so acceleration can be excited
        // independently.
        let q = [
            [sa2 * dt4 / 4.0, sa2 * dt3 / 2.0, sa2 * dt2 / 2.0],
            [sa2 * dt3 / 2.0, sa2 * dt2, sa2 * dt],
            [sa2 * dt2 / 2.0, sa2 * dt, sj2],
        ];

        // Predict: x = F x, P = F P Fᵀ + Q
        let xp = [
            f[0][0] * self.x[0] + f[0][1] * self.x[1] + f[0][2] * self.x[2],
            f[1][1] * self.x[1] + f[1][2] * self.x[2],
            self.x[2],
        ];
        let fp = mat3_mul(&f, &self.p);
        let mut pp = mat3_mul_transposed(&fp, &f);
        for i in 0..3 {
            for j in 0..3 {
                pp[i][j] += q[i][j];
            }
        }

        // Update with H = [1, 0, 0].
        let mut s = pp[0][0] + self.r;
        if s.abs() < 1e-9 {
            s = if s >= 0.0 { 1e-9 } else { -1e-9 };
        }
        let k = [pp[0][0] / s, pp[1][0] / s, pp[2][0] / s];
        let innovation = measurement_g - xp[0];

        self.x = [
            xp[0] + k[0] * innovation,
            xp[1] + k[1] * innovation,
            xp[2] + k[2] * innovation,
        ];

        // P = (I - K H) P_pred; with this H only the first column of K
        // participates.
        let i_kh = [
            [1.0 - k[0], 0.0, 0.0],
            [-k[1], 1.0, 0.0],
            [-k[2], 0.0, 1.0],
        ];
        self.p = mat3_mul(&i_kh, &pp);

        // A non-finite state means the caller fed unguarded input.
        debug_assert!(
            self.x.iter().all(|v| v.is_finite()),
            "weight filter state diverged: {:?}",
            self.x
        );

        self.x[0]
    }

    pub fn mass_g(&self) -> f32 {
        self.x[0]
    }

    /// Rate of mass change; negative while the bag drains.
    pub fn velocity_gps(&self) -> f32 {
        self.x[1]
    }

    pub fn acceleration_gps2(&self) -> f32 {
        self.x[2]
    }

    pub fn set_measurement_noise(&mut self, r: f32) {
        self.r = r;
    }

    pub fn measurement_noise(&self) -> f32 {
        self.r
    }

    pub fn covariance(&self) -> [[f32; 3]; 3] {
        self.p
    }
}

fn mat3_mul(a: &[[f32; 3]; 3], b: &[[f32; 3]; 3]) -> [[f32; 3]; 3] {
    let mut out = [[0.0f32; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            for (k, bk) in b.iter().enumerate() {
                out[i][j] += a[i][k] * bk[j];
            }
        }
    }
    out
}

/// a · bᵀ
fn mat3_mul_transposed(a: &[[f32; 3]; 3], b: &[[f32; 3]; 3]) -> [[f32; 3]; 3] {
    let mut out = [[0.0f32; 3]; 3];
    for i in 0..3 {
        for (j, bj) in b.iter().enumerate() {
            for k in 0..3 {
                out[i][j] += a[i][k] * bj[k];
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_filter() -> WeightKalmanFilter {
        WeightKalmanFilter::new(&WeightFilterCfg::default())
    }

    #[test]
    fn zero_dt_is_a_no_op() {
        let mut kf = default_filter();
        kf.init(500.0, 0.0, 0.0);
        let before = (kf.mass_g(), kf.velocity_gps(), kf.covariance());
        let out = kf.update(400.0, 0.0);
        assert_eq!(out, 500.0);
        assert_eq!(before.0, kf.mass_g());
        assert_eq!(before.1, kf.velocity_gps());
        assert_eq!(before.2, kf.covariance());
        // negative dt is equally ignored
        let _ = kf.update(400.0, -1.0);
        assert_eq!(kf.mass_g(), 500.0);
    }

    #[test]
    fn constant_mass_settles() {
        let mut kf = default_filter();
        kf.init(500.0, 0.0, 0.0);
        for _ in 0..30 {
            kf.update(500.0, 1.0);
        }
        assert!((kf.mass_g() - 500.0).abs() < 0.5);
        assert!(kf.velocity_gps().abs() < 0.05);
    }

    #[test]
    fn tracks_linear_ramp_velocity() {
        let mut kf = default_filter();
        kf.init(500.0, 0.0, 0.0);
        let mut mass = 500.0f32;
        for _ in 0..30 {
            mass -= 0.5;
            kf.update(mass, 1.0);
        }
        assert!(
            (kf.velocity_gps() - (-0.5)).abs() < 0.2,
            "velocity {} not tracking -0.5",
            kf.velocity_gps()
        );
    }

    #[test]
    fn covariance_stays_symmetric_and_psd() {
        let mut kf = default_filter();
        kf.init(500.0, 0.0, 0.0);
        let mut mass = 500.0f32;
        for i in 0..100 {
            mass -= 0.1;
            let noise = if i % 2 == 0 { 0.3 } else { -0.3 };
            kf.update(mass + noise, 1.0);
            let p = kf.covariance();
            for r in 0..3 {
                for c in 0..3 {
                    assert!(
                        (p[r][c] - p[c][r]).abs() < 1e-3,
                        "P not symmetric at tick {i}: {p:?}"
                    );
                }
                // diagonal entries are the channel variances
                assert!(p[r][r] >= -1e-6, "negative variance at tick {i}: {p:?}");
            }
            // leading principal minors within tolerance (Sylvester)
            let m2 = p[0][0] * p[1][1] - p[0][1] * p[1][0];
            assert!(m2 >= -1e-6, "2x2 minor negative at tick {i}");
        }
    }

    #[test]
    fn shrinking_r_speeds_convergence() {
        let mut slow = default_filter();
        let mut fast = default_filter();
        slow.init(0.0, 0.0, 0.0);
        fast.init(0.0, 0.0, 0.0);
        fast.set_measurement_noise(slow.measurement_noise() / 10.0);
        for _ in 0..5 {
            slow.update(100.0, 1.0);
            fast.update(100.0, 1.0);
        }
        assert!(
            (100.0 - fast.mass_g()).abs() < (100.0 - slow.mass_g()).abs(),
            "fast {} vs slow {}",
            fast.mass_g(),
            slow.mass_g()
        );
    }
}
