//! Fusion stage: two decoupled scalar Kalman estimators, one for flow and
//! one for remaining mass, each updated sequentially with the weight- and
//! drop-channel measurements.
//!
//! A measurement whose variance is below 1e-9 is treated as "sensor off"
//! for that tick and skipped, which is how the supervisor detaches a
//! channel without restructuring the filter.

use crate::config::FusionCfg;

#[derive(Debug, Clone)]
pub struct FlowFusion {
    flow_gps: f32,
    p_flow: f32,
    remaining_g: f32,
    p_remaining: f32,
    q_flow: f32,
    q_remaining: f32,
    r_flow_weight: f32,
    r_flow_drip: f32,
    r_remaining_weight: f32,
    r_remaining_drip: f32,
}

/// Standard 1-D Kalman update; the prediction step already happened in
/// `update`, so `p` arrives as the predicted covariance.
fn kalman_update_1d(x: &mut f32, p: &mut f32, measurement: f32, r: f32) {
    if r < 1e-9 {
        return;
    }
    let k = *p / (*p + r);
    *x += k * (measurement - *x);
    *p *= 1.0 - k;
}

impl FlowFusion {
    pub fn new(cfg: &FusionCfg) -> Self {
        Self {
            flow_gps: 0.0,
            p_flow: 1.0,
            remaining_g: 0.0,
            p_remaining: 10.0,
            q_flow: cfg.q_flow,
            q_remaining: cfg.q_remaining,
            r_flow_weight: cfg.r_flow_weight,
            r_flow_drip: cfg.r_flow_drip,
            r_remaining_weight: cfg.r_remaining_weight,
            r_remaining_drip: cfg.r_remaining_drip,
        }
    }

    pub fn init(&mut self, flow_gps: f32, remaining_g: f32) {
        self.flow_gps = flow_gps;
        self.p_flow = 0.1;
        self.remaining_g = remaining_g;
        self.p_remaining = 1.0;
    }

    /// Predict both estimators forward by `dt_s`, then fold in the four
    /// channel measurements. `dt_s <= 1e-6` is a no-op.
    pub fn update(
        &mut self,
        flow_weight_gps: f32,
        flow_drip_gps: f32,
        mass_weight_g: f32,
        remaining_drip_g: f32,
        dt_s: f32,
    ) {
        if dt_s <= 1e-6 {
            return;
        }

        // Flow prediction: the true rate drifts slowly, identity model.
        self.p_flow += self.q_flow * dt_s;

        // Remaining-mass prediction is coupled to the current flow
        // estimate: remaining decreases by flow*dt, never below zero.
        self.remaining_g = (self.remaining_g - self.flow_gps * dt_s).max(0.0);
        self.p_remaining += self.q_remaining * dt_s;

        kalman_update_1d(
            &mut self.flow_gps,
            &mut self.p_flow,
            flow_weight_gps,
            self.r_flow_weight,
        );
        kalman_update_1d(
            &mut self.flow_gps,
            &mut self.p_flow,
            flow_drip_gps,
            self.r_flow_drip,
        );

        kalman_update_1d(
            &mut self.remaining_g,
            &mut self.p_remaining,
            mass_weight_g,
            self.r_remaining_weight,
        );
        kalman_update_1d(
            &mut self.remaining_g,
            &mut self.p_remaining,
            remaining_drip_g,
            self.r_remaining_drip,
        );

        if self.remaining_g < 0.0 {
            self.remaining_g = 0.0;
        }
    }

    /// Fused flow, floored at 0 for publication.
    pub fn flow_gps(&self) -> f32 {
        self.flow_gps.max(0.0)
    }

    /// Fused remaining mass, floored at 0.
    pub fn remaining_g(&self) -> f32 {
        self.remaining_g.max(0.0)
    }

    pub fn set_flow_noises(&mut self, r_weight: f32, r_drip: f32) {
        self.r_flow_weight = r_weight;
        self.r_flow_drip = r_drip;
    }

    pub fn flow_noises(&self) -> (f32, f32) {
        (self.r_flow_weight, self.r_flow_drip)
    }

    pub fn set_remaining_noises(&mut self, r_weight: f32, r_drip: f32) {
        self.r_remaining_weight = r_weight;
        self.r_remaining_drip = r_drip;
    }

    pub fn remaining_noises(&self) -> (f32, f32) {
        (self.r_remaining_weight, self.r_remaining_drip)
    }
}
