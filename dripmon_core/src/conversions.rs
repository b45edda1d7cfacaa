//! `From` implementations bridging `dripmon_config` types to
//! `dripmon_core` types, so hosts don't map fields by hand.

use crate::config::{
    DripFilterCfg, FusionCfg, TareCfg, TimingCfg, WeightFilterCfg, WpdCalibrationCfg, WpdCfg,
};

impl From<&dripmon_config::WeightFilterCfg> for WeightFilterCfg {
    fn from(c: &dripmon_config::WeightFilterCfg) -> Self {
        Self {
            sigma_a: c.sigma_a,
            sigma_j: c.sigma_j,
            r: c.r,
        }
    }
}

impl From<&dripmon_config::DripFilterCfg> for DripFilterCfg {
    fn from(c: &dripmon_config::DripFilterCfg) -> Self {
        Self {
            sigma_a: c.sigma_a,
            r: c.r,
        }
    }
}

impl From<&dripmon_config::WpdCfg> for WpdCfg {
    fn from(c: &dripmon_config::WpdCfg) -> Self {
        Self {
            q: c.q,
            r: c.r,
            drops_per_ml: c.drops_per_ml,
            density_g_per_ml: c.density_g_per_ml,
        }
    }
}

impl From<&dripmon_config::FusionCfg> for FusionCfg {
    fn from(c: &dripmon_config::FusionCfg) -> Self {
        Self {
            q_flow: c.q_flow,
            r_flow_weight: c.r_flow_weight,
            r_flow_drip: c.r_flow_drip,
            q_remaining: c.q_remaining,
            r_remaining_weight: c.r_remaining_weight,
            r_remaining_drip: c.r_remaining_drip,
        }
    }
}

impl From<&dripmon_config::TimingCfg> for TimingCfg {
    fn from(c: &dripmon_config::TimingCfg) -> Self {
        Self {
            tick_ms: c.tick_ms,
            fast_convergence_ms: c.fast_convergence_ms,
            no_drip_timeout_ms: c.no_drip_timeout_ms,
            stall_check_ms: c.stall_check_ms,
            ..TimingCfg::default()
        }
    }
}

impl From<&dripmon_config::TareCfg> for TareCfg {
    fn from(c: &dripmon_config::TareCfg) -> Self {
        Self {
            equipment_g: c.equipment_g,
            empty_bag_g: c.empty_bag_g,
        }
    }
}

impl From<&dripmon_config::WpdCalibrationCfg> for WpdCalibrationCfg {
    fn from(c: &dripmon_config::WpdCalibrationCfg) -> Self {
        Self {
            duration_ms: c.duration_ms,
            min_drops: c.min_drops,
        }
    }
}
