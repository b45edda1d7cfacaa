use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(default)]
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

#[derive(Debug, Deserialize)]
#[serde(default)]
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WpdCfg {
    pub q: f32,
    pub r: f32,
    /// Nominal giving-set specification, used to seed the estimate.
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

#[derive(Debug, Deserialize)]
#[serde(default)]
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

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TimingCfg {
    pub tick_ms: u64,
    pub fast_convergence_ms: u64,
    pub no_drip_timeout_ms: u64,
    pub stall_check_ms: u64,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            fast_convergence_ms: 60_000,
            no_drip_timeout_ms: 10_000,
            stall_check_ms: 10_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TareCfg {
    pub equipment_g: f32,
    pub empty_bag_g: f32,
}

impl Default for TareCfg {
    fn default() -> Self {
        Self {
            equipment_g: 12.0,
            empty_bag_g: 60.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
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

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Device {
    /// Identifier reported in the cloud payload.
    pub device_id: Option<String>,
    /// Liquid mass at which the infusion counts as finished.
    pub target_empty_g: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub weight_filter: WeightFilterCfg,
    pub drip_filter: DripFilterCfg,
    pub wpd: WpdCfg,
    pub fusion: FusionCfg,
    pub timing: TimingCfg,
    pub tare: TareCfg,
    pub wpd_calibration: WpdCalibrationCfg,
    pub logging: Logging,
    pub device: Device,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}
