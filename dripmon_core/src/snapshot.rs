//! Per-tick published snapshot and its fixed-order broadcast row.

use crate::state::SystemState;

/// Remaining-time sentinel for "flow effectively zero but liquid left".
pub const UNDEFINED_TIME_S: f32 = 88_888.0;
/// All remaining-time estimates are capped here.
pub const MAX_TIME_S: f32 = 999_999.0;

/// Read-only copy of everything the engine derives in one tick.
/// Collaborators sample it at their own rate.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub timestamp_ms: u64,
    pub raw_mass_g: f32,
    pub filtered_mass_g: f32,
    pub raw_flow_weight_gps: f32,
    pub flow_weight_gps: f32,
    pub drops_this_tick: u32,
    pub raw_drip_rate_dps: f32,
    pub filtered_drip_rate_dps: f32,
    pub raw_flow_drip_gps: f32,
    pub flow_drip_gps: f32,
    pub wpd_gpd: f32,
    pub wpd_calibrating: bool,
    pub wpd_long_cal_active: bool,
    pub remaining_drop_g: f32,
    pub fused_flow_gps: f32,
    pub fused_remaining_g: f32,
    pub remaining_time_raw_weight_s: f32,
    pub remaining_time_filt_weight_s: f32,
    pub remaining_time_raw_drip_s: f32,
    pub remaining_time_filt_drip_s: f32,
    pub remaining_time_fused_s: f32,
    pub total_drops: u64,
    pub initial_total_mass_g: f32,
    /// -1 until the initial mass has been captured.
    pub progress_percent: f32,
    pub state: SystemState,
    pub auto_clamp: bool,

    // Derived extras, not part of the broadcast row.
    pub total_volume_ml: f32,
    pub flow_ml_per_hour: f32,
}

/// Column names of the broadcast row, in wire order. Dashboards parse by
/// position, so this order is frozen.
pub const CSV_HEADER: &str = "timestamp_ms,raw_mass_g,filtered_mass_g,\
raw_flow_weight_gps,flow_weight_gps,drops_this_tick,raw_drip_rate_dps,\
filtered_drip_rate_dps,raw_flow_drip_gps,flow_drip_gps,wpd_gpd,\
wpd_calibrating,wpd_long_cal_active,remaining_drop_g,fused_flow_gps,\
fused_remaining_g,remaining_time_raw_weight_s,remaining_time_filt_weight_s,\
remaining_time_raw_drip_s,remaining_time_filt_drip_s,remaining_time_fused_s,\
total_drops,initial_total_mass_g,progress_percent,state,auto_clamp";

impl Snapshot {
    /// The fixed-order 26-column row broadcast to dashboards.
    pub fn csv_row(&self) -> String {
        format!(
            "{},{:.2},{:.2},{:.4},{:.4},{},{:.2},{:.2},{:.4},{:.4},{:.4},{},{},{:.2},{:.4},{:.2},{:.0},{:.0},{:.0},{:.0},{:.0},{},{:.2},{:.1},{},{}",
            self.timestamp_ms,
            self.raw_mass_g,
            self.filtered_mass_g,
            self.raw_flow_weight_gps,
            self.flow_weight_gps,
            self.drops_this_tick,
            self.raw_drip_rate_dps,
            self.filtered_drip_rate_dps,
            self.raw_flow_drip_gps,
            self.flow_drip_gps,
            self.wpd_gpd,
            u8::from(self.wpd_calibrating),
            u8::from(self.wpd_long_cal_active),
            self.remaining_drop_g,
            self.fused_flow_gps,
            self.fused_remaining_g,
            self.remaining_time_raw_weight_s,
            self.remaining_time_filt_weight_s,
            self.remaining_time_raw_drip_s,
            self.remaining_time_filt_drip_s,
            self.remaining_time_fused_s,
            self.total_drops,
            self.initial_total_mass_g,
            self.progress_percent,
            self.state.upper_name(),
            u8::from(self.auto_clamp),
        )
    }
}
