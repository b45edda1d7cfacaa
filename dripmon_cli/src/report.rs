//! Cloud upload payload, produced from a snapshot.
//!
//! The field names and encodings are a wire contract with the backend:
//! `currentRate` is drops-per-minute rounded to integer, `estimatedTime`
//! is the fused remaining time in whole minutes (ceiling), `systemState`
//! is the uppercase state name and `autoClamp` is 0/1.

use dripmon_core::Snapshot;
use serde_json::json;

pub fn cloud_report(snap: &Snapshot, device_id: &str, density_g_per_ml: f32) -> serde_json::Value {
    let remaining_volume = if density_g_per_ml > 1e-6 {
        snap.fused_remaining_g / density_g_per_ml
    } else {
        0.0
    };
    json!({
        "deviceId": device_id,
        "totalVolume": snap.total_volume_ml,
        "remainingVolume": remaining_volume,
        "currentRate": (snap.filtered_drip_rate_dps * 60.0).round() as i64,
        "estimatedTime": (snap.remaining_time_fused_s / 60.0).ceil() as i64,
        "systemState": snap.state.upper_name(),
        "autoClamp": u8::from(snap.auto_clamp),
    })
}

/// JSON-lines form of one tick for `--json` output.
pub fn snapshot_json(snap: &Snapshot) -> serde_json::Value {
    json!({
        "timestamp_ms": snap.timestamp_ms,
        "raw_mass_g": snap.raw_mass_g,
        "filtered_mass_g": snap.filtered_mass_g,
        "flow_weight_gps": snap.flow_weight_gps,
        "filtered_drip_rate_dps": snap.filtered_drip_rate_dps,
        "flow_drip_gps": snap.flow_drip_gps,
        "wpd_gpd": snap.wpd_gpd,
        "fused_flow_gps": snap.fused_flow_gps,
        "fused_remaining_g": snap.fused_remaining_g,
        "remaining_time_fused_s": snap.remaining_time_fused_s,
        "total_drops": snap.total_drops,
        "progress_percent": snap.progress_percent,
        "flow_ml_per_hour": snap.flow_ml_per_hour,
        "state": snap.state.upper_name(),
        "auto_clamp": snap.auto_clamp,
    })
}
