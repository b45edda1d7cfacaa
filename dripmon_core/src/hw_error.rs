//! Maps `Box<dyn Error>` from the sensor trait boundary to typed `MonitorError`.
//!
//! `dripmon_traits::WeightSensor` uses `Box<dyn Error + Send + Sync>` for
//! maximum flexibility; this module converts those to our typed enum,
//! downcasting `dripmon_hardware::HwError` first.

use crate::error::MonitorError;
use dripmon_hardware::error::HwError;

/// Map a trait-boundary error to a typed `MonitorError`.
///
/// Attempts to downcast the known hardware error type first, then falls
/// back to string-based heuristics.
pub fn map_sensor_error(e: &(dyn std::error::Error + 'static)) -> MonitorError {
    if let Some(hw) = e.downcast_ref::<HwError>() {
        return match hw {
            HwError::NotReady => MonitorError::SensorNotReady,
            HwError::Timeout => MonitorError::Timeout,
            other => MonitorError::HardwareFault(other.to_string()),
        };
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") {
        MonitorError::Timeout
    } else {
        MonitorError::Hardware(s)
    }
}
