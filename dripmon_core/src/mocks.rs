//! Test and helper mocks for dripmon_core

use dripmon_hardware::error::HwError;

/// A weight sensor that always reports not-ready; useful when exercising
/// the substitute-last-filtered path or driving only the drop channel.
pub struct NoopWeightSensor;

impl dripmon_traits::WeightSensor for NoopWeightSensor {
    fn read(
        &mut self,
        _timeout: std::time::Duration,
    ) -> Result<f32, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(HwError::NotReady))
    }
}
