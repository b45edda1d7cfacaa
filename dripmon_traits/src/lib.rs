pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// A gross-weight sensor (load cell under the bag and fixture).
///
/// `read` returns grams including all tare; the engine subtracts the
/// configured tare itself. Implementations may block up to `timeout`
/// waiting for the ADC to become ready.
pub trait WeightSensor {
    fn read(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<f32, Box<dyn std::error::Error + Send + Sync>>;
}
