use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum MonitorError {
    /// The ADC had no fresh sample; the engine substitutes the last
    /// filtered value and keeps running.
    #[error("sensor not ready")]
    SensorNotReady,
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid state: {0}")]
    State(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing weight sensor")]
    MissingWeightSensor,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
