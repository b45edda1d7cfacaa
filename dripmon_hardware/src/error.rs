use thiserror::Error;

/// Typed errors surfaced by sensor backends.
///
/// The core downcasts to this enum at the trait boundary to distinguish
/// a transient not-ready ADC from a wiring-level fault.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HwError {
    /// The ADC had no fresh conversion within the polling window.
    #[error("sensor not ready")]
    NotReady,
    /// The read did not complete within the caller's timeout.
    #[error("sensor read timeout")]
    Timeout,
    /// The reading is outside any physically plausible range.
    #[error("reading out of range: {0} g")]
    OutOfRange(f32),
    #[error("io error: {0}")]
    Io(String),
}
