use thiserror::Error;

/// Why an alignment attempt was aborted.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    #[error("max attempt time exceeded")]
    MaxRuntime,
    #[error("vision target lost too long")]
    VisionLost,
}

#[derive(Debug, Error, Clone)]
pub enum ControlError {
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("hardware fault: {0}")]
    HardwareFault(String),
    #[error("timeout waiting for sensor")]
    Timeout,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("controller queried before first update")]
    NeverUpdated,
    #[error("estimator used before initialize")]
    NeverInitialized,
    #[error("invalid state: {0}")]
    State(String),
    #[error("aborted: {0}")]
    Abort(AbortReason),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing vision sensor")]
    MissingVision,
    #[error("missing motion sensor")]
    MissingMotion,
    #[error("missing drivetrain")]
    MissingDrivetrain,
    #[error("interpolation table requires at least one control point")]
    EmptyTable,
    #[error("interpolation table keys must be strictly increasing (index {index})")]
    NonIncreasingKeys { index: usize },
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
