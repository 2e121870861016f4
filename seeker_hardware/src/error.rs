use thiserror::Error;

#[derive(Debug, Error)]
pub enum HwError {
    #[error("device bus error: {0}")]
    Bus(String),
    #[error("vision pipeline timeout")]
    Timeout,
    #[error("vision pipeline disabled")]
    PipelineDisabled,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HwError>;
