use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("namespace not open")]
    NotOpen,
    #[error("invalid key {0:?}: use 1..=15 ascii alphanumerics, '_' or '-'")]
    InvalidKey(String),
    #[error("invalid namespace {0:?}")]
    InvalidNamespace(String),
    #[error("simulated backend fault: {0}")]
    Injected(&'static str),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BackendError>;
