use thiserror::Error;

/// Setup-time failures. Budget and scheduling operations themselves never return errors:
/// they either report a boolean outcome or abort on a contract violation.
#[derive(Debug, Error)]
pub enum SchedError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("kick timer error: {0}")]
    Timer(#[from] vmm_sys_util::errno::Error),
}

pub type Result<T> = std::result::Result<T, SchedError>;
