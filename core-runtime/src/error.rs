use thiserror::Error;

/// Failures raised while assembling the runtime around a sync run.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid setting {key}: {message}")]
    InvalidSetting { key: String, message: String },

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Capability missing: {capability} - {message}")]
    CapabilityMissing { capability: String, message: String },
}

impl Error {
    pub(crate) fn invalid_setting(key: &str, message: impl Into<String>) -> Self {
        Error::InvalidSetting {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
