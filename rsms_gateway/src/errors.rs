// errors.rs: thiserror-based error types for the gateway
use rsms_protocol::FrameError;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("IO on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Frame: {0}")]
    Frame(#[from] FrameError),
    #[error("Config: {0}")]
    Config(#[from] config::ConfigError),
    #[error("identity field `{0}` is not provisioned")]
    Unprovisioned(&'static str),
    #[error("Decode: {0}")]
    Decode(String),
    #[error("Transport: {0}")]
    Transport(String),
}

impl GatewayError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        GatewayError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
