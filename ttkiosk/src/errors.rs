use thiserror::Error;
use ttclient::TapToneError;

pub type Result<T> = std::result::Result<T, KioskError>;

#[derive(Error, Debug)]
pub enum KioskError {
    #[error("Backend error: {0}")]
    Api(#[from] TapToneError),
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),
    #[error("No playlist loaded")]
    NoPlaylist,
    #[error("Song {0} is not a discovery entry of the loaded playlist")]
    NotADiscovery(String),
    #[error("Audio output has no source to play")]
    NoSource,
    #[error("Audio output error: {0}")]
    Output(String),
}

impl KioskError {
    pub fn output(message: impl Into<String>) -> Self {
        KioskError::Output(message.into())
    }
}
