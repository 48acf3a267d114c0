use thiserror::Error;

/// All errors produced by oratio-core.
///
/// Setup failures are fatal to the session: the controller cleans up and
/// returns them without retrying. Hangup is not an error — it is reported
/// through [`crate::session::Disposition::HungUp`].
#[derive(Debug, Error)]
pub enum OratioError {
    #[error("no text to speak")]
    EmptyText,

    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    #[error("failed to open synthesis port: {0}")]
    PortOpen(String),

    #[error("voice selection failed: {query}")]
    VoiceUnavailable { query: String },

    #[error("failed to start synthesis: {0}")]
    SpeakStart(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, OratioError>;
