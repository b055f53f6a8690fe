//! Error types for the OS1 voice front end

use thiserror::Error;

/// Result type alias for OS1 operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice front end
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio output error
    #[error("audio error: {0}")]
    Audio(String),

    /// Audio context could not be created or resumed; the user must retry the gesture
    #[error("audio is locked: {0}")]
    AudioLocked(String),

    /// Synthesized audio could not be decoded, even after recreating the context
    #[error("decode error: {0}")]
    Decode(String),

    /// Microphone access was denied
    #[error("microphone permission denied: {0}")]
    PermissionDenied(String),

    /// Speech recognizer error
    #[error("recognizer error: {0}")]
    Recognizer(String),

    /// Chat collaborator error
    #[error("chat error: {0}")]
    Chat(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Operation called from a state that does not allow it
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// What the user is told when a turn fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Microphone access was refused
    PermissionDenied,
    /// Audio could not be unlocked; tap again
    AudioLocked,
    /// A remote service or the audio pipeline failed; the turn can be retried
    Service,
}

impl Error {
    /// Whether this error means the microphone is unavailable to us
    #[must_use]
    pub const fn is_permission(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }

    /// Collapse into the fault shown to the user
    #[must_use]
    pub const fn fault(&self) -> Fault {
        match self {
            Self::PermissionDenied(_) => Fault::PermissionDenied,
            Self::AudioLocked(_) => Fault::AudioLocked,
            _ => Fault::Service,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_classification() {
        assert_eq!(
            Error::PermissionDenied("not-allowed".into()).fault(),
            Fault::PermissionDenied
        );
        assert_eq!(Error::AudioLocked("suspended".into()).fault(), Fault::AudioLocked);
        assert_eq!(Error::Chat("500".into()).fault(), Fault::Service);
        assert_eq!(Error::Decode("bad frame".into()).fault(), Fault::Service);
    }

    #[test]
    fn test_is_permission() {
        assert!(Error::PermissionDenied("denied".into()).is_permission());
        assert!(!Error::Recognizer("network".into()).is_permission());
    }
}
