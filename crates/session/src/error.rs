//! Session-spezifische Fehlertypen

use thiserror::Error;

/// Fehler rund um Verbindung und Session-Ablauf
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Verbindungsaufbau fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Transportfehler: {0}")]
    Transport(String),

    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    #[error(transparent)]
    Audio(#[from] chatterbox_audio::AudioError),

    #[error(transparent)]
    Kern(#[from] chatterbox_core::ChatterboxError),
}

/// Result-Alias fuer Session-Operationen
pub type SessionResult<T> = Result<T, SessionError>;
