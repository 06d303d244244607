//! Audio-spezifische Fehlertypen

use thiserror::Error;

/// Fehler im Audio-Subsystem
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Audio-Geraet nicht gefunden: {0}")]
    GeraetNichtGefunden(String),

    #[error("Kein Standard-Eingabegeraet vorhanden")]
    KeinStandardEingabegeraet,

    #[error("Kein Standard-Ausgabegeraet vorhanden")]
    KeinStandardAusgabegeraet,

    /// Geraet vorhanden, aber nach allen Versuchen nicht nutzbar
    #[error("Audio-Geraet nicht verfuegbar: {0}")]
    GeraetNichtVerfuegbar(String),

    #[error("Audio-Stream Fehler: {0}")]
    StreamFehler(String),

    #[error("Audio-Worker nicht gestartet: {0}")]
    WorkerFehler(String),
}

/// Result-Alias fuer Audio-Operationen
pub type AudioResult<T> = Result<T, AudioError>;

impl From<AudioError> for chatterbox_core::ChatterboxError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::GeraetNichtGefunden(_)
            | AudioError::KeinStandardEingabegeraet
            | AudioError::KeinStandardAusgabegeraet
            | AudioError::GeraetNichtVerfuegbar(_) => {
                chatterbox_core::ChatterboxError::GeraetNichtVerfuegbar(e.to_string())
            }
            AudioError::StreamFehler(_) | AudioError::WorkerFehler(_) => {
                chatterbox_core::ChatterboxError::Intern(e.to_string())
            }
        }
    }
}
