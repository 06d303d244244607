//! Zentrale Fehlertypen fuer Chatterbox

use thiserror::Error;

/// Haupt-Fehlertyp der ueber Crate-Grenzen hinweg verwendet wird
#[derive(Error, Debug)]
pub enum ChatterboxError {
    /// Audio-Geraet fehlt, ist belegt oder die Berechtigung wurde verweigert
    #[error("Audio-Geraet nicht verfuegbar: {0}")]
    GeraetNichtVerfuegbar(String),

    /// Senden oder Empfangen ueber den Transport schlug fehl
    #[error("Transportfehler: {0}")]
    Transport(String),

    /// Es besteht keine Verbindung
    #[error("Nicht verbunden: {0}")]
    Getrennt(String),

    /// Gegenstelle hat ein Protokollproblem gemeldet oder verursacht
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Payload konnte nicht dekodiert werden (Base64, PCM-Laenge, JSON)
    #[error("Dekodierfehler: {0}")]
    Dekodierung(String),

    /// Eine beschraenkte Queue musste Eintraege verwerfen
    #[error("Kapazitaet ueberschritten: {0}")]
    KapazitaetUeberschritten(String),

    /// Ungueltige oder fehlende Konfiguration
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    /// Zeitlimit ueberschritten
    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl ChatterboxError {
    /// Gibt zurueck ob ein erneuter Versuch sinnvoll ist
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(
            self,
            ChatterboxError::Transport(_)
                | ChatterboxError::Getrennt(_)
                | ChatterboxError::Zeitlimit(_)
        )
    }
}

/// Result-Alias fuer Chatterbox-Operationen
pub type Result<T> = std::result::Result<T, ChatterboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = ChatterboxError::GeraetNichtVerfuegbar("Mikrofon".to_string());
        assert!(e.to_string().contains("Mikrofon"));
    }

    #[test]
    fn wiederholbarkeit() {
        assert!(ChatterboxError::Transport("x".into()).ist_wiederholbar());
        assert!(ChatterboxError::Getrennt("x".into()).ist_wiederholbar());
        assert!(!ChatterboxError::Dekodierung("x".into()).ist_wiederholbar());
        assert!(!ChatterboxError::Konfiguration("x".into()).ist_wiederholbar());
    }
}
