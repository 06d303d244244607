//! Transport-Schnittstelle der Session
//!
//! Die Session-Logik kennt nur diese Schnittstelle; die konkrete
//! WebSocket-Anbindung lebt in einem anderen Crate und Tests haengen
//! einen Mock dahinter.

use chatterbox_core::Result;

/// Sendeseite des Session-Transports
///
/// `senden` darf nicht blockieren; Rueckstau oder eine fehlende
/// Verbindung sind als Fehler zu melden, der Aufrufer entscheidet
/// ueber Verwerfen oder Wiederholen.
pub trait SessionTransport: Send + Sync {
    /// Reiht eine Textnachricht zum Versand ein
    fn senden(&self, text: String) -> Result<()>;

    /// Ob der Transport aktuell eine offene Verbindung hat
    fn ist_verbunden(&self) -> bool;
}

/// Empfangsseitige Ereignisse des Transports
///
/// Werden von genau einem Konsumenten (dem Protokoll-Handler) in
/// Empfangsreihenfolge verarbeitet.
#[derive(Debug, Clone)]
pub enum TransportEreignis {
    /// Socket ist offen (noch vor der Session-Bestaetigung)
    Verbunden,
    /// Verbindung wurde beendet
    Getrennt { grund: String },
    /// Textnachricht der Gegenstelle
    Text(String),
    /// Transportfehler (Verbindung gilt danach als beendet)
    Fehler { meldung: String },
}
