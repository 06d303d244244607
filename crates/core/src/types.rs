//! Grundtypen: Audio-Kontrakt, Gespraechs- und Verbindungszustand

use serde::{Deserialize, Serialize};

/// Abtastrate des gesamten Audio-Pfads (Aufnahme und Wiedergabe)
pub const ABTASTRATE_HZ: u32 = 24_000;

/// Kanalanzahl: durchgehend Mono
pub const KANAELE: u16 = 1;

/// Bytes pro Sample (PCM16 Little-Endian)
pub const BYTES_PRO_SAMPLE: usize = 2;

/// Zustand des Gespraechsablaufs
///
/// Genau ein Teilnehmer "hat das Wort": solange die KI spricht oder
/// denkt, bleibt die Aufnahme angehalten (Rueckkopplungsschutz).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gespraechszustand {
    /// Bereit, niemand spricht
    Ruhe,
    /// Der Benutzer spricht, Aufnahme laeuft
    BenutzerSpricht,
    /// Antwort wird erzeugt
    KiDenkt,
    /// Synthetisierte Antwort wird abgespielt
    KiSpricht,
}

impl Gespraechszustand {
    /// Anzeigetext fuer die Praesentationsschicht
    pub fn beschreibung(&self) -> &'static str {
        match self {
            Gespraechszustand::Ruhe => "Ready",
            Gespraechszustand::BenutzerSpricht => "Listening...",
            Gespraechszustand::KiDenkt => "Thinking...",
            Gespraechszustand::KiSpricht => "Speaking...",
        }
    }

    /// Akzentfarbe fuer die Praesentationsschicht
    pub fn farbe(&self) -> &'static str {
        match self {
            Gespraechszustand::Ruhe => "gray",
            Gespraechszustand::BenutzerSpricht => "blue",
            Gespraechszustand::KiDenkt => "orange",
            Gespraechszustand::KiSpricht => "purple",
        }
    }

    /// Ob die Sprechen-Taste in diesem Zustand bedienbar ist
    pub fn taste_aktiv(&self) -> bool {
        matches!(
            self,
            Gespraechszustand::Ruhe | Gespraechszustand::BenutzerSpricht
        )
    }
}

/// Verbindungsstatus zur Realtime-Gegenstelle
///
/// "Verbunden" bedeutet: Session-Konfiguration wurde bestaetigt,
/// nicht bloss dass der Socket offen ist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbindungsstatus {
    NichtVerbunden,
    Verbindet,
    Verbunden,
}

impl Verbindungsstatus {
    pub fn beschreibung(&self) -> &'static str {
        match self {
            Verbindungsstatus::NichtVerbunden => "nicht verbunden",
            Verbindungsstatus::Verbindet => "verbindet",
            Verbindungsstatus::Verbunden => "verbunden",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zustand_beschreibungen() {
        assert_eq!(Gespraechszustand::Ruhe.beschreibung(), "Ready");
        assert_eq!(
            Gespraechszustand::BenutzerSpricht.beschreibung(),
            "Listening..."
        );
        assert_eq!(Gespraechszustand::KiDenkt.beschreibung(), "Thinking...");
        assert_eq!(Gespraechszustand::KiSpricht.beschreibung(), "Speaking...");
    }

    #[test]
    fn zustand_farben() {
        assert_eq!(Gespraechszustand::Ruhe.farbe(), "gray");
        assert_eq!(Gespraechszustand::BenutzerSpricht.farbe(), "blue");
        assert_eq!(Gespraechszustand::KiDenkt.farbe(), "orange");
        assert_eq!(Gespraechszustand::KiSpricht.farbe(), "purple");
    }

    #[test]
    fn taste_nur_in_ruhe_und_beim_sprechen() {
        assert!(Gespraechszustand::Ruhe.taste_aktiv());
        assert!(Gespraechszustand::BenutzerSpricht.taste_aktiv());
        assert!(!Gespraechszustand::KiDenkt.taste_aktiv());
        assert!(!Gespraechszustand::KiSpricht.taste_aktiv());
    }

    #[test]
    fn audio_kontrakt() {
        assert_eq!(ABTASTRATE_HZ, 24_000);
        assert_eq!(KANAELE, 1);
        assert_eq!(BYTES_PRO_SAMPLE, 2);
    }
}
