//! Typisierter Event-Bus
//!
//! Publish/Subscribe auf Basis von tokio broadcast. Abonnenten erhalten
//! einen eigenen Receiver; langsame Abonnenten verlieren alte Events
//! (Lagged), der Sender blockiert nie.

use tokio::sync::broadcast;
use tracing::trace;

use crate::types::{Gespraechszustand, Verbindungsstatus};

/// Ereignisse an die Praesentationsschicht und andere Beobachter
#[derive(Debug, Clone, PartialEq)]
pub enum ChatterboxEvent {
    /// Verbindungsstatus hat sich geaendert
    VerbindungGeaendert { status: Verbindungsstatus },
    /// Gespraechszustand hat sich geaendert
    ZustandGeaendert { zustand: Gespraechszustand },
    /// Server-VAD hat Sprachbeginn des Benutzers erkannt
    SprachbeginnErkannt,
    /// Transkript der Benutzereingabe liegt vor
    EingabeText { text: String },
    /// Textanteil der Antwort (Delta oder Abschluss-Transkript)
    AusgabeText { text: String },
    /// Lautstaerke-Metrik eines Aufnahme-Frames (0.0..=1.0)
    AudioPegel { rms: f32 },
    /// Wiedergabe der Antwort ist vollstaendig ausgelaufen
    WiedergabeBeendet,
    /// Wiedergabe wurde abgebrochen
    WiedergabeGestoppt,
    /// Nicht-fataler Fehler zur Anzeige
    Fehler { meldung: String },
}

/// Event-Bus: geklonte Handles teilen denselben Kanal
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChatterboxEvent>,
}

impl EventBus {
    /// Erstellt einen Bus mit gegebener Kanal-Kapazitaet
    pub fn neu(kapazitaet: usize) -> Self {
        let (sender, _) = broadcast::channel(kapazitaet);
        Self { sender }
    }

    /// Veroeffentlicht ein Event (best effort, ohne Abonnenten ein No-Op)
    pub fn senden(&self, event: ChatterboxEvent) {
        trace!(?event, "Event");
        let _ = self.sender.send(event);
    }

    /// Abonniert den Bus; der Receiver lebt so lange wie der Abonnent
    pub fn abonnieren(&self) -> broadcast::Receiver<ChatterboxEvent> {
        self.sender.subscribe()
    }

    /// Anzahl aktiver Abonnenten
    pub fn abonnenten(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::neu(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_kommt_beim_abonnenten_an() {
        let bus = EventBus::neu(8);
        let mut rx = bus.abonnieren();
        bus.senden(ChatterboxEvent::AudioPegel { rms: 0.25 });
        let event = rx.recv().await.expect("Event erwartet");
        assert_eq!(event, ChatterboxEvent::AudioPegel { rms: 0.25 });
    }

    #[tokio::test]
    async fn senden_ohne_abonnenten_ist_harmlos() {
        let bus = EventBus::neu(8);
        bus.senden(ChatterboxEvent::WiedergabeBeendet);
        // Kein Panik, kein Fehler
        assert_eq!(bus.abonnenten(), 0);
    }

    #[tokio::test]
    async fn mehrere_abonnenten_sehen_dasselbe_event() {
        let bus = EventBus::neu(8);
        let mut a = bus.abonnieren();
        let mut b = bus.abonnieren();
        bus.senden(ChatterboxEvent::SprachbeginnErkannt);
        assert_eq!(a.recv().await.unwrap(), ChatterboxEvent::SprachbeginnErkannt);
        assert_eq!(b.recv().await.unwrap(), ChatterboxEvent::SprachbeginnErkannt);
    }
}
