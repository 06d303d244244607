//! Gespraechs-Zustandsmaschine
//!
//! Haelt den aktuellen Gespraechszustand, erzwingt die erlaubten
//! Uebergaenge und meldet jede Aenderung auf dem Event-Bus. Ein
//! Watchdog setzt einen haengengebliebenen KiSpricht-Zustand nach
//! Ablauf einer Frist auf Ruhe zurueck (verpasstes Wiedergabe-Ende).

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::event::{ChatterboxEvent, EventBus};
use crate::types::Gespraechszustand;

/// Standard-Frist bevor KiSpricht zwangsweise beendet wird
pub const WATCHDOG_FRIST: Duration = Duration::from_secs(30);

struct Innen {
    zustand: Gespraechszustand,
    seit: Instant,
}

/// Zustandsmaschine fuer den Gespraechsablauf
pub struct Zustandsmaschine {
    innen: Mutex<Innen>,
    events: EventBus,
    watchdog: Duration,
}

impl Zustandsmaschine {
    pub fn neu(events: EventBus) -> Self {
        Self::mit_watchdog(events, WATCHDOG_FRIST)
    }

    pub fn mit_watchdog(events: EventBus, watchdog: Duration) -> Self {
        Self {
            innen: Mutex::new(Innen {
                zustand: Gespraechszustand::Ruhe,
                seit: Instant::now(),
            }),
            events,
            watchdog,
        }
    }

    /// Aktueller Zustand; prueft dabei den Watchdog
    pub fn zustand(&self) -> Gespraechszustand {
        let mut innen = self.innen.lock();
        if innen.zustand == Gespraechszustand::KiSpricht && innen.seit.elapsed() > self.watchdog {
            warn!("KiSpricht-Watchdog abgelaufen, zurueck zu Ruhe");
            Self::setzen(&mut innen, Gespraechszustand::Ruhe, &self.events);
        }
        innen.zustand
    }

    /// Ob die Sprechen-Taste gerade bedienbar ist
    pub fn taste_aktiv(&self) -> bool {
        self.zustand().taste_aktiv()
    }

    /// Benutzer beginnt zu sprechen; nur mit bestaetigter Verbindung
    pub fn benutzer_spricht(&self, verbunden: bool) -> bool {
        if !verbunden {
            debug!("BenutzerSpricht verweigert: keine bestaetigte Verbindung");
            return false;
        }
        let mut innen = self.innen.lock();
        Self::setzen(&mut innen, Gespraechszustand::BenutzerSpricht, &self.events);
        true
    }

    /// Benutzer hat das Sprechen beendet, Antwort wird erwartet
    pub fn ki_denkt(&self) {
        let mut innen = self.innen.lock();
        if innen.zustand == Gespraechszustand::BenutzerSpricht {
            Self::setzen(&mut innen, Gespraechszustand::KiDenkt, &self.events);
        }
    }

    /// Erstes Antwort-Fragment ist eingetroffen
    pub fn ki_spricht(&self) {
        let mut innen = self.innen.lock();
        Self::setzen(&mut innen, Gespraechszustand::KiSpricht, &self.events);
    }

    /// Zurueck in den Ruhezustand (Wiedergabe beendet oder abgebrochen)
    pub fn ruhe(&self) {
        let mut innen = self.innen.lock();
        Self::setzen(&mut innen, Gespraechszustand::Ruhe, &self.events);
    }

    fn setzen(innen: &mut Innen, neu: Gespraechszustand, events: &EventBus) {
        if innen.zustand == neu {
            return;
        }
        debug!(von = ?innen.zustand, nach = ?neu, "Gespraechszustand");
        innen.zustand = neu;
        innen.seit = Instant::now();
        events.senden(ChatterboxEvent::ZustandGeaendert { zustand: neu });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maschine() -> (Zustandsmaschine, tokio::sync::broadcast::Receiver<ChatterboxEvent>) {
        let bus = EventBus::neu(16);
        let rx = bus.abonnieren();
        (Zustandsmaschine::neu(bus), rx)
    }

    #[tokio::test]
    async fn startet_in_ruhe() {
        let (m, _rx) = maschine();
        assert_eq!(m.zustand(), Gespraechszustand::Ruhe);
        assert!(m.taste_aktiv());
    }

    #[tokio::test]
    async fn benutzer_spricht_nur_verbunden() {
        let (m, _rx) = maschine();
        assert!(!m.benutzer_spricht(false));
        assert_eq!(m.zustand(), Gespraechszustand::Ruhe);
        assert!(m.benutzer_spricht(true));
        assert_eq!(m.zustand(), Gespraechszustand::BenutzerSpricht);
    }

    #[tokio::test]
    async fn voller_gespraechszyklus() {
        let (m, mut rx) = maschine();
        m.benutzer_spricht(true);
        m.ki_denkt();
        m.ki_spricht();
        m.ruhe();
        let mut gesehen = Vec::new();
        while let Ok(e) = rx.try_recv() {
            if let ChatterboxEvent::ZustandGeaendert { zustand } = e {
                gesehen.push(zustand);
            }
        }
        assert_eq!(
            gesehen,
            vec![
                Gespraechszustand::BenutzerSpricht,
                Gespraechszustand::KiDenkt,
                Gespraechszustand::KiSpricht,
                Gespraechszustand::Ruhe,
            ]
        );
    }

    #[tokio::test]
    async fn ki_denkt_nur_nach_benutzer_spricht() {
        let (m, _rx) = maschine();
        m.ki_denkt();
        assert_eq!(m.zustand(), Gespraechszustand::Ruhe);
    }

    #[tokio::test]
    async fn gleicher_zustand_erzeugt_kein_event() {
        let (m, mut rx) = maschine();
        m.ruhe();
        assert!(rx.try_recv().is_err(), "Ruhe -> Ruhe darf kein Event senden");
    }

    #[tokio::test]
    async fn watchdog_setzt_ki_spricht_zurueck() {
        let bus = EventBus::neu(16);
        let m = Zustandsmaschine::mit_watchdog(bus, Duration::from_millis(5));
        m.ki_spricht();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(m.zustand(), Gespraechszustand::Ruhe);
    }
}
