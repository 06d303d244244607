//! Protokoll-Handler
//!
//! Verarbeitet die Transport-Ereignisse der Realtime-Session. Der
//! Handler ist der einzige Konsument des Ereignis-Kanals, damit jede
//! Nachricht vollstaendig abgearbeitet ist bevor die naechste beginnt.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use chatterbox_audio::{CaptureEngine, DownlinkFragment, WiedergabePlaner};
use chatterbox_core::{ChatterboxEvent, EventBus, Verbindungsstatus, Zustandsmaschine};
use chatterbox_protocol::{
    AusgehendeNachricht, EingehendesEreignis, SessionKonfiguration, SessionTransport,
    TransportEreignis,
};

/// Alles was der Handler zum Dispatchen braucht
pub struct HandlerKontext {
    pub transport: Arc<dyn SessionTransport>,
    pub capture: Arc<CaptureEngine>,
    pub planer: Arc<WiedergabePlaner>,
    pub zustaende: Arc<Zustandsmaschine>,
    pub status: Arc<Mutex<Verbindungsstatus>>,
    pub events: EventBus,
    pub session_config: SessionKonfiguration,
}

/// Dispatcher fuer Server-Ereignisse
pub struct ProtokollHandler {
    kontext: HandlerKontext,
    /// Laufende Nummer des naechsten Antwort-Fragments
    fragment_index: u64,
}

impl ProtokollHandler {
    pub fn neu(kontext: HandlerKontext) -> Self {
        Self {
            kontext,
            fragment_index: 0,
        }
    }

    pub fn status(&self) -> Verbindungsstatus {
        *self.kontext.status.lock()
    }

    fn status_setzen(&self, neu: Verbindungsstatus) {
        let mut status = self.kontext.status.lock();
        if *status == neu {
            return;
        }
        debug!(von = ?*status, nach = ?neu, "Verbindungsstatus");
        *status = neu;
        drop(status);
        self.kontext
            .events
            .senden(ChatterboxEvent::VerbindungGeaendert { status: neu });
    }

    /// Verarbeitet genau ein Transport-Ereignis
    pub fn verarbeiten(&mut self, ereignis: TransportEreignis) {
        match ereignis {
            TransportEreignis::Verbunden => {
                debug!("Socket offen, warte auf session.created");
            }
            TransportEreignis::Text(text) => self.nachricht_verarbeiten(&text),
            TransportEreignis::Fehler { meldung } => {
                warn!(%meldung, "Transportfehler");
                self.kontext
                    .events
                    .senden(ChatterboxEvent::Fehler { meldung });
            }
            TransportEreignis::Getrennt { grund } => {
                info!(%grund, "Verbindung beendet");
                self.kontext.capture.stoppen();
                self.kontext.planer.stoppen();
                self.kontext.zustaende.ruhe();
                self.status_setzen(Verbindungsstatus::NichtVerbunden);
            }
        }
    }

    fn nachricht_verarbeiten(&mut self, text: &str) {
        let ereignis: EingehendesEreignis = match serde_json::from_str(text) {
            Ok(e) => e,
            Err(e) => {
                warn!(fehler = %e, "Unlesbare Server-Nachricht verworfen");
                return;
            }
        };

        match ereignis {
            EingehendesEreignis::SitzungErstellt => {
                debug!("session.created, sende Konfiguration");
                let nachricht = AusgehendeNachricht::SitzungKonfigurieren {
                    session: self.kontext.session_config.clone(),
                };
                match serde_json::to_string(&nachricht) {
                    Ok(json) => {
                        if let Err(e) = self.kontext.transport.senden(json) {
                            warn!(fehler = %e, "Session-Konfiguration nicht sendbar");
                        }
                    }
                    Err(e) => warn!(fehler = %e, "Session-Konfiguration nicht serialisierbar"),
                }
            }

            EingehendesEreignis::SitzungAktualisiert => {
                info!("Session bestaetigt");
                self.status_setzen(Verbindungsstatus::Verbunden);
                if let Err(e) = self.kontext.capture.starten() {
                    warn!(fehler = %e, "Aufnahme nach Session-Start nicht moeglich");
                    self.kontext.events.senden(ChatterboxEvent::Fehler {
                        meldung: e.to_string(),
                    });
                }
            }

            EingehendesEreignis::SprachbeginnErkannt => {
                debug!("Sprachbeginn erkannt");
                // Wartende Antwort-Fragmente sind damit veraltet
                self.kontext.planer.leeren();
                self.fragment_index = 0;
                let verbunden = self.status() == Verbindungsstatus::Verbunden;
                self.kontext.zustaende.benutzer_spricht(verbunden);
                self.kontext.events.senden(ChatterboxEvent::SprachbeginnErkannt);
            }

            EingehendesEreignis::AudioDelta { delta } => {
                if self.fragment_index == 0 {
                    // Erste Antwort: Aufnahme anhalten (Rueckkopplungsschutz)
                    self.kontext.capture.stoppen();
                    self.kontext.zustaende.ki_spricht();
                }
                self.kontext.planer.einreihen(DownlinkFragment {
                    index: self.fragment_index,
                    payload: delta,
                });
                self.fragment_index += 1;
            }

            EingehendesEreignis::TranskriptDelta { delta } => {
                self.kontext
                    .events
                    .senden(ChatterboxEvent::AusgabeText { text: delta });
            }

            EingehendesEreignis::EingabeTranskript { transcript } => {
                self.kontext
                    .events
                    .senden(ChatterboxEvent::EingabeText { text: transcript });
            }

            EingehendesEreignis::AntwortAbgeschlossen { response } => {
                if let Some(transkript) = response.transkript() {
                    self.kontext.events.senden(ChatterboxEvent::AusgabeText {
                        text: transkript.to_string(),
                    });
                }
            }

            EingehendesEreignis::Fehler { error } => {
                let meldung = error.meldung();
                warn!(%meldung, "Serverfehler gemeldet");
                self.kontext
                    .events
                    .senden(ChatterboxEvent::Fehler { meldung });
            }

            EingehendesEreignis::Unbekannt => {
                trace!("Unbekannter Ereignistyp ignoriert");
            }
        }
    }
}
