//! Session-Client
//!
//! Steckt Aufnahme, Uplink, Protokoll-Handler, Wiedergabe und
//! Zustandsmaschine zusammen und besitzt den Verbindungs-Lebenszyklus:
//! Aufbau, beschraenkte automatische Wiederverbindung, Monitor-Takt
//! (Wiedergabe-Auslauf, Watchdog) und synchrone Trennung.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chatterbox_audio::{AudioFrame, CaptureEngine, UplinkBatcher, UplinkConfig, WiedergabePlaner};
use chatterbox_core::{
    ChatterboxEvent, EventBus, Gespraechszustand, Verbindungsstatus, Zustandsmaschine,
};
use chatterbox_protocol::{SessionKonfiguration, SessionTransport, TransportEreignis};

use crate::error::{SessionError, SessionResult};
use crate::handler::{HandlerKontext, ProtokollHandler};
use crate::verbindung::{TransportHalter, WebSocketVerbindung, WsConfig};
use crate::zeitplan::VerzoegerteAufgabe;

/// Konfiguration des Session-Clients
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub ws: WsConfig,
    pub session: SessionKonfiguration,
    pub uplink: UplinkConfig,
    /// Maximale automatische Wiederverbindungsversuche
    pub wiederverbindungen: u32,
    /// Abstand zwischen den Versuchen
    pub wiederverbindungs_abstand: Duration,
    /// Wartezeit nach Wiedergabe-Ende bevor die Aufnahme wieder scharf wird
    pub nachlauf: Duration,
    /// Takt des Auslauf- und Watchdog-Monitors
    pub monitor_intervall: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ws: WsConfig::default(),
            session: SessionKonfiguration::default(),
            uplink: UplinkConfig::default(),
            wiederverbindungen: 3,
            wiederverbindungs_abstand: Duration::from_secs(2),
            nachlauf: Duration::from_millis(300),
            monitor_intervall: Duration::from_millis(500),
        }
    }
}

/// Client einer Realtime-Sprachsession
pub struct SitzungsClient {
    config: ClientConfig,
    halter: Arc<TransportHalter>,
    capture: Arc<CaptureEngine>,
    planer: Arc<WiedergabePlaner>,
    zustaende: Arc<Zustandsmaschine>,
    batcher: Arc<Mutex<UplinkBatcher>>,
    events: EventBus,
    status: Arc<Mutex<Verbindungsstatus>>,
    aufgaben: Mutex<Vec<VerzoegerteAufgabe>>,
    monitor_token: Mutex<Option<CancellationToken>>,
    versuche: AtomicU32,
    manuell_getrennt: AtomicBool,
}

impl SitzungsClient {
    /// Erstellt den Client und startet den Uplink-Worker
    pub fn neu(
        config: ClientConfig,
        capture: Arc<CaptureEngine>,
        frames: Receiver<AudioFrame>,
        planer: Arc<WiedergabePlaner>,
        zustaende: Arc<Zustandsmaschine>,
        events: EventBus,
    ) -> SessionResult<Arc<Self>> {
        let halter = Arc::new(TransportHalter::neu());
        let batcher = Arc::new(Mutex::new(UplinkBatcher::neu(
            Arc::clone(&halter) as Arc<dyn SessionTransport>,
            config.uplink.clone(),
        )));

        // Uplink-Worker: Frames aus der Capture-Engine in den Batcher
        let uplink_batcher = Arc::clone(&batcher);
        std::thread::Builder::new()
            .name("chatterbox-uplink".to_string())
            .spawn(move || {
                while let Ok(frame) = frames.recv() {
                    uplink_batcher.lock().einreihen(&frame);
                }
                debug!("Uplink-Worker beendet");
            })
            .map_err(|e| SessionError::Transport(format!("Uplink-Worker: {e}")))?;

        Ok(Arc::new(Self {
            config,
            halter,
            capture,
            planer,
            zustaende,
            batcher,
            events,
            status: Arc::new(Mutex::new(Verbindungsstatus::NichtVerbunden)),
            aufgaben: Mutex::new(Vec::new()),
            monitor_token: Mutex::new(None),
            versuche: AtomicU32::new(0),
            manuell_getrennt: AtomicBool::new(false),
        }))
    }

    /// Baut die Verbindung auf und startet Handler-Schleife und Monitor
    ///
    /// "Verbunden" wird der Status erst mit der Session-Bestaetigung
    /// durch den Handler.
    pub async fn verbinden(self: &Arc<Self>) -> SessionResult<()> {
        {
            let mut status = self.status.lock();
            if *status != Verbindungsstatus::NichtVerbunden {
                debug!("Verbindungsaufbau laeuft bereits");
                return Ok(());
            }
            *status = Verbindungsstatus::Verbindet;
        }
        self.events.senden(ChatterboxEvent::VerbindungGeaendert {
            status: Verbindungsstatus::Verbindet,
        });
        self.manuell_getrennt.store(false, Ordering::SeqCst);

        let (verbindung, mut ereignisse) = match WebSocketVerbindung::verbinden(&self.config.ws)
            .await
        {
            Ok(x) => x,
            Err(e) => {
                warn!(fehler = %e, "Verbindungsaufbau fehlgeschlagen");
                *self.status.lock() = Verbindungsstatus::NichtVerbunden;
                self.events.senden(ChatterboxEvent::VerbindungGeaendert {
                    status: Verbindungsstatus::NichtVerbunden,
                });
                self.wiederverbindung_planen();
                return Err(e);
            }
        };
        self.halter.setzen(verbindung);
        self.versuche.store(0, Ordering::SeqCst);

        // Handler-Schleife: einziger Konsument der Transport-Ereignisse
        let klient = Arc::clone(self);
        tokio::spawn(async move {
            let mut handler = ProtokollHandler::neu(HandlerKontext {
                transport: Arc::clone(&klient.halter) as Arc<dyn SessionTransport>,
                capture: Arc::clone(&klient.capture),
                planer: Arc::clone(&klient.planer),
                zustaende: Arc::clone(&klient.zustaende),
                status: Arc::clone(&klient.status),
                events: klient.events.clone(),
                session_config: klient.config.session.clone(),
            });
            while let Some(ereignis) = ereignisse.recv().await {
                let getrennt = matches!(ereignis, TransportEreignis::Getrennt { .. });
                handler.verarbeiten(ereignis);
                if getrennt {
                    klient.halter.entfernen();
                    klient.batcher.lock().leeren();
                    if !klient.manuell_getrennt.load(Ordering::SeqCst) {
                        klient.wiederverbindung_planen();
                    }
                    break;
                }
            }
            debug!("Handler-Schleife beendet");
        });

        self.monitor_starten();
        Ok(())
    }

    /// Trennt synchron: nach Rueckkehr laeuft weder Aufnahme noch
    /// Wiedergabe und alle geplanten Aufgaben sind abgebrochen
    pub fn trennen(&self) {
        info!("Manuelle Trennung");
        self.manuell_getrennt.store(true, Ordering::SeqCst);
        for aufgabe in self.aufgaben.lock().drain(..) {
            aufgabe.abbrechen();
        }
        if let Some(token) = self.monitor_token.lock().take() {
            token.cancel();
        }
        if let Some(verbindung) = self.halter.entfernen() {
            verbindung.trennen();
        }
        self.capture.stoppen();
        self.planer.stoppen();
        self.batcher.lock().leeren();
        self.zustaende.ruhe();
        self.versuche.store(0, Ordering::SeqCst);

        let vorher = {
            let mut status = self.status.lock();
            std::mem::replace(&mut *status, Verbindungsstatus::NichtVerbunden)
        };
        if vorher != Verbindungsstatus::NichtVerbunden {
            self.events.senden(ChatterboxEvent::VerbindungGeaendert {
                status: Verbindungsstatus::NichtVerbunden,
            });
        }
    }

    /// Sprechen-Taste gedrueckt
    pub fn zuhoeren_starten(&self) -> SessionResult<()> {
        if !self.zustaende.taste_aktiv() {
            // Waehrend die KI denkt oder spricht ist die Taste inert
            return Ok(());
        }
        if *self.status.lock() != Verbindungsstatus::Verbunden {
            // Ohne Session bleibt das Mikrofon aus
            debug!("Taste ohne Verbindung ignoriert");
            return Ok(());
        }
        self.capture.starten().map_err(SessionError::from)?;
        self.zustaende.benutzer_spricht(true);
        Ok(())
    }

    /// Sprechen-Taste losgelassen
    pub fn zuhoeren_beenden(&self) {
        self.capture.stoppen();
        self.zustaende.ki_denkt();
    }

    pub fn status(&self) -> Verbindungsstatus {
        *self.status.lock()
    }

    pub fn gespraechszustand(&self) -> Gespraechszustand {
        self.zustaende.zustand()
    }

    /// Ein Monitor-Takt: Watchdog pruefen, Wiedergabe-Auslauf erkennen
    /// und danach die Aufnahme mit Nachlauf wieder scharf machen
    pub fn takt(&self) {
        let _ = self.zustaende.zustand();

        if !self.planer.drain_pruefen() {
            return;
        }
        self.zustaende.ruhe();

        if *self.status.lock() != Verbindungsstatus::Verbunden {
            return;
        }
        let capture = Arc::clone(&self.capture);
        let status = Arc::clone(&self.status);
        let events = self.events.clone();
        let aufgabe = VerzoegerteAufgabe::planen(self.config.nachlauf, async move {
            if *status.lock() != Verbindungsstatus::Verbunden {
                return;
            }
            if let Err(e) = capture.starten() {
                warn!(fehler = %e, "Aufnahme nach Wiedergabe nicht reaktivierbar");
                events.senden(ChatterboxEvent::Fehler {
                    meldung: e.to_string(),
                });
            }
        });
        self.aufgaben.lock().push(aufgabe);
    }

    fn monitor_starten(self: &Arc<Self>) {
        let mut guard = self.monitor_token.lock();
        if guard.is_some() {
            return;
        }
        let token = CancellationToken::new();
        *guard = Some(token.clone());
        drop(guard);

        let klient = Arc::clone(self);
        tokio::spawn(async move {
            let mut takt = tokio::time::interval(klient.config.monitor_intervall);
            takt.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = takt.tick() => klient.takt(),
                }
            }
            debug!("Monitor beendet");
        });
    }

    fn wiederverbindung_planen(self: &Arc<Self>) {
        let versuch = self.versuche.fetch_add(1, Ordering::SeqCst) + 1;
        if versuch > self.config.wiederverbindungen {
            warn!("Wiederverbindung aufgegeben");
            self.events.senden(ChatterboxEvent::Fehler {
                meldung: "Verbindung verloren, Wiederverbindung aufgegeben".to_string(),
            });
            return;
        }
        info!(
            versuch,
            von = self.config.wiederverbindungen,
            "Wiederverbindung geplant"
        );
        let klient = Arc::clone(self);
        let aufgabe = VerzoegerteAufgabe::planen(self.config.wiederverbindungs_abstand, async move {
            if klient.manuell_getrennt.load(Ordering::SeqCst) {
                return;
            }
            if let Err(e) = klient.verbinden().await {
                warn!(fehler = %e, "Wiederverbindung fehlgeschlagen");
            }
        });
        self.aufgaben.lock().push(aufgabe);
    }
}
