//! Chatterbox - Sprach-Companion ueber die OpenAI Realtime-API
//!
//! Verkabelt Mikrofon-Aufnahme, Session-Client und Wiedergabe und
//! laeuft bis Ctrl+C. Die Gespraechsereignisse gehen ueber den
//! Event-Bus an das Log; eine UI kann denselben Bus abonnieren.

mod config;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use chatterbox_audio::{CaptureEngine, CpalAufnahme, CpalWiedergabe, WiedergabePlaner};
use chatterbox_core::{ChatterboxEvent, EventBus, Zustandsmaschine};
use chatterbox_session::SitzungsClient;

use config::{AppConfig, API_SCHLUESSEL_VARIABLE};

fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Abonniert den Event-Bus und schreibt das Gespraech ins Log
fn ereignisse_loggen(bus: &EventBus) {
    let mut empfaenger = bus.abonnieren();
    tokio::spawn(async move {
        while let Ok(ereignis) = empfaenger.recv().await {
            match ereignis {
                ChatterboxEvent::VerbindungGeaendert { status } => {
                    info!(?status, "Verbindungsstatus");
                }
                ChatterboxEvent::ZustandGeaendert { zustand } => {
                    info!(anzeige = zustand.beschreibung(), "Gespraechszustand");
                }
                ChatterboxEvent::SprachbeginnErkannt => {
                    info!("Sprachbeginn erkannt");
                }
                ChatterboxEvent::EingabeText { text } => {
                    info!(text = %text, "Du");
                }
                ChatterboxEvent::AusgabeText { text } => {
                    info!(text = %text, "Chatterbox");
                }
                ChatterboxEvent::WiedergabeBeendet => {
                    info!("Wiedergabe beendet");
                }
                ChatterboxEvent::WiedergabeGestoppt => {
                    info!("Wiedergabe gestoppt");
                }
                ChatterboxEvent::Fehler { meldung } => {
                    error!(meldung = %meldung, "Sessionfehler");
                }
                ChatterboxEvent::AudioPegel { .. } => {} // zu laut fuers Log
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_pfad =
        std::env::var("CHATTERBOX_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
    let config_vorhanden = std::path::Path::new(&config_pfad).is_file();
    let config = AppConfig::laden(&config_pfad)?;
    logging_initialisieren(&config.logging.level, &config.logging.format);
    info!(pfad = %config_pfad, "Chatterbox startet");
    if !config_vorhanden {
        warn!(
            pfad = %config_pfad,
            "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
        );
    }

    let api_schluessel = std::env::var(API_SCHLUESSEL_VARIABLE).map_err(|_| {
        anyhow::anyhow!("Umgebungsvariable {API_SCHLUESSEL_VARIABLE} ist nicht gesetzt")
    })?;

    let bus = EventBus::neu(64);
    ereignisse_loggen(&bus);

    let capture_config = config.capture_config();
    let frame_samples = capture_config.frame_samples;
    let quelle = CpalAufnahme::neu(capture_config);
    let (capture, frames) = CaptureEngine::neu(Box::new(quelle), frame_samples, bus.clone());
    let capture = Arc::new(capture);

    let playback_config = config.playback_config();
    let senke = CpalWiedergabe::neu(&playback_config)?;
    let planer = Arc::new(WiedergabePlaner::neu(
        Box::new(senke),
        playback_config,
        bus.clone(),
    ));

    let zustaende = Arc::new(Zustandsmaschine::neu(bus.clone()));
    let klient = SitzungsClient::neu(
        config.client_config(api_schluessel),
        Arc::clone(&capture),
        frames,
        Arc::clone(&planer),
        zustaende,
        bus,
    )?;

    if let Err(e) = klient.verbinden().await {
        // Wiederverbindung ist bereits geplant, kein Abbruch
        warn!(fehler = %e, "Erster Verbindungsaufbau fehlgeschlagen");
    }

    info!("Bereit - beenden mit Ctrl+C");
    tokio::signal::ctrl_c().await?;

    info!("Chatterbox faehrt herunter");
    klient.trennen();
    planer.aufraeumen();
    Ok(())
}
