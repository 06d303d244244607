//! App-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! Standardwerte, sodass die App ohne Konfigurationsdatei lauffaehig
//! ist. Der API-Schluessel kommt ausschliesslich aus der Umgebung und
//! steht nie in der Datei.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use chatterbox_audio::{CaptureConfig, PlaybackConfig, UplinkConfig};
use chatterbox_protocol::SessionKonfiguration;
use chatterbox_session::{ClientConfig, WsConfig};

/// Umgebungsvariable mit dem API-Schluessel
pub const API_SCHLUESSEL_VARIABLE: &str = "OPENAI_API_KEY";

/// Vollstaendige App-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Realtime-API-Einstellungen
    pub api: ApiEinstellungen,
    /// Audio-Einstellungen
    pub audio: AudioEinstellungen,
    /// Session-Einstellungen
    pub sitzung: SitzungsEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Realtime-API-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiEinstellungen {
    /// Endpunkt inkl. Modellparameter
    pub url: String,
    /// Maximale automatische Wiederverbindungsversuche
    pub wiederverbindungen: u32,
    /// Abstand zwischen den Versuchen in Millisekunden
    pub wiederverbindungs_abstand_ms: u64,
}

impl Default for ApiEinstellungen {
    fn default() -> Self {
        let ws = WsConfig::default();
        Self {
            url: ws.url,
            wiederverbindungen: 3,
            wiederverbindungs_abstand_ms: 2000,
        }
    }
}

/// Audio-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    /// Eingabegeraet (leer = Standard)
    pub eingabegeraet: Option<String>,
    /// Ausgabegeraet (leer = Standard)
    pub ausgabegeraet: Option<String>,
    /// Samples pro Aufnahme-Frame
    pub frame_samples: usize,
    /// Verstaerkung der Wiedergabe, saettigend
    pub verstaerkung: f32,
    /// Jede wievielte Einreihung einen Uplink-Batch ausloest
    pub batch_schwelle: usize,
    /// Nachrichten pro Uplink-Batch
    pub batch_groesse: usize,
    /// Obergrenze wartender Wiedergabe-Fragmente
    pub max_fragmente: usize,
    /// Nachlauf nach Wiedergabe-Ende in Millisekunden
    pub nachlauf_ms: u64,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            eingabegeraet: None,
            ausgabegeraet: None,
            frame_samples: 480,
            verstaerkung: 2.0,
            batch_schwelle: 5,
            batch_groesse: 5,
            max_fragmente: 256,
            nachlauf_ms: 300,
        }
    }
}

/// Session-Einstellungen (werden per session.update gesetzt)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SitzungsEinstellungen {
    /// Stimme der synthetisierten Antwort
    pub stimme: String,
    /// Verhaltensanweisung an das Modell
    pub anweisungen: String,
    pub temperatur: f32,
    pub max_antwort_tokens: u32,
    /// Server-VAD-Schwelle
    pub vad_schwelle: f32,
    pub vad_vorlauf_ms: u32,
    pub vad_stille_ms: u32,
}

impl Default for SitzungsEinstellungen {
    fn default() -> Self {
        let standard = SessionKonfiguration::default();
        Self {
            stimme: standard.voice,
            anweisungen: standard.instructions,
            temperatur: standard.temperature,
            max_antwort_tokens: standard.max_response_output_tokens,
            vad_schwelle: standard.turn_detection.threshold,
            vad_vorlauf_ms: standard.turn_detection.prefix_padding_ms,
            vad_stille_ms: standard.turn_detection.silence_duration_ms,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level (trace, debug, info, warn, error)
    pub level: String,
    /// Format: "text" oder "json"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl AppConfig {
    /// Laedt die Konfiguration; eine fehlende Datei liefert die
    /// Standardwerte (das Logging steht beim Laden noch nicht, die
    /// Warnung dazu gibt der Aufrufer aus)
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Baut die Session-Konfiguration fuer session.update
    pub fn session_konfiguration(&self) -> SessionKonfiguration {
        let mut session = SessionKonfiguration::default();
        session.voice = self.sitzung.stimme.clone();
        session.instructions = self.sitzung.anweisungen.clone();
        session.temperature = self.sitzung.temperatur;
        session.max_response_output_tokens = self.sitzung.max_antwort_tokens;
        session.turn_detection.threshold = self.sitzung.vad_schwelle;
        session.turn_detection.prefix_padding_ms = self.sitzung.vad_vorlauf_ms;
        session.turn_detection.silence_duration_ms = self.sitzung.vad_stille_ms;
        session
    }

    /// Baut die Capture-Konfiguration
    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            frame_samples: self.audio.frame_samples,
            geraet: self.audio.eingabegeraet.clone(),
            ..Default::default()
        }
    }

    /// Baut die Wiedergabe-Konfiguration
    pub fn playback_config(&self) -> PlaybackConfig {
        PlaybackConfig {
            geraet: self.audio.ausgabegeraet.clone(),
            max_fragmente: self.audio.max_fragmente,
            verstaerkung: self.audio.verstaerkung,
            ..Default::default()
        }
    }

    /// Baut die Client-Konfiguration; der Schluessel kommt vom Aufrufer
    pub fn client_config(&self, api_schluessel: String) -> ClientConfig {
        ClientConfig {
            ws: WsConfig {
                url: self.api.url.clone(),
                api_schluessel,
                ..Default::default()
            },
            session: self.session_konfiguration(),
            uplink: UplinkConfig {
                batch_schwelle: self.audio.batch_schwelle,
                batch_groesse: self.audio.batch_groesse,
                ..Default::default()
            },
            wiederverbindungen: self.api.wiederverbindungen,
            wiederverbindungs_abstand: Duration::from_millis(self.api.wiederverbindungs_abstand_ms),
            nachlauf: Duration::from_millis(self.audio.nachlauf_ms),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardwerte_sind_vollstaendig() {
        let config = AppConfig::default();
        assert_eq!(config.audio.frame_samples, 480);
        assert!((config.audio.verstaerkung - 2.0).abs() < f32::EPSILON);
        assert_eq!(config.audio.batch_schwelle, 5);
        assert_eq!(config.sitzung.stimme, "echo");
        assert_eq!(config.api.wiederverbindungen, 3);
    }

    #[test]
    fn teil_toml_ueberschreibt_nur_genanntes() {
        let toml = r#"
            [audio]
            verstaerkung = 3.0

            [sitzung]
            stimme = "alloy"
        "#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert!((config.audio.verstaerkung - 3.0).abs() < f32::EPSILON);
        assert_eq!(config.sitzung.stimme, "alloy");
        // Rest bleibt Standard
        assert_eq!(config.audio.batch_schwelle, 5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let config = AppConfig::laden("/gibt/es/nicht/chatterbox.toml").unwrap();
        assert_eq!(config.audio.batch_schwelle, 5);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn session_konfiguration_uebernimmt_werte() {
        let mut config = AppConfig::default();
        config.sitzung.stimme = "alloy".into();
        config.sitzung.vad_stille_ms = 700;
        let session = config.session_konfiguration();
        assert_eq!(session.voice, "alloy");
        assert_eq!(session.turn_detection.silence_duration_ms, 700);
        assert_eq!(session.input_audio_format, "pcm16");
    }

    #[test]
    fn api_schluessel_steht_nicht_in_der_config() {
        // Kein Feld der Datei darf den Schluessel tragen
        let toml = toml::to_string(&AppConfig::default()).unwrap();
        assert!(!toml.to_lowercase().contains("schluessel"));
        assert!(!toml.to_lowercase().contains("api_key"));
    }
}
