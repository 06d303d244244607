//! Nachrichten der Realtime-API
//!
//! Eingehende Server-Ereignisse und ausgehende Client-Nachrichten als
//! intern getaggte Enums ("type"-Feld). Unbekannte Ereignistypen werden
//! bewusst toleriert, damit neue Server-Events den Client nicht brechen.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Eingehende Server-Ereignisse
// ---------------------------------------------------------------------------

/// Vom Server empfangenes Ereignis
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum EingehendesEreignis {
    /// Session steht, Konfiguration kann gesendet werden
    #[serde(rename = "session.created")]
    SitzungErstellt,

    /// Session-Konfiguration wurde uebernommen
    #[serde(rename = "session.updated")]
    SitzungAktualisiert,

    /// Server-VAD hat Sprachbeginn des Benutzers erkannt
    #[serde(rename = "input_audio_buffer.speech_started")]
    SprachbeginnErkannt,

    /// Base64-kodiertes PCM16-Fragment der synthetisierten Antwort
    #[serde(rename = "response.audio.delta")]
    AudioDelta { delta: String },

    /// Textanteil der Antwort, inkrementell
    #[serde(rename = "response.audio_transcript.delta")]
    TranskriptDelta { delta: String },

    /// Transkript der Benutzereingabe ist fertig
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    EingabeTranskript { transcript: String },

    /// Antwort abgeschlossen; enthaelt ggf. das Gesamttranskript
    #[serde(rename = "response.done")]
    AntwortAbgeschlossen { response: ResponseAbschluss },

    /// Vom Server gemeldeter Fehler (nicht fatal)
    #[serde(rename = "error")]
    Fehler { error: FehlerDetails },

    /// Jeder nicht modellierte Ereignistyp
    #[serde(other)]
    Unbekannt,
}

/// Fehlerobjekt eines "error"-Ereignisses
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FehlerDetails {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl FehlerDetails {
    pub fn meldung(&self) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(msg)) => format!("{code}: {msg}"),
            (None, Some(msg)) => msg.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => "unbekannter Serverfehler".to_string(),
        }
    }
}

/// Abschlussobjekt von `response.done`
///
/// Das Transkript liegt verschachtelt unter
/// `response.output[0].content[0].transcript`; fehlende Ebenen sind
/// kein Fehler, sondern "kein Transkript".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseAbschluss {
    #[serde(default)]
    pub output: Vec<AusgabeElement>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AusgabeElement {
    #[serde(default)]
    pub content: Vec<InhaltsElement>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InhaltsElement {
    #[serde(default)]
    pub transcript: Option<String>,
}

impl ResponseAbschluss {
    /// Gesamttranskript der Antwort, falls vorhanden
    pub fn transkript(&self) -> Option<&str> {
        self.output
            .first()?
            .content
            .first()?
            .transcript
            .as_deref()
    }
}

// ---------------------------------------------------------------------------
// Ausgehende Client-Nachrichten
// ---------------------------------------------------------------------------

/// An den Server gesendete Nachricht
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum AusgehendeNachricht {
    /// Base64-kodiertes PCM16-Frame an den Eingabepuffer anhaengen
    #[serde(rename = "input_audio_buffer.append")]
    AudioAnhaengen { audio: String },

    /// Session-Konfiguration setzen (Antwort auf session.created)
    #[serde(rename = "session.update")]
    SitzungKonfigurieren { session: SessionKonfiguration },
}

/// Konfiguration der Realtime-Session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionKonfiguration {
    pub instructions: String,
    pub voice: String,
    pub modalities: Vec<String>,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub turn_detection: Sprachpausenerkennung,
    pub input_audio_transcription: Transkription,
    pub temperature: f32,
    pub max_response_output_tokens: u32,
    pub tools: Vec<serde_json::Value>,
    pub tool_choice: String,
}

/// Server-VAD-Parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sprachpausenerkennung {
    #[serde(rename = "type")]
    pub typ: String,
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transkription {
    pub model: String,
}

impl Default for SessionKonfiguration {
    fn default() -> Self {
        Self {
            instructions: "You are a friendly, helpful voice companion. \
                           Keep your answers short and conversational."
                .to_string(),
            voice: "echo".to_string(),
            modalities: vec!["text".to_string(), "audio".to_string()],
            input_audio_format: "pcm16".to_string(),
            output_audio_format: "pcm16".to_string(),
            turn_detection: Sprachpausenerkennung::default(),
            input_audio_transcription: Transkription {
                model: "whisper-1".to_string(),
            },
            temperature: 1.0,
            max_response_output_tokens: 1024,
            tools: Vec::new(),
            tool_choice: "auto".to_string(),
        }
    }
}

impl Default for Sprachpausenerkennung {
    fn default() -> Self {
        Self {
            typ: "server_vad".to_string(),
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_created_parsen() {
        let json = r#"{"type":"session.created","event_id":"ev_1","session":{"id":"sess_1"}}"#;
        let e: EingehendesEreignis = serde_json::from_str(json).unwrap();
        assert!(matches!(e, EingehendesEreignis::SitzungErstellt));
    }

    #[test]
    fn audio_delta_parsen() {
        let json = r#"{"type":"response.audio.delta","response_id":"r1","delta":"AAAA"}"#;
        let e: EingehendesEreignis = serde_json::from_str(json).unwrap();
        match e {
            EingehendesEreignis::AudioDelta { delta } => assert_eq!(delta, "AAAA"),
            other => panic!("AudioDelta erwartet, war {other:?}"),
        }
    }

    #[test]
    fn eingabe_transkript_parsen() {
        let json = r#"{"type":"conversation.item.input_audio_transcription.completed","item_id":"i1","transcript":"Hallo Welt"}"#;
        let e: EingehendesEreignis = serde_json::from_str(json).unwrap();
        match e {
            EingehendesEreignis::EingabeTranskript { transcript } => {
                assert_eq!(transcript, "Hallo Welt")
            }
            other => panic!("EingabeTranskript erwartet, war {other:?}"),
        }
    }

    #[test]
    fn unbekannter_typ_wird_toleriert() {
        let json = r#"{"type":"rate_limits.updated","rate_limits":[]}"#;
        let e: EingehendesEreignis = serde_json::from_str(json).unwrap();
        assert!(matches!(e, EingehendesEreignis::Unbekannt));
    }

    #[test]
    fn response_done_transkript_verschachtelt() {
        let json = r#"{
            "type": "response.done",
            "response": {
                "output": [
                    {"content": [{"type": "audio", "transcript": "Guten Tag!"}]}
                ]
            }
        }"#;
        let e: EingehendesEreignis = serde_json::from_str(json).unwrap();
        match e {
            EingehendesEreignis::AntwortAbgeschlossen { response } => {
                assert_eq!(response.transkript(), Some("Guten Tag!"));
            }
            other => panic!("AntwortAbgeschlossen erwartet, war {other:?}"),
        }
    }

    #[test]
    fn response_done_ohne_transkript() {
        let json = r#"{"type":"response.done","response":{"output":[]}}"#;
        let e: EingehendesEreignis = serde_json::from_str(json).unwrap();
        match e {
            EingehendesEreignis::AntwortAbgeschlossen { response } => {
                assert_eq!(response.transkript(), None);
            }
            other => panic!("AntwortAbgeschlossen erwartet, war {other:?}"),
        }
    }

    #[test]
    fn fehler_meldung_formatierung() {
        let json = r#"{"type":"error","error":{"code":"invalid_request","message":"kaputt"}}"#;
        let e: EingehendesEreignis = serde_json::from_str(json).unwrap();
        match e {
            EingehendesEreignis::Fehler { error } => {
                assert_eq!(error.meldung(), "invalid_request: kaputt")
            }
            other => panic!("Fehler erwartet, war {other:?}"),
        }
    }

    #[test]
    fn audio_anhaengen_serialisieren() {
        let n = AusgehendeNachricht::AudioAnhaengen {
            audio: "QUJD".to_string(),
        };
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains(r#""type":"input_audio_buffer.append""#));
        assert!(json.contains(r#""audio":"QUJD""#));
    }

    #[test]
    fn session_update_serialisieren() {
        let n = AusgehendeNachricht::SitzungKonfigurieren {
            session: SessionKonfiguration::default(),
        };
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains(r#""type":"session.update""#));
        assert!(json.contains(r#""voice":"echo""#));
        assert!(json.contains(r#""type":"server_vad""#));
        assert!(json.contains(r#""prefix_padding_ms":300"#));
        assert!(json.contains(r#""silence_duration_ms":500"#));
        assert!(json.contains(r#""model":"whisper-1""#));
        assert!(json.contains(r#""max_response_output_tokens":1024"#));
    }
}
