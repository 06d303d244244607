//! Uplink-Batcher
//!
//! Sammelt Aufnahme-Frames als fertig serialisierte
//! `input_audio_buffer.append`-Nachrichten und schiebt sie in Batches
//! zum Transport. Der Pfad ist bewusst verlustbehaftet: bei vollem
//! Puffer weichen die aeltesten Nachrichten, bei Transportfehlern wird
//! der angefangene Batch verworfen statt wiederholt.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, warn};

use chatterbox_protocol::{pcm, AusgehendeNachricht, SessionTransport};

use crate::frame::AudioFrame;

/// Konfiguration des Uplink-Batchers
#[derive(Debug, Clone)]
pub struct UplinkConfig {
    /// Jede wievielte Einreihung einen Batch ausloest
    pub batch_schwelle: usize,
    /// Maximale Nachrichten pro Batch
    pub batch_groesse: usize,
    /// Obergrenze wartender Nachrichten (drop-oldest)
    pub max_ausstehend: usize,
}

impl Default for UplinkConfig {
    fn default() -> Self {
        Self {
            batch_schwelle: 5,
            batch_groesse: 5,
            max_ausstehend: 64,
        }
    }
}

/// Batcher zwischen Capture-Engine und Session-Transport
pub struct UplinkBatcher {
    config: UplinkConfig,
    transport: Arc<dyn SessionTransport>,
    ausstehend: VecDeque<String>,
    eingereiht: u64,
}

impl UplinkBatcher {
    pub fn neu(transport: Arc<dyn SessionTransport>, config: UplinkConfig) -> Self {
        Self {
            config,
            transport,
            ausstehend: VecDeque::new(),
            eingereiht: 0,
        }
    }

    /// Serialisiert ein Frame und reiht es ein; loest ggf. einen Batch aus
    pub fn einreihen(&mut self, frame: &AudioFrame) {
        let nachricht = AusgehendeNachricht::AudioAnhaengen {
            audio: pcm::nach_base64(&frame.samples),
        };
        let text = match serde_json::to_string(&nachricht) {
            Ok(t) => t,
            Err(e) => {
                warn!(fehler = %e, sequenz = frame.sequenz, "Frame nicht serialisierbar");
                return;
            }
        };

        while self.ausstehend.len() >= self.config.max_ausstehend.max(1) {
            // Verdraengung ist Policy, kein Fehler
            self.ausstehend.pop_front();
        }
        self.ausstehend.push_back(text);

        self.eingereiht += 1;
        if self.eingereiht % self.config.batch_schwelle.max(1) as u64 == 0 {
            self.abfliessen();
        }
    }

    /// Sendet bis zu `batch_groesse` wartende Nachrichten in FIFO-Reihenfolge
    pub fn abfliessen(&mut self) {
        let anzahl = self.config.batch_groesse.min(self.ausstehend.len());
        for gesendet in 0..anzahl {
            let Some(text) = self.ausstehend.pop_front() else {
                break;
            };
            if let Err(e) = self.transport.senden(text) {
                warn!(fehler = %e, "Uplink-Batch abgebrochen, Rest verworfen");
                // Nur den Rest dieses Batches verwerfen
                for _ in gesendet + 1..anzahl {
                    self.ausstehend.pop_front();
                }
                return;
            }
        }
        if anzahl > 0 {
            debug!(gesendet = anzahl, wartend = self.ausstehend.len(), "Uplink-Batch");
        }
    }

    /// Verwirft alle wartenden Nachrichten und den Zaehlerstand
    pub fn leeren(&mut self) {
        self.ausstehend.clear();
        self.eingereiht = 0;
    }

    pub fn wartend(&self) -> usize {
        self.ausstehend.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatterbox_core::Result;
    use chatterbox_protocol::EingehendesEreignis;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct MockTransport {
        gesendet: Mutex<Vec<String>>,
        verbunden: AtomicBool,
        noch_erfolgreich: AtomicUsize,
    }

    impl MockTransport {
        fn neu() -> Arc<Self> {
            Arc::new(Self {
                gesendet: Mutex::new(Vec::new()),
                verbunden: AtomicBool::new(true),
                noch_erfolgreich: AtomicUsize::new(usize::MAX),
            })
        }
    }

    impl SessionTransport for MockTransport {
        fn senden(&self, text: String) -> Result<()> {
            if !self.verbunden.load(Ordering::SeqCst) {
                return Err(chatterbox_core::ChatterboxError::Getrennt(
                    "Mock getrennt".to_string(),
                ));
            }
            let rest = self.noch_erfolgreich.load(Ordering::SeqCst);
            if rest == 0 {
                return Err(chatterbox_core::ChatterboxError::Transport(
                    "Mock-Sendefehler".to_string(),
                ));
            }
            if rest != usize::MAX {
                self.noch_erfolgreich.store(rest - 1, Ordering::SeqCst);
            }
            self.gesendet.lock().push(text);
            Ok(())
        }

        fn ist_verbunden(&self) -> bool {
            self.verbunden.load(Ordering::SeqCst)
        }
    }

    fn frame(sequenz: u64) -> AudioFrame {
        // Eindeutige Nutzlast pro Frame, damit Reihenfolge pruefbar ist
        AudioFrame::neu(vec![sequenz as i16; 4], sequenz)
    }

    /// Dekodiert die Kennung aus einer gesendeten append-Nachricht
    fn kennung(text: &str) -> i16 {
        let payload = text
            .split(r#""audio":""#)
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .expect("audio-Feld erwartet");
        pcm::aus_base64(payload).unwrap()[0]
    }

    #[test]
    fn batch_erst_ab_schwelle() {
        let transport = MockTransport::neu();
        let mut b = UplinkBatcher::neu(transport.clone(), UplinkConfig::default());
        for i in 0..4 {
            b.einreihen(&frame(i));
        }
        assert!(transport.gesendet.lock().is_empty());
        b.einreihen(&frame(4));
        assert_eq!(transport.gesendet.lock().len(), 5);
    }

    #[test]
    fn fifo_ohne_duplikate() {
        let transport = MockTransport::neu();
        let mut b = UplinkBatcher::neu(transport.clone(), UplinkConfig::default());
        for i in 0..12 {
            b.einreihen(&frame(i));
        }
        // Zwei volle Batches gesendet, zwei Nachrichten warten noch
        let gesendet = transport.gesendet.lock();
        assert_eq!(gesendet.len(), 10);
        assert_eq!(b.wartend(), 2);
        let kennungen: Vec<i16> = gesendet.iter().map(|t| kennung(t)).collect();
        assert_eq!(kennungen, (0..10).collect::<Vec<i16>>());
    }

    #[test]
    fn nachrichten_sind_gueltige_append_events() {
        let transport = MockTransport::neu();
        let mut b = UplinkBatcher::neu(transport.clone(), UplinkConfig::default());
        for i in 0..5 {
            b.einreihen(&frame(i));
        }
        for text in transport.gesendet.lock().iter() {
            assert!(text.contains(r#""type":"input_audio_buffer.append""#));
            // Rueckwaerts als Server-Event gelesen bleibt es unbekannt
            let _: EingehendesEreignis = serde_json::from_str(text).unwrap();
        }
    }

    #[test]
    fn transportfehler_verwirft_batch() {
        let transport = MockTransport::neu();
        transport.verbunden.store(false, Ordering::SeqCst);
        let mut b = UplinkBatcher::neu(transport.clone(), UplinkConfig::default());
        for i in 0..5 {
            b.einreihen(&frame(i));
        }
        assert!(transport.gesendet.lock().is_empty());
        assert_eq!(b.wartend(), 0, "Batch muss verworfen sein");

        // Nach Wiederverbindung laeuft der Uplink normal weiter
        transport.verbunden.store(true, Ordering::SeqCst);
        for i in 5..10 {
            b.einreihen(&frame(i));
        }
        assert_eq!(transport.gesendet.lock().len(), 5);
    }

    #[test]
    fn fehler_mitten_im_batch_verschont_folgenachrichten() {
        let transport = MockTransport::neu();
        transport.noch_erfolgreich.store(2, Ordering::SeqCst);
        let config = UplinkConfig {
            batch_schwelle: 100, // kein automatischer Abfluss
            batch_groesse: 5,
            max_ausstehend: 64,
        };
        let mut b = UplinkBatcher::neu(transport.clone(), config);
        for i in 0..8 {
            b.einreihen(&frame(i));
        }

        // Dritter Sendeversuch des Batches schlaegt fehl: nur die
        // restlichen Batch-Nachrichten (3, 4) duerfen mit weichen
        b.abfliessen();
        assert_eq!(b.wartend(), 3);

        transport.noch_erfolgreich.store(usize::MAX, Ordering::SeqCst);
        b.abfliessen();
        let kennungen: Vec<i16> = transport.gesendet.lock().iter().map(|t| kennung(t)).collect();
        assert_eq!(kennungen, vec![0, 1, 5, 6, 7]);
        assert_eq!(b.wartend(), 0);
    }

    #[test]
    fn verdraengung_bei_vollem_puffer() {
        let transport = MockTransport::neu();
        let config = UplinkConfig {
            batch_schwelle: 100, // kein automatischer Abfluss
            batch_groesse: 100,
            max_ausstehend: 3,
        };
        let mut b = UplinkBatcher::neu(transport.clone(), config);
        for i in 0..6 {
            b.einreihen(&frame(i));
        }
        assert_eq!(b.wartend(), 3);
        b.abfliessen();
        let kennungen: Vec<i16> = transport.gesendet.lock().iter().map(|t| kennung(t)).collect();
        assert_eq!(kennungen, vec![3, 4, 5], "aelteste muessen weichen");
    }

    #[test]
    fn leeren_verwirft_wartende() {
        let transport = MockTransport::neu();
        let config = UplinkConfig {
            batch_schwelle: 100,
            ..Default::default()
        };
        let mut b = UplinkBatcher::neu(transport.clone(), config);
        for i in 0..3 {
            b.einreihen(&frame(i));
        }
        b.leeren();
        assert_eq!(b.wartend(), 0);
        b.abfliessen();
        assert!(transport.gesendet.lock().is_empty());
    }
}
