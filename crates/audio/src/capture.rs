//! Mikrofon-Capture
//!
//! Der cpal-Callback schreibt Samples nur in einen lock-free
//! Ring-Buffer; ein Worker-Thread zieht sie heraus und reicht sie an
//! die Engine weiter, die daraus Frames fester Groesse baut, den Pegel
//! bestimmt und sie an den Uplink gibt. Die Hardware haengt hinter dem
//! Trait [`AufnahmeQuelle`], Tests speisen Samples direkt ein.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use tracing::{debug, error, info, warn};

use chatterbox_core::{ChatterboxEvent, EventBus, ABTASTRATE_HZ, KANAELE};
use chatterbox_protocol::pcm;

use crate::error::{AudioError, AudioResult};
use crate::frame::AudioFrame;
use crate::geraet;
use crate::mitschnitt::MitschnittPuffer;

/// Konfiguration der Mikrofon-Aufnahme
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Abtastrate in Hz
    pub abtastrate: u32,
    /// Kanalanzahl
    pub kanaele: u16,
    /// Samples pro Frame (480 = 20 ms bei 24 kHz)
    pub frame_samples: usize,
    /// Ring-Buffer Kapazitaet in Samples
    pub ring_kapazitaet: usize,
    /// Geraetename (None = Standard)
    pub geraet: Option<String>,
    /// Oeffnungsversuche bevor das Geraet als nicht verfuegbar gilt
    pub versuche: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            abtastrate: ABTASTRATE_HZ,
            kanaele: KANAELE,
            frame_samples: 480,
            ring_kapazitaet: ABTASTRATE_HZ as usize * 2, // 2 Sekunden
            geraet: None,
            versuche: 3,
        }
    }
}

/// Nimmt Sample-Bloecke vom Aufnahme-Worker entgegen
pub type SampleSenke = Box<dyn FnMut(&[i16]) + Send + 'static>;

/// Quelle von Mikrofon-Samples
///
/// `starten` ist idempotent; eine laufende Quelle bleibt unveraendert.
pub trait AufnahmeQuelle: Send {
    fn starten(&mut self, senke: SampleSenke) -> AudioResult<()>;
    fn stoppen(&mut self);
    fn laeuft(&self) -> bool;
}

// ---------------------------------------------------------------------------
// cpal-Implementierung
// ---------------------------------------------------------------------------

/// Mikrofon-Aufnahme via cpal
///
/// Der cpal-Stream ist nicht Send und lebt deshalb in einem eigenen
/// Thread, der ueber einen Kanal gestoppt wird.
pub struct CpalAufnahme {
    config: CaptureConfig,
    stop_tx: Option<Sender<()>>,
    laeuft: Arc<AtomicBool>,
}

impl CpalAufnahme {
    pub fn neu(config: CaptureConfig) -> Self {
        Self {
            config,
            stop_tx: None,
            laeuft: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl AufnahmeQuelle for CpalAufnahme {
    fn starten(&mut self, mut senke: SampleSenke) -> AudioResult<()> {
        if self.laeuft.load(Ordering::SeqCst) {
            return Ok(());
        }

        let config = self.config.clone();
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (bereit_tx, bereit_rx) = bounded::<AudioResult<()>>(1);
        let laeuft = Arc::clone(&self.laeuft);

        std::thread::Builder::new()
            .name("chatterbox-capture".to_string())
            .spawn(move || {
                let (stream, mut consumer) = match eingabestream_oeffnen(&config) {
                    Ok(x) => {
                        let _ = bereit_tx.send(Ok(()));
                        x
                    }
                    Err(e) => {
                        let _ = bereit_tx.send(Err(e));
                        return;
                    }
                };

                let mut puffer = vec![0i16; config.frame_samples.max(1024)];
                loop {
                    match stop_rx.recv_timeout(Duration::from_millis(10)) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => {
                            let n = consumer.pop_slice(&mut puffer);
                            if n > 0 {
                                senke(&puffer[..n]);
                            }
                        }
                    }
                }

                drop(stream);
                laeuft.store(false, Ordering::SeqCst);
                debug!("Capture-Thread beendet");
            })
            .map_err(|e| AudioError::WorkerFehler(e.to_string()))?;

        match bereit_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {
                self.laeuft.store(true, Ordering::SeqCst);
                self.stop_tx = Some(stop_tx);
                info!(
                    abtastrate = self.config.abtastrate,
                    frame_samples = self.config.frame_samples,
                    "Mikrofon-Aufnahme gestartet"
                );
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AudioError::GeraetNichtVerfuegbar(
                "Zeitlimit beim Oeffnen des Eingabegeraets".to_string(),
            )),
        }
    }

    fn stoppen(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        self.laeuft.store(false, Ordering::SeqCst);
    }

    fn laeuft(&self) -> bool {
        self.laeuft.load(Ordering::SeqCst)
    }
}

impl Drop for CpalAufnahme {
    fn drop(&mut self) {
        self.stoppen();
    }
}

/// Oeffnet den cpal-Eingabestream mit beschraenkten Wiederholversuchen
fn eingabestream_oeffnen(
    config: &CaptureConfig,
) -> AudioResult<(Stream, ringbuf::HeapCons<i16>)> {
    let device = geraet::eingabegeraet_laden(config.geraet.as_deref())?;

    let stream_config = StreamConfig {
        channels: config.kanaele,
        sample_rate: cpal::SampleRate(config.abtastrate),
        buffer_size: cpal::BufferSize::Default,
    };

    let supported = device
        .supported_input_configs()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?
        .find(|c| {
            c.min_sample_rate().0 <= config.abtastrate
                && c.max_sample_rate().0 >= config.abtastrate
                && c.channels() >= config.kanaele
        });
    let sample_format = supported
        .map(|c| c.sample_format())
        .unwrap_or(SampleFormat::I16);

    let mut letzter_fehler = String::new();
    for versuch in 1..=config.versuche.max(1) {
        let rb = HeapRb::<i16>::new(config.ring_kapazitaet);
        let (producer, consumer) = rb.split();

        match eingabestream_bauen(&device, &stream_config, sample_format, producer) {
            Ok(stream) => match stream.play() {
                Ok(()) => {
                    debug!(
                        versuch,
                        format = ?sample_format,
                        "Eingabestream geoeffnet"
                    );
                    return Ok((stream, consumer));
                }
                Err(e) => letzter_fehler = e.to_string(),
            },
            Err(e) => letzter_fehler = e.to_string(),
        }

        warn!(versuch, fehler = %letzter_fehler, "Eingabestream-Versuch fehlgeschlagen");
        std::thread::sleep(Duration::from_millis(100));
    }

    Err(AudioError::GeraetNichtVerfuegbar(letzter_fehler))
}

fn eingabestream_bauen(
    device: &Device,
    stream_config: &StreamConfig,
    sample_format: SampleFormat,
    mut producer: HeapProd<i16>,
) -> AudioResult<Stream> {
    let err_fn = |err| error!("Capture-Fehler: {}", err);

    // Im Callback nur in den Ring-Buffer schreiben, keine weitere Arbeit
    match sample_format {
        SampleFormat::I16 => device
            .build_input_stream(
                stream_config,
                move |data: &[i16], _| {
                    let geschrieben = producer.push_slice(data);
                    if geschrieben < data.len() {
                        warn!(
                            verworfen = data.len() - geschrieben,
                            "Capture Ring-Buffer voll"
                        );
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string())),
        SampleFormat::F32 => device
            .build_input_stream(
                stream_config,
                move |data: &[f32], _| {
                    let ints = pcm::aus_f32(data);
                    let geschrieben = producer.push_slice(&ints);
                    if geschrieben < ints.len() {
                        warn!("Capture Ring-Buffer voll");
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| AudioError::StreamFehler(e.to_string())),
        other => Err(AudioError::StreamFehler(format!(
            "Nicht unterstuetztes Sample-Format: {other:?}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Capture-Engine
// ---------------------------------------------------------------------------

struct EngineInnen {
    aktiv: AtomicBool,
    sequenz: AtomicU64,
    frame_samples: usize,
    frame_tx: Sender<AudioFrame>,
    events: EventBus,
    mitschnitt: Mutex<MitschnittPuffer>,
    rest: Mutex<Vec<i16>>,
}

impl EngineInnen {
    /// Baut aus eingehenden Sample-Bloecken Frames fester Groesse
    fn verarbeiten(&self, data: &[i16]) {
        let mut rest = self.rest.lock();
        rest.extend_from_slice(data);
        while rest.len() >= self.frame_samples {
            let samples: Vec<i16> = rest.drain(..self.frame_samples).collect();
            let sequenz = self.sequenz.fetch_add(1, Ordering::Relaxed);
            let frame = AudioFrame::neu(samples, sequenz);

            self.events.senden(ChatterboxEvent::AudioPegel { rms: frame.pegel });
            self.mitschnitt.lock().aufnehmen(frame.clone());

            if self.frame_tx.try_send(frame).is_err() {
                warn!(sequenz, "Frame-Kanal voll, Frame verworfen");
            }
        }
    }
}

/// Steuert die Mikrofon-Aufnahme und produziert [`AudioFrame`]s
///
/// `starten` ist idempotent und setzt die Sequenznummer bei jedem
/// echten Neustart auf 0 zurueck. Solange die KI spricht, haelt der
/// Protokoll-Handler die Engine an (Rueckkopplungsschutz).
pub struct CaptureEngine {
    innen: Arc<EngineInnen>,
    quelle: Mutex<Box<dyn AufnahmeQuelle>>,
}

impl CaptureEngine {
    /// Erstellt die Engine; der Receiver liefert die fertigen Frames
    pub fn neu(
        quelle: Box<dyn AufnahmeQuelle>,
        frame_samples: usize,
        events: EventBus,
    ) -> (Self, Receiver<AudioFrame>) {
        let (frame_tx, frame_rx) = bounded(64);
        let innen = Arc::new(EngineInnen {
            aktiv: AtomicBool::new(false),
            sequenz: AtomicU64::new(0),
            frame_samples,
            frame_tx,
            events,
            mitschnitt: Mutex::new(MitschnittPuffer::standard()),
            rest: Mutex::new(Vec::new()),
        });
        (
            Self {
                innen,
                quelle: Mutex::new(quelle),
            },
            frame_rx,
        )
    }

    /// Startet die Aufnahme; bei bereits aktiver Engine nur ein
    /// Sicherstellen dass die Quelle laeuft
    pub fn starten(&self) -> AudioResult<()> {
        let mut quelle = self.quelle.lock();
        if self.innen.aktiv.load(Ordering::SeqCst) {
            if !quelle.laeuft() {
                quelle.starten(self.senke())?;
            }
            return Ok(());
        }

        self.innen.sequenz.store(0, Ordering::SeqCst);
        self.innen.rest.lock().clear();
        quelle.starten(self.senke())?;
        self.innen.aktiv.store(true, Ordering::SeqCst);
        info!("Capture-Engine aktiv");
        Ok(())
    }

    /// Stoppt die Aufnahme (idempotent)
    pub fn stoppen(&self) {
        self.quelle.lock().stoppen();
        if self.innen.aktiv.swap(false, Ordering::SeqCst) {
            self.innen.rest.lock().clear();
            info!("Capture-Engine angehalten");
        }
    }

    pub fn ist_aktiv(&self) -> bool {
        self.innen.aktiv.load(Ordering::SeqCst)
    }

    /// Groesse des diagnostischen Mitschnitts in Bytes
    pub fn mitschnitt_bytes(&self) -> usize {
        self.innen.mitschnitt.lock().byte_laenge()
    }

    fn senke(&self) -> SampleSenke {
        let innen = Arc::clone(&self.innen);
        Box::new(move |data: &[i16]| innen.verarbeiten(data))
    }
}
