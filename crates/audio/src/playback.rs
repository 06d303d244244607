//! Wiedergabe der synthetisierten Antwort
//!
//! Antwort-Fragmente (Base64-PCM16) landen in einer beschraenkten
//! Warteschlange; ein Worker-Thread dekodiert, verstaerkt und schreibt
//! genau ein Fragment auf einmal in die Senke, damit die Wiedergabe
//! lueckenlos und in Reihenfolge bleibt. Die Hardware haengt hinter dem
//! Trait [`WiedergabeSenke`]; die cpal-Senke besteht aus Ring-Buffer
//! und einem Thread, dem der Output-Stream gehoert.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Sender};
use parking_lot::{Condvar, Mutex};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use tracing::{debug, error, info, warn};

use chatterbox_core::{ChatterboxEvent, EventBus, ABTASTRATE_HZ, KANAELE};
use chatterbox_protocol::pcm;

use crate::error::{AudioError, AudioResult};
use crate::geraet;

/// Konfiguration von Wiedergabe-Senke und -Planer
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Abtastrate in Hz
    pub abtastrate: u32,
    /// Kanalanzahl
    pub kanaele: u16,
    /// Ring-Buffer Kapazitaet in Samples
    pub ring_kapazitaet: usize,
    /// Geraetename (None = Standard)
    pub geraet: Option<String>,
    /// Oeffnungsversuche bevor das Geraet als nicht verfuegbar gilt
    pub versuche: u32,
    /// Obergrenze wartender Fragmente (drop-oldest)
    pub max_fragmente: usize,
    /// Verstaerkungsfaktor, saettigend
    pub verstaerkung: f32,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            abtastrate: ABTASTRATE_HZ,
            kanaele: KANAELE,
            ring_kapazitaet: ABTASTRATE_HZ as usize * 2, // 2 Sekunden
            geraet: None,
            versuche: 3,
            max_fragmente: 256,
            verstaerkung: 2.0,
        }
    }
}

/// Ein empfangenes Antwort-Fragment
#[derive(Debug, Clone, PartialEq)]
pub struct DownlinkFragment {
    /// Laufende Nummer innerhalb der Antwort
    pub index: u64,
    /// Base64-kodiertes PCM16
    pub payload: String,
}

/// Abspielseite des Audio-Pfads
pub trait WiedergabeSenke: Send {
    /// Schreibt Samples; gibt zurueck wie viele uebernommen wurden
    fn schreiben(&mut self, samples: &[f32]) -> usize;
    /// Samples die geschrieben aber noch nicht abgespielt sind
    fn ausstehend(&self) -> usize;
    fn pausieren(&mut self);
    fn fortsetzen(&mut self);
    /// Verwirft alles noch nicht Abgespielte
    fn leeren(&mut self);
}

// ---------------------------------------------------------------------------
// cpal-Implementierung
// ---------------------------------------------------------------------------

enum SenkenKommando {
    Pausieren,
    Fortsetzen,
    Beenden,
}

/// Lautsprecher-Ausgabe via cpal
pub struct CpalWiedergabe {
    producer: HeapProd<f32>,
    kommando_tx: Sender<SenkenKommando>,
    leeren_flag: Arc<AtomicBool>,
}

impl CpalWiedergabe {
    /// Oeffnet das Ausgabegeraet; der Stream lebt in einem eigenen Thread
    pub fn neu(config: &PlaybackConfig) -> AudioResult<Self> {
        let config = config.clone();
        let leeren_flag = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&leeren_flag);
        let (kommando_tx, kommando_rx) = bounded::<SenkenKommando>(8);
        let (bereit_tx, bereit_rx) = bounded::<AudioResult<HeapProd<f32>>>(1);

        std::thread::Builder::new()
            .name("chatterbox-playback".to_string())
            .spawn(move || {
                let stream_config = StreamConfig {
                    channels: config.kanaele,
                    sample_rate: cpal::SampleRate(config.abtastrate),
                    buffer_size: cpal::BufferSize::Default,
                };

                let mut letzter_fehler = String::new();
                let mut geoeffnet = None;
                for versuch in 1..=config.versuche.max(1) {
                    match ausgabestream_oeffnen(&config, &stream_config, Arc::clone(&flag)) {
                        Ok(x) => {
                            debug!(versuch, "Ausgabestream geoeffnet");
                            geoeffnet = Some(x);
                            break;
                        }
                        Err(e) => {
                            letzter_fehler = e.to_string();
                            warn!(versuch, fehler = %letzter_fehler, "Ausgabestream-Versuch fehlgeschlagen");
                            std::thread::sleep(Duration::from_millis(100));
                        }
                    }
                }

                let (stream, producer) = match geoeffnet {
                    Some(x) => x,
                    None => {
                        let _ = bereit_tx.send(Err(AudioError::GeraetNichtVerfuegbar(
                            letzter_fehler,
                        )));
                        return;
                    }
                };
                let _ = bereit_tx.send(Ok(producer));

                loop {
                    match kommando_rx.recv() {
                        Ok(SenkenKommando::Pausieren) => {
                            if let Err(e) = stream.pause() {
                                warn!(fehler = %e, "Stream-Pause nicht moeglich");
                            }
                        }
                        Ok(SenkenKommando::Fortsetzen) => {
                            if let Err(e) = stream.play() {
                                warn!(fehler = %e, "Stream-Fortsetzung nicht moeglich");
                            }
                        }
                        Ok(SenkenKommando::Beenden) | Err(_) => break,
                    }
                }
                drop(stream);
                debug!("Playback-Thread beendet");
            })
            .map_err(|e| AudioError::WorkerFehler(e.to_string()))?;

        let producer = bereit_rx
            .recv_timeout(Duration::from_secs(5))
            .map_err(|_| {
                AudioError::GeraetNichtVerfuegbar("Zeitlimit beim Oeffnen des Ausgabegeraets".to_string())
            })??;

        info!("Lautsprecher-Ausgabe bereit");
        Ok(Self {
            producer,
            kommando_tx,
            leeren_flag,
        })
    }
}

impl WiedergabeSenke for CpalWiedergabe {
    fn schreiben(&mut self, samples: &[f32]) -> usize {
        self.producer.push_slice(samples)
    }

    fn ausstehend(&self) -> usize {
        self.producer.occupied_len()
    }

    fn pausieren(&mut self) {
        let _ = self.kommando_tx.send(SenkenKommando::Pausieren);
    }

    fn fortsetzen(&mut self) {
        let _ = self.kommando_tx.send(SenkenKommando::Fortsetzen);
    }

    fn leeren(&mut self) {
        // Der Callback raeumt beim naechsten Durchlauf
        self.leeren_flag.store(true, Ordering::SeqCst);
    }
}

impl Drop for CpalWiedergabe {
    fn drop(&mut self) {
        let _ = self.kommando_tx.send(SenkenKommando::Beenden);
    }
}

fn ausgabestream_oeffnen(
    config: &PlaybackConfig,
    stream_config: &StreamConfig,
    leeren_flag: Arc<AtomicBool>,
) -> AudioResult<(cpal::Stream, HeapProd<f32>)> {
    let device = geraet::ausgabegeraet_laden(config.geraet.as_deref())?;

    let supported = device
        .supported_output_configs()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?
        .find(|c| {
            c.min_sample_rate().0 <= config.abtastrate
                && c.max_sample_rate().0 >= config.abtastrate
                && c.channels() >= config.kanaele
        });
    let sample_format = supported
        .map(|c| c.sample_format())
        .unwrap_or(SampleFormat::F32);
    if sample_format != SampleFormat::F32 {
        return Err(AudioError::StreamFehler(format!(
            "Nicht unterstuetztes Sample-Format: {sample_format:?}"
        )));
    }

    let rb = HeapRb::<f32>::new(config.ring_kapazitaet);
    let (producer, mut consumer) = rb.split();

    let err_fn = |err| error!("Playback-Fehler: {}", err);
    let stream = device
        .build_output_stream(
            stream_config,
            move |data: &mut [f32], _| {
                if leeren_flag.swap(false, Ordering::SeqCst) {
                    consumer.clear();
                }
                let n = consumer.pop_slice(data);
                // Rest mit Stille fuellen
                for s in &mut data[n..] {
                    *s = 0.0;
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    stream
        .play()
        .map_err(|e| AudioError::StreamFehler(e.to_string()))?;

    Ok((stream, producer))
}

// ---------------------------------------------------------------------------
// Wiedergabe-Planer
// ---------------------------------------------------------------------------

struct PlanerInnen {
    config: PlaybackConfig,
    warteschlange: Mutex<VecDeque<DownlinkFragment>>,
    wecker: Condvar,
    senke: Mutex<Box<dyn WiedergabeSenke>>,
    /// Laufende Wiedergabe-Episode (erstes Fragment bis Auslauf)
    spielt: AtomicBool,
    pausiert: AtomicBool,
    beendet: AtomicBool,
    /// Zaehlt jedes stoppen(); ein laufendes Fragment einer alten
    /// Generation bricht ab und wird nicht aus der Queue genommen
    generation: AtomicU64,
    verdraengt: AtomicU64,
    events: EventBus,
}

impl PlanerInnen {
    /// Dekodiert und schreibt ein Fragment vollstaendig in die Senke
    fn abspielen(&self, fragment: &DownlinkFragment, generation: u64) {
        let mut samples = match pcm::aus_base64(&fragment.payload) {
            Ok(s) => s,
            Err(e) => {
                warn!(index = fragment.index, fehler = %e, "Fragment nicht dekodierbar, verworfen");
                return;
            }
        };
        pcm::verstaerken(&mut samples, self.config.verstaerkung);
        let floats = pcm::nach_f32(&samples);

        let mut offset = 0;
        while offset < floats.len() {
            if self.beendet.load(Ordering::SeqCst)
                || self.generation.load(Ordering::SeqCst) != generation
            {
                return;
            }
            if self.pausiert.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
                continue;
            }
            let n = self.senke.lock().schreiben(&floats[offset..]);
            offset += n;
            if n == 0 {
                // Senke voll, auf den Abfluss warten
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }
}

/// Plant die Wiedergabe der Antwort-Fragmente
///
/// Es ist immer hoechstens ein Fragment "in Arbeit"; erst wenn es
/// vollstaendig in der Senke liegt, wird es aus der Warteschlange
/// genommen und das naechste begonnen.
pub struct WiedergabePlaner {
    innen: Arc<PlanerInnen>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WiedergabePlaner {
    pub fn neu(senke: Box<dyn WiedergabeSenke>, config: PlaybackConfig, events: EventBus) -> Self {
        let innen = Arc::new(PlanerInnen {
            config,
            warteschlange: Mutex::new(VecDeque::new()),
            wecker: Condvar::new(),
            senke: Mutex::new(senke),
            spielt: AtomicBool::new(false),
            pausiert: AtomicBool::new(false),
            beendet: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            verdraengt: AtomicU64::new(0),
            events,
        });

        let worker_innen = Arc::clone(&innen);
        let worker = std::thread::Builder::new()
            .name("chatterbox-planer".to_string())
            .spawn(move || worker_schleife(worker_innen))
            .ok();
        if worker.is_none() {
            warn!("Wiedergabe-Worker konnte nicht gestartet werden");
        }

        Self {
            innen,
            worker: Mutex::new(worker),
        }
    }

    /// Reiht ein Fragment ein; bei leerer Warteschlange beginnt die
    /// Wiedergabe unmittelbar
    pub fn einreihen(&self, fragment: DownlinkFragment) {
        self.innen.spielt.store(true, Ordering::SeqCst);

        let mut q = self.innen.warteschlange.lock();
        let mut verdraengt = 0u64;
        while q.len() >= self.innen.config.max_fragmente.max(1) {
            q.pop_front();
            verdraengt += 1;
        }
        if verdraengt > 0 {
            self.innen.verdraengt.fetch_add(verdraengt, Ordering::Relaxed);
            warn!(verdraengt, "Downlink-Warteschlange voll, aelteste Fragmente verworfen");
        }
        q.push_back(fragment);
        drop(q);
        self.innen.wecker.notify_one();
    }

    /// Verwirft alle wartenden Fragmente; das laufende spielt zu Ende
    pub fn leeren(&self) {
        self.innen.warteschlange.lock().clear();
    }

    /// Bricht die Wiedergabe ab und leert Warteschlange und Senke
    pub fn stoppen(&self) {
        {
            let mut q = self.innen.warteschlange.lock();
            self.innen.generation.fetch_add(1, Ordering::SeqCst);
            q.clear();
        }
        self.innen.senke.lock().leeren();
        if self.innen.spielt.swap(false, Ordering::SeqCst) {
            self.innen.events.senden(ChatterboxEvent::WiedergabeGestoppt);
        }
        debug!("Wiedergabe gestoppt");
    }

    pub fn pausieren(&self) {
        self.innen.pausiert.store(true, Ordering::SeqCst);
        self.innen.senke.lock().pausieren();
    }

    pub fn fortsetzen(&self) {
        self.innen.pausiert.store(false, Ordering::SeqCst);
        self.innen.senke.lock().fortsetzen();
        self.innen.wecker.notify_one();
    }

    /// Meldet genau einmal das Ende einer Wiedergabe-Episode
    ///
    /// Wird periodisch vom Session-Client aufgerufen; "zu Ende" heisst:
    /// Episode lief, Warteschlange leer und die Senke ist ausgelaufen.
    pub fn drain_pruefen(&self) -> bool {
        if !self.innen.spielt.load(Ordering::SeqCst) {
            return false;
        }
        if !self.innen.warteschlange.lock().is_empty() {
            return false;
        }
        if self.innen.senke.lock().ausstehend() > 0 {
            return false;
        }
        self.innen.spielt.store(false, Ordering::SeqCst);
        self.innen.events.senden(ChatterboxEvent::WiedergabeBeendet);
        true
    }

    /// Baut den Worker ab; idempotent
    pub fn aufraeumen(&self) {
        if self.innen.beendet.swap(true, Ordering::SeqCst) {
            return;
        }
        self.innen.wecker.notify_one();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
        self.innen.senke.lock().leeren();
        debug!("Wiedergabe-Planer abgebaut");
    }

    pub fn wartend(&self) -> usize {
        self.innen.warteschlange.lock().len()
    }

    pub fn spielt(&self) -> bool {
        self.innen.spielt.load(Ordering::SeqCst)
    }
}

impl Drop for WiedergabePlaner {
    fn drop(&mut self) {
        self.aufraeumen();
    }
}

fn worker_schleife(innen: Arc<PlanerInnen>) {
    loop {
        let (fragment, generation) = {
            let mut q = innen.warteschlange.lock();
            loop {
                if innen.beendet.load(Ordering::SeqCst) {
                    return;
                }
                if !innen.pausiert.load(Ordering::SeqCst) {
                    if let Some(f) = q.front().cloned() {
                        break (f, innen.generation.load(Ordering::SeqCst));
                    }
                }
                innen
                    .wecker
                    .wait_for(&mut q, Duration::from_millis(50));
            }
        };

        innen.abspielen(&fragment, generation);

        let mut q = innen.warteschlange.lock();
        if innen.generation.load(Ordering::SeqCst) != generation {
            // stoppen() kam dazwischen, Warteschlange ist schon geleert
            continue;
        }
        q.pop_front();
    }
}
