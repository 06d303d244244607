//! Aufnahme-Frame

use chatterbox_protocol::pcm;

/// Ein Block Mono-PCM16-Samples mit Reihenfolge und Pegel
///
/// Die Sequenznummer beginnt bei jedem Aufnahme-Start wieder bei 0.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub sequenz: u64,
    /// Effektivwert, normiert auf [0.0, 1.0]
    pub pegel: f32,
}

impl AudioFrame {
    pub fn neu(samples: Vec<i16>, sequenz: u64) -> Self {
        let pegel = pcm::pegel_rms(&samples);
        Self {
            samples,
            sequenz,
            pegel,
        }
    }

    /// Groesse der Nutzdaten in Bytes (PCM16)
    pub fn byte_laenge(&self) -> usize {
        self.samples.len() * 2
    }
}
