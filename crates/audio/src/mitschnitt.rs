//! Diagnostischer Mitschnitt-Puffer
//!
//! Haelt die juengsten Aufnahme-Frames bis zu einer Byte-Obergrenze
//! vor (drop-oldest). Rein diagnostisch: der Uplink liest nie aus
//! diesem Puffer.

use std::collections::VecDeque;

use tracing::warn;

use crate::frame::AudioFrame;

/// Obergrenze fuer ein einzelnes Frame
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;
/// Obergrenze fuer den gesamten Puffer
pub const MAX_GESAMT_BYTES: usize = 10 * 1024 * 1024;

/// Bounded Ringpuffer der letzten Aufnahme-Frames
pub struct MitschnittPuffer {
    frames: VecDeque<AudioFrame>,
    bytes: usize,
    max_frame_bytes: usize,
    max_gesamt_bytes: usize,
}

impl MitschnittPuffer {
    pub fn neu(max_frame_bytes: usize, max_gesamt_bytes: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            bytes: 0,
            max_frame_bytes,
            max_gesamt_bytes,
        }
    }

    pub fn standard() -> Self {
        Self::neu(MAX_FRAME_BYTES, MAX_GESAMT_BYTES)
    }

    /// Nimmt ein Frame auf; verdraengt die aeltesten bei Platzmangel
    pub fn aufnehmen(&mut self, frame: AudioFrame) {
        let groesse = frame.byte_laenge();
        if groesse > self.max_frame_bytes {
            warn!(
                bytes = groesse,
                "Frame uebersteigt Mitschnitt-Limit, uebersprungen"
            );
            return;
        }
        while self.bytes + groesse > self.max_gesamt_bytes {
            match self.frames.pop_front() {
                Some(alt) => self.bytes -= alt.byte_laenge(),
                None => break,
            }
        }
        self.bytes += groesse;
        self.frames.push_back(frame);
    }

    pub fn leeren(&mut self) {
        self.frames.clear();
        self.bytes = 0;
    }

    pub fn byte_laenge(&self) -> usize {
        self.bytes
    }

    pub fn frame_anzahl(&self) -> usize {
        self.frames.len()
    }

    /// Aelteste noch vorgehaltene Sequenznummer
    pub fn aelteste_sequenz(&self) -> Option<u64> {
        self.frames.front().map(|f| f.sequenz)
    }
}

impl Default for MitschnittPuffer {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(sequenz: u64, samples: usize) -> AudioFrame {
        AudioFrame::neu(vec![0; samples], sequenz)
    }

    #[test]
    fn haelt_byte_obergrenze_ein() {
        // 10 Frames je 100 Bytes, Limit 450 Bytes
        let mut p = MitschnittPuffer::neu(1000, 450);
        for i in 0..10 {
            p.aufnehmen(frame(i, 50));
        }
        assert!(p.byte_laenge() <= 450);
        assert_eq!(p.frame_anzahl(), 4);
        // Die aeltesten wurden verdraengt
        assert_eq!(p.aelteste_sequenz(), Some(6));
    }

    #[test]
    fn uebergrosses_frame_wird_uebersprungen() {
        let mut p = MitschnittPuffer::neu(100, 1000);
        p.aufnehmen(frame(0, 51)); // 102 Bytes > 100
        assert_eq!(p.frame_anzahl(), 0);
        p.aufnehmen(frame(1, 50)); // 100 Bytes, passt
        assert_eq!(p.frame_anzahl(), 1);
    }

    #[test]
    fn leeren_setzt_zurueck() {
        let mut p = MitschnittPuffer::standard();
        p.aufnehmen(frame(0, 480));
        p.leeren();
        assert_eq!(p.frame_anzahl(), 0);
        assert_eq!(p.byte_laenge(), 0);
    }
}
