//! PCM16-Hilfsfunktionen
//!
//! Das gesamte Drahtformat ist Mono-PCM16 Little-Endian, Base64-kodiert.
//! Verstaerkung saettigt am i16-Wertebereich statt zu ueberlaufen; die
//! i16/f32-Konvertierung teilt bzw. multipliziert symmetrisch mit 32768.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use chatterbox_core::{ChatterboxError, Result};

/// Kodiert PCM16-Samples als Base64 (Little-Endian Bytefolge)
pub fn nach_base64(samples: &[i16]) -> String {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        bytes.extend_from_slice(&s.to_le_bytes());
    }
    BASE64.encode(bytes)
}

/// Dekodiert Base64 zu PCM16-Samples
///
/// Ungueltiges Base64 oder eine ungerade Byteanzahl ist ein
/// Dekodierfehler; das Fragment wird vom Aufrufer verworfen.
pub fn aus_base64(payload: &str) -> Result<Vec<i16>> {
    let bytes = BASE64
        .decode(payload)
        .map_err(|e| ChatterboxError::Dekodierung(format!("Base64: {e}")))?;
    if bytes.len() % 2 != 0 {
        return Err(ChatterboxError::Dekodierung(format!(
            "ungerade PCM16-Bytelaenge: {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect())
}

/// Verstaerkt Samples in-place mit Saettigung am i16-Bereich
pub fn verstaerken(samples: &mut [i16], faktor: f32) {
    for s in samples.iter_mut() {
        let v = (*s as f32 * faktor).clamp(i16::MIN as f32, i16::MAX as f32);
        *s = v as i16;
    }
}

/// PCM16 -> f32 im Bereich [-1.0, 1.0)
pub fn nach_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// f32 -> PCM16 mit Saettigung
pub fn aus_f32(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Effektivwert eines Frames, normiert auf [0.0, 1.0]
pub fn pegel_rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let summe: f64 = samples
        .iter()
        .map(|&s| {
            let n = s as f64 / 32768.0;
            n * n
        })
        .sum();
    ((summe / samples.len() as f64).sqrt() as f32).clamp(0.0, 1.0)
}
