//! Audio-Geraete-Auswahl
//!
//! Laedt das gewuenschte Ein- bzw. Ausgabegeraet; ohne Namensangabe
//! wird das Systemstandard-Geraet verwendet.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;

use crate::error::{AudioError, AudioResult};

/// Laedt ein cpal-Eingabegeraet anhand des Namens (None = Standard)
pub fn eingabegeraet_laden(name: Option<&str>) -> AudioResult<Device> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_input_device()
            .ok_or(AudioError::KeinStandardEingabegeraet),
        Some(n) => {
            let devices = host
                .input_devices()
                .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
            for device in devices {
                if let Ok(dev_name) = device.name() {
                    if dev_name.contains(n) {
                        return Ok(device);
                    }
                }
            }
            Err(AudioError::GeraetNichtGefunden(n.to_string()))
        }
    }
}

/// Laedt ein cpal-Ausgabegeraet anhand des Namens (None = Standard)
pub fn ausgabegeraet_laden(name: Option<&str>) -> AudioResult<Device> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_output_device()
            .ok_or(AudioError::KeinStandardAusgabegeraet),
        Some(n) => {
            let devices = host
                .output_devices()
                .map_err(|e| AudioError::StreamFehler(e.to_string()))?;
            for device in devices {
                if let Ok(dev_name) = device.name() {
                    if dev_name.contains(n) {
                        return Ok(device);
                    }
                }
            }
            Err(AudioError::GeraetNichtGefunden(n.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore = "Benoetigt Audio-Hardware"]
    fn standard_eingabegeraet_ladbar() {
        let geraet = eingabegeraet_laden(None);
        assert!(geraet.is_ok(), "Standard-Eingabegeraet erwartet");
    }

    #[test]
    #[ignore = "Benoetigt Audio-Hardware"]
    fn unbekannter_name_ist_fehler() {
        let geraet = eingabegeraet_laden(Some("gibt-es-sicher-nicht-xyz"));
        assert!(matches!(geraet, Err(AudioError::GeraetNichtGefunden(_))));
    }
}
