//! Chatterbox Audio - Aufnahme- und Wiedergabepfad
//!
//! Capture-Engine (Mikrofon -> Frames), Uplink-Batcher (Frames ->
//! Transport-Nachrichten) und Wiedergabe-Planer (Antwort-Fragmente ->
//! Lautsprecher). Die Hardware haengt hinter den Traits
//! [`AufnahmeQuelle`] und [`WiedergabeSenke`], damit Queue- und
//! Ablauflogik ohne Geraete testbar bleiben.

pub mod capture;
pub mod error;
pub mod frame;
pub mod geraet;
pub mod mitschnitt;
pub mod playback;
pub mod uplink;

pub use capture::{AufnahmeQuelle, CaptureConfig, CaptureEngine, CpalAufnahme, SampleSenke};
pub use error::{AudioError, AudioResult};
pub use frame::AudioFrame;
pub use mitschnitt::MitschnittPuffer;
pub use playback::{
    CpalWiedergabe, DownlinkFragment, PlaybackConfig, WiedergabePlaner, WiedergabeSenke,
};
pub use uplink::{UplinkBatcher, UplinkConfig};
