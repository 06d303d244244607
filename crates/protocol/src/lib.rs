//! Chatterbox Protocol - Drahtformat der Realtime-Session
//!
//! Definiert die ein- und ausgehenden JSON-Nachrichten, die
//! Session-Konfiguration, die PCM16/Base64-Hilfsfunktionen und die
//! Transport-Schnittstelle zwischen Session-Logik und WebSocket.

pub mod pcm;
pub mod realtime;
pub mod transport;

pub use realtime::{
    AusgehendeNachricht, EingehendesEreignis, ResponseAbschluss, SessionKonfiguration,
};
pub use transport::{SessionTransport, TransportEreignis};
