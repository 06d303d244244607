//! Chatterbox Session - Verbindung zur Realtime-API
//!
//! WebSocket-Transport, der Protokoll-Handler fuer die Server-Events,
//! abbrechbare Zeitplan-Aufgaben (Wiederverbindung, Nachlauf) und der
//! Session-Client, der Aufnahme, Uplink, Wiedergabe und Zustand
//! zusammensteckt.

pub mod client;
pub mod error;
pub mod handler;
pub mod verbindung;
pub mod zeitplan;

pub use client::{ClientConfig, SitzungsClient};
pub use error::{SessionError, SessionResult};
pub use handler::ProtokollHandler;
pub use verbindung::{TransportHalter, WebSocketVerbindung, WsConfig};
pub use zeitplan::VerzoegerteAufgabe;
