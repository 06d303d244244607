//! Chatterbox Core - gemeinsame Typen fuer alle Crates
//!
//! Enthaelt den zentralen Fehlertyp, die Gespraechs- und
//! Verbindungszustaende, den typisierten Event-Bus und die
//! Zustandsmaschine fuer den Gespraechsablauf.

pub mod error;
pub mod event;
pub mod types;
pub mod zustand;

pub use error::{ChatterboxError, Result};
pub use event::{ChatterboxEvent, EventBus};
pub use types::{Gespraechszustand, Verbindungsstatus, ABTASTRATE_HZ, KANAELE};
pub use zustand::Zustandsmaschine;
