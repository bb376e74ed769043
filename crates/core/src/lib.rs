//! cryptr-core – Gemeinsame Typen
//!
//! Stellt die Identitaets- und Zeittypen bereit, die von Krypto-, Protokoll-,
//! Relay- und Client-Crate gemeinsam genutzt werden.

pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use types::{jetzt_ms, ClientId, ClientIdFehler};
