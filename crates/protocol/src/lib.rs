//! cryptr-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert das binaere Envelope, das zwischen Client und
//! Relay ausgetauscht wird, sowie die Rahmung fuer TCP-Verbindungen.
//! Ueber WebSocket traegt jede Binaernachricht genau ein Envelope ohne
//! Laengen-Praefix.

pub mod envelope;
pub mod wire;

pub use envelope::{
    besitznachweis_klartext, Envelope, NachrichtenTyp, ProtokollFehler, ProtokollResult,
    Quittung, ZustellStatus,
};
pub use wire::{
    frame_lesen, frame_schreiben, FrameCodec, LAENGEN_PRAEFIX, STANDARD_MAX_FRAME_GROESSE,
};
