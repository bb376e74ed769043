//! cryptr-client – Client-Bibliothek fuer das Relay
//!
//! Holt eine Identitaet (in-band oder per HTTP-Bootstrap), leitet das
//! Secret lokal ab und sendet/empfaengt verschluesselte Envelopes ueber TCP.
//! Das Secret wird nie uebertragen und nie gespeichert.
//!
//! Das Binary `cryptr-client` ist ein Zeilen-Chat auf dieser Bibliothek.

pub mod client;
pub mod error;
pub mod identitaet;
pub mod konsole;
pub mod profil;
pub mod sitzung;

pub use client::{Nachricht, RelayClient};
pub use error::{ClientError, ClientResult};
pub use identitaet::Identitaet;
pub use konsole::{anzeige, Eingabe};
pub use profil::ClientProfil;
pub use sitzung::sitzung_oeffnen;
