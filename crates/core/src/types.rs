//! Identifikationstypen fuer cryptr
//!
//! Eine `ClientId` ist ein zufaelliger Byte-String (16–24 Bytes). Nach aussen
//! (HTTP, Logs, Registry-Schluessel) wird sie als Hex-Token dargestellt.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fehler beim Parsen einer `ClientId`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientIdFehler {
    #[error("Ungueltige ClientId-Laenge: {0} Bytes (erlaubt: 16–24)")]
    Laenge(usize),

    #[error("Ungueltiges Hex-Token: {0}")]
    Hex(String),
}

/// Eindeutige Client-Identitaet
///
/// Wird vom Server zufaellig erzeugt. Clone ist guenstig genug fuer
/// Registry-Schnappschuesse (max. 24 Bytes).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(Vec<u8>);

impl ClientId {
    /// Minimale Laenge in Bytes
    pub const MIN_LAENGE: usize = 16;
    /// Maximale Laenge in Bytes
    pub const MAX_LAENGE: usize = 24;
    /// Laenge der vom Server erzeugten IDs
    pub const STANDARD_LAENGE: usize = 24;

    /// Erstellt eine `ClientId` aus rohen Bytes
    pub fn aus_bytes(bytes: &[u8]) -> Result<Self, ClientIdFehler> {
        if !(Self::MIN_LAENGE..=Self::MAX_LAENGE).contains(&bytes.len()) {
            return Err(ClientIdFehler::Laenge(bytes.len()));
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Parst ein Hex-Token (Gross-/Kleinschreibung egal)
    pub fn aus_hex(token: &str) -> Result<Self, ClientIdFehler> {
        let bytes = hex::decode(token.trim()).map_err(|e| ClientIdFehler::Hex(e.to_string()))?;
        Self::aus_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Hex-Darstellung (Kleinbuchstaben)
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClientId({})", self.to_hex())
    }
}

impl TryFrom<String> for ClientId {
    type Error = ClientIdFehler;

    fn try_from(token: String) -> Result<Self, Self::Error> {
        Self::aus_hex(&token)
    }
}

impl From<ClientId> for String {
    fn from(id: ClientId) -> Self {
        id.to_hex()
    }
}

/// Aktuelle Unix-Zeit in Millisekunden (UTC)
pub fn jetzt_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
