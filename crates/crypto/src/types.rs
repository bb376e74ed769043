//! Gemeinsame Typen fuer das Kryptografie-Subsystem

use crate::derivation::SECRET_LAENGE;
use crate::error::{CryptoError, CryptoResult};

/// Abgeleitetes 32-Byte Client-Secret (wird beim Drop genullt)
///
/// Verlaesst nie den Prozess: Server und Client berechnen es jeweils lokal.
#[derive(Clone)]
pub struct ClientSecret([u8; SECRET_LAENGE]);

impl ClientSecret {
    pub fn aus_array(bytes: [u8; SECRET_LAENGE]) -> Self {
        Self(bytes)
    }

    /// Erstellt ein Secret aus einem Slice, das exakt 32 Bytes lang sein muss
    pub fn aus_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let array: [u8; SECRET_LAENGE] = bytes
            .try_into()
            .map_err(|_| CryptoError::UngueltigeSchluesselLaenge(bytes.len()))?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq for ClientSecret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for ClientSecret {}

impl Drop for ClientSecret {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClientSecret([REDACTED] {} bytes)", self.0.len())
    }
}
