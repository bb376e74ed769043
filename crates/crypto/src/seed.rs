//! SeedAuthority – Prozessweiter oeffentlicher Seed
//!
//! Der Seed wird einmal beim Start erzeugt und danach nur noch gelesen.
//! Er ist oeffentlich (`GET /public/identity`), die Vertraulichkeit der
//! Client-Secrets haengt allein an der ClientId und dem Zeitstempel.

use bytes::Bytes;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

/// Minimale Seed-Groesse fuer die Fensterauswahl der Ableitung
pub const MIN_SEED_LAENGE: usize = 48;

/// Standard-Seed-Groesse
pub const STANDARD_SEED_LAENGE: usize = 64;

/// Unveraenderlicher Seed. Clone teilt den Puffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Seed(Bytes);

impl Seed {
    /// Uebernimmt empfangene Seed-Bytes (z.B. aus einer IdentityResponse)
    ///
    /// Die Laenge wird erst bei der Ableitung geprueft.
    pub fn aus_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn aus_hex(text: &str) -> CryptoResult<Self> {
        hex::decode(text.trim())
            .map(Self::aus_bytes)
            .map_err(|e| CryptoError::Konfiguration(format!("Seed ist kein gueltiges Hex: {e}")))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Gibt den geteilten Puffer zurueck (kein Kopieren)
    pub fn bytes(&self) -> Bytes {
        self.0.clone()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Seed({} bytes)", self.0.len())
    }
}

/// Erzeugt einen neuen Seed aus der Zufallsquelle des Betriebssystems
///
/// # Fehler
/// - `Konfiguration` wenn `groesse < MIN_SEED_LAENGE`
/// - `Konfiguration` wenn die Zufallsquelle nicht verfuegbar ist
pub fn generate_seed(groesse: usize) -> CryptoResult<Seed> {
    if groesse < MIN_SEED_LAENGE {
        return Err(CryptoError::Konfiguration(format!(
            "Seed-Groesse {groesse} zu klein (Minimum: {MIN_SEED_LAENGE} Bytes)"
        )));
    }

    let mut bytes = vec![0u8; groesse];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| CryptoError::Konfiguration(format!("Zufallsquelle nicht verfuegbar: {e}")))?;

    tracing::debug!(groesse, "Seed erzeugt");
    Ok(Seed(Bytes::from(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_hat_angeforderte_groesse() {
        let seed = generate_seed(STANDARD_SEED_LAENGE).unwrap();
        assert_eq!(seed.len(), STANDARD_SEED_LAENGE);
    }

    #[test]
    fn minimum_ist_erlaubt() {
        assert!(generate_seed(MIN_SEED_LAENGE).is_ok());
    }

    #[test]
    fn zu_kleiner_seed_ist_konfigurationsfehler() {
        let result = generate_seed(MIN_SEED_LAENGE - 1);
        assert!(matches!(result, Err(CryptoError::Konfiguration(_))));
        assert!(matches!(generate_seed(0), Err(CryptoError::Konfiguration(_))));
    }

    #[test]
    fn zwei_seeds_sind_verschieden() {
        let a = generate_seed(64).unwrap();
        let b = generate_seed(64).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn hex_round_trip() {
        let seed = generate_seed(48).unwrap();
        let wieder = Seed::aus_hex(&seed.to_hex()).unwrap();
        assert_eq!(seed, wieder);
        assert!(Seed::aus_hex("zz").is_err());
    }

    #[test]
    fn debug_zeigt_nur_laenge() {
        let seed = Seed::aus_bytes(vec![7u8; 50]);
        assert_eq!(format!("{seed:?}"), "Seed(50 bytes)");
    }
}
