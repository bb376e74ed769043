//! Authentisierte Verschluesselung (AES-GCM)
//!
//! Ausgabeformat: `[nonce: 12 Bytes][ciphertext + tag: 16 Bytes]`
//!
//! Die Variante richtet sich nach der Schluessellaenge:
//! 16 Bytes -> AES-128-GCM, 24 Bytes -> AES-192-GCM, 32 Bytes -> AES-256-GCM.
//! Jeder Aufruf von `encrypt` erzeugt eine frische Zufalls-Nonce.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit, Nonce};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

/// Nonce-Laenge in Bytes (96 Bit)
pub const NONCE_LAENGE: usize = 12;

/// Laenge des GCM-Authentifizierungs-Tags
const TAG_LAENGE: usize = 16;

type Aes192Gcm = AesGcm<aes_gcm::aes::Aes192, U12>;

/// Verschluesselt `klartext` mit `schluessel`
///
/// # Fehler
/// - `UngueltigeSchluesselLaenge` wenn der Schluessel nicht 16, 24 oder 32 Bytes hat
/// - `Zufall` wenn keine Nonce erzeugt werden kann
pub fn encrypt(klartext: &[u8], schluessel: &[u8]) -> CryptoResult<Vec<u8>> {
    match schluessel.len() {
        16 => versiegeln::<Aes128Gcm>(klartext, schluessel),
        24 => versiegeln::<Aes192Gcm>(klartext, schluessel),
        32 => versiegeln::<Aes256Gcm>(klartext, schluessel),
        andere => Err(CryptoError::UngueltigeSchluesselLaenge(andere)),
    }
}

/// Entschluesselt `nonce || ciphertext` mit `schluessel`
///
/// # Fehler
/// - `UngueltigeSchluesselLaenge` wenn der Schluessel nicht 16, 24 oder 32 Bytes hat
/// - `Authentifizierung` wenn die Daten zu kurz, manipuliert oder mit einem
///   anderen Schluessel verschluesselt sind
pub fn decrypt(daten: &[u8], schluessel: &[u8]) -> CryptoResult<Vec<u8>> {
    match schluessel.len() {
        16 => oeffnen::<Aes128Gcm>(daten, schluessel),
        24 => oeffnen::<Aes192Gcm>(daten, schluessel),
        32 => oeffnen::<Aes256Gcm>(daten, schluessel),
        andere => Err(CryptoError::UngueltigeSchluesselLaenge(andere)),
    }
}

fn versiegeln<C: Aead + KeyInit>(klartext: &[u8], schluessel: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = C::new_from_slice(schluessel)
        .map_err(|_| CryptoError::UngueltigeSchluesselLaenge(schluessel.len()))?;

    let mut nonce_bytes = [0u8; NONCE_LAENGE];
    OsRng
        .try_fill_bytes(&mut nonce_bytes)
        .map_err(|e| CryptoError::Zufall(e.to_string()))?;
    let nonce = Nonce::<C>::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, klartext)
        .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;

    let mut ausgabe = Vec::with_capacity(NONCE_LAENGE + ciphertext.len());
    ausgabe.extend_from_slice(&nonce_bytes);
    ausgabe.extend_from_slice(&ciphertext);
    Ok(ausgabe)
}

fn oeffnen<C: Aead + KeyInit>(daten: &[u8], schluessel: &[u8]) -> CryptoResult<Vec<u8>> {
    if daten.len() < NONCE_LAENGE + TAG_LAENGE {
        return Err(CryptoError::Authentifizierung(format!(
            "Daten zu kurz: {} Bytes",
            daten.len()
        )));
    }

    let cipher = C::new_from_slice(schluessel)
        .map_err(|_| CryptoError::UngueltigeSchluesselLaenge(schluessel.len()))?;

    let (nonce_bytes, ciphertext) = daten.split_at(NONCE_LAENGE);
    let nonce = Nonce::<C>::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CryptoError::Authentifizierung("Tag-Pruefung fehlgeschlagen".into()))
}
