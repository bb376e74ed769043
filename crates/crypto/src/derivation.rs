//! Deterministische Secret-Ableitung
//!
//! ```text
//! material  = SHA-256(seed || client_id)                 (32 Bytes)
//! bereich   = len(material) - 16                         (16)
//! i_minute  = SHA-256([minute])[0]  % bereich
//! i_sekunde = SHA-256([sekunde])[0] % bereich
//! secret    = material[i_minute..+16] || material[i_sekunde..+16]
//! ```
//!
//! Minute und Sekunde stammen aus dem UTC-Zeitstempel in Millisekunden.
//! Stunde, Tag und Millisekunden gehen nicht ein: zwei Zeitpunkte mit gleicher
//! Minute/Sekunde liefern dasselbe Secret. Das Schema ist schwach und nur fuer
//! Kompatibilitaet mit bestehenden Clients gedacht.

use cryptr_core::ClientId;
use sha2::{Digest, Sha256};

use crate::error::{CryptoError, CryptoResult};
use crate::seed::MIN_SEED_LAENGE;
use crate::types::ClientSecret;

/// Laenge des abgeleiteten Secrets
pub const SECRET_LAENGE: usize = 32;

/// Laenge eines ausgewaehlten Fensters
const FENSTER_LAENGE: usize = 16;

/// Leitet das Client-Secret aus Seed, ClientId und Zeitstempel ab
///
/// # Fehler
/// - `Ableitung` wenn der Seed kuerzer als `MIN_SEED_LAENGE` ist
pub fn derive_secret(
    seed: &[u8],
    client_id: &ClientId,
    zeitstempel_ms: u64,
) -> CryptoResult<ClientSecret> {
    if seed.len() < MIN_SEED_LAENGE {
        return Err(CryptoError::Ableitung {
            minimum: MIN_SEED_LAENGE,
            erhalten: seed.len(),
        });
    }

    let material: [u8; 32] = Sha256::new()
        .chain_update(seed)
        .chain_update(client_id.as_bytes())
        .finalize()
        .into();

    let (minute, sekunde) = minute_und_sekunde(zeitstempel_ms);
    let bereich = material.len() - FENSTER_LAENGE;
    let i_minute = einzelbyte_hash(minute) as usize % bereich;
    let i_sekunde = einzelbyte_hash(sekunde) as usize % bereich;

    // Zwei 16-Byte-Fenster fuellen die 32 Bytes exakt
    let mut secret = [0u8; SECRET_LAENGE];
    secret[..FENSTER_LAENGE].copy_from_slice(&material[i_minute..i_minute + FENSTER_LAENGE]);
    secret[FENSTER_LAENGE..].copy_from_slice(&material[i_sekunde..i_sekunde + FENSTER_LAENGE]);

    Ok(ClientSecret::aus_array(secret))
}

/// Erstes Byte des SHA-256 ueber ein einzelnes Byte
fn einzelbyte_hash(wert: u8) -> u8 {
    Sha256::digest([wert])[0]
}

/// UTC-Minute und -Sekunde eines Unix-Zeitstempels in Millisekunden
fn minute_und_sekunde(zeitstempel_ms: u64) -> (u8, u8) {
    let sekunden = zeitstempel_ms / 1000;
    (((sekunden / 60) % 60) as u8, (sekunden % 60) as u8)
}
