//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;

/// Fehler im Kryptografie-Subsystem
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Ungueltige Seed-Konfiguration oder fehlende Zufallsquelle beim Start
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    /// Seed zu kurz fuer die Fensterauswahl
    #[error("Ableitung fehlgeschlagen: Seed hat {erhalten} Bytes, benoetigt mindestens {minimum}")]
    Ableitung { minimum: usize, erhalten: usize },

    #[error("Ungueltige Schluessel-Laenge: {0} Bytes (erlaubt: 16, 24, 32)")]
    UngueltigeSchluesselLaenge(usize),

    #[error("Zufallsquelle nicht verfuegbar: {0}")]
    Zufall(String),

    /// Auth-Tag ungueltig oder Ciphertext kuerzer als die Nonce
    #[error("Authentifizierung fehlgeschlagen: {0}")]
    Authentifizierung(String),

    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Verschluesselung(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
