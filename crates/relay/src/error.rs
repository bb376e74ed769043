//! Fehlertypen fuer das Relay

use cryptr_crypto::CryptoError;
use cryptr_protocol::ProtokollFehler;
use thiserror::Error;

/// Fehlertyp fuer Registry, Dispatcher und Verbindungen
#[derive(Debug, Error)]
pub enum RelayError {
    /// Envelope konnte nicht dekodiert werden
    #[error("Ungueltiges Envelope: {0}")]
    Envelope(#[from] ProtokollFehler),

    /// Protokollfehler (falscher Typ, falscher Absender, falscher Zustand)
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Unicast-Ziel ist nicht registriert oder nicht verbunden
    #[error("Unbekanntes Ziel: {ziel}")]
    Routing { ziel: String },

    /// Ableitung, Ver- oder Entschluesselung fehlgeschlagen
    #[error("Kryptofehler: {0}")]
    Krypto(#[from] CryptoError),

    /// Registrierung abgelehnt
    #[error("Registrierung abgelehnt: {0}")]
    Registrierung(String),

    /// Send-Queue des Empfaengers blieb laenger als `send_timeout` voll
    #[error("Timeout")]
    Timeout,

    /// Send-Queue des Empfaengers ist geschlossen
    #[error("Verbindung getrennt")]
    VerbindungGetrennt,
}

impl RelayError {
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }

    pub fn registrierung(msg: impl Into<String>) -> Self {
        Self::Registrierung(msg.into())
    }

    /// `true` fuer fehlgeschlagene Tag-Pruefungen (zaehlt gegen `max_auth_fehler`)
    pub fn ist_auth_fehler(&self) -> bool {
        matches!(self, Self::Krypto(CryptoError::Authentifizierung(_)))
    }
}

/// Result-Typ fuer das Relay
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nur_tag_fehler_zaehlen_als_auth_fehler() {
        let tag = RelayError::from(CryptoError::Authentifizierung("Tag".into()));
        assert!(tag.ist_auth_fehler());

        let ableitung = RelayError::from(CryptoError::Ableitung {
            minimum: 48,
            erhalten: 8,
        });
        assert!(!ableitung.ist_auth_fehler());
        assert!(!RelayError::registrierung("Nachweis abgelaufen").ist_auth_fehler());
        assert!(!RelayError::Timeout.ist_auth_fehler());
    }
}
