//! Fehlertypen fuer die Client-Bibliothek

use cryptr_core::ClientIdFehler;
use cryptr_crypto::CryptoError;
use cryptr_protocol::ProtokollFehler;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ungueltiges Envelope: {0}")]
    Envelope(#[from] ProtokollFehler),

    #[error("Kryptofehler: {0}")]
    Krypto(#[from] CryptoError),

    #[error("Ungueltige ClientId: {0}")]
    ClientId(#[from] ClientIdFehler),

    /// Unerwartete Nachricht vom Server
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Senden vor `identitaet_anfordern` oder `anmelden`
    #[error("Keine Identitaet - zuerst anfordern oder anmelden")]
    KeineIdentitaet,

    #[error("Verbindung vom Server getrennt")]
    VerbindungGetrennt,

    /// Wiederanmeldung blieb unbeantwortet (Identitaet unbekannt oder
    /// Nachweis abgelehnt)
    #[error("Anmeldung vom Relay nicht bestaetigt")]
    NichtBestaetigt,

    #[error("Profil nicht lesbar: {0}")]
    ProfilLesen(#[from] toml::de::Error),

    #[error("Profil nicht schreibbar: {0}")]
    ProfilSchreiben(#[from] toml::ser::Error),
}

pub type ClientResult<T> = Result<T, ClientError>;
