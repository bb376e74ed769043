//! Client-Profil – Persistierte Identitaet
//!
//! Gespeichert werden Server-Adresse, ClientId, Ableitungs-Zeitstempel und
//! Seed. Das Secret wird nie geschrieben, sondern beim Laden neu abgeleitet.
//!
//! ```toml
//! server = "127.0.0.1:9987"
//! client_id = "3f9a..."
//! timestamp_ms = 1704112496789
//! seed_hex = "a1b2..."
//! ```

use cryptr_core::ClientId;
use cryptr_crypto::Seed;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ClientResult;
use crate::identitaet::Identitaet;

/// Dateiname des Profils im Konfigurationsverzeichnis
pub const PROFIL_DATEI: &str = "cryptr.toml";

/// Auf der Platte gespeichertes Profil
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientProfil {
    /// Adresse des TCP-Relays
    pub server: String,
    pub client_id: ClientId,
    pub timestamp_ms: u64,
    pub seed_hex: String,
}

impl ClientProfil {
    pub fn neu(server: impl Into<String>, identitaet: &Identitaet) -> Self {
        Self {
            server: server.into(),
            client_id: identitaet.client_id().clone(),
            timestamp_ms: identitaet.zeitstempel_ms(),
            seed_hex: identitaet.seed().to_hex(),
        }
    }

    /// `<Konfigurationsverzeichnis>/cryptr.toml`, ohne ein solches `./cryptr.toml`
    pub fn standard_pfad() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(PROFIL_DATEI)
    }

    /// Laedt ein Profil aus einer TOML-Datei
    pub fn laden(pfad: impl AsRef<Path>) -> ClientResult<Self> {
        let inhalt = std::fs::read_to_string(pfad.as_ref())?;
        Ok(toml::from_str(&inhalt)?)
    }

    /// Schreibt das Profil als TOML-Datei, fehlende Ordner werden angelegt
    pub fn speichern(&self, pfad: impl AsRef<Path>) -> ClientResult<()> {
        let inhalt = toml::to_string_pretty(self)?;
        if let Some(ordner) = pfad.as_ref().parent() {
            std::fs::create_dir_all(ordner)?;
        }
        std::fs::write(pfad.as_ref(), inhalt)?;
        tracing::debug!(
            pfad = %pfad.as_ref().display(),
            client = %self.client_id,
            "Profil gespeichert"
        );
        Ok(())
    }

    /// Leitet die Identitaet (inkl. Secret) aus dem Profil neu ab
    pub fn identitaet(&self) -> ClientResult<Identitaet> {
        let seed = Seed::aus_hex(&self.seed_hex)?;
        Identitaet::ableiten(self.client_id.clone(), self.timestamp_ms, seed)
    }
}
