//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use cryptr_relay::RelayConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::logging::{log_format_gueltig, log_level_gueltig};

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Seed-Erzeugung beim Start
    pub seed: SeedEinstellungen,
    /// Relay-Verhalten (Queues, Timeouts, Zustellung)
    pub relay: RelayEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    pub bind_adresse: String,
    /// Port des TCP-Relays (laengenpraefixierte Frames)
    pub tcp_port: u16,
    /// Port fuer HTTP-Bootstrap und WebSocket (`/chat`)
    pub http_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            tcp_port: 9987,
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedEinstellungen {
    /// Seed-Laenge in Bytes (mindestens 48)
    pub groesse: usize,
}

impl Default for SeedEinstellungen {
    fn default() -> Self {
        Self {
            groesse: cryptr_crypto::STANDARD_SEED_LAENGE,
        }
    }
}

/// Relay-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayEinstellungen {
    pub send_queue_groesse: usize,
    pub send_timeout_ms: u64,
    pub idle_timeout_sek: u64,
    pub registrierungs_timeout_sek: u64,
    /// Maximale Frame-Groesse in Bytes
    pub max_frame_groesse: usize,
    /// Broadcasts auch an den Absender zustellen
    pub absender_einschliessen: bool,
    pub quittungen_senden: bool,
    pub max_auth_fehler: u32,
    /// Erlaubte Uhrabweichung beim Besitznachweis einer Wiederanmeldung
    pub nachweis_fenster_sek: u64,
    /// Per HTTP erzeugte Identitaeten ohne Verbindung werden danach entfernt
    pub pending_ttl_sek: u64,
    pub pending_pruef_intervall_sek: u64,
}

impl Default for RelayEinstellungen {
    fn default() -> Self {
        let relay = RelayConfig::default();
        Self {
            send_queue_groesse: relay.send_queue_groesse,
            send_timeout_ms: relay.send_timeout.as_millis() as u64,
            idle_timeout_sek: relay.idle_timeout.as_secs(),
            registrierungs_timeout_sek: relay.registrierungs_timeout.as_secs(),
            max_frame_groesse: relay.max_frame_groesse,
            absender_einschliessen: relay.absender_einschliessen,
            quittungen_senden: relay.quittungen_senden,
            max_auth_fehler: relay.max_auth_fehler,
            nachweis_fenster_sek: relay.nachweis_fenster.as_secs(),
            pending_ttl_sek: 600,
            pending_pruef_intervall_sek: 60,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level (trace, debug, info, warn, error)
    pub level: String,
    /// Ausgabeformat: "text" oder "json"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config: Self = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.validieren()?;
        Ok(config)
    }

    /// Prueft Werte, die toml allein nicht abfangen kann
    pub fn validieren(&self) -> anyhow::Result<()> {
        if self.seed.groesse < cryptr_crypto::MIN_SEED_LAENGE {
            anyhow::bail!(
                "seed.groesse muss mindestens {} sein, ist {}",
                cryptr_crypto::MIN_SEED_LAENGE,
                self.seed.groesse
            );
        }
        if self.relay.send_queue_groesse == 0 {
            anyhow::bail!("relay.send_queue_groesse darf nicht 0 sein");
        }
        if self.relay.max_frame_groesse == 0 {
            anyhow::bail!("relay.max_frame_groesse darf nicht 0 sein");
        }
        if self.relay.nachweis_fenster_sek == 0 {
            anyhow::bail!("relay.nachweis_fenster_sek darf nicht 0 sein");
        }
        if self.relay.pending_pruef_intervall_sek == 0 {
            anyhow::bail!("relay.pending_pruef_intervall_sek darf nicht 0 sein");
        }
        if !log_level_gueltig(&self.logging.level) {
            anyhow::bail!("logging.level ungueltig: '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            anyhow::bail!(
                "logging.format muss \"text\" oder \"json\" sein, ist '{}'",
                self.logging.format
            );
        }
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse fuer das TCP-Relay zurueck
    pub fn tcp_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.tcp_port)
    }

    /// Gibt die Bind-Adresse fuer HTTP/WebSocket zurueck
    pub fn http_bind_adresse(&self) -> String {
        format!("{}:{}", self.netzwerk.bind_adresse, self.netzwerk.http_port)
    }

    /// Wandelt die `[relay]`-Sektion in die Laufzeit-Konfiguration um
    pub fn relay_config(&self) -> RelayConfig {
        let r = &self.relay;
        RelayConfig {
            send_queue_groesse: r.send_queue_groesse,
            send_timeout: Duration::from_millis(r.send_timeout_ms),
            idle_timeout: Duration::from_secs(r.idle_timeout_sek),
            registrierungs_timeout: Duration::from_secs(r.registrierungs_timeout_sek),
            max_frame_groesse: r.max_frame_groesse,
            absender_einschliessen: r.absender_einschliessen,
            quittungen_senden: r.quittungen_senden,
            max_auth_fehler: r.max_auth_fehler,
            nachweis_fenster: Duration::from_secs(r.nachweis_fenster_sek),
        }
    }

    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.relay.pending_ttl_sek)
    }

    pub fn pending_pruef_intervall(&self) -> Duration {
        Duration::from_secs(self.relay.pending_pruef_intervall_sek)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ServerConfig::default();
        assert!(cfg.validieren().is_ok());
        assert_eq!(cfg.netzwerk.tcp_port, 9987);
        assert_eq!(cfg.seed.groesse, 64);
        assert_eq!(cfg.relay.send_queue_groesse, 64);
        assert!(!cfg.relay.absender_einschliessen);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn bind_adressen() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.tcp_bind_adresse(), "0.0.0.0:9987");
        assert_eq!(cfg.http_bind_adresse(), "0.0.0.0:8080");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [netzwerk]
            tcp_port = 10000

            [relay]
            send_timeout_ms = 500
            absender_einschliessen = true
        "#;
        let cfg: ServerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.netzwerk.tcp_port, 10000);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.netzwerk.http_port, 8080);

        let relay = cfg.relay_config();
        assert_eq!(relay.send_timeout, Duration::from_millis(500));
        assert!(relay.absender_einschliessen);
        assert_eq!(relay.idle_timeout, Duration::from_secs(300));
    }

    #[test]
    fn relay_config_entspricht_standard() {
        let relay = ServerConfig::default().relay_config();
        let standard = RelayConfig::default();
        assert_eq!(relay.send_timeout, standard.send_timeout);
        assert_eq!(relay.registrierungs_timeout, standard.registrierungs_timeout);
        assert_eq!(relay.max_frame_groesse, standard.max_frame_groesse);
        assert_eq!(relay.max_auth_fehler, standard.max_auth_fehler);
        assert_eq!(relay.nachweis_fenster, standard.nachweis_fenster);
    }

    #[test]
    fn zu_kleiner_seed_wird_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.seed.groesse = 16;
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn ungueltiges_logging_wird_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.logging.level = "cryptr_relay=debug,info".into();
        assert!(cfg.validieren().is_ok());

        cfg.logging.level = "geschwaetzig".into();
        assert!(cfg.validieren().is_err());

        let mut cfg = ServerConfig::default();
        cfg.logging.format = "xml".into();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn nachweis_fenster_null_wird_abgelehnt() {
        let mut cfg = ServerConfig::default();
        cfg.relay.nachweis_fenster_sek = 0;
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn datei_mit_tippfehler_im_level_ist_fehler() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("config.toml");
        std::fs::write(&pfad, "[logging]\nlevel = \"infoo\"\n").unwrap();
        let err = ServerConfig::laden(pfad.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn fehlende_datei_liefert_standardwerte() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("fehlt.toml");
        let cfg = ServerConfig::laden(pfad.to_str().unwrap()).unwrap();
        assert_eq!(cfg.netzwerk.tcp_port, 9987);
    }

    #[test]
    fn kaputte_datei_ist_fehler() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("kaputt.toml");
        std::fs::write(&pfad, "[relay\nsend_queue_groesse = ").unwrap();
        assert!(ServerConfig::laden(pfad.to_str().unwrap()).is_err());
    }

    #[test]
    fn datei_mit_ungueltigem_seed_ist_fehler() {
        let dir = tempfile::tempdir().unwrap();
        let pfad = dir.path().join("config.toml");
        std::fs::write(&pfad, "[seed]\ngroesse = 8\n").unwrap();
        assert!(ServerConfig::laden(pfad.to_str().unwrap()).is_err());
    }
}
