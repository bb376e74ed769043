//! Gemeinsamer Relay-Zustand
//!
//! Haelt Seed, Registry und Konfiguration als Arc-Referenz, die sicher
//! zwischen tokio-Tasks geteilt werden kann. Die Registry ist der einzige
//! veraenderliche geteilte Zustand.

use cryptr_crypto::Seed;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::registry::ClientRegistry;

/// Laufzeit-Konfiguration des Relays
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Kapazitaet der Send-Queue pro Verbindung
    pub send_queue_groesse: usize,
    /// Maximale Wartezeit beim Einreihen in eine volle Queue
    pub send_timeout: Duration,
    /// Verbindung wird nach dieser Zeit ohne Frame in beide Richtungen
    /// geschlossen
    pub idle_timeout: Duration,
    /// Zeit bis zur erfolgreichen Identitaetsanfrage
    pub registrierungs_timeout: Duration,
    /// Maximale Frame-Groesse (TCP-Rahmung)
    pub max_frame_groesse: usize,
    /// Broadcast auch an den Absender zustellen
    pub absender_einschliessen: bool,
    /// ContentAck nach jeder Zustellung an den Absender senden
    pub quittungen_senden: bool,
    /// Verbindung nach so vielen fehlgeschlagenen Tag-Pruefungen schliessen
    pub max_auth_fehler: u32,
    /// Erlaubte Abweichung des Besitznachweis-Zeitstempels von der Serverzeit
    pub nachweis_fenster: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            send_queue_groesse: 64,
            send_timeout: Duration::from_secs(2),
            idle_timeout: Duration::from_secs(300),
            registrierungs_timeout: Duration::from_secs(10),
            max_frame_groesse: cryptr_protocol::STANDARD_MAX_FRAME_GROESSE,
            absender_einschliessen: false,
            quittungen_senden: true,
            max_auth_fehler: 5,
            nachweis_fenster: Duration::from_secs(30),
        }
    }
}

/// Gemeinsamer Relay-Zustand (thread-safe, Arc-geteilt)
pub struct RelayState {
    /// Prozessweiter, oeffentlicher Seed
    pub seed: Seed,
    /// Alle registrierten Clients
    pub registry: ClientRegistry,
    pub config: RelayConfig,
    verbindungs_zaehler: AtomicU64,
}

impl RelayState {
    pub fn neu(seed: Seed, config: RelayConfig) -> Arc<Self> {
        Arc::new(Self {
            seed,
            registry: ClientRegistry::neu(),
            config,
            verbindungs_zaehler: AtomicU64::new(1),
        })
    }

    /// Vergibt eine prozessweit eindeutige Verbindungsnummer
    pub fn naechste_verbindungs_nr(&self) -> u64 {
        self.verbindungs_zaehler.fetch_add(1, Ordering::Relaxed)
    }
}
