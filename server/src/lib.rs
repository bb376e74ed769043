//! cryptr-server – Bibliotheks-Root
//!
//! Verdrahtet Seed, Relay-Zustand, TCP-Relay und HTTP/WebSocket zu einem
//! Server und stellt den Einstiegspunkt fuer Integrationstests bereit.

pub mod config;
pub mod http;
pub mod logging;

use anyhow::{Context, Result};
use config::ServerConfig;
use cryptr_crypto::generate_seed;
use cryptr_relay::{RelayServer, RelayState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Gebundener, noch nicht laufender Server
pub struct Server {
    config: ServerConfig,
    state: Arc<RelayState>,
    relay: RelayServer,
    http: TcpListener,
}

impl Server {
    /// Erzeugt den Seed und bindet TCP-Relay sowie HTTP-Listener
    pub async fn binden(config: ServerConfig) -> Result<Self> {
        let seed = generate_seed(config.seed.groesse).context("Seed-Erzeugung fehlgeschlagen")?;
        tracing::info!(groesse = seed.len(), "Seed erzeugt");

        let state = RelayState::neu(seed, config.relay_config());

        let tcp_adresse: SocketAddr = config
            .tcp_bind_adresse()
            .parse()
            .with_context(|| format!("Ungueltige TCP-Adresse '{}'", config.tcp_bind_adresse()))?;
        let relay = RelayServer::binden(Arc::clone(&state), tcp_adresse)
            .await
            .with_context(|| format!("TCP-Relay auf {tcp_adresse} nicht bindbar"))?;

        let http = TcpListener::bind(config.http_bind_adresse())
            .await
            .with_context(|| format!("HTTP auf {} nicht bindbar", config.http_bind_adresse()))?;

        Ok(Self {
            config,
            state,
            relay,
            http,
        })
    }

    pub fn state(&self) -> &Arc<RelayState> {
        &self.state
    }

    pub fn tcp_adresse(&self) -> std::io::Result<SocketAddr> {
        self.relay.lokale_adresse()
    }

    pub fn http_adresse(&self) -> std::io::Result<SocketAddr> {
        self.http.local_addr()
    }

    /// Startet alle Subsysteme und laeuft bis `shutdown_rx` `true` meldet
    ///
    /// 1. TCP-Relay
    /// 2. Bereinigung ausstehender Identitaeten
    /// 3. HTTP/WebSocket (blockiert bis zum Shutdown)
    pub async fn starten(self, shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        tracing::info!(
            tcp = %self.tcp_adresse()?,
            http = %self.http_adresse()?,
            "Server startet"
        );

        let relay_task = tokio::spawn(self.relay.starten(shutdown_rx.clone()));

        let bereinigung = tokio::spawn(ausstehende_bereinigen(
            Arc::clone(&self.state),
            self.config.pending_ttl(),
            self.config.pending_pruef_intervall(),
            shutdown_rx.clone(),
        ));

        let app = http::router(http::AppState {
            relay: Arc::clone(&self.state),
            shutdown_rx: shutdown_rx.clone(),
        });
        let mut signal = shutdown_rx;
        axum::serve(
            self.http,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            while !*signal.borrow() {
                if signal.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .context("HTTP-Server beendet mit Fehler")?;

        relay_task.await.context("TCP-Relay-Task abgebrochen")??;
        bereinigung.await.context("Bereinigungs-Task abgebrochen")?;

        tracing::info!("Server gestoppt");
        Ok(())
    }

    /// Laeuft bis Ctrl-C und faehrt dann alle Verbindungen herunter
    pub async fn bis_ctrl_c(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let laufend = tokio::spawn(self.starten(shutdown_rx));

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        // Fehler heisst nur: alle Empfaenger sind schon weg
        let _ = shutdown_tx.send(true);
        laufend.await.context("Server-Task abgebrochen")?
    }
}

/// Entfernt periodisch per HTTP erzeugte Identitaeten, die sich nie verbunden haben
async fn ausstehende_bereinigen(
    state: Arc<RelayState>,
    ttl: Duration,
    intervall: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(intervall);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let entfernt = state.registry.ausstehende_entfernen(ttl);
                if entfernt > 0 {
                    tracing::info!(entfernt, "Ausstehende Identitaeten entfernt");
                }
            }
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
