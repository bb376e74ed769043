//! TCP-Listener – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `RelayServer` akzeptiert TCP-Verbindungen und startet fuer jede einen
//! eigenen tokio-Task mit einer `ClientConnection`. Die Rahmung uebernimmt
//! der `FrameCodec` (u32 BE Laenge + Envelope).

use bytes::BytesMut;
use cryptr_protocol::FrameCodec;
use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::connection::ClientConnection;
use crate::server_state::RelayState;

/// TCP-Relay-Server
pub struct RelayServer {
    state: Arc<RelayState>,
    listener: TcpListener,
}

impl RelayServer {
    /// Bindet den Listener. Port 0 waehlt einen freien Port.
    pub async fn binden(state: Arc<RelayState>, bind_addr: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        Ok(Self { state, listener })
    }

    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Akzeptiert Verbindungen bis `shutdown_rx` ein `true`-Signal empfaengt
    pub async fn starten(self, mut shutdown_rx: watch::Receiver<bool>) -> std::io::Result<()> {
        tracing::info!(adresse = %self.lokale_adresse()?, "TCP-Relay gestartet");

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");
                            self.verbindung_starten(stream, peer_addr, shutdown_rx.clone());
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("TCP-Relay: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("TCP-Relay gestoppt");
        Ok(())
    }

    fn verbindung_starten(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
        shutdown_rx: watch::Receiver<bool>,
    ) {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(peer = %peer_addr, fehler = %e, "TCP_NODELAY nicht gesetzt");
        }

        let max = self.state.config.max_frame_groesse;
        let (lesen, schreiben) = stream.into_split();
        let reader = FramedRead::new(lesen, FrameCodec::mit_maximum(max))
            .map(|frame| frame.map(BytesMut::freeze));
        let writer = FramedWrite::new(schreiben, FrameCodec::mit_maximum(max));

        let verbindung = ClientConnection::neu(Arc::clone(&self.state), peer_addr.to_string());
        tokio::spawn(async move {
            verbindung.verarbeiten(reader, writer, shutdown_rx).await;
        });
    }
}
