//! Client-Connection – Verwaltet eine einzelne Relay-Verbindung
//!
//! Jede Verbindung (TCP oder WebSocket) bekommt eine `ClientConnection` in
//! einem eigenen tokio-Task plus einen Schreib-Task, der die Send-Queue in
//! den Transport leert.
//!
//! ## State Machine
//! ```text
//! Verbindend -> Registrierend -> Aktiv -> Schliessend -> Geschlossen
//!                    |                         ^
//!                    +-------------------------+
//! ```
//!
//! Lese-/Rahmungsfehler, Ende des Streams, Idle-Timeout, Ende des
//! Schreib-Tasks oder zu viele fehlgeschlagene Tag-Pruefungen fuehren nach
//! `Schliessend`. Dort wird der Client abgemeldet und der Schreib-Task
//! abgebrochen.
//!
//! Der Idle-Timeout zaehlt Verkehr in beide Richtungen: jeder eingehende
//! Frame und jeder vom Schreib-Task ausgelieferte Frame setzt ihn zurueck.
//! Ein Client, der nur Broadcasts mitliest, bleibt so verbunden, solange
//! Broadcasts eintreffen.
//!
//! Die einzige dauerhafte Sender-Haelfte der Send-Queue liegt in der
//! Registry. Wird der Client dort entfernt (z.B. nach fehlgeschlagener
//! Zustellung), endet der Schreib-Task und damit auch diese Verbindung.

use bytes::Bytes;
use cryptr_core::ClientId;
use cryptr_protocol::Envelope;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use std::io;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::dispatcher::MessageDispatcher;
use crate::error::RelayError;
use crate::registry::ClientHandle;
use crate::server_state::RelayState;

// ---------------------------------------------------------------------------
// Verbindungszustand
// ---------------------------------------------------------------------------

/// Zustand einer Relay-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbindungsZustand {
    /// Transport steht, noch keine Nachricht gelesen
    Verbindend,
    /// Wartet auf eine gueltige Identitaetsanfrage
    Registrierend,
    /// Angemeldet, Frames werden geroutet
    Aktiv,
    /// Abmeldung und Freigabe laufen
    Schliessend,
    /// Endzustand
    Geschlossen,
}

/// Grund fuer das Ende einer Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrennGrund {
    /// Gegenseite hat den Stream beendet
    StreamEnde,
    /// Lese- oder Rahmungsfehler
    Lesefehler,
    /// Weder gelesen noch geschrieben innerhalb des Idle-Timeouts
    Leerlauf,
    /// Keine Registrierung innerhalb des Registrierungs-Timeouts
    RegistrierungsTimeout,
    /// Schreib-Task beendet (Transport kaputt oder Client abgemeldet)
    SchreiberBeendet,
    /// Zu viele fehlgeschlagene Tag-Pruefungen
    AuthFehler,
    /// Server faehrt herunter
    Shutdown,
}

// ---------------------------------------------------------------------------
// ClientConnection
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne Relay-Verbindung
pub struct ClientConnection {
    state: Arc<RelayState>,
    dispatcher: MessageDispatcher,
    /// Transport-Bezeichnung fuer Logs (Peer-Adresse)
    peer: String,
    verbindungs_nr: u64,
    zustand: VerbindungsZustand,
    auth_fehler: u32,
}

impl ClientConnection {
    pub fn neu(state: Arc<RelayState>, peer: impl Into<String>) -> Self {
        let verbindungs_nr = state.naechste_verbindungs_nr();
        Self {
            dispatcher: MessageDispatcher::neu(Arc::clone(&state)),
            state,
            peer: peer.into(),
            verbindungs_nr,
            zustand: VerbindungsZustand::Verbindend,
            auth_fehler: 0,
        }
    }

    pub fn zustand(&self) -> VerbindungsZustand {
        self.zustand
    }

    fn zustand_setzen(&mut self, neu: VerbindungsZustand) {
        tracing::trace!(
            peer = %self.peer,
            von = ?self.zustand,
            nach = ?neu,
            "Zustandswechsel"
        );
        self.zustand = neu;
    }

    /// Startet die Verbindungs-Verarbeitung
    ///
    /// `reader` liefert je ein Envelope pro Element, `writer` nimmt kodierte
    /// Envelopes entgegen. Laeuft bis die Verbindung endet oder ein
    /// Shutdown-Signal eingeht, und gibt den Trenngrund zurueck.
    pub async fn verarbeiten<R, W>(
        mut self,
        mut reader: R,
        writer: W,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> TrennGrund
    where
        R: Stream<Item = io::Result<Bytes>> + Unpin,
        W: Sink<Bytes, Error = io::Error> + Unpin + Send + 'static,
    {
        tracing::info!(peer = %self.peer, verbindungs_nr = self.verbindungs_nr, "Neue Verbindung");

        let (tx, rx) = mpsc::channel::<Envelope>(self.state.config.send_queue_groesse);
        let ausgeliefert = Arc::new(Notify::new());
        let mut schreiber = tokio::spawn(schreiben(
            writer,
            rx,
            Arc::clone(&ausgeliefert),
            self.peer.clone(),
        ));
        let handle = ClientHandle::neu(self.verbindungs_nr, tx);

        self.zustand_setzen(VerbindungsZustand::Registrierend);
        let registrierung = self
            .registrieren(&mut reader, handle, &mut schreiber, &mut shutdown_rx)
            .await;

        let grund = match registrierung {
            Ok(id) => {
                self.zustand_setzen(VerbindungsZustand::Aktiv);
                let grund = self
                    .aktiv(&id, &mut reader, &mut schreiber, &ausgeliefert, &mut shutdown_rx)
                    .await;
                self.zustand_setzen(VerbindungsZustand::Schliessend);
                self.state.registry.verbindung_entfernen(&id, self.verbindungs_nr);
                grund
            }
            Err(grund) => {
                self.zustand_setzen(VerbindungsZustand::Schliessend);
                grund
            }
        };

        schreiber.abort();
        self.zustand_setzen(VerbindungsZustand::Geschlossen);
        tracing::info!(peer = %self.peer, grund = ?grund, "Verbindung geschlossen");
        grund
    }

    /// Wartet auf eine gueltige Identitaetsanfrage
    ///
    /// Gibt nur die Id zurueck: `handle` und der Record werden hier verworfen,
    /// damit nur noch die Registry die Send-Queue offen haelt.
    async fn registrieren<R>(
        &mut self,
        reader: &mut R,
        handle: ClientHandle,
        schreiber: &mut JoinHandle<io::Result<()>>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<ClientId, TrennGrund>
    where
        R: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        if *shutdown_rx.borrow() {
            return Err(TrennGrund::Shutdown);
        }

        let frist = tokio::time::sleep(self.state.config.registrierungs_timeout);
        tokio::pin!(frist);

        loop {
            tokio::select! {
                _ = &mut frist => {
                    tracing::warn!(peer = %self.peer, "Keine Registrierung innerhalb des Timeouts");
                    return Err(TrennGrund::RegistrierungsTimeout);
                }

                frame = reader.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => {
                            tracing::warn!(peer = %self.peer, fehler = %e, "Frame-Lesefehler");
                            return Err(TrennGrund::Lesefehler);
                        }
                        None => return Err(TrennGrund::StreamEnde),
                    };

                    match self.dispatcher.identitaet_verarbeiten(frame, handle.clone()) {
                        Ok(record) => {
                            tracing::info!(
                                peer = %self.peer,
                                client = %record.id,
                                "Client registriert"
                            );
                            return Ok(record.id);
                        }
                        Err(e) => {
                            tracing::warn!(
                                peer = %self.peer,
                                fehler = %e,
                                "Registrierung abgelehnt"
                            );
                            if self.auth_fehler_zaehlen(&e) {
                                return Err(TrennGrund::AuthFehler);
                            }
                        }
                    }
                }

                _ = &mut *schreiber => {
                    return Err(TrennGrund::SchreiberBeendet);
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return Err(TrennGrund::Shutdown);
                    }
                }
            }
        }
    }

    /// Hauptschleife einer angemeldeten Verbindung
    async fn aktiv<R>(
        &mut self,
        id: &ClientId,
        reader: &mut R,
        schreiber: &mut JoinHandle<io::Result<()>>,
        ausgeliefert: &Notify,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> TrennGrund
    where
        R: Stream<Item = io::Result<Bytes>> + Unpin,
    {
        let idle_timeout = self.state.config.idle_timeout;
        let leerlauf = tokio::time::sleep(idle_timeout);
        tokio::pin!(leerlauf);

        loop {
            tokio::select! {
                _ = &mut leerlauf => {
                    tracing::info!(client = %id, "Idle-Timeout");
                    return TrennGrund::Leerlauf;
                }

                _ = ausgeliefert.notified() => {
                    leerlauf.as_mut().reset(Instant::now() + idle_timeout);
                }

                frame = reader.next() => {
                    let frame = match frame {
                        Some(Ok(frame)) => frame,
                        Some(Err(e)) => {
                            tracing::warn!(client = %id, fehler = %e, "Frame-Lesefehler");
                            return TrennGrund::Lesefehler;
                        }
                        None => {
                            tracing::info!(client = %id, "Verbindung vom Client getrennt");
                            return TrennGrund::StreamEnde;
                        }
                    };
                    leerlauf.as_mut().reset(Instant::now() + idle_timeout);

                    // Aktuellen Eintrag holen; fehlt er, wurde der Client abgemeldet
                    let Some(record) = self
                        .state
                        .registry
                        .nachschlagen(id)
                        .filter(|r| r.gehoert_zu(self.verbindungs_nr))
                    else {
                        tracing::debug!(client = %id, "Client nicht mehr registriert");
                        return TrennGrund::SchreiberBeendet;
                    };

                    match self.dispatcher.eingehend_verarbeiten(&record, frame).await {
                        Ok(zustellung) => {
                            tracing::trace!(
                                client = %id,
                                status = ?zustellung.status,
                                zugestellt = zustellung.zugestellt,
                                "Nachricht geroutet"
                            );
                        }
                        Err(e @ RelayError::Routing { .. }) => {
                            tracing::debug!(client = %id, fehler = %e, "Nachricht verworfen");
                        }
                        Err(e) => {
                            tracing::warn!(client = %id, fehler = %e, "Nachricht verworfen");
                            if self.auth_fehler_zaehlen(&e) {
                                return TrennGrund::AuthFehler;
                            }
                        }
                    }
                }

                ergebnis = &mut *schreiber => {
                    if let Ok(Err(e)) = ergebnis {
                        tracing::warn!(client = %id, fehler = %e, "Schreibfehler");
                    }
                    return TrennGrund::SchreiberBeendet;
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(client = %id, "Shutdown-Signal - Verbindung wird getrennt");
                        return TrennGrund::Shutdown;
                    }
                }
            }
        }
    }

    /// Zaehlt Authentifizierungsfehler; `true` wenn das Limit erreicht ist
    fn auth_fehler_zaehlen(&mut self, fehler: &RelayError) -> bool {
        if !fehler.ist_auth_fehler() {
            return false;
        }
        self.auth_fehler += 1;
        if self.auth_fehler >= self.state.config.max_auth_fehler {
            tracing::warn!(
                peer = %self.peer,
                fehler_anzahl = self.auth_fehler,
                "Zu viele Authentifizierungsfehler"
            );
            return true;
        }
        false
    }
}

// ---------------------------------------------------------------------------
// Schreib-Task
// ---------------------------------------------------------------------------

/// Leert die Send-Queue in den Transport (FIFO)
///
/// Meldet jeden ausgelieferten Frame ueber `ausgeliefert`. Endet, sobald
/// alle Sender-Haelften verworfen sind oder der Transport einen Fehler
/// meldet.
async fn schreiben<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<Envelope>,
    ausgeliefert: Arc<Notify>,
    peer: String,
) -> io::Result<()>
where
    W: Sink<Bytes, Error = io::Error> + Unpin,
{
    while let Some(envelope) = rx.recv().await {
        match envelope.kodieren() {
            Ok(frame) => {
                writer.send(frame).await?;
                ausgeliefert.notify_one();
            }
            Err(e) => {
                tracing::warn!(peer = %peer, fehler = %e, "Envelope nicht kodierbar, verworfen");
            }
        }
    }
    tracing::debug!(peer = %peer, "Send-Queue geschlossen");
    writer.close().await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
