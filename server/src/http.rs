//! HTTP-Bootstrap und WebSocket-Relay (axum)
//!
//! Endpunkte:
//! - `GET  /public/identity` - Seed als `application/octet-stream`
//! - `POST /create/client`   - neue Identitaet ohne Verbindung
//! - `GET  /health`          - Status und Anzahl registrierter Clients
//! - `GET  /chat`            - WebSocket, je Binary-Nachricht ein Envelope

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use cryptr_core::jetzt_ms;
use cryptr_relay::{ClientConnection, RelayError, RelayState};
use futures_util::{future, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;

/// Geteilter Zustand der HTTP-Handler
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<RelayState>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Antwort auf `POST /create/client`
#[derive(Debug, Serialize, Deserialize)]
pub struct ClientErstellt {
    /// ClientId als Hex-String
    pub client_id: String,
    pub timestamp_ms: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthAntwort {
    pub status: String,
    pub clients: usize,
    pub verbunden: usize,
}

/// Fehler eines Handlers, wird als JSON mit Status 500 beantwortet
pub struct ApiFehler(RelayError);

impl From<RelayError> for ApiFehler {
    fn from(e: RelayError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiFehler {
    fn into_response(self) -> Response {
        tracing::error!(fehler = %self.0, "HTTP-Anfrage fehlgeschlagen");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "fehler": self.0.to_string() })),
        )
            .into_response()
    }
}

/// Baut den Router mit allen Endpunkten
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/public/identity", get(oeffentliche_identitaet))
        .route("/create/client", post(client_erzeugen))
        .route("/health", get(health))
        .route("/chat", get(chat))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /public/identity
async fn oeffentliche_identitaet(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        state.relay.seed.bytes(),
    )
}

/// POST /create/client
async fn client_erzeugen(
    State(state): State<AppState>,
) -> Result<Json<ClientErstellt>, ApiFehler> {
    let record = state
        .relay
        .registry
        .identitaet_erzeugen(state.relay.seed.as_bytes(), jetzt_ms(), None)?;

    tracing::info!(client = %record.id, "Identitaet per HTTP erzeugt");
    Ok(Json(ClientErstellt {
        client_id: record.id.to_hex(),
        timestamp_ms: record.zeitstempel_ms,
    }))
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthAntwort> {
    Json(HealthAntwort {
        status: "ok".into(),
        clients: state.relay.registry.anzahl(),
        verbunden: state.relay.registry.verbundene_anzahl(),
    })
}

/// GET /chat
async fn chat(
    ws: WebSocketUpgrade,
    peer: Option<ConnectInfo<SocketAddr>>,
    State(state): State<AppState>,
) -> Response {
    let peer = match peer {
        Some(ConnectInfo(adresse)) => format!("ws://{adresse}"),
        None => "ws://unbekannt".to_string(),
    };
    let max = state.relay.config.max_frame_groesse;
    ws.max_message_size(max)
        .on_upgrade(move |socket| chat_verbindung(socket, state, peer))
}

/// Adaptiert den WebSocket auf Stream/Sink von Envelope-Bytes
async fn chat_verbindung(socket: WebSocket, state: AppState, peer: String) {
    let max = state.relay.config.max_frame_groesse;
    let (ws_tx, ws_rx) = socket.split();

    let reader = Box::pin(ws_rx.filter_map(move |nachricht| {
        future::ready(nachricht_zu_frame(nachricht, max))
    }));
    let writer = ws_tx
        .with(|daten: Bytes| future::ready(Ok::<_, axum::Error>(Message::Binary(daten.to_vec()))))
        .sink_map_err(io::Error::other);

    let verbindung = ClientConnection::neu(state.relay, peer);
    verbindung.verarbeiten(reader, writer, state.shutdown_rx).await;
}

/// Binary-Nachrichten werden Frames, Steuer- und Textnachrichten entfallen
pub fn nachricht_zu_frame(
    nachricht: Result<Message, axum::Error>,
    max: usize,
) -> Option<io::Result<Bytes>> {
    match nachricht {
        Ok(Message::Binary(daten)) if daten.len() > max => Some(Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("WebSocket-Nachricht zu gross: {} > {max}", daten.len()),
        ))),
        Ok(Message::Binary(daten)) => Some(Ok(Bytes::from(daten))),
        Ok(Message::Text(_)) => {
            tracing::debug!("Text-Nachricht auf /chat verworfen");
            None
        }
        Ok(_) => None,
        Err(e) => Some(Err(io::Error::other(e))),
    }
}
