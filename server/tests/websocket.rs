//! Relay ueber WebSocket (`/chat`) gegen einen laufenden Server
//!
//! Jede Binary-Nachricht traegt genau ein Envelope. Die Clients hier
//! sprechen das Protokoll direkt und leiten ihr Secret selbst ab.

use bytes::Bytes;
use cryptr_client::{Identitaet, Nachricht, RelayClient};
use cryptr_core::{jetzt_ms, ClientId};
use cryptr_crypto::Seed;
use cryptr_protocol::{Envelope, NachrichtenTyp, Quittung, ZustellStatus};
use cryptr_server::config::ServerConfig;
use cryptr_server::Server;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const WARTEN: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.netzwerk.bind_adresse = "127.0.0.1".into();
    config.netzwerk.tcp_port = 0;
    config.netzwerk.http_port = 0;
    config
}

struct WsClient {
    ws: WsStream,
    identitaet: Identitaet,
}

impl WsClient {
    /// Verbindet sich mit `/chat` und fordert eine neue Identitaet an
    async fn registrieren(http: SocketAddr) -> Self {
        let (mut ws, _) = timeout(WARTEN, connect_async(format!("ws://{http}/chat")))
            .await
            .unwrap()
            .unwrap();

        let anfrage = Envelope::identitaet_anfordern(Bytes::new(), jetzt_ms(), Bytes::new());
        envelope_senden(&mut ws, &anfrage).await;

        let antwort = envelope_lesen(&mut ws).await;
        assert_eq!(antwort.typ, NachrichtenTyp::IdentityResponse);
        let id = ClientId::aus_bytes(&antwort.ziel).unwrap();
        let seed = Seed::aus_bytes(antwort.payload);
        let identitaet = Identitaet::ableiten(id, antwort.zeitstempel_ms, seed).unwrap();
        Self { ws, identitaet }
    }

    fn id(&self) -> &ClientId {
        self.identitaet.client_id()
    }

    async fn inhalt_senden(&mut self, ziel: &[u8], klartext: &[u8]) {
        let envelope = Envelope::inhalt(
            Bytes::copy_from_slice(self.id().as_bytes()),
            Bytes::copy_from_slice(ziel),
            jetzt_ms(),
            Bytes::from(self.identitaet.versiegeln(klartext).unwrap()),
        );
        envelope_senden(&mut self.ws, &envelope).await;
    }

    /// Naechster Inhalt: (Absender, Broadcast, Klartext)
    async fn inhalt_lesen(&mut self) -> (Bytes, bool, Vec<u8>) {
        let envelope = envelope_lesen(&mut self.ws).await;
        assert_eq!(envelope.typ, NachrichtenTyp::Content);
        let klartext = self.identitaet.oeffnen(&envelope.payload).unwrap();
        (envelope.absender.clone(), envelope.ist_broadcast(), klartext)
    }

    async fn quittung_lesen(&mut self) -> Quittung {
        let envelope = envelope_lesen(&mut self.ws).await;
        assert_eq!(envelope.typ, NachrichtenTyp::ContentAck);
        let klartext = self.identitaet.oeffnen(&envelope.payload).unwrap();
        Quittung::dekodieren(&klartext).unwrap()
    }
}

async fn envelope_senden(ws: &mut WsStream, envelope: &Envelope) {
    let daten = envelope.kodieren().unwrap();
    ws.send(Message::Binary(daten.to_vec())).await.unwrap();
}

/// Liest bis zur naechsten Binary-Nachricht (Ping/Pong werden uebergangen)
async fn envelope_lesen(ws: &mut WsStream) -> Envelope {
    loop {
        match timeout(WARTEN, ws.next()).await.unwrap() {
            Some(Ok(Message::Binary(daten))) => {
                return Envelope::dekodieren(Bytes::from(daten)).unwrap();
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            andere => panic!("Binary-Nachricht erwartet, {andere:?} erhalten"),
        }
    }
}

#[tokio::test]
async fn unicast_zwischen_zwei_websocket_clients() {
    let server = Server::binden(test_config()).await.unwrap();
    let http = server.http_adresse().unwrap();
    let state = std::sync::Arc::clone(server.state());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let laufend = tokio::spawn(server.starten(shutdown_rx));

    let mut a = WsClient::registrieren(http).await;
    let mut b = WsClient::registrieren(http).await;
    assert_ne!(a.id(), b.id());
    assert_eq!(state.registry.verbundene_anzahl(), 2);

    // Lokal abgeleitetes Secret entspricht dem des Servers
    let record = state.registry.nachschlagen(b.id()).unwrap();
    assert_eq!(b.identitaet.secret(), &*record.secret);

    let b_id = b.id().as_bytes().to_vec();
    a.inhalt_senden(&b_id, b"hallo ueber websocket").await;

    let (absender, broadcast, klartext) = b.inhalt_lesen().await;
    assert_eq!(absender, a.id().as_bytes());
    assert!(!broadcast);
    assert_eq!(klartext, b"hallo ueber websocket");

    let q = a.quittung_lesen().await;
    assert_eq!(q.status, ZustellStatus::Zugestellt);
    assert_eq!(q.zugestellt, 1);

    // Unbekanntes Ziel: nur die Quittung kommt zurueck
    a.inhalt_senden(&[0xEE; 24], b"niemand").await;
    assert_eq!(a.quittung_lesen().await.status, ZustellStatus::UnbekanntesZiel);

    shutdown_tx.send(true).unwrap();
    timeout(WARTEN, laufend).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn broadcast_erreicht_websocket_und_tcp_clients() {
    let server = Server::binden(test_config()).await.unwrap();
    let http = server.http_adresse().unwrap();
    let tcp = server.tcp_adresse().unwrap();
    let state = std::sync::Arc::clone(server.state());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let laufend = tokio::spawn(server.starten(shutdown_rx));

    let mut a = WsClient::registrieren(http).await;
    let mut b = WsClient::registrieren(http).await;
    let mut c = RelayClient::verbinden(tcp).await.unwrap();
    c.identitaet_anfordern().await.unwrap();
    assert_eq!(state.registry.verbundene_anzahl(), 3);

    a.inhalt_senden(&[], b"an alle").await;

    let (absender, broadcast, klartext) = b.inhalt_lesen().await;
    assert_eq!(absender, a.id().as_bytes());
    assert!(broadcast);
    assert_eq!(klartext, b"an alle");

    match timeout(WARTEN, c.empfangen()).await.unwrap().unwrap() {
        Nachricht::Inhalt {
            absender,
            broadcast,
            klartext,
            ..
        } => {
            assert_eq!(&absender, a.id());
            assert!(broadcast);
            assert_eq!(klartext, b"an alle");
        }
        andere => panic!("Inhalt erwartet, {andere:?} erhalten"),
    }

    // Absender bekommt nur die Quittung, kein Echo
    let q = a.quittung_lesen().await;
    assert_eq!(q.status, ZustellStatus::Zugestellt);
    assert_eq!(q.zugestellt, 2);

    // TCP-Client antwortet per Unicast an den WebSocket-Client
    c.unicast_senden(b.id(), b"zurueck").await.unwrap();
    let (absender, broadcast, klartext) = b.inhalt_lesen().await;
    assert_eq!(absender, c.identitaet().unwrap().client_id().as_bytes());
    assert!(!broadcast);
    assert_eq!(klartext, b"zurueck");

    shutdown_tx.send(true).unwrap();
    timeout(WARTEN, laufend).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn text_nachricht_wird_ignoriert() {
    let server = Server::binden(test_config()).await.unwrap();
    let http = server.http_adresse().unwrap();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(server.starten(shutdown_rx));

    let mut a = WsClient::registrieren(http).await;
    let mut b = WsClient::registrieren(http).await;

    a.ws.send(Message::Text("kein envelope".into())).await.unwrap();
    let b_id = b.id().as_bytes().to_vec();
    a.inhalt_senden(&b_id, b"danach").await;

    let (_, _, klartext) = b.inhalt_lesen().await;
    assert_eq!(klartext, b"danach");
}
