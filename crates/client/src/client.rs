//! RelayClient – TCP-Verbindung zum Relay
//!
//! Ablauf:
//! 1. `verbinden` oeffnet die TCP-Verbindung
//! 2. `identitaet_anfordern` (neu) oder `anmelden` (Wiederanmeldung mit
//!    Besitznachweis)
//! 3. `unicast_senden` / `broadcast_senden` / `empfangen`
//! 4. `schliessen`

use bytes::Bytes;
use cryptr_core::{jetzt_ms, ClientId};
use cryptr_crypto::Seed;
use cryptr_protocol::{Envelope, FrameCodec, NachrichtenTyp, Quittung};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;

use crate::error::{ClientError, ClientResult};
use crate::identitaet::Identitaet;

/// Vom Relay empfangene, bereits entschluesselte Nachricht
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Nachricht {
    Inhalt {
        absender: ClientId,
        /// `true` wenn die Nachricht an alle ging
        broadcast: bool,
        zeitstempel_ms: u64,
        klartext: Vec<u8>,
    },
    Quittung(Quittung),
}

pub struct RelayClient {
    framed: Framed<TcpStream, FrameCodec>,
    identitaet: Option<Identitaet>,
}

impl RelayClient {
    pub async fn verbinden(adresse: impl ToSocketAddrs) -> ClientResult<Self> {
        let stream = TcpStream::connect(adresse).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            framed: Framed::new(stream, FrameCodec::neu()),
            identitaet: None,
        })
    }

    pub fn identitaet(&self) -> Option<&Identitaet> {
        self.identitaet.as_ref()
    }

    /// Fordert eine neue Identitaet an und leitet das Secret lokal ab
    pub async fn identitaet_anfordern(&mut self) -> ClientResult<&Identitaet> {
        let anfrage = Envelope::identitaet_anfordern(Bytes::new(), jetzt_ms(), Bytes::new());
        self.senden(&anfrage).await?;

        let antwort = self.naechstes_envelope().await?;
        if antwort.typ != NachrichtenTyp::IdentityResponse {
            return Err(ClientError::Protokoll(format!(
                "IdentityResponse erwartet, {:?} erhalten",
                antwort.typ
            )));
        }

        let client_id = ClientId::aus_bytes(&antwort.ziel)?;
        let seed = Seed::aus_bytes(antwort.payload);
        let identitaet = Identitaet::ableiten(client_id, antwort.zeitstempel_ms, seed)?;
        tracing::info!(client = %identitaet.client_id(), "Identitaet erhalten");

        Ok(self.identitaet.insert(identitaet))
    }

    /// Meldet eine bestehende Identitaet an (Reconnect oder HTTP-Bootstrap)
    ///
    /// Schlaegt der Besitznachweis fehl, antwortet der Server nicht. Aufrufer
    /// sollten dann mit einem Timeout arbeiten.
    pub async fn anmelden(&mut self, identitaet: Identitaet) -> ClientResult<()> {
        let jetzt = jetzt_ms();
        let anfrage = Envelope::identitaet_anfordern(
            Bytes::copy_from_slice(identitaet.client_id().as_bytes()),
            jetzt,
            Bytes::from(identitaet.besitznachweis(jetzt)?),
        );
        self.senden(&anfrage).await?;

        let antwort = self.naechstes_envelope().await?;
        if antwort.typ != NachrichtenTyp::IdentityResponse
            || antwort.ziel != identitaet.client_id().as_bytes()
        {
            return Err(ClientError::Protokoll("Anmeldung nicht bestaetigt".into()));
        }

        tracing::info!(client = %identitaet.client_id(), "Identitaet angemeldet");
        self.identitaet = Some(identitaet);
        Ok(())
    }

    pub async fn unicast_senden(&mut self, ziel: &ClientId, klartext: &[u8]) -> ClientResult<()> {
        self.inhalt_senden(Bytes::copy_from_slice(ziel.as_bytes()), klartext)
            .await
    }

    pub async fn broadcast_senden(&mut self, klartext: &[u8]) -> ClientResult<()> {
        self.inhalt_senden(Bytes::new(), klartext).await
    }

    async fn inhalt_senden(&mut self, ziel: Bytes, klartext: &[u8]) -> ClientResult<()> {
        let identitaet = self.identitaet.as_ref().ok_or(ClientError::KeineIdentitaet)?;
        let envelope = Envelope::inhalt(
            Bytes::copy_from_slice(identitaet.client_id().as_bytes()),
            ziel,
            jetzt_ms(),
            Bytes::from(identitaet.versiegeln(klartext)?),
        );
        self.senden(&envelope).await
    }

    /// Wartet auf die naechste Nachricht und entschluesselt sie
    pub async fn empfangen(&mut self) -> ClientResult<Nachricht> {
        let envelope = self.naechstes_envelope().await?;
        let identitaet = self.identitaet.as_ref().ok_or(ClientError::KeineIdentitaet)?;

        match envelope.typ {
            NachrichtenTyp::Content => Ok(Nachricht::Inhalt {
                absender: ClientId::aus_bytes(&envelope.absender)?,
                broadcast: envelope.ist_broadcast(),
                zeitstempel_ms: envelope.zeitstempel_ms,
                klartext: identitaet.oeffnen(&envelope.payload)?,
            }),
            NachrichtenTyp::ContentAck => {
                let klartext = identitaet.oeffnen(&envelope.payload)?;
                Ok(Nachricht::Quittung(Quittung::dekodieren(&klartext)?))
            }
            andere => Err(ClientError::Protokoll(format!("Unerwartete Nachricht {andere:?}"))),
        }
    }

    pub async fn schliessen(mut self) -> ClientResult<()> {
        SinkExt::<Bytes>::close(&mut self.framed).await?;
        Ok(())
    }

    async fn senden(&mut self, envelope: &Envelope) -> ClientResult<()> {
        self.framed.send(envelope.kodieren()?).await?;
        Ok(())
    }

    async fn naechstes_envelope(&mut self) -> ClientResult<Envelope> {
        match self.framed.next().await {
            Some(frame) => Ok(Envelope::dekodieren(frame?.freeze())?),
            None => Err(ClientError::VerbindungGetrennt),
        }
    }
}
