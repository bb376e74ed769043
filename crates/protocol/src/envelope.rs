//! Binaeres Nachrichten-Envelope
//!
//! ## Format (big-endian, kein serde)
//!
//! ```text
//! Feld           Len   Beschreibung
//! -------------  ----  -----------
//! typ            1     NachrichtenTyp (0..=3)
//! sender_len     2     Laenge der Absender-Id
//! sender         N     Absender-Id (leer = Server / noch keine Identitaet)
//! target_len     2     Laenge der Ziel-Id
//! target         M     Ziel-Id (leer = Broadcast)
//! timestamp_ms   8     Unix-Zeit in Millisekunden
//! payload_len    4     Laenge der Nutzdaten
//! payload        P     Nutzdaten (Ciphertext sobald ein Secret existiert)
//! ```
//!
//! Ueberschuessige oder fehlende Bytes sind ein `ProtokollFehler`.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Groesse aller festen Felder zusammen
pub const KOPF_GROESSE: usize = 1 + 2 + 2 + 8 + 4;

// ---------------------------------------------------------------------------
// Fehler
// ---------------------------------------------------------------------------

/// Fehler beim Kodieren oder Dekodieren eines Envelopes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtokollFehler {
    #[error("Unbekannter Nachrichtentyp: {0}")]
    UnbekannterTyp(u8),

    #[error("Envelope abgeschnitten im Feld '{feld}'")]
    Abgeschnitten { feld: &'static str },

    #[error("{0} ueberschuessige Bytes nach dem Envelope")]
    UeberschuessigeBytes(usize),

    #[error("Feld '{feld}' zu lang: {laenge} Bytes")]
    FeldZuLang { feld: &'static str, laenge: usize },

    #[error("Ungueltige Quittung: {0} Bytes (erwartet 5)")]
    UngueltigeQuittung(usize),

    #[error("Unbekannter Zustellstatus: {0}")]
    UnbekannterStatus(u8),
}

pub type ProtokollResult<T> = Result<T, ProtokollFehler>;

// ---------------------------------------------------------------------------
// NachrichtenTyp
// ---------------------------------------------------------------------------

/// Art der Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NachrichtenTyp {
    /// Client -> Server: neue Identitaet anfordern oder wieder anmelden
    IdentityRequest = 0,
    /// Server -> Client: Identitaet und Seed
    IdentityResponse = 1,
    /// Verschluesselter Inhalt (Unicast oder Broadcast)
    Content = 2,
    /// Server -> Client: Zustellquittung
    ContentAck = 3,
}

impl NachrichtenTyp {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::IdentityRequest),
            1 => Some(Self::IdentityResponse),
            2 => Some(Self::Content),
            3 => Some(Self::ContentAck),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Ein einzelnes Envelope auf dem Draht
///
/// Nach dem Bauen unveraenderlich gedacht; `Bytes` macht Clones guenstig
/// (Broadcast teilt Absender und Zeitstempel ueber alle Empfaenger).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub typ: NachrichtenTyp,
    pub absender: Bytes,
    pub ziel: Bytes,
    pub zeitstempel_ms: u64,
    pub payload: Bytes,
}

impl Envelope {
    /// Identitaetsanfrage. Leerer Absender fordert eine neue Identitaet an,
    /// sonst ist `beweis` der [`besitznachweis_klartext`] versiegelt mit dem
    /// eigenen Secret.
    pub fn identitaet_anfordern(absender: Bytes, zeitstempel_ms: u64, beweis: Bytes) -> Self {
        Self {
            typ: NachrichtenTyp::IdentityRequest,
            absender,
            ziel: Bytes::new(),
            zeitstempel_ms,
            payload: beweis,
        }
    }

    /// Antwort des Servers: `ziel` ist die vergebene Id, `payload` der Seed
    pub fn identitaet_antwort(ziel: Bytes, zeitstempel_ms: u64, seed: Bytes) -> Self {
        Self {
            typ: NachrichtenTyp::IdentityResponse,
            absender: Bytes::new(),
            ziel,
            zeitstempel_ms,
            payload: seed,
        }
    }

    pub fn inhalt(absender: Bytes, ziel: Bytes, zeitstempel_ms: u64, payload: Bytes) -> Self {
        Self {
            typ: NachrichtenTyp::Content,
            absender,
            ziel,
            zeitstempel_ms,
            payload,
        }
    }

    pub fn quittung(ziel: Bytes, zeitstempel_ms: u64, payload: Bytes) -> Self {
        Self {
            typ: NachrichtenTyp::ContentAck,
            absender: Bytes::new(),
            ziel,
            zeitstempel_ms,
            payload,
        }
    }

    /// Leeres Ziel bedeutet Broadcast
    pub fn ist_broadcast(&self) -> bool {
        self.ziel.is_empty()
    }

    /// Laenge der kodierten Darstellung in Bytes
    pub fn kodierte_laenge(&self) -> usize {
        KOPF_GROESSE + self.absender.len() + self.ziel.len() + self.payload.len()
    }

    /// Schreibt das Envelope an das Ende von `dst`
    ///
    /// # Fehler
    /// - `FeldZuLang` wenn eine Id laenger als `u16::MAX` oder die Nutzdaten
    ///   laenger als `u32::MAX` sind
    pub fn kodieren_in(&self, dst: &mut BytesMut) -> ProtokollResult<()> {
        let sender_len = feld_laenge_u16("sender", &self.absender)?;
        let target_len = feld_laenge_u16("target", &self.ziel)?;
        let payload_len =
            u32::try_from(self.payload.len()).map_err(|_| ProtokollFehler::FeldZuLang {
                feld: "payload",
                laenge: self.payload.len(),
            })?;

        dst.reserve(self.kodierte_laenge());
        dst.put_u8(self.typ as u8);
        dst.put_u16(sender_len);
        dst.put_slice(&self.absender);
        dst.put_u16(target_len);
        dst.put_slice(&self.ziel);
        dst.put_u64(self.zeitstempel_ms);
        dst.put_u32(payload_len);
        dst.put_slice(&self.payload);
        Ok(())
    }

    pub fn kodieren(&self) -> ProtokollResult<Bytes> {
        let mut buf = BytesMut::with_capacity(self.kodierte_laenge());
        self.kodieren_in(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Dekodiert genau ein Envelope aus `daten`
    ///
    /// Id- und Payload-Felder teilen sich den Puffer mit `daten`.
    pub fn dekodieren(mut daten: Bytes) -> ProtokollResult<Self> {
        let typ_byte = lesen_u8(&mut daten, "typ")?;
        let typ =
            NachrichtenTyp::from_u8(typ_byte).ok_or(ProtokollFehler::UnbekannterTyp(typ_byte))?;

        let sender_len = lesen_u16(&mut daten, "sender_len")? as usize;
        let absender = lesen_bytes(&mut daten, sender_len, "sender")?;
        let target_len = lesen_u16(&mut daten, "target_len")? as usize;
        let ziel = lesen_bytes(&mut daten, target_len, "target")?;
        let zeitstempel_ms = lesen_u64(&mut daten, "timestamp_ms")?;
        let payload_len = lesen_u32(&mut daten, "payload_len")? as usize;
        let payload = lesen_bytes(&mut daten, payload_len, "payload")?;

        if daten.has_remaining() {
            return Err(ProtokollFehler::UeberschuessigeBytes(daten.remaining()));
        }

        Ok(Self {
            typ,
            absender,
            ziel,
            zeitstempel_ms,
            payload,
        })
    }
}

fn feld_laenge_u16(feld: &'static str, daten: &[u8]) -> ProtokollResult<u16> {
    u16::try_from(daten.len()).map_err(|_| ProtokollFehler::FeldZuLang {
        feld,
        laenge: daten.len(),
    })
}

fn pruefen(daten: &Bytes, n: usize, feld: &'static str) -> ProtokollResult<()> {
    if daten.remaining() < n {
        return Err(ProtokollFehler::Abgeschnitten { feld });
    }
    Ok(())
}

fn lesen_u8(daten: &mut Bytes, feld: &'static str) -> ProtokollResult<u8> {
    pruefen(daten, 1, feld)?;
    Ok(daten.get_u8())
}

fn lesen_u16(daten: &mut Bytes, feld: &'static str) -> ProtokollResult<u16> {
    pruefen(daten, 2, feld)?;
    Ok(daten.get_u16())
}

fn lesen_u32(daten: &mut Bytes, feld: &'static str) -> ProtokollResult<u32> {
    pruefen(daten, 4, feld)?;
    Ok(daten.get_u32())
}

fn lesen_u64(daten: &mut Bytes, feld: &'static str) -> ProtokollResult<u64> {
    pruefen(daten, 8, feld)?;
    Ok(daten.get_u64())
}

fn lesen_bytes(daten: &mut Bytes, n: usize, feld: &'static str) -> ProtokollResult<Bytes> {
    pruefen(daten, n, feld)?;
    Ok(daten.split_to(n))
}

// ---------------------------------------------------------------------------
// Quittung (ContentAck-Klartext)
// ---------------------------------------------------------------------------

/// Ergebnis einer Zustellung aus Sicht des Absenders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ZustellStatus {
    /// Mindestens ein Empfaenger hat die Nachricht in seiner Queue
    Zugestellt = 0,
    /// Unicast-Ziel ist nicht registriert oder nicht verbunden
    UnbekanntesZiel = 1,
    /// Kein Empfaenger konnte beliefert werden
    Fehlgeschlagen = 2,
}

impl ZustellStatus {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Zugestellt),
            1 => Some(Self::UnbekanntesZiel),
            2 => Some(Self::Fehlgeschlagen),
            _ => None,
        }
    }
}

/// Klartext einer ContentAck: `status(u8) | zugestellt(u32 BE)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quittung {
    pub status: ZustellStatus,
    pub zugestellt: u32,
}

impl Quittung {
    pub const GROESSE: usize = 5;

    pub fn kodieren(&self) -> [u8; Self::GROESSE] {
        let mut buf = [0u8; Self::GROESSE];
        buf[0] = self.status as u8;
        buf[1..5].copy_from_slice(&self.zugestellt.to_be_bytes());
        buf
    }

    pub fn dekodieren(buf: &[u8]) -> ProtokollResult<Self> {
        if buf.len() != Self::GROESSE {
            return Err(ProtokollFehler::UngueltigeQuittung(buf.len()));
        }
        let status =
            ZustellStatus::from_u8(buf[0]).ok_or(ProtokollFehler::UnbekannterStatus(buf[0]))?;
        let zugestellt = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        Ok(Self { status, zugestellt })
    }
}

/// Klartext des Besitznachweises bei der Wiederanmeldung: `id || zeitstempel_ms`
///
/// Der Zeitstempel ist derselbe wie im Envelope der Anfrage. Das Relay
/// nimmt pro Identitaet nur streng steigende Zeitstempel an.
pub fn besitznachweis_klartext(id: &[u8], zeitstempel_ms: u64) -> Bytes {
    let mut buf = BytesMut::with_capacity(id.len() + 8);
    buf.put_slice(id);
    buf.put_u64(zeitstempel_ms);
    buf.freeze()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
