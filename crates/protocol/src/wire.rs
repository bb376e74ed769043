//! Rahmung fuer den TCP-Transport
//!
//! ```text
//! | Laenge (u32 BE) | Envelope-Bytes (Laenge Bytes) |
//! ```
//!
//! Der Codec kennt nur die Rahmung. Envelopes werden erst im Relay
//! dekodiert, ein kaputtes Envelope beendet daher die Verbindung nicht.
//! Ein zu grosser Frame dagegen schon: nach ihm ist der Stream nicht mehr
//! synchron.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

/// Standard-Obergrenze fuer einen Frame (1 MiB)
pub const STANDARD_MAX_FRAME_GROESSE: usize = 1024 * 1024;

/// Breite des Laengen-Praefix
pub const LAENGEN_PRAEFIX: usize = std::mem::size_of::<u32>();

/// Laengenpraefix-Codec fuer `Framed`/`FramedRead`/`FramedWrite`
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    maximum: usize,
}

impl FrameCodec {
    pub fn neu() -> Self {
        Self::mit_maximum(STANDARD_MAX_FRAME_GROESSE)
    }

    pub fn mit_maximum(maximum: usize) -> Self {
        Self { maximum }
    }

    pub fn maximum(&self) -> usize {
        self.maximum
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::neu()
    }
}

/// `InvalidData` wenn `laenge` das Maximum ueberschreitet
fn laenge_pruefen(laenge: usize, maximum: usize) -> io::Result<()> {
    if laenge > maximum {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Frame zu gross: {laenge} > {maximum} Bytes"),
        ));
    }
    Ok(())
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, puffer: &mut BytesMut) -> io::Result<Option<BytesMut>> {
        let Some(mut kopf) = puffer.get(..LAENGEN_PRAEFIX) else {
            return Ok(None);
        };
        let laenge = kopf.get_u32() as usize;
        laenge_pruefen(laenge, self.maximum)?;

        let gesamt = LAENGEN_PRAEFIX + laenge;
        if puffer.len() < gesamt {
            // Platz fuer den Rest schon jetzt reservieren
            puffer.reserve(gesamt - puffer.len());
            return Ok(None);
        }

        puffer.advance(LAENGEN_PRAEFIX);
        Ok(Some(puffer.split_to(laenge)))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, envelope: Bytes, ziel: &mut BytesMut) -> io::Result<()> {
        laenge_pruefen(envelope.len(), self.maximum)?;
        ziel.reserve(LAENGEN_PRAEFIX + envelope.len());
        ziel.put_u32(envelope.len() as u32);
        ziel.extend_from_slice(&envelope);
        Ok(())
    }
}

/// Liest genau einen Frame ohne `Framed` (Tests, einfache Werkzeuge)
pub async fn frame_lesen<R>(quelle: &mut R, maximum: usize) -> io::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let laenge = quelle.read_u32().await? as usize;
    laenge_pruefen(laenge, maximum)?;

    let mut inhalt = BytesMut::zeroed(laenge);
    quelle.read_exact(&mut inhalt).await?;
    Ok(inhalt.freeze())
}

/// Schreibt genau einen Frame und flusht
pub async fn frame_schreiben<W>(ziel: &mut W, envelope: &[u8], maximum: usize) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    laenge_pruefen(envelope.len(), maximum)?;
    ziel.write_u32(envelope.len() as u32).await?;
    ziel.write_all(envelope).await?;
    ziel.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;

    fn envelope_bytes(n: u8) -> Bytes {
        Envelope::inhalt(
            Bytes::from(vec![n; 24]),
            Bytes::new(),
            u64::from(n),
            Bytes::from_static(b"payload"),
        )
        .kodieren()
        .unwrap()
    }

    #[test]
    fn praefix_ist_big_endian() {
        let mut puffer = BytesMut::new();
        FrameCodec::neu()
            .encode(Bytes::from_static(&[7; 258]), &mut puffer)
            .unwrap();
        assert_eq!(&puffer[..LAENGEN_PRAEFIX], &[0, 0, 1, 2]);
        assert_eq!(puffer.len(), LAENGEN_PRAEFIX + 258);
    }

    #[test]
    fn teilframe_wartet_auf_rest() {
        let mut codec = FrameCodec::neu();
        let mut puffer = BytesMut::new();
        codec.encode(envelope_bytes(1), &mut puffer).unwrap();

        // Nicht einmal das Praefix ist vollstaendig
        let mut teil = puffer.split_to(2);
        assert!(codec.decode(&mut teil).unwrap().is_none());

        // Praefix da, Inhalt unvollstaendig
        teil.unsplit(puffer.split_to(10));
        assert!(codec.decode(&mut teil).unwrap().is_none());

        teil.unsplit(puffer);
        let frame = codec.decode(&mut teil).unwrap().expect("Frame erwartet");
        assert_eq!(Envelope::dekodieren(frame.freeze()).unwrap().zeitstempel_ms, 1);
        assert!(teil.is_empty());
    }

    #[test]
    fn mehrere_frames_in_einem_puffer() {
        let mut codec = FrameCodec::neu();
        let mut puffer = BytesMut::new();
        for i in 0..3u8 {
            codec.encode(envelope_bytes(i), &mut puffer).unwrap();
        }

        for i in 0..3u8 {
            let frame = codec.decode(&mut puffer).unwrap().expect("Frame erwartet");
            let env = Envelope::dekodieren(frame.freeze()).unwrap();
            assert_eq!(env.zeitstempel_ms, u64::from(i));
        }
        assert!(codec.decode(&mut puffer).unwrap().is_none());
    }

    #[test]
    fn zu_grosser_frame_wird_schon_am_praefix_erkannt() {
        let mut codec = FrameCodec::mit_maximum(100);
        let mut puffer = BytesMut::new();
        puffer.put_u32(200);

        let err = codec.decode(&mut puffer).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn encode_lehnt_zu_grossen_frame_ab() {
        let mut codec = FrameCodec::mit_maximum(10);
        let mut puffer = BytesMut::new();
        assert!(codec.encode(envelope_bytes(1), &mut puffer).is_err());
        assert!(puffer.is_empty());
    }

    #[test]
    fn leerer_frame() {
        let mut codec = FrameCodec::neu();
        let mut puffer = BytesMut::new();
        codec.encode(Bytes::new(), &mut puffer).unwrap();
        let frame = codec.decode(&mut puffer).unwrap().expect("Frame erwartet");
        assert!(frame.is_empty());
    }

    #[tokio::test]
    async fn frame_lesen_und_schreiben_ueber_stream() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let env = envelope_bytes(99);

        let schreiber = {
            let env = env.clone();
            tokio::spawn(async move {
                frame_schreiben(&mut a, &env, STANDARD_MAX_FRAME_GROESSE).await
            })
        };
        let gelesen = frame_lesen(&mut b, STANDARD_MAX_FRAME_GROESSE).await.unwrap();
        schreiber.await.unwrap().unwrap();
        assert_eq!(gelesen, env);
    }

    #[tokio::test]
    async fn frame_lesen_vorzeitiges_ende() {
        let mut daten: Vec<u8> = Vec::new();
        daten.extend_from_slice(&10u32.to_be_bytes());
        daten.extend_from_slice(b"abc");

        let err = frame_lesen(&mut io::Cursor::new(daten), STANDARD_MAX_FRAME_GROESSE)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn frame_lesen_lehnt_zu_grossen_frame_ab() {
        let daten = (2u32 * 1024 * 1024).to_be_bytes().to_vec();
        let err = frame_lesen(&mut io::Cursor::new(daten), STANDARD_MAX_FRAME_GROESSE)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
