//! Zeilenformat des Chat-Clients
//!
//! ```text
//! @<client-id-hex> text   Unicast
//! text                    Broadcast
//! /id                     eigene ClientId anzeigen
//! /quit                   beenden
//! ```

use cryptr_core::ClientId;
use cryptr_protocol::ZustellStatus;

use crate::client::Nachricht;
use crate::error::ClientResult;

/// Eine Eingabezeile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eingabe {
    Unicast { ziel: ClientId, text: String },
    Broadcast(String),
    EigeneId,
    Beenden,
    Leer,
}

impl Eingabe {
    pub fn parsen(zeile: &str) -> ClientResult<Self> {
        let zeile = zeile.trim();
        if zeile.is_empty() {
            return Ok(Self::Leer);
        }
        match zeile {
            "/quit" | "/exit" => return Ok(Self::Beenden),
            "/id" => return Ok(Self::EigeneId),
            _ => {}
        }

        let Some(rest) = zeile.strip_prefix('@') else {
            return Ok(Self::Broadcast(zeile.to_string()));
        };
        let (ziel, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        Ok(Self::Unicast {
            ziel: ClientId::aus_hex(ziel)?,
            text: text.trim_start().to_string(),
        })
    }
}

/// Anzeigezeile fuer eine empfangene Nachricht
///
/// Erfolgreiche Quittungen werden nicht angezeigt.
pub fn anzeige(nachricht: &Nachricht) -> Option<String> {
    match nachricht {
        Nachricht::Inhalt {
            absender,
            broadcast,
            klartext,
            ..
        } => {
            let kanal = if *broadcast { "alle" } else { "privat" };
            Some(format!(
                "[{kanal}] {absender}: {}",
                String::from_utf8_lossy(klartext)
            ))
        }
        Nachricht::Quittung(q) => match q.status {
            ZustellStatus::Zugestellt => None,
            ZustellStatus::UnbekanntesZiel => Some("! Empfaenger unbekannt oder offline".into()),
            ZustellStatus::Fehlgeschlagen => Some("! Zustellung fehlgeschlagen".into()),
        },
    }
}
