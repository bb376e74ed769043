//! Message-Dispatcher – Entschluesselt, verschluesselt neu und routet
//!
//! Der Dispatcher empfaengt rohe Frames von einer `ClientConnection`.
//!
//! ## Zustandspruefung
//! - Im Zustand `Registrierend` ist nur `IdentityRequest` erlaubt
//! - Im Zustand `Aktiv` wird nur `Content` geroutet, alles andere ist ein
//!   Protokollfehler und wird verworfen
//!
//! Broadcast verschluesselt fuer jeden Empfaenger einzeln mit dessen Secret.
//! Kein Klartext und kein Ciphertext wird zwischen Empfaengern geteilt.

use bytes::Bytes;
use cryptr_core::{jetzt_ms, ClientId};
use cryptr_crypto::{decrypt, encrypt};
use cryptr_protocol::{
    besitznachweis_klartext, Envelope, NachrichtenTyp, Quittung, ZustellStatus,
};
use futures_util::future::join_all;
use std::sync::Arc;

use crate::error::{RelayError, RelayResult};
use crate::registry::{ClientHandle, ClientRecord};
use crate::server_state::RelayState;

/// Ergebnis einer gerouteten Content-Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zustellung {
    pub status: ZustellStatus,
    /// Anzahl der Empfaenger, deren Queue die Nachricht angenommen hat
    pub zugestellt: u32,
}

/// Zentraler Message-Dispatcher
pub struct MessageDispatcher {
    state: Arc<RelayState>,
}

impl MessageDispatcher {
    pub fn neu(state: Arc<RelayState>) -> Self {
        Self { state }
    }

    // -----------------------------------------------------------------------
    // Registrierung
    // -----------------------------------------------------------------------

    /// Verarbeitet eine Identitaetsanfrage und meldet `handle` an
    ///
    /// - leerer Absender: neue Identitaet erzeugen
    /// - sonst: Wiederanmeldung mit Besitznachweis, siehe [`Self::besitz_pruefen`]
    ///
    /// Die Antwort (`IdentityResponse`) steht in der Queue von `handle`,
    /// bevor der Client fuer andere erreichbar ist.
    pub fn identitaet_verarbeiten(
        &self,
        frame: Bytes,
        handle: ClientHandle,
    ) -> RelayResult<ClientRecord> {
        let anfrage = Envelope::dekodieren(frame)?;
        if anfrage.typ != NachrichtenTyp::IdentityRequest {
            return Err(RelayError::protokoll(format!(
                "{:?} vor der Registrierung",
                anfrage.typ
            )));
        }

        let neu = anfrage.absender.is_empty();
        let record = if neu {
            self.state
                .registry
                .identitaet_erzeugen(self.state.seed.as_bytes(), jetzt_ms(), None)?
        } else {
            self.besitz_pruefen(&anfrage)?
        };

        let antwort = Envelope::identitaet_antwort(
            Bytes::copy_from_slice(record.id.as_bytes()),
            record.zeitstempel_ms,
            self.state.seed.bytes(),
        );
        match self.state.registry.verbindung_anmelden(&record.id, handle, antwort) {
            Ok(record) => Ok(record),
            Err(e) => {
                // Eine nie ausgelieferte Identitaet kennt niemand
                if neu {
                    self.state.registry.entfernen(&record.id);
                }
                Err(e)
            }
        }
    }

    /// Prueft den Besitznachweis einer Wiederanmeldung
    ///
    /// `payload` muss [`besitznachweis_klartext`] aus eigener Id und dem
    /// Envelope-Zeitstempel sein, versiegelt mit dem eigenen Secret. Der
    /// Zeitstempel muss im `nachweis_fenster` liegen und juenger als der
    /// zuletzt angenommene sein.
    fn besitz_pruefen(&self, anfrage: &Envelope) -> RelayResult<ClientRecord> {
        let id = ClientId::aus_bytes(&anfrage.absender)
            .map_err(|e| RelayError::protokoll(format!("Ungueltige Absender-Id: {e}")))?;

        let bestehend = self
            .state
            .registry
            .nachschlagen(&id)
            .ok_or_else(|| RelayError::registrierung(format!("Unbekannte Identitaet {id}")))?;

        let abweichung = jetzt_ms().abs_diff(anfrage.zeitstempel_ms);
        if u128::from(abweichung) > self.state.config.nachweis_fenster.as_millis() {
            return Err(RelayError::registrierung(format!(
                "Besitznachweis ausserhalb des Zeitfensters ({abweichung} ms Abweichung)"
            )));
        }

        let beweis = decrypt(&anfrage.payload, bestehend.secret.as_bytes())?;
        if beweis != besitznachweis_klartext(id.as_bytes(), anfrage.zeitstempel_ms) {
            return Err(RelayError::registrierung("Besitznachweis passt nicht zur Id"));
        }

        let record = self
            .state
            .registry
            .nachweis_verbrauchen(&id, anfrage.zeitstempel_ms)?;
        tracing::info!(client = %id, "Identitaet wieder angemeldet");
        Ok(record)
    }

    // -----------------------------------------------------------------------
    // Aktive Verbindung
    // -----------------------------------------------------------------------

    /// Verarbeitet einen eingehenden Frame eines angemeldeten Clients
    ///
    /// # Fehler
    /// - `Envelope` / `Protokoll` bei kaputtem Frame, falschem Typ oder Absender
    /// - `Krypto` wenn der Payload nicht mit dem Secret des Absenders passt
    /// - `Routing` wenn das Unicast-Ziel unbekannt ist (Quittung ist dann
    ///   bereits eingereiht)
    pub async fn eingehend_verarbeiten(
        &self,
        absender: &ClientRecord,
        frame: Bytes,
    ) -> RelayResult<Zustellung> {
        let envelope = Envelope::dekodieren(frame)?;

        if envelope.absender != absender.id.as_bytes() {
            return Err(RelayError::protokoll("Absender-Id passt nicht zur Verbindung"));
        }
        if envelope.typ != NachrichtenTyp::Content {
            return Err(RelayError::protokoll(format!(
                "{:?} im aktiven Zustand nicht erlaubt",
                envelope.typ
            )));
        }

        let klartext = decrypt(&envelope.payload, absender.secret.as_bytes())?;

        let ergebnis = if envelope.ist_broadcast() {
            Ok(self.broadcast(absender, &envelope, &klartext).await)
        } else {
            self.unicast(absender, &envelope, &klartext).await
        };

        let zustellung = match &ergebnis {
            Ok(z) => *z,
            Err(_) => Zustellung {
                status: ZustellStatus::UnbekanntesZiel,
                zugestellt: 0,
            },
        };
        if self.state.config.quittungen_senden {
            self.quittung_senden(absender, zustellung).await;
        }

        ergebnis
    }

    async fn unicast(
        &self,
        absender: &ClientRecord,
        envelope: &Envelope,
        klartext: &[u8],
    ) -> RelayResult<Zustellung> {
        let ziel = ClientId::aus_bytes(&envelope.ziel)
            .ok()
            .and_then(|id| self.state.registry.nachschlagen(&id))
            .filter(ClientRecord::ist_verbunden);

        let Some(ziel) = ziel else {
            let ziel_hex = hex::encode(&envelope.ziel);
            tracing::info!(client = %absender.id, ziel = %ziel_hex, "Unicast an unbekanntes Ziel");
            return Err(RelayError::Routing { ziel: ziel_hex });
        };

        let zugestellt = self.zustellen_an(&ziel, envelope, klartext).await;
        Ok(Zustellung {
            status: if zugestellt {
                ZustellStatus::Zugestellt
            } else {
                ZustellStatus::Fehlgeschlagen
            },
            zugestellt: u32::from(zugestellt),
        })
    }

    async fn broadcast(
        &self,
        absender: &ClientRecord,
        envelope: &Envelope,
        klartext: &[u8],
    ) -> Zustellung {
        let empfaenger: Vec<ClientRecord> = self
            .state
            .registry
            .schnappschuss()
            .into_iter()
            .filter(|r| r.ist_verbunden())
            .filter(|r| self.state.config.absender_einschliessen || r.id != absender.id)
            .collect();

        let versuche = empfaenger.len();
        let ergebnisse =
            join_all(empfaenger.iter().map(|r| self.zustellen_an(r, envelope, klartext))).await;
        let zugestellt = ergebnisse.into_iter().filter(|ok| *ok).count() as u32;

        tracing::debug!(
            client = %absender.id,
            empfaenger = versuche,
            zugestellt,
            "Broadcast verteilt"
        );

        Zustellung {
            status: if versuche > 0 && zugestellt == 0 {
                ZustellStatus::Fehlgeschlagen
            } else {
                ZustellStatus::Zugestellt
            },
            zugestellt,
        }
    }

    /// Verschluesselt `klartext` mit dem Secret des Empfaengers und reiht ihn ein
    ///
    /// Schlaegt die Zustellung fehl, wird der Empfaenger abgemeldet.
    async fn zustellen_an(
        &self,
        empfaenger: &ClientRecord,
        original: &Envelope,
        klartext: &[u8],
    ) -> bool {
        let Some(handle) = empfaenger.handle.as_ref() else {
            return false;
        };

        let ergebnis = match encrypt(klartext, empfaenger.secret.as_bytes()) {
            Ok(ciphertext) => {
                let envelope = Envelope::inhalt(
                    original.absender.clone(),
                    original.ziel.clone(),
                    original.zeitstempel_ms,
                    Bytes::from(ciphertext),
                );
                handle.zustellen(envelope, self.state.config.send_timeout).await
            }
            Err(e) => Err(e.into()),
        };

        match ergebnis {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    client = %empfaenger.id,
                    fehler = %e,
                    "Zustellung fehlgeschlagen, Empfaenger wird abgemeldet"
                );
                self.state
                    .registry
                    .verbindung_entfernen(&empfaenger.id, handle.verbindungs_nr());
                false
            }
        }
    }

    async fn quittung_senden(&self, absender: &ClientRecord, zustellung: Zustellung) {
        let Some(handle) = absender.handle.as_ref() else {
            return;
        };

        let quittung = Quittung {
            status: zustellung.status,
            zugestellt: zustellung.zugestellt,
        };
        let ciphertext = match encrypt(&quittung.kodieren(), absender.secret.as_bytes()) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(
                    client = %absender.id,
                    fehler = %e,
                    "Quittung nicht verschluesselbar"
                );
                return;
            }
        };

        let envelope = Envelope::quittung(
            Bytes::copy_from_slice(absender.id.as_bytes()),
            jetzt_ms(),
            Bytes::from(ciphertext),
        );
        if let Err(e) = handle.zustellen(envelope, self.state.config.send_timeout).await {
            tracing::debug!(client = %absender.id, fehler = %e, "Quittung nicht zustellbar");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
