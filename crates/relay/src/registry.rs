//! Client-Registry – Wer ist registriert, wer ist verbunden
//!
//! Nebenlaeufige Map `ClientId -> ClientRecord` auf Basis von DashMap.
//! Schreibzugriffe sind pro Eintrag exklusiv (Shard-Lock), Leser sehen
//! entweder den alten oder den neuen vollstaendigen Wert. Aufrufer erhalten
//! nur Clones, es wird kein Lock ueber ein `await` gehalten.

use cryptr_core::ClientId;
use cryptr_crypto::{derive_secret, ClientSecret};
use cryptr_protocol::Envelope;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};

use crate::error::{RelayError, RelayResult};

// ---------------------------------------------------------------------------
// ClientHandle
// ---------------------------------------------------------------------------

/// Handle auf die Send-Queue einer Verbindung
#[derive(Clone, Debug)]
pub struct ClientHandle {
    verbindungs_nr: u64,
    tx: mpsc::Sender<Envelope>,
}

impl ClientHandle {
    pub fn neu(verbindungs_nr: u64, tx: mpsc::Sender<Envelope>) -> Self {
        Self { verbindungs_nr, tx }
    }

    pub fn verbindungs_nr(&self) -> u64 {
        self.verbindungs_nr
    }

    /// Reiht ein Envelope ein und wartet hoechstens `timeout` auf freien Platz
    ///
    /// # Fehler
    /// - `Timeout` wenn die Queue so lange voll bleibt
    /// - `VerbindungGetrennt` wenn der Schreib-Task beendet ist
    pub async fn zustellen(&self, envelope: Envelope, timeout: Duration) -> RelayResult<()> {
        match self.tx.send_timeout(envelope, timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(RelayError::Timeout),
            Err(SendTimeoutError::Closed(_)) => Err(RelayError::VerbindungGetrennt),
        }
    }

    /// Reiht ein Envelope ohne Warten ein
    pub fn sofort_zustellen(&self, envelope: Envelope) -> RelayResult<()> {
        match self.tx.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(RelayError::Timeout),
            Err(TrySendError::Closed(_)) => Err(RelayError::VerbindungGetrennt),
        }
    }
}

// ---------------------------------------------------------------------------
// ClientRecord
// ---------------------------------------------------------------------------

/// Registrierungseintrag eines Clients
#[derive(Clone, Debug)]
pub struct ClientRecord {
    pub id: ClientId,
    pub secret: Arc<ClientSecret>,
    /// Zeitstempel der Ableitung (Millisekunden, UTC)
    pub zeitstempel_ms: u64,
    /// `None` solange keine Verbindung angemeldet ist (HTTP-Bootstrap)
    pub handle: Option<ClientHandle>,
    pub registriert_am: Instant,
    /// Zeitstempel des letzten angenommenen Besitznachweises (0 = keiner)
    pub letzter_nachweis_ms: u64,
}

impl ClientRecord {
    pub fn ist_verbunden(&self) -> bool {
        self.handle.is_some()
    }

    /// `true` wenn der Eintrag zur Verbindung `verbindungs_nr` gehoert
    pub fn gehoert_zu(&self, verbindungs_nr: u64) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| h.verbindungs_nr == verbindungs_nr)
    }
}

// ---------------------------------------------------------------------------
// ClientRegistry
// ---------------------------------------------------------------------------

/// Zentrale Registry aller Clients
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<ClientId, ClientRecord>,
}

impl ClientRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Erzeugt eine neue Identitaet, leitet ihr Secret ab und fuegt sie ein
    ///
    /// Kollidiert die Zufalls-Id mit einer bestehenden, wird neu gewuerfelt.
    pub fn identitaet_erzeugen(
        &self,
        seed: &[u8],
        zeitstempel_ms: u64,
        handle: Option<ClientHandle>,
    ) -> RelayResult<ClientRecord> {
        loop {
            let id = zufaellige_id()?;
            let secret = Arc::new(derive_secret(seed, &id, zeitstempel_ms)?);

            match self.clients.entry(id) {
                Entry::Occupied(eintrag) => {
                    tracing::warn!(client = %eintrag.key(), "ClientId-Kollision, neuer Versuch");
                }
                Entry::Vacant(eintrag) => {
                    let record = ClientRecord {
                        id: eintrag.key().clone(),
                        secret,
                        zeitstempel_ms,
                        handle,
                        registriert_am: Instant::now(),
                        letzter_nachweis_ms: 0,
                    };
                    tracing::info!(client = %record.id, "Neue Identitaet vergeben");
                    eintrag.insert(record.clone());
                    return Ok(record);
                }
            }
        }
    }

    /// Verbucht einen geprueften Besitznachweis
    ///
    /// Nimmt pro Identitaet nur streng steigende Zeitstempel an, ein
    /// mitgeschnittener Nachweis laesst sich so nicht erneut verwenden.
    /// Das Handle bleibt unveraendert.
    pub fn nachweis_verbrauchen(
        &self,
        id: &ClientId,
        zeitstempel_ms: u64,
    ) -> RelayResult<ClientRecord> {
        let mut record = self
            .clients
            .get_mut(id)
            .ok_or_else(|| RelayError::registrierung(format!("Unbekannte Identitaet {id}")))?;
        if zeitstempel_ms <= record.letzter_nachweis_ms {
            return Err(RelayError::registrierung(format!(
                "Besitznachweis fuer {id} bereits verwendet"
            )));
        }
        record.letzter_nachweis_ms = zeitstempel_ms;
        Ok(record.clone())
    }

    /// Haengt `handle` an eine bestehende Identitaet und reiht `antwort` ein
    ///
    /// Beides geschieht unter dem Lock des Eintrags: wer den Client ueber die
    /// Registry findet, findet `antwort` bereits in seiner Queue. Ein
    /// vorheriges Handle wird ersetzt.
    pub fn verbindung_anmelden(
        &self,
        id: &ClientId,
        handle: ClientHandle,
        antwort: Envelope,
    ) -> RelayResult<ClientRecord> {
        let mut record = self
            .clients
            .get_mut(id)
            .ok_or_else(|| RelayError::registrierung(format!("Identitaet {id} nicht mehr da")))?;
        handle.sofort_zustellen(antwort)?;
        if record.handle.replace(handle).is_some() {
            tracing::debug!(client = %id, "Verbindungs-Handle ersetzt");
        }
        Ok(record.clone())
    }

    pub fn nachschlagen(&self, id: &ClientId) -> Option<ClientRecord> {
        self.clients.get(id).map(|r| r.clone())
    }

    pub fn entfernen(&self, id: &ClientId) -> Option<ClientRecord> {
        self.clients.remove(id).map(|(_, record)| record)
    }

    /// Entfernt den Client nur, wenn sein Handle zur Verbindung `verbindungs_nr`
    /// gehoert. Eine ersetzte Verbindung loescht so nicht die neuere.
    pub fn verbindung_entfernen(&self, id: &ClientId, verbindungs_nr: u64) -> bool {
        let entfernt = self
            .clients
            .remove_if(id, |_, record| record.gehoert_zu(verbindungs_nr))
            .is_some();
        if entfernt {
            tracing::debug!(client = %id, verbindungs_nr, "Client abgemeldet");
        }
        entfernt
    }

    /// Konsistente Kopie aller Eintraege
    pub fn schnappschuss(&self) -> Vec<ClientRecord> {
        self.clients.iter().map(|r| r.value().clone()).collect()
    }

    /// Entfernt Identitaeten, die innerhalb von `ttl` keine Verbindung angemeldet haben
    ///
    /// Gibt die Anzahl der entfernten Eintraege zurueck.
    pub fn ausstehende_entfernen(&self, ttl: Duration) -> usize {
        let mut entfernt = 0;
        self.clients.retain(|_, record| {
            let behalten = record.ist_verbunden() || record.registriert_am.elapsed() < ttl;
            if !behalten {
                entfernt += 1;
            }
            behalten
        });
        entfernt
    }

    pub fn anzahl(&self) -> usize {
        self.clients.len()
    }

    pub fn verbundene_anzahl(&self) -> usize {
        self.clients.iter().filter(|r| r.ist_verbunden()).count()
    }
}

fn zufaellige_id() -> RelayResult<ClientId> {
    let mut bytes = [0u8; ClientId::STANDARD_LAENGE];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| cryptr_crypto::CryptoError::Zufall(e.to_string()))?;
    ClientId::aus_bytes(&bytes).map_err(|e| RelayError::registrierung(e.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn seed() -> Vec<u8> {
        vec![0x5A; 64]
    }

    fn handle(nr: u64) -> (ClientHandle, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(4);
        (ClientHandle::neu(nr, tx), rx)
    }

    fn secret(byte: u8) -> Arc<ClientSecret> {
        Arc::new(ClientSecret::aus_array([byte; 32]))
    }

    fn id(byte: u8) -> ClientId {
        ClientId::aus_bytes(&[byte; 24]).unwrap()
    }

    fn antwort() -> Envelope {
        Envelope::identitaet_antwort(bytes::Bytes::new(), 0, bytes::Bytes::new())
    }

    fn einfuegen(
        registry: &ClientRegistry,
        id: ClientId,
        secret: Arc<ClientSecret>,
        zeitstempel_ms: u64,
        handle: Option<ClientHandle>,
    ) {
        let record = ClientRecord {
            id: id.clone(),
            secret,
            zeitstempel_ms,
            handle,
            registriert_am: Instant::now(),
            letzter_nachweis_ms: 0,
        };
        registry.clients.insert(id, record);
    }

    #[test]
    fn registrieren_und_nachschlagen() {
        let registry = ClientRegistry::neu();
        let (h, _rx) = handle(1);
        einfuegen(&registry, id(1), secret(1), 100, Some(h));

        let record = registry.nachschlagen(&id(1)).unwrap();
        assert_eq!(record.zeitstempel_ms, 100);
        assert!(record.gehoert_zu(1));
        assert!(registry.nachschlagen(&id(2)).is_none());
    }

    #[test]
    fn reconnect_ersetzt_nur_das_handle() {
        let registry = ClientRegistry::neu();
        let (alt, _rx1) = handle(1);
        let (neu, mut rx2) = handle(2);
        einfuegen(&registry, id(1), secret(1), 100, Some(alt));
        let record = registry.verbindung_anmelden(&id(1), neu, antwort()).unwrap();

        assert_eq!(record.zeitstempel_ms, 100);
        assert_eq!(record.secret.as_bytes(), &[1u8; 32]);
        assert!(record.gehoert_zu(2));
        assert!(rx2.try_recv().is_ok());
        assert_eq!(registry.anzahl(), 1);
    }

    #[test]
    fn alte_verbindung_entfernt_neue_registrierung_nicht() {
        let registry = ClientRegistry::neu();
        let (alt, _rx1) = handle(1);
        let (neu, _rx2) = handle(2);
        einfuegen(&registry, id(1), secret(1), 100, Some(alt));
        registry.verbindung_anmelden(&id(1), neu, antwort()).unwrap();

        assert!(!registry.verbindung_entfernen(&id(1), 1));
        assert!(registry.nachschlagen(&id(1)).is_some());
        assert!(registry.verbindung_entfernen(&id(1), 2));
        assert!(registry.nachschlagen(&id(1)).is_none());
    }

    #[test]
    fn nachweis_nur_mit_steigendem_zeitstempel() {
        let registry = ClientRegistry::neu();
        let (h, _rx) = handle(1);
        einfuegen(&registry, id(1), secret(1), 0, Some(h));

        let record = registry.nachweis_verbrauchen(&id(1), 500).unwrap();
        assert_eq!(record.letzter_nachweis_ms, 500);
        assert!(record.gehoert_zu(1));

        assert!(registry.nachweis_verbrauchen(&id(1), 500).is_err());
        assert!(registry.nachweis_verbrauchen(&id(1), 499).is_err());
        assert!(registry.nachweis_verbrauchen(&id(1), 501).is_ok());
        assert!(matches!(
            registry.nachweis_verbrauchen(&id(2), 1_000),
            Err(RelayError::Registrierung(_))
        ));
    }

    #[test]
    fn verbindung_anmelden_unbekannter_identitaet() {
        let registry = ClientRegistry::neu();
        let (h, mut rx) = handle(3);
        let result = registry.verbindung_anmelden(&id(9), h, antwort());
        assert!(matches!(result, Err(RelayError::Registrierung(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn verbindung_anmelden_mit_geschlossener_queue() {
        let registry = ClientRegistry::neu();
        einfuegen(&registry, id(1), secret(1), 0, None);

        let (h, rx) = handle(1);
        drop(rx);
        let result = registry.verbindung_anmelden(&id(1), h, antwort());
        assert!(matches!(result, Err(RelayError::VerbindungGetrennt)));
        assert!(!registry.nachschlagen(&id(1)).unwrap().ist_verbunden());
    }

    #[test]
    fn entfernen() {
        let registry = ClientRegistry::neu();
        einfuegen(&registry, id(1), secret(1), 0, None);
        assert!(registry.entfernen(&id(1)).is_some());
        assert!(registry.entfernen(&id(1)).is_none());
        assert_eq!(registry.anzahl(), 0);
    }

    #[test]
    fn identitaet_erzeugen_leitet_secret_ab() {
        let registry = ClientRegistry::neu();
        let record = registry.identitaet_erzeugen(&seed(), 1234, None).unwrap();

        assert_eq!(record.id.as_bytes().len(), ClientId::STANDARD_LAENGE);
        let erwartet = derive_secret(&seed(), &record.id, 1234).unwrap();
        assert_eq!(*record.secret, erwartet);
        assert!(!record.ist_verbunden());
        assert_eq!(registry.anzahl(), 1);
    }

    #[test]
    fn identitaet_erzeugen_mit_zu_kurzem_seed() {
        let registry = ClientRegistry::neu();
        let result = registry.identitaet_erzeugen(&[0u8; 10], 0, None);
        assert!(matches!(result, Err(RelayError::Krypto(_))));
        assert_eq!(registry.anzahl(), 0);
    }

    #[test]
    fn parallele_registrierungen_erzeugen_eindeutige_ids() {
        let registry = Arc::new(ClientRegistry::neu());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| registry.identitaet_erzeugen(&seed(), 0, None).unwrap().id)
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for t in threads {
            for id in t.join().unwrap() {
                assert!(ids.insert(id));
            }
        }
        assert_eq!(ids.len(), 400);
        assert_eq!(registry.anzahl(), 400);
    }

    #[test]
    fn schnappschuss_enthaelt_alle_eintraege() {
        let registry = ClientRegistry::neu();
        let (h, _rx) = handle(1);
        einfuegen(&registry, id(1), secret(1), 0, Some(h));
        einfuegen(&registry, id(2), secret(2), 0, None);

        let snapshot = registry.schnappschuss();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.verbundene_anzahl(), 1);
    }

    #[test]
    fn ausstehende_identitaeten_werden_entfernt() {
        let registry = ClientRegistry::neu();
        let (h, _rx) = handle(1);
        einfuegen(&registry, id(1), secret(1), 0, Some(h));
        einfuegen(&registry, id(2), secret(2), 0, None);

        // TTL null: jede nicht verbundene Identitaet ist abgelaufen
        assert_eq!(registry.ausstehende_entfernen(Duration::ZERO), 1);
        assert!(registry.nachschlagen(&id(1)).is_some());
        assert!(registry.nachschlagen(&id(2)).is_none());

        einfuegen(&registry, id(3), secret(3), 0, None);
        assert_eq!(registry.ausstehende_entfernen(Duration::from_secs(60)), 0);
    }

    #[tokio::test]
    async fn zustellen_an_geschlossene_queue() {
        let (h, rx) = handle(1);
        drop(rx);
        let env = Envelope::quittung(bytes::Bytes::new(), 0, bytes::Bytes::new());
        let result = h.zustellen(env, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(RelayError::VerbindungGetrennt)));
    }

    #[tokio::test]
    async fn zustellen_an_volle_queue_laeuft_in_timeout() {
        let (tx, _rx) = mpsc::channel(1);
        let h = ClientHandle::neu(1, tx);
        let env = Envelope::quittung(bytes::Bytes::new(), 0, bytes::Bytes::new());
        h.zustellen(env.clone(), Duration::from_millis(10)).await.unwrap();
        let result = h.zustellen(env, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(RelayError::Timeout)));
    }
}
