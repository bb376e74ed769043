//! Lokale Identitaet eines Clients
//!
//! Das Secret wird aus (Seed, ClientId, Zeitstempel) lokal abgeleitet und
//! verlaesst den Prozess nie.

use cryptr_core::ClientId;
use cryptr_crypto::{decrypt, derive_secret, encrypt, ClientSecret, Seed};
use cryptr_protocol::besitznachweis_klartext;

use crate::error::ClientResult;

#[derive(Debug, Clone)]
pub struct Identitaet {
    client_id: ClientId,
    zeitstempel_ms: u64,
    seed: Seed,
    secret: ClientSecret,
}

impl Identitaet {
    /// Leitet das Secret ab, wie es auch der Server tut
    pub fn ableiten(client_id: ClientId, zeitstempel_ms: u64, seed: Seed) -> ClientResult<Self> {
        let secret = derive_secret(seed.as_bytes(), &client_id, zeitstempel_ms)?;
        Ok(Self {
            client_id,
            zeitstempel_ms,
            seed,
            secret,
        })
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn zeitstempel_ms(&self) -> u64 {
        self.zeitstempel_ms
    }

    pub fn seed(&self) -> &Seed {
        &self.seed
    }

    pub fn secret(&self) -> &ClientSecret {
        &self.secret
    }

    pub fn versiegeln(&self, klartext: &[u8]) -> ClientResult<Vec<u8>> {
        Ok(encrypt(klartext, self.secret.as_bytes())?)
    }

    pub fn oeffnen(&self, ciphertext: &[u8]) -> ClientResult<Vec<u8>> {
        Ok(decrypt(ciphertext, self.secret.as_bytes())?)
    }

    /// Besitznachweis fuer die Wiederanmeldung
    ///
    /// `zeitstempel_ms` muss auch im Envelope der Anfrage stehen. Das Relay
    /// nimmt ihn nur nahe der eigenen Uhrzeit und nur einmal an.
    pub fn besitznachweis(&self, zeitstempel_ms: u64) -> ClientResult<Vec<u8>> {
        self.versiegeln(&besitznachweis_klartext(self.client_id.as_bytes(), zeitstempel_ms))
    }
}
