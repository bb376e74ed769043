//! Sitzungsaufbau fuer den Chat-Client
//!
//! Mit vorhandenem Profil: Secret neu ableiten und per Besitznachweis
//! wieder anmelden. Das Relay vergisst eine Identitaet, sobald ihre letzte
//! Verbindung endet. Bestaetigt es die Anmeldung nicht, wird wie ohne
//! Profil eine neue Identitaet angefordert und das Profil ersetzt.

use std::io;
use std::path::Path;
use std::time::Duration;

use crate::client::RelayClient;
use crate::error::{ClientError, ClientResult};
use crate::profil::ClientProfil;

/// So lange wird auf die Bestaetigung einer Wiederanmeldung gewartet
pub const ANMELDE_TIMEOUT: Duration = Duration::from_secs(3);

/// Oeffnet eine angemeldete Sitzung
///
/// `server` gilt nur ohne Profil, ein geladenes Profil bringt seine eigene
/// Relay-Adresse mit. Mit `neu` wird ein vorhandenes Profil ignoriert.
pub async fn sitzung_oeffnen(pfad: &Path, server: &str, neu: bool) -> ClientResult<RelayClient> {
    if neu {
        return neue_identitaet(pfad, server).await;
    }

    let profil = match ClientProfil::laden(pfad) {
        Ok(profil) => profil,
        Err(ClientError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            tracing::info!(pfad = %pfad.display(), "Kein Profil, fordere neue Identitaet an");
            return neue_identitaet(pfad, server).await;
        }
        Err(e) => return Err(e),
    };

    match wieder_anmelden(&profil).await {
        Err(ClientError::NichtBestaetigt) => {
            tracing::warn!(
                client = %profil.client_id,
                server = %profil.server,
                "Relay kennt die Identitaet nicht mehr, fordere neue an"
            );
            neue_identitaet(pfad, &profil.server).await
        }
        ergebnis => ergebnis,
    }
}

async fn wieder_anmelden(profil: &ClientProfil) -> ClientResult<RelayClient> {
    let identitaet = profil.identitaet()?;
    let mut client = RelayClient::verbinden(profil.server.as_str()).await?;

    // Ein abgelehnter Nachweis bleibt vom Relay unbeantwortet
    tokio::time::timeout(ANMELDE_TIMEOUT, client.anmelden(identitaet))
        .await
        .map_err(|_| ClientError::NichtBestaetigt)??;
    Ok(client)
}

async fn neue_identitaet(pfad: &Path, server: &str) -> ClientResult<RelayClient> {
    let mut client = RelayClient::verbinden(server).await?;
    let identitaet = client.identitaet_anfordern().await?.clone();
    ClientProfil::neu(server, &identitaet).speichern(pfad)?;
    tracing::info!(
        client = %identitaet.client_id(),
        pfad = %pfad.display(),
        "Neue Identitaet gespeichert"
    );
    Ok(client)
}
