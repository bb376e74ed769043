//! cryptr-client – Zeilen-Chat ueber das Relay
//!
//! Startet mit dem gespeicherten Profil oder fordert eine neue Identitaet
//! an. Jede Zeile auf stdin wird gesendet, empfangene Nachrichten gehen
//! nach stdout, Logs nach stderr.

use anyhow::{Context, Result};
use clap::Parser;
use cryptr_client::{anzeige, sitzung_oeffnen, ClientError, ClientProfil, Eingabe};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "cryptr-client", version)]
#[command(about = "Verschluesselter Chat ueber ein cryptr-Relay", long_about = None)]
struct Cli {
    /// Profil-Datei (Standard: <Konfigurationsverzeichnis>/cryptr.toml)
    #[arg(short, long, env = "CRYPTR_PROFIL")]
    profil: Option<PathBuf>,

    /// TCP-Adresse des Relays fuer eine neue Identitaet
    #[arg(short, long, default_value = "127.0.0.1:9987")]
    server: String,

    /// Vorhandenes Profil ersetzen und eine neue Identitaet anfordern
    #[arg(long)]
    neu: bool,

    /// Filter-Direktive fuer die Logs auf stderr
    #[arg(long, env = "CRYPTR_LOG_LEVEL", default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let pfad = cli.profil.unwrap_or_else(ClientProfil::standard_pfad);
    let mut client = sitzung_oeffnen(&pfad, &cli.server, cli.neu)
        .await
        .with_context(|| format!("Sitzung mit Profil {} fehlgeschlagen", pfad.display()))?;
    let eigene_id = client
        .identitaet()
        .map(|i| i.client_id().clone())
        .context("Sitzung ohne Identitaet")?;

    println!("Angemeldet als {eigene_id}");
    println!("'@<id> text' sendet privat, jede andere Zeile an alle, /quit beendet");

    let mut zeilen = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            zeile = zeilen.next_line() => {
                let Some(zeile) = zeile? else {
                    break;
                };
                match Eingabe::parsen(&zeile) {
                    Ok(Eingabe::Unicast { ziel, text }) => {
                        client.unicast_senden(&ziel, text.as_bytes()).await?;
                    }
                    Ok(Eingabe::Broadcast(text)) => client.broadcast_senden(text.as_bytes()).await?,
                    Ok(Eingabe::EigeneId) => println!("{eigene_id}"),
                    Ok(Eingabe::Beenden) => break,
                    Ok(Eingabe::Leer) => {}
                    Err(e) => eprintln!("! {e}"),
                }
            }

            nachricht = client.empfangen() => {
                match nachricht {
                    Ok(nachricht) => {
                        if let Some(zeile) = anzeige(&nachricht) {
                            println!("{zeile}");
                        }
                    }
                    Err(ClientError::VerbindungGetrennt) => {
                        eprintln!("! Relay hat die Verbindung getrennt");
                        break;
                    }
                    Err(e) => tracing::warn!(fehler = %e, "Nachricht verworfen"),
                }
            }
        }
    }

    if let Err(e) = client.schliessen().await {
        tracing::debug!(fehler = %e, "Verbindung beim Beenden bereits zu");
    }
    Ok(())
}
