//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (ueberschreibt `[logging]`):
//! - `CRYPTR_LOG_LEVEL`: Filter-Direktive (z.B. `info` oder
//!   `cryptr_relay=debug,info`)
//! - `CRYPTR_LOG_FORMAT`: Format (text/json)

use tracing_subscriber::{fmt, EnvFilter};

pub const LOG_LEVEL_ENV: &str = "CRYPTR_LOG_LEVEL";
pub const LOG_FORMAT_ENV: &str = "CRYPTR_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Umgebungsvariablen haben Vorrang vor den konfigurierten Werten. Ein
/// ungueltiger Filter faellt auf `info` zurueck.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(LOG_LEVEL_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = format_waehlen(std::env::var(LOG_FORMAT_ENV).ok(), format);

    match format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Waehlt das Ausgabeformat: Umgebung vor Konfiguration, Unbekanntes wird "text"
pub fn format_waehlen(aus_env: Option<String>, konfiguriert: &str) -> String {
    let gewaehlt = aus_env.unwrap_or_else(|| konfiguriert.to_string());
    if log_format_gueltig(&gewaehlt) {
        gewaehlt
    } else {
        "text".to_string()
    }
}

/// Prueft `[logging] level`: ein Level oder eine Liste `ziel=level,...`
///
/// Jede Direktive muss auf ein bekanntes Level enden. Reine Zielnamen
/// (`verbose`) nimmt `EnvFilter` zwar an, sie sind in der Konfiguration
/// aber fast immer ein Tippfehler.
pub fn log_level_gueltig(level: &str) -> bool {
    !level.trim().is_empty()
        && level.split(',').all(|direktive| {
            let stufe = direktive.rsplit('=').next().unwrap_or_default().trim();
            ["trace", "debug", "info", "warn", "error", "off"]
                .iter()
                .any(|s| s.eq_ignore_ascii_case(stufe))
        })
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
