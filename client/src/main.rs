//! Skyband Client – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Client.

use anyhow::Result;
use skyband_client::{config::ClientConfig, Client};
use skyband_observability::logging_initialisieren;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("SKYBAND_CONFIG").unwrap_or_else(|_| "skyband.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = ClientConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Skyband Client wird initialisiert"
    );

    Client::neu(config).starten().await
}
