//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable (ueberstimmt die Konfigurationsdatei):
//! - `SKY_LOG_LEVEL`: Log-Level oder Filter-Direktive, Standard: info
//! - `SKY_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Sitzungs-ID und Callsign kommen als Span-Felder in jede Zeile.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};

/// Abschnitt `[logging]` der Client-Konfiguration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl LogConfig {
    pub fn validieren(&self) -> Result<(), String> {
        if EnvFilter::try_new(&self.level).is_err() {
            return Err(format!("ungueltiger Log-Level: {}", self.level));
        }
        if !log_format_gueltig(&self.format) {
            return Err(format!("ungueltiges Log-Format: {}", self.format));
        }
        Ok(())
    }
}

/// Initialisiert das Logging-System.
///
/// `SKY_LOG_LEVEL` und `SKY_LOG_FORMAT` haben Vorrang vor `config`.
/// Der Audio-Takt loggt nur auf `trace`; im Normalbetrieb bleibt er still.
pub fn logging_initialisieren(config: &LogConfig) {
    let wirksam = mit_umgebung(config);
    let filter = EnvFilter::try_new(&wirksam.level).unwrap_or_else(|_| EnvFilter::new("info"));

    match wirksam.format.as_str() {
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
            fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_names(true)
                .init();
        }
    }
}

/// Konfiguration nach Anwendung der Umgebungsvariablen
pub fn mit_umgebung(config: &LogConfig) -> LogConfig {
    LogConfig {
        level: std::env::var("SKY_LOG_LEVEL").unwrap_or_else(|_| config.level.clone()),
        format: std::env::var("SKY_LOG_FORMAT").unwrap_or_else(|_| config.format.clone()),
    }
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}
