//! # skyband-observability
//!
//! Observability-Crate fuer Skyband:
//! - Prometheus-Metriken der Voice-Sitzung, exportiert als Textfile
//!   (node_exporter Textfile-Collector)
//! - Structured Logging (Text oder JSON) via tracing-subscriber

pub mod logging;
pub mod metrics;

pub use logging::{logging_initialisieren, LogConfig};
pub use metrics::{textfile_exporter_starten, MetrikConfig, VoiceMetriken};
