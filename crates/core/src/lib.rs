//! skyband-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Skyband-Crates gemeinsam genutzt werden: Rufzeichen,
//! Funkfrequenzen, Sitzungs-IDs und die Fehler-Taxonomie der Voice-Engine.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{Result, SkybandError};
pub use types::{Callsign, FrequencyHz, SitzungsId};
