//! Gemeinsame Identifikationstypen fuer Skyband
//!
//! Newtype-Pattern fuer Rufzeichen, Frequenzen und Sitzungen, damit
//! Hz-Werte, Sequenznummern und Kennungen zur Compilezeit nicht
//! verwechselt werden koennen.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SkybandError;

/// Maximale Laenge eines Rufzeichens in Bytes
pub const MAX_CALLSIGN_LAENGE: usize = 32;

/// Grenze zwischen HF- und VHF-Band (30 MHz)
pub const HF_GRENZE_HZ: u32 = 30_000_000;

// ---------------------------------------------------------------------------
// Callsign
// ---------------------------------------------------------------------------

/// Rufzeichen eines Teilnehmers (z.B. `EDDF_TWR`, `DLH4CK`)
///
/// Erlaubt sind ASCII-Buchstaben, Ziffern, `_` und `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Callsign(String);

impl Callsign {
    /// Erstellt ein Rufzeichen nach Pruefung von Laenge und Zeichensatz
    pub fn neu(wert: impl Into<String>) -> Result<Self, SkybandError> {
        let wert = wert.into();
        if wert.is_empty() {
            return Err(SkybandError::Konfiguration("Rufzeichen ist leer".into()));
        }
        if wert.len() > MAX_CALLSIGN_LAENGE {
            return Err(SkybandError::Konfiguration(format!(
                "Rufzeichen '{wert}' laenger als {MAX_CALLSIGN_LAENGE} Bytes"
            )));
        }
        if !wert
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(SkybandError::Konfiguration(format!(
                "Rufzeichen '{wert}' enthaelt ungueltige Zeichen"
            )));
        }
        Ok(Self(wert))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Callsign {
    type Error = SkybandError;

    fn try_from(wert: String) -> Result<Self, Self::Error> {
        Self::neu(wert)
    }
}

impl From<Callsign> for String {
    fn from(c: Callsign) -> Self {
        c.0
    }
}

impl std::fmt::Display for Callsign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// FrequencyHz
// ---------------------------------------------------------------------------

/// Funkfrequenz in Hz (118.300 MHz = `FrequencyHz(118_300_000)`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrequencyHz(pub u32);

impl FrequencyHz {
    /// Erstellt eine Frequenz aus einem kHz-Wert (z.B. `118_300`)
    pub const fn from_khz(khz: u32) -> Self {
        Self(khz * 1000)
    }

    /// Gibt den Rohwert in Hz zurueck
    pub fn hz(&self) -> u32 {
        self.0
    }

    /// Kurzwelle (unter 30 MHz) – eigener Klangcharakter im Mixer
    pub fn ist_hf(&self) -> bool {
        self.0 < HF_GRENZE_HZ
    }
}

impl std::fmt::Display for FrequencyHz {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:03} MHz", self.0 / 1_000_000, (self.0 % 1_000_000) / 1000)
    }
}

// ---------------------------------------------------------------------------
// SitzungsId
// ---------------------------------------------------------------------------

/// Eindeutige ID einer Voice-Sitzung (fuer Logging-Spans)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SitzungsId(pub Uuid);

impl SitzungsId {
    /// Erstellt eine neue zufaellige SitzungsId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SitzungsId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SitzungsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sitzung:{}", self.0)
    }
}
