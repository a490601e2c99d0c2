//! Codec-Konfiguration fuer die Sprachuebertragung
//!
//! Definiert die Codec-Auswahl (Opus oder G.711 mu-law), Abtastraten und
//! vordefinierte Funk-Presets. Die Codec-Art wird in jedem Voice-Paket
//! mitgesendet, damit Empfaenger mit dem Codec des Senders dekodieren.

use serde::{Deserialize, Serialize};

/// Dauer eines Audio-Frames in Millisekunden (fester Takt der Engine)
pub const FRAME_DAUER_MS: u32 = 20;

/// Anzahl Samples eines 20ms-Frames bei gegebener Abtastrate
pub fn samples_pro_frame(rate_hz: u32) -> usize {
    (rate_hz * FRAME_DAUER_MS / 1000) as usize
}

// ---------------------------------------------------------------------------
// Codec-Art
// ---------------------------------------------------------------------------

/// Verwendeter Sprach-Codec
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecArt {
    /// Opus – Standard-Codec fuer Sprache
    #[default]
    Opus,
    /// PCMU (G.711 mu-law) – verlustarm, ohne Codec-Zustand
    Pcmu,
}

impl CodecArt {
    /// Kennung im Wire-Format
    pub fn wire_id(&self) -> u8 {
        match self {
            Self::Opus => 1,
            Self::Pcmu => 2,
        }
    }

    /// Konvertiert eine Wire-Kennung zurueck
    pub fn from_wire_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Opus),
            2 => Some(Self::Pcmu),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Abtastrate
// ---------------------------------------------------------------------------

/// Abtastrate des Codecs
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleRate {
    /// 8 kHz – Schmalband (Funk-/Telefon-Qualitaet)
    Hz8000 = 8000,
    /// 12 kHz – Mittelband
    Hz12000 = 12000,
    /// 16 kHz – Breitband
    Hz16000 = 16000,
    /// 24 kHz – Superbreitband
    Hz24000 = 24000,
    /// 48 kHz – Vollband (Rate des Mixers und der Audio-Geraete)
    #[default]
    Hz48000 = 48000,
}

impl SampleRate {
    /// Gibt die Rate in Hz zurueck
    pub fn hz(&self) -> u32 {
        *self as u32
    }

    /// Samples eines 20ms-Frames bei dieser Rate
    pub fn samples_pro_frame(&self) -> usize {
        samples_pro_frame(self.hz())
    }
}

/// Opus-Anwendungsmodus
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpusApplication {
    /// Optimiert fuer Sprachverstaendlichkeit (VOIP)
    #[default]
    Voip,
    /// Minimale Verarbeitungsverzoegerung
    RestrictedLowdelay,
}

// ---------------------------------------------------------------------------
// CodecConfig
// ---------------------------------------------------------------------------

/// Vollstaendige Codec-Konfiguration einer Sitzung
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Codec-Art
    pub art: CodecArt,
    /// Abtastrate des Codecs (Mixer und Geraete laufen immer mit 48 kHz)
    pub sample_rate: SampleRate,
    /// Ziel-Bitrate in kbps (nur Opus, 6–510)
    pub bitrate_kbps: u16,
    /// Anwendungsmodus (nur Opus)
    pub application: OpusApplication,
    /// In-Band Forward Error Correction (nur Opus)
    pub fec_enabled: bool,
    /// Komplexitaet (0–10, nur Opus)
    pub complexity: u8,
    /// Variable Bitrate (nur Opus)
    pub vbr_enabled: bool,
}

impl Default for CodecConfig {
    fn default() -> Self {
        FunkPreset::Funk.config()
    }
}

impl CodecConfig {
    /// Validiert die Konfiguration
    pub fn validieren(&self) -> Result<(), String> {
        if self.art == CodecArt::Opus {
            if self.bitrate_kbps < 6 || self.bitrate_kbps > 510 {
                return Err(format!(
                    "Bitrate muss zwischen 6 und 510 kbps liegen (war: {})",
                    self.bitrate_kbps
                ));
            }
            if self.complexity > 10 {
                return Err(format!(
                    "Komplexitaet muss zwischen 0 und 10 liegen (war: {})",
                    self.complexity
                ));
            }
        }
        Ok(())
    }

    /// Samples eines Codec-Frames
    pub fn samples_pro_frame(&self) -> usize {
        self.sample_rate.samples_pro_frame()
    }
}

// ---------------------------------------------------------------------------
// Funk-Presets
// ---------------------------------------------------------------------------

/// Vordefinierte Codec-Konfigurationen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunkPreset {
    /// Opus 16 kHz mit FEC – Standard fuer Funkverkehr
    Funk,
    /// Opus 48 kHz, keine Resampling-Stufe
    Vollband,
    /// G.711 mu-law 8 kHz – klassisches Schmalband
    Schmalband,
}

impl FunkPreset {
    /// Gibt die vordefinierte `CodecConfig` fuer dieses Preset zurueck
    pub fn config(&self) -> CodecConfig {
        match self {
            FunkPreset::Funk => CodecConfig {
                art: CodecArt::Opus,
                sample_rate: SampleRate::Hz16000,
                bitrate_kbps: 24,
                application: OpusApplication::Voip,
                fec_enabled: true,
                complexity: 8,
                vbr_enabled: true,
            },
            FunkPreset::Vollband => CodecConfig {
                art: CodecArt::Opus,
                sample_rate: SampleRate::Hz48000,
                bitrate_kbps: 32,
                application: OpusApplication::Voip,
                fec_enabled: true,
                complexity: 9,
                vbr_enabled: true,
            },
            FunkPreset::Schmalband => CodecConfig {
                art: CodecArt::Pcmu,
                sample_rate: SampleRate::Hz8000,
                bitrate_kbps: 64,
                application: OpusApplication::Voip,
                fec_enabled: false,
                complexity: 0,
                vbr_enabled: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_groessen() {
        assert_eq!(samples_pro_frame(48_000), 960);
        assert_eq!(SampleRate::Hz16000.samples_pro_frame(), 320);
        assert_eq!(SampleRate::Hz8000.samples_pro_frame(), 160);
    }

    #[test]
    fn codec_wire_ids() {
        for art in [CodecArt::Opus, CodecArt::Pcmu] {
            assert_eq!(CodecArt::from_wire_id(art.wire_id()), Some(art));
        }
        assert_eq!(CodecArt::from_wire_id(0), None);
    }

    #[test]
    fn presets_sind_valide() {
        for preset in [FunkPreset::Funk, FunkPreset::Vollband, FunkPreset::Schmalband] {
            assert!(preset.config().validieren().is_ok(), "{preset:?}");
        }
    }

    #[test]
    fn ungueltige_opus_bitrate() {
        let mut config = CodecConfig::default();
        config.bitrate_kbps = 5;
        assert!(config.validieren().is_err());

        // Fuer PCMU ist die Bitrate bedeutungslos
        config.art = CodecArt::Pcmu;
        assert!(config.validieren().is_ok());
    }
}
