//! Sprachaktivitaetserkennung (VAD)
//!
//! Energie-Schwelle mit Zero-Crossing-Plausibilisierung und adaptivem
//! Rauschboden. Steuert im Modus `VoiceActivation` das Senden und
//! liefert dem Transmit-Pfad den Nachlauf nach dem letzten Wort.

use serde::{Deserialize, Serialize};

use super::AudioProcessor;

/// Konfiguration der VAD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Mindest-RMS fuer Sprache (normalisiert, 0.0..1.0)
    pub energie_schwelle: f32,
    /// Oberhalb dieser Zero-Crossing-Rate gilt ein Frame als Rauschen
    pub zcr_grenze: f32,
    /// Frames, die nach der letzten Aktivitaet noch als aktiv gelten
    pub nachlauf_frames: u32,
    /// Glaettung der Energie (0.0 = keine, nahe 1.0 = stark)
    pub glaettung: f32,
    /// Sprache muss so viel lauter sein als der gemessene Rauschboden
    pub rauschabstand: f32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            energie_schwelle: 0.01,
            zcr_grenze: 0.35,
            nachlauf_frames: 15,
            glaettung: 0.6,
            rauschabstand: 2.0,
        }
    }
}

/// Voice Activity Detector fuer 20ms-Frames
pub struct Vad {
    config: VadConfig,
    geglaettete_energie: f32,
    rauschboden: f32,
    nachlauf: u32,
    aktiv: bool,
    enabled: bool,
}

impl Vad {
    pub fn neu(config: VadConfig) -> Self {
        Self {
            config,
            geglaettete_energie: 0.0,
            rauschboden: 0.0,
            nachlauf: 0,
            aktiv: false,
            enabled: true,
        }
    }

    /// Ergebnis des letzten analysierten Frames
    pub fn ist_aktiv(&self) -> bool {
        self.aktiv
    }

    /// Ob der Nachlauf nach dem letzten Sprach-Frame gerade laeuft
    pub fn im_nachlauf(&self) -> bool {
        self.aktiv && self.nachlauf < self.config.nachlauf_frames
    }

    /// Analysiert einen Frame. Die Samples werden nicht veraendert.
    pub fn erkennen(&mut self, samples: &[f32]) -> bool {
        if !self.enabled || samples.is_empty() {
            return false;
        }

        let energie = rms_energy(samples);
        let g = self.config.glaettung;
        self.geglaettete_energie = g * self.geglaettete_energie + (1.0 - g) * energie;

        let schwelle = self
            .config
            .energie_schwelle
            .max(self.rauschboden * self.config.rauschabstand);
        let laut_genug = self.geglaettete_energie > schwelle;
        let sprachartig = zero_crossing_rate(samples) < self.config.zcr_grenze;

        if laut_genug && sprachartig {
            self.nachlauf = self.config.nachlauf_frames;
            self.aktiv = true;
        } else {
            // Rauschboden nur in Pausen nachfuehren, langsam steigend
            self.rauschboden = if energie < self.rauschboden {
                energie
            } else {
                0.995 * self.rauschboden + 0.005 * energie
            };

            if self.nachlauf > 0 {
                self.nachlauf -= 1;
                self.aktiv = true;
            } else {
                self.aktiv = false;
            }
        }

        self.aktiv
    }

    pub fn geglaettete_energie(&self) -> f32 {
        self.geglaettete_energie
    }

    pub fn rauschboden(&self) -> f32 {
        self.rauschboden
    }
}

impl AudioProcessor for Vad {
    fn process(&mut self, samples: &mut [f32]) {
        self.erkennen(samples);
    }

    fn reset(&mut self) {
        self.geglaettete_energie = 0.0;
        self.rauschboden = 0.0;
        self.nachlauf = 0;
        self.aktiv = false;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.aktiv = false;
        }
    }
}

/// RMS-Energie eines Frames
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Normalisierte Zero-Crossing-Rate
pub fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|w| (w[0] >= 0.0) != (w[1] >= 0.0))
        .count();
    crossings as f32 / (samples.len() - 1) as f32
}
