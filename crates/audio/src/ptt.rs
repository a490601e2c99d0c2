//! Push-to-Talk Steuerung
//!
//! Drei Modi: Hold (Taste halten), Toggle (Druck schaltet um) und
//! VoiceActivation (VAD entscheidet). Mute ueberstimmt jeden Modus.

use serde::{Deserialize, Serialize};

/// Betriebsmodus fuer Push-to-Talk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PttMode {
    /// Senden solange die Taste gehalten wird (Standard im Flugfunk)
    #[default]
    Hold,
    /// Ein Druck startet, der naechste beendet
    Toggle,
    /// Automatisch per Voice Activity Detection
    VoiceActivation,
}

/// Push-to-Talk Controller
#[derive(Debug)]
pub struct PttController {
    mode: PttMode,
    taste_gehalten: bool,
    umschalter_aktiv: bool,
    vad_aktiv: bool,
    stumm: bool,
}

impl PttController {
    pub fn neu(mode: PttMode) -> Self {
        Self {
            mode,
            taste_gehalten: false,
            umschalter_aktiv: false,
            vad_aktiv: false,
            stumm: false,
        }
    }

    /// PTT-Taste gedrueckt. Im Toggle-Modus schaltet jeder Druck um,
    /// im VAD-Modus hat die Taste keine Wirkung.
    pub fn taste_druecken(&mut self) {
        match self.mode {
            PttMode::Hold => self.taste_gehalten = true,
            PttMode::Toggle => self.umschalter_aktiv = !self.umschalter_aktiv,
            PttMode::VoiceActivation => {}
        }
    }

    /// PTT-Taste losgelassen (nur im Hold-Modus wirksam)
    pub fn taste_loslassen(&mut self) {
        self.taste_gehalten = false;
    }

    /// Ergebnis der VAD fuer den aktuellen Frame
    pub fn vad_setzen(&mut self, aktiv: bool) {
        self.vad_aktiv = aktiv;
    }

    /// Modus wechseln, setzt alle Zustaende zurueck
    pub fn modus_setzen(&mut self, mode: PttMode) {
        self.mode = mode;
        self.taste_gehalten = false;
        self.umschalter_aktiv = false;
        self.vad_aktiv = false;
    }

    pub fn stumm_setzen(&mut self, stumm: bool) {
        self.stumm = stumm;
    }

    /// Will der Operator gerade senden?
    pub fn sendeabsicht(&self) -> bool {
        if self.stumm {
            return false;
        }
        match self.mode {
            PttMode::Hold => self.taste_gehalten,
            PttMode::Toggle => self.umschalter_aktiv,
            PttMode::VoiceActivation => self.vad_aktiv,
        }
    }

    pub fn mode(&self) -> PttMode {
        self.mode
    }

    pub fn ist_stumm(&self) -> bool {
        self.stumm
    }
}
