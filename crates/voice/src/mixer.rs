//! Radio Channel Mixer – ein Mixer pro abonnierter Frequenz
//!
//! Summiert die Frames aller Sender einer Frequenz und legt die
//! Funk-Effekte darueber:
//!
//! ```text
//! Quellen ─► Daempfung (Signal) ─► Summe ─► Bandpass ─► Rauschen/Knistern
//!        ─► Squelch-Klick ─► Blockierton (>= 2 Sender) ─► Soft-Limiter
//! ```
//!
//! Jede Stufe ist einzeln abschaltbar. Sender mit `bypass` (oder alle,
//! wenn die Effekte des Mixers aus sind) gehen unbearbeitet in die Summe;
//! der Blockierton bleibt auch dann hoerbar. Ohne aktive Sender liefert der
//! Mixer exakt Stille, damit der Ausgabetakt nie abreisst.

use serde::{Deserialize, Serialize};
use skyband_audio::dsp::funkfilter::{Band, FunkFilter};
use skyband_audio::dsp::limiter::SoftLimiter;
use skyband_audio::dsp::rauschen::{knister_faktor, KlickPosition, Knistern, SquelchKlick, WeissesRauschen};
use skyband_audio::dsp::ton::Sinuston;
use skyband_audio::{AudioFrame, AudioProcessor, MIX_FRAME_SAMPLES, MIX_RATE};
use skyband_core::FrequencyHz;

/// Sprachpegel auf Kurzwelle (unabhaengig vom Signal)
pub const HF_SPRACHPEGEL: f32 = 0.38;

/// Abschwaechung der Sprache je Einheit Knisterfaktor (VHF)
const VHF_DAEMPFUNG_PRO_KNISTERN: f32 = 3.7;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Reihenfolge von Daempfung und Squelch-Klick
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SquelchReihenfolge {
    /// Klick nach der Daempfung: immer mit vollem Pegel hoerbar
    #[default]
    DaempfungVorSquelch,
    /// Klick je Sender vor der Daempfung: schwache Sender klicken leiser
    DaempfungNachSquelch,
}

/// Effekt-Schalter und Pegel eines Mixers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Hauptschalter; aus = Summe mit Blockierton und Soft-Limiter
    pub effekte: bool,
    pub daempfung: bool,
    pub bandpass: bool,
    pub rauschen: bool,
    pub squelch: bool,
    pub blockierton: bool,
    pub squelch_reihenfolge: SquelchReihenfolge,
    pub vhf_rauschen: f32,
    pub hf_rauschen: f32,
    pub klick_pegel: f32,
    pub blockierton_pegel: f32,
    pub blockierton_hz: f64,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            effekte: true,
            daempfung: true,
            bandpass: true,
            rauschen: true,
            squelch: true,
            blockierton: true,
            squelch_reihenfolge: SquelchReihenfolge::default(),
            vhf_rauschen: 0.01,
            hf_rauschen: 0.06,
            klick_pegel: 0.5,
            blockierton_pegel: 0.22,
            blockierton_hz: 180.0,
        }
    }
}

impl MixerConfig {
    /// Ohne Effekte und Blockierton (reine Summe)
    pub fn ohne_effekte() -> Self {
        Self {
            effekte: false,
            blockierton: false,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Eingabe / Statistik
// ---------------------------------------------------------------------------

/// Beitrag eines Senders zu einem Mix-Takt
#[derive(Debug, Clone, Copy)]
pub struct MischEingabe<'a> {
    /// Frame mit 48 kHz
    pub frame: &'a AudioFrame,
    /// Signalverhaeltnis (1.0 = voller Empfang)
    pub signal: f32,
    /// Uebertragung beginnt in diesem Frame
    pub anfang: bool,
    /// Uebertragung endet in diesem Frame
    pub ende: bool,
    /// Ohne Funk-Effekte mischen
    pub bypass: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MixerStatistik {
    pub takte: u64,
    pub stille_takte: u64,
    /// Takte mit zwei oder mehr Sendern
    pub ueberlagerungen: u64,
    pub klicks: u64,
}

// ---------------------------------------------------------------------------
// RadioChannelMixer
// ---------------------------------------------------------------------------

pub struct RadioChannelMixer {
    frequenz: FrequencyHz,
    config: MixerConfig,
    filter: FunkFilter,
    rauschen: WeissesRauschen,
    knistern: Knistern,
    klick: SquelchKlick,
    blockierton: Sinuston,
    limiter: SoftLimiter,
    /// Letzter Takt hatte Sender (Filterzustand ist gefuellt)
    war_aktiv: bool,
    statistik: MixerStatistik,
}

impl RadioChannelMixer {
    pub fn neu(frequenz: FrequencyHz, config: MixerConfig) -> Self {
        let band = if frequenz.ist_hf() { Band::Hf } else { Band::Vhf };
        tracing::debug!(frequenz = %frequenz, band = ?band, effekte = config.effekte, "Mixer erstellt");
        Self {
            frequenz,
            filter: FunkFilter::neu(band, MIX_RATE),
            rauschen: WeissesRauschen::neu(),
            knistern: Knistern::neu(),
            klick: SquelchKlick::neu(),
            blockierton: Sinuston::neu(config.blockierton_hz, MIX_RATE),
            limiter: SoftLimiter::default(),
            war_aktiv: false,
            statistik: MixerStatistik::default(),
            config,
        }
    }

    pub fn frequenz(&self) -> FrequencyHz {
        self.frequenz
    }

    pub fn config(&self) -> &MixerConfig {
        &self.config
    }

    pub fn statistik(&self) -> &MixerStatistik {
        &self.statistik
    }

    /// Schaltet die Funk-Effekte fuer alle Sender dieser Frequenz
    pub fn effekte_setzen(&mut self, an: bool) {
        if self.config.effekte != an {
            tracing::debug!(frequenz = %self.frequenz, effekte = an, "Effekte umgeschaltet");
            self.config.effekte = an;
            self.filter.reset();
        }
    }

    /// Verwirft Filter- und Tonzustand (z.B. waehrend selbst gesendet wird)
    pub fn zuruecksetzen(&mut self) {
        self.filter.reset();
        self.blockierton.reset();
        self.war_aktiv = false;
    }

    /// Mischt alle aktiven Sender dieses Takts zu einem Frame (48 kHz)
    pub fn mischen(&mut self, eingaben: &[MischEingabe<'_>]) -> AudioFrame {
        self.statistik.takte += 1;
        let mut summe = vec![0.0f32; MIX_FRAME_SAMPLES];

        if eingaben.is_empty() {
            self.statistik.stille_takte += 1;
            if self.war_aktiv {
                // Filter-Ausklang nicht in die naechste Uebertragung tragen
                self.filter.reset();
                self.blockierton.reset();
                self.war_aktiv = false;
            }
            return AudioFrame::neu(summe, MIX_RATE);
        }
        self.war_aktiv = true;
        if eingaben.len() >= 2 {
            self.statistik.ueberlagerungen += 1;
        }

        let alle_direkt = !self.config.effekte;
        let hf = self.frequenz.ist_hf();
        let nach_squelch = self.config.squelch
            && self.config.squelch_reihenfolge == SquelchReihenfolge::DaempfungNachSquelch;
        let mut knister_summe = 0.0f32;
        let mut funk_sender = 0usize;
        let mut quelle = vec![0.0f32; MIX_FRAME_SAMPLES];
        let mut direkt = vec![0.0f32; MIX_FRAME_SAMPLES];

        for e in eingaben {
            if alle_direkt || e.bypass {
                addieren(&mut direkt, e.frame.samples(), 1.0);
                continue;
            }
            funk_sender += 1;

            let (sprachpegel, knistern) = if self.config.daempfung {
                let k = knister_faktor(e.signal);
                let pegel = if hf {
                    HF_SPRACHPEGEL
                } else {
                    (1.0 - VHF_DAEMPFUNG_PRO_KNISTERN * k).max(0.0)
                };
                (pegel, k)
            } else {
                (1.0, 0.0)
            };
            knister_summe += knistern * 2.0;

            if nach_squelch {
                quelle.iter_mut().for_each(|s| *s = 0.0);
                addieren(&mut quelle, e.frame.samples(), 1.0);
                self.klicks_addieren(&mut quelle, e.anfang, e.ende);
                addieren(&mut summe, &quelle, sprachpegel);
            } else {
                addieren(&mut summe, e.frame.samples(), sprachpegel);
            }
        }

        if funk_sender > 0 {
            if self.config.bandpass {
                self.filter.process(&mut summe);
            }

            if self.config.rauschen {
                let zischen = if hf {
                    self.config.hf_rauschen
                } else {
                    self.config.vhf_rauschen
                };
                self.rauschen.addieren(&mut summe, zischen);
                self.knistern.addieren(&mut summe, knister_summe);
            }

            if self.config.squelch && !nach_squelch {
                let funk = || eingaben.iter().filter(|e| !e.bypass);
                let anfang = funk().any(|e| e.anfang);
                let ende = funk().any(|e| e.ende);
                self.klicks_addieren(&mut summe, anfang, ende);
            }
        }

        addieren(&mut summe, &direkt, 1.0);

        if self.config.blockierton && eingaben.len() >= 2 {
            self.blockierton
                .addieren(&mut summe, self.config.blockierton_pegel);
        }

        self.limiter.process(&mut summe);
        AudioFrame::neu(summe, MIX_RATE)
    }

    fn klicks_addieren(&mut self, samples: &mut [f32], anfang: bool, ende: bool) {
        if anfang {
            self.klick
                .addieren(samples, KlickPosition::Anfang, self.config.klick_pegel);
            self.statistik.klicks += 1;
        }
        if ende {
            self.klick
                .addieren(samples, KlickPosition::Ende, self.config.klick_pegel);
            self.statistik.klicks += 1;
        }
    }
}

fn addieren(ziel: &mut [f32], quelle: &[f32], gain: f32) {
    for (z, q) in ziel.iter_mut().zip(quelle) {
        *z += q * gain;
    }
}
