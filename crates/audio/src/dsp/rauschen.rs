//! Rausch-Quellen fuer die Funksimulation
//!
//! - `WeissesRauschen`: deterministischer Rauschgenerator (XOR/Add-Schieberegister)
//! - `Knistern`: vereinzelte Knackser bei schwachem Signal
//! - `SquelchKlick`: kurzer abklingender Rauschstoss an Sendeanfang und -ende

/// Obergrenze des Knister-Faktors
pub const MAX_KNISTERN: f32 = 0.15;

/// Dauer des Squelch-Klicks in Samples bei 48 kHz (8ms)
pub const KLICK_SAMPLES: usize = 384;

/// Knister-Faktor fuer ein Signalverhaeltnis `r` (1.0 = volle Staerke)
///
/// Steigt bei schwachem Signal steil an und ist auf `MAX_KNISTERN` begrenzt.
pub fn knister_faktor(r: f32) -> f32 {
    if !r.is_finite() || r <= 0.0 {
        return MAX_KNISTERN;
    }
    let r = r as f64;
    let faktor = r.exp() * r.powf(-2.5) / 350.0 - 0.00776652;
    (faktor as f32).clamp(0.0, MAX_KNISTERN)
}

// ---------------------------------------------------------------------------
// Weisses Rauschen
// ---------------------------------------------------------------------------

/// Gleichverteiltes weisses Rauschen im Bereich `-1.0..=1.0`
#[derive(Debug, Clone)]
pub struct WeissesRauschen {
    x1: i32,
    x2: i32,
}

impl Default for WeissesRauschen {
    fn default() -> Self {
        Self::neu()
    }
}

impl WeissesRauschen {
    pub fn neu() -> Self {
        Self {
            x1: 0x6745_2301,
            x2: 0xefcd_ab89_u32 as i32,
        }
    }

    #[inline]
    pub fn naechstes(&mut self) -> f32 {
        self.x1 ^= self.x2;
        let wert = self.x2 as f32 * (2.0 / u32::MAX as f32);
        self.x2 = self.x2.wrapping_add(self.x1);
        wert
    }

    /// Addiert Rauschen mit Pegel `gain` auf die Samples
    pub fn addieren(&mut self, samples: &mut [f32], gain: f32) {
        if gain <= 0.0 {
            return;
        }
        for s in samples.iter_mut() {
            *s += self.naechstes() * gain;
        }
    }
}

// ---------------------------------------------------------------------------
// Knistern
// ---------------------------------------------------------------------------

/// Knackser-Generator: seltene Impulse mit schnell abklingender Huelle
#[derive(Debug, Clone, Default)]
pub struct Knistern {
    ausloeser: WeissesRauschen,
    traeger: WeissesRauschen,
    huelle: f32,
}

impl Knistern {
    /// Schwelle, ab der ein Zufallswert einen Knackser ausloest
    const AUSLOESE_SCHWELLE: f32 = 0.996;
    const ABKLINGEN: f32 = 0.93;

    pub fn neu() -> Self {
        let mut traeger = WeissesRauschen::neu();
        // Phasenversatz, damit Ausloeser und Traeger nicht korrelieren
        for _ in 0..97 {
            traeger.naechstes();
        }
        Self {
            ausloeser: WeissesRauschen::neu(),
            traeger,
            huelle: 0.0,
        }
    }

    pub fn addieren(&mut self, samples: &mut [f32], gain: f32) {
        if gain <= 0.0 {
            return;
        }
        for s in samples.iter_mut() {
            if self.ausloeser.naechstes().abs() > Self::AUSLOESE_SCHWELLE {
                self.huelle = 1.0;
            }
            *s += self.traeger.naechstes() * self.huelle * gain;
            self.huelle *= Self::ABKLINGEN;
        }
    }
}

// ---------------------------------------------------------------------------
// Squelch-Klick
// ---------------------------------------------------------------------------

/// Lage des Klicks im Grenz-Frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KlickPosition {
    /// Sendeanfang: Klick am Frame-Anfang
    Anfang,
    /// Sendeende: Klick endet mit dem Frame
    Ende,
}

/// Synthetischer Squelch-Tail
#[derive(Debug, Clone, Default)]
pub struct SquelchKlick {
    rauschen: WeissesRauschen,
}

impl SquelchKlick {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Addiert einen Klick; er bleibt vollstaendig innerhalb von `samples`
    pub fn addieren(&mut self, samples: &mut [f32], position: KlickPosition, gain: f32) {
        if gain <= 0.0 || samples.is_empty() {
            return;
        }
        let laenge = KLICK_SAMPLES.min(samples.len());
        let start = match position {
            KlickPosition::Anfang => 0,
            KlickPosition::Ende => samples.len() - laenge,
        };
        let n = laenge as f32;
        for (i, s) in samples[start..start + laenge].iter_mut().enumerate() {
            let t = i as f32 / n;
            let huelle = match position {
                KlickPosition::Anfang => (1.0 - t) * (1.0 - t),
                KlickPosition::Ende => t * t,
            };
            *s += self.rauschen.naechstes() * huelle * gain;
        }
    }
}
