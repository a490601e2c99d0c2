//! Funk-Bandpass: formt das Stimmsignal zum typischen Flugfunk-Klang
//!
//! VHF: Hochpass 450 Hz, breite Anhebung um 2.2 kHz, Tiefpass 3 kHz.
//! HF: schmaler und dumpfer. Die Kette ist linear, daher kann der Mixer
//! sie einmal auf die Summe aller Quellen anwenden.

use super::biquad::{Biquad, Koeffizienten};
use super::AudioProcessor;

/// Klangcharakter des Bandes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    Vhf,
    Hf,
}

/// Kette aus drei Biquads plus Ausgleichsverstaerkung
pub struct FunkFilter {
    band: Band,
    stufen: [Biquad; 3],
    ausgleich: f32,
    enabled: bool,
}

impl FunkFilter {
    pub fn neu(band: Band, rate: u32) -> Self {
        let (stufen, ausgleich) = match band {
            Band::Vhf => (
                [
                    Biquad::neu(Koeffizienten::hochpass(rate, 450.0, 1.0)),
                    Biquad::neu(Koeffizienten::glocke(rate, 2200.0, 0.25, 13.0)),
                    Biquad::neu(Koeffizienten::tiefpass(rate, 3000.0, 1.0)),
                ],
                0.25,
            ),
            Band::Hf => (
                [
                    Biquad::neu(Koeffizienten::hochpass(rate, 400.0, 0.7)),
                    Biquad::neu(Koeffizienten::glocke(rate, 1500.0, 0.5, 6.0)),
                    Biquad::neu(Koeffizienten::tiefpass(rate, 2400.0, 0.7)),
                ],
                0.5,
            ),
        };
        Self {
            band,
            stufen,
            ausgleich,
            enabled: true,
        }
    }

    pub fn band(&self) -> Band {
        self.band
    }
}

impl AudioProcessor for FunkFilter {
    fn process(&mut self, samples: &mut [f32]) {
        if !self.enabled {
            return;
        }
        for stufe in self.stufen.iter_mut() {
            stufe.verarbeiten(samples);
        }
        for s in samples.iter_mut() {
            *s *= self.ausgleich;
        }
    }

    fn reset(&mut self) {
        for stufe in self.stufen.iter_mut() {
            stufe.reset();
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::vad::rms_energy;

    fn ton(freq: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / 48_000.0).sin() * 0.5)
            .collect()
    }

    fn pegel_nach_filter(band: Band, freq: f32) -> f32 {
        let mut f = FunkFilter::neu(band, 48_000);
        let mut s = ton(freq, 9600);
        f.process(&mut s);
        rms_energy(&s[4800..])
    }

    #[test]
    fn sprachband_kommt_durch_raender_nicht() {
        let mitte = pegel_nach_filter(Band::Vhf, 1800.0);
        let tief = pegel_nach_filter(Band::Vhf, 60.0);
        let hoch = pegel_nach_filter(Band::Vhf, 12_000.0);
        assert!(mitte > 5.0 * tief, "mitte {mitte} tief {tief}");
        assert!(mitte > 5.0 * hoch, "mitte {mitte} hoch {hoch}");
    }

    #[test]
    fn stille_bleibt_stille() {
        let mut f = FunkFilter::neu(Band::Hf, 48_000);
        let mut s = vec![0.0f32; 960];
        f.process(&mut s);
        assert!(s.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn deaktiviert_unveraendert() {
        let mut f = FunkFilter::neu(Band::Vhf, 48_000);
        f.set_enabled(false);
        let original = ton(1000.0, 960);
        let mut s = original.clone();
        f.process(&mut s);
        assert_eq!(s, original);
    }
}
