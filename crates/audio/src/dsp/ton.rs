//! Sinus-Tongenerator (Blockierton bei Doppelbelegung, Testton)

use std::f64::consts::TAU;

/// Phasenkontinuierlicher Sinuston
#[derive(Debug, Clone)]
pub struct Sinuston {
    frequenz: f64,
    rate: u32,
    phase: f64,
}

impl Sinuston {
    pub fn neu(frequenz: f64, rate: u32) -> Self {
        Self {
            frequenz,
            rate,
            phase: 0.0,
        }
    }

    /// Addiert den Ton mit Pegel `gain`; die Phase laeuft ueber Frames weiter
    pub fn addieren(&mut self, samples: &mut [f32], gain: f32) {
        let schritt = TAU * self.frequenz / self.rate as f64;
        for s in samples.iter_mut() {
            *s += (self.phase.sin() as f32) * gain;
            self.phase = (self.phase + schritt) % TAU;
        }
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::vad::{rms_energy, zero_crossing_rate};

    #[test]
    fn pegel_und_frequenz() {
        let mut ton = Sinuston::neu(180.0, 48_000);
        let mut s = vec![0.0f32; 48_000];
        ton.addieren(&mut s, 0.22);
        // Sinus-RMS = Amplitude / sqrt(2)
        assert!((rms_energy(&s) - 0.22 / 2f32.sqrt()).abs() < 0.005);
        // 180 Hz = 360 Nulldurchgaenge pro Sekunde
        let zcr = zero_crossing_rate(&s) * 47_999.0;
        assert!((zcr - 360.0).abs() <= 2.0, "{zcr}");
    }

    #[test]
    fn phase_laeuft_ueber_frames() {
        let mut am_stueck = Sinuston::neu(180.0, 48_000);
        let mut a = vec![0.0f32; 1920];
        am_stueck.addieren(&mut a, 1.0);

        let mut geteilt = Sinuston::neu(180.0, 48_000);
        let mut b = vec![0.0f32; 1920];
        geteilt.addieren(&mut b[..960], 1.0);
        geteilt.addieren(&mut b[960..], 1.0);
        assert_eq!(a, b);
    }
}
