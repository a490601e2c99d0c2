//! Biquad-Filter nach dem RBJ Audio-EQ-Cookbook
//!
//! Direktform I mit f64-Zustand. Koeffizienten werden bei der Erstellung
//! auf a0 normiert.

use std::f64::consts::PI;

/// Normierte Filterkoeffizienten
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Koeffizienten {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Koeffizienten {
    fn normiert(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    fn omega(rate: u32, freq: f64, q: f64) -> (f64, f64, f64) {
        let w0 = 2.0 * PI * freq / rate as f64;
        let alpha = w0.sin() / (2.0 * q);
        (w0.cos(), w0.sin(), alpha)
    }

    pub fn tiefpass(rate: u32, freq: f64, q: f64) -> Self {
        let (cos, _, alpha) = Self::omega(rate, freq, q);
        Self::normiert(
            (1.0 - cos) / 2.0,
            1.0 - cos,
            (1.0 - cos) / 2.0,
            1.0 + alpha,
            -2.0 * cos,
            1.0 - alpha,
        )
    }

    pub fn hochpass(rate: u32, freq: f64, q: f64) -> Self {
        let (cos, _, alpha) = Self::omega(rate, freq, q);
        Self::normiert(
            (1.0 + cos) / 2.0,
            -(1.0 + cos),
            (1.0 + cos) / 2.0,
            1.0 + alpha,
            -2.0 * cos,
            1.0 - alpha,
        )
    }

    /// Bandpass mit 0 dB Spitzenverstaerkung
    pub fn bandpass(rate: u32, freq: f64, q: f64) -> Self {
        let (cos, _, alpha) = Self::omega(rate, freq, q);
        Self::normiert(alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos, 1.0 - alpha)
    }

    /// Glockenfilter (Peaking EQ) mit `gain_db` Anhebung
    pub fn glocke(rate: u32, freq: f64, q: f64, gain_db: f64) -> Self {
        let a = 10f64.powf(gain_db / 40.0);
        let (cos, _, alpha) = Self::omega(rate, freq, q);
        Self::normiert(
            1.0 + alpha * a,
            -2.0 * cos,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos,
            1.0 - alpha / a,
        )
    }
}

/// Ein Biquad-Abschnitt mit eigenem Zustand
#[derive(Debug, Clone)]
pub struct Biquad {
    k: Koeffizienten,
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl Biquad {
    pub fn neu(k: Koeffizienten) -> Self {
        Self {
            k,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    #[inline]
    pub fn sample(&mut self, x: f32) -> f32 {
        let x = x as f64;
        let k = &self.k;
        let y = k.b0 * x + k.b1 * self.x1 + k.b2 * self.x2 - k.a1 * self.y1 - k.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;
        y as f32
    }

    pub fn verarbeiten(&mut self, samples: &mut [f32]) {
        for s in samples.iter_mut() {
            *s = self.sample(*s);
        }
    }

    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::vad::rms_energy;

    fn ton(rate: u32, freq: f64, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / rate as f64).sin() as f32)
            .collect()
    }

    /// Verstaerkung im eingeschwungenen Zustand
    fn verstaerkung(k: Koeffizienten, freq: f64) -> f32 {
        let mut f = Biquad::neu(k);
        let mut s = ton(48_000, freq, 9600);
        f.verarbeiten(&mut s);
        rms_energy(&s[4800..]) / rms_energy(&ton(48_000, freq, 9600)[4800..])
    }

    #[test]
    fn tiefpass_daempft_hoehen() {
        let k = Koeffizienten::tiefpass(48_000, 1000.0, 0.707);
        assert!(verstaerkung(k, 100.0) > 0.95);
        assert!(verstaerkung(k, 10_000.0) < 0.05);
    }

    #[test]
    fn hochpass_daempft_tiefen() {
        let k = Koeffizienten::hochpass(48_000, 1000.0, 0.707);
        assert!(verstaerkung(k, 50.0) < 0.05);
        assert!(verstaerkung(k, 10_000.0) > 0.95);
    }

    #[test]
    fn bandpass_mitte_ungedaempft() {
        let k = Koeffizienten::bandpass(48_000, 1500.0, 1.0);
        assert!((verstaerkung(k, 1500.0) - 1.0).abs() < 0.05);
        assert!(verstaerkung(k, 20.0) < 0.1);
    }

    #[test]
    fn glocke_hebt_an() {
        let k = Koeffizienten::glocke(48_000, 2000.0, 1.0, 12.0);
        // +12 dB ~ Faktor 3.98
        assert!((verstaerkung(k, 2000.0) - 3.98).abs() < 0.2);
    }

    #[test]
    fn reset_loescht_historie() {
        let mut f = Biquad::neu(Koeffizienten::tiefpass(48_000, 1000.0, 0.707));
        f.sample(1.0);
        f.reset();
        let mut g = Biquad::neu(Koeffizienten::tiefpass(48_000, 1000.0, 0.707));
        assert_eq!(f.sample(0.5), g.sample(0.5));
    }
}
