//! Soft-Limiter fuer Summensignale
//!
//! Unterhalb des Knies linear, darueber tanh-Saettigung. Die Ausgabe
//! erreicht `1.0` nie, es entsteht kein hartes Clipping wenn mehrere
//! Sprecher gleichzeitig senden.

use super::AudioProcessor;

/// Standard-Knie (Beginn der Kompression)
pub const STANDARD_KNIE: f32 = 0.8;

pub struct SoftLimiter {
    knie: f32,
    enabled: bool,
}

impl Default for SoftLimiter {
    fn default() -> Self {
        Self::neu(STANDARD_KNIE)
    }
}

impl SoftLimiter {
    pub fn neu(knie: f32) -> Self {
        Self {
            knie: knie.clamp(0.1, 0.99),
            enabled: true,
        }
    }

    #[inline]
    pub fn sample(&self, x: f32) -> f32 {
        if !x.is_finite() {
            return 0.0;
        }
        let betrag = x.abs();
        if betrag <= self.knie {
            return x;
        }
        let rest = 1.0 - self.knie;
        let y = self.knie + rest * ((betrag - self.knie) / rest).tanh();
        // tanh rundet in f32 bei grossen Werten auf 1.0
        y.min(1.0 - f32::EPSILON).copysign(x)
    }
}

impl AudioProcessor for SoftLimiter {
    fn process(&mut self, samples: &mut [f32]) {
        if !self.enabled {
            return;
        }
        for s in samples.iter_mut() {
            *s = self.sample(*s);
        }
    }

    fn reset(&mut self) {}

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}
