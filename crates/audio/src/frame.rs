//! AudioFrame – die Einheit zwischen allen Pipeline-Stufen
//!
//! Ein Frame umfasst immer 20 ms lineares PCM (mono, f32 im Bereich
//! -1.0..1.0). Nach der Erzeugung wird er nicht mehr veraendert; jede
//! Stufe uebernimmt den Frame und erzeugt einen neuen.

use skyband_protocol::codec::samples_pro_frame;

/// Abtastrate von Mixer und Audio-Geraeten
pub const MIX_RATE: u32 = 48_000;

/// Samples eines Mixer-Frames (20 ms bei 48 kHz)
pub const MIX_FRAME_SAMPLES: usize = 960;

/// 20ms-Block linearer PCM-Samples
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioFrame {
    /// Uebernimmt fertige Samples
    pub fn neu(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Stiller Frame passender Laenge
    pub fn stille(sample_rate: u32) -> Self {
        Self {
            samples: vec![0.0; samples_pro_frame(sample_rate)],
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Alle Samples exakt null
    pub fn ist_stille(&self) -> bool {
        self.samples.iter().all(|s| *s == 0.0)
    }

    /// RMS-Energie des Frames
    pub fn energie(&self) -> f32 {
        crate::dsp::vad::rms_energy(&self.samples)
    }

    /// Betrag des lautesten Samples
    pub fn spitze(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stiller_frame_hat_frame_laenge() {
        let frame = AudioFrame::stille(MIX_RATE);
        assert_eq!(frame.len(), MIX_FRAME_SAMPLES);
        assert!(frame.ist_stille());
        assert_eq!(AudioFrame::stille(8000).len(), 160);
    }

    #[test]
    fn energie_und_spitze() {
        let frame = AudioFrame::neu(vec![0.5, -0.5, 0.5, -0.5], MIX_RATE);
        assert!((frame.energie() - 0.5).abs() < 1e-6);
        assert_eq!(frame.spitze(), 0.5);
        assert!(!frame.ist_stille());
    }
}
