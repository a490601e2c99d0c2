//! Frame-Groessen-Adapter fuer Geraete-Callbacks
//!
//! Audio-Geraete liefern und verlangen Puffer beliebiger Groesse. Die
//! Engine arbeitet in festen 20ms-Frames. Zwischen beiden Seiten liegt je
//! ein lock-free Ring-Buffer (ringbuf), damit weder der Geraete-Callback
//! noch der Audio-Takt blockiert.
//!
//! ```text
//! Mikrofon-Callback -> CaptureEingang ==ring==> FrameSammler -> Transmit
//! Mixer -> FrameAusgabe ==ring==> PlaybackAusgang -> Lautsprecher-Callback
//! ```

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use tracing::trace;

use crate::frame::AudioFrame;

/// Erstellt das Capture-Paar fuer `frame_laenge` Samples pro Frame
///
/// `kapazitaet_frames` begrenzt, wie viele Frames sich stauen duerfen.
pub fn capture_puffer(
    frame_laenge: usize,
    rate: u32,
    kapazitaet_frames: usize,
) -> (CaptureEingang, FrameSammler) {
    let rb = HeapRb::<f32>::new(frame_laenge * kapazitaet_frames.max(2));
    let (prod, cons) = rb.split();
    (
        CaptureEingang {
            prod,
            verworfen: 0,
        },
        FrameSammler {
            cons,
            frame_laenge,
            rate,
        },
    )
}

/// Erstellt das Playback-Paar
pub fn playback_puffer(
    frame_laenge: usize,
    kapazitaet_frames: usize,
) -> (FrameAusgabe, PlaybackAusgang) {
    let rb = HeapRb::<f32>::new(frame_laenge * kapazitaet_frames.max(2));
    let (prod, cons) = rb.split();
    (
        FrameAusgabe {
            prod,
            verworfen: 0,
        },
        PlaybackAusgang {
            cons,
            unterlaeufe: 0,
        },
    )
}

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

/// Geraete-Seite des Capture-Puffers
pub struct CaptureEingang {
    prod: HeapProd<f32>,
    verworfen: u64,
}

impl CaptureEingang {
    /// Nimmt einen Geraete-Puffer beliebiger Laenge an
    ///
    /// Ist der Ring voll, werden die ueberzaehligen Samples verworfen.
    pub fn schreiben(&mut self, samples: &[f32]) {
        let geschrieben = self.prod.push_slice(samples);
        if geschrieben < samples.len() {
            self.verworfen += (samples.len() - geschrieben) as u64;
            trace!(verworfen = samples.len() - geschrieben, "Capture-Ring voll");
        }
    }

    /// Bisher verworfene Samples
    pub fn verworfen(&self) -> u64 {
        self.verworfen
    }
}

/// Takt-Seite des Capture-Puffers: setzt feste Frames zusammen
pub struct FrameSammler {
    cons: HeapCons<f32>,
    frame_laenge: usize,
    rate: u32,
}

impl FrameSammler {
    /// Naechster vollstaendiger Frame, falls genug Samples vorliegen
    pub fn naechster_frame(&mut self) -> Option<AudioFrame> {
        if self.cons.occupied_len() < self.frame_laenge {
            return None;
        }
        let mut samples = vec![0.0f32; self.frame_laenge];
        let gelesen = self.cons.pop_slice(&mut samples);
        debug_assert_eq!(gelesen, self.frame_laenge);
        Some(AudioFrame::neu(samples, self.rate))
    }

    /// Anzahl vollstaendiger Frames im Puffer
    pub fn verfuegbare_frames(&self) -> usize {
        self.cons.occupied_len() / self.frame_laenge
    }
}

// ---------------------------------------------------------------------------
// Playback
// ---------------------------------------------------------------------------

/// Takt-Seite des Playback-Puffers
pub struct FrameAusgabe {
    prod: HeapProd<f32>,
    verworfen: u64,
}

impl FrameAusgabe {
    /// Reicht einen gemischten Frame an das Geraet weiter
    pub fn schreiben(&mut self, frame: &AudioFrame) {
        let geschrieben = self.prod.push_slice(frame.samples());
        if geschrieben < frame.len() {
            self.verworfen += (frame.len() - geschrieben) as u64;
            trace!("Playback-Ring voll, Frame gekuerzt");
        }
    }

    pub fn freie_samples(&self) -> usize {
        self.prod.vacant_len()
    }

    pub fn verworfen(&self) -> u64 {
        self.verworfen
    }
}

/// Geraete-Seite des Playback-Puffers
pub struct PlaybackAusgang {
    cons: HeapCons<f32>,
    unterlaeufe: u64,
}

impl PlaybackAusgang {
    /// Fuellt einen Geraete-Puffer; fehlende Samples werden Stille
    pub fn fuellen(&mut self, ziel: &mut [f32]) {
        let gelesen = self.cons.pop_slice(ziel);
        if gelesen < ziel.len() {
            ziel[gelesen..].fill(0.0);
            self.unterlaeufe += 1;
        }
    }

    /// Anzahl Callbacks mit zu wenig Samples
    pub fn unterlaeufe(&self) -> u64 {
        self.unterlaeufe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kleine_geraete_puffer_ergeben_ganze_frames() {
        let (mut eingang, mut sammler) = capture_puffer(960, 48_000, 4);
        for _ in 0..3 {
            eingang.schreiben(&[0.25; 256]);
        }
        // 768 Samples: noch kein Frame
        assert!(sammler.naechster_frame().is_none());
        eingang.schreiben(&[0.25; 256]);
        let frame = sammler.naechster_frame().unwrap();
        assert_eq!(frame.len(), 960);
        assert_eq!(frame.sample_rate(), 48_000);
        assert!(sammler.naechster_frame().is_none());
    }

    #[test]
    fn grosse_geraete_puffer_ergeben_mehrere_frames() {
        let (mut eingang, mut sammler) = capture_puffer(960, 48_000, 4);
        eingang.schreiben(&[0.1; 2048]);
        assert_eq!(sammler.verfuegbare_frames(), 2);
        assert!(sammler.naechster_frame().is_some());
        assert!(sammler.naechster_frame().is_some());
        assert!(sammler.naechster_frame().is_none());
    }

    #[test]
    fn voller_capture_ring_verwirft() {
        let (mut eingang, _sammler) = capture_puffer(960, 48_000, 2);
        eingang.schreiben(&[0.0; 2000]);
        assert_eq!(eingang.verworfen(), 80);
    }

    #[test]
    fn playback_unterlauf_wird_stille() {
        let (mut ausgabe, mut ausgang) = playback_puffer(960, 4);
        ausgabe.schreiben(&AudioFrame::neu(vec![0.5; 960], 48_000));

        let mut geraet = vec![1.0f32; 512];
        ausgang.fuellen(&mut geraet);
        assert!(geraet.iter().all(|s| *s == 0.5));
        assert_eq!(ausgang.unterlaeufe(), 0);

        ausgang.fuellen(&mut geraet);
        assert!(geraet[..448].iter().all(|s| *s == 0.5));
        assert!(geraet[448..].iter().all(|s| *s == 0.0));
        assert_eq!(ausgang.unterlaeufe(), 1);
    }
}
