//! Eingangspegel-Anzeige (VU-Meter) fuer das Mikrofon
//!
//! Spitzenpegel pro Frame in dBFS, begrenzt auf -40..0 dB, dazu ein
//! gleitender Mittelwert ueber 300ms (15 Frames).

use std::collections::VecDeque;

/// Untere Anzeigegrenze
pub const MIN_DBFS: f32 = -40.0;

/// Fensterlaenge des Mittelwerts in Frames (15 x 20ms = 300ms)
pub const FENSTER_FRAMES: usize = 15;

/// Pegelmesser
#[derive(Debug, Clone)]
pub struct PegelMesser {
    fenster: VecDeque<f32>,
    summe: f32,
    letzter: f32,
}

impl Default for PegelMesser {
    fn default() -> Self {
        Self::neu()
    }
}

impl PegelMesser {
    pub fn neu() -> Self {
        Self {
            fenster: VecDeque::with_capacity(FENSTER_FRAMES),
            summe: 0.0,
            letzter: MIN_DBFS,
        }
    }

    /// Misst einen Frame und gibt dessen Spitzenpegel in dBFS zurueck
    pub fn messen(&mut self, samples: &[f32]) -> f32 {
        let spitze = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        let db = linear_zu_db(spitze).clamp(MIN_DBFS, 0.0);

        if self.fenster.len() == FENSTER_FRAMES {
            if let Some(alt) = self.fenster.pop_front() {
                self.summe -= alt;
            }
        }
        self.fenster.push_back(db);
        self.summe += db;
        self.letzter = db;
        db
    }

    /// Spitzenpegel des letzten Frames
    pub fn aktuell_db(&self) -> f32 {
        self.letzter
    }

    /// Mittelwert ueber die letzten 300ms
    pub fn mittel_db(&self) -> f32 {
        if self.fenster.is_empty() {
            return MIN_DBFS;
        }
        self.summe / self.fenster.len() as f32
    }
}

/// Linear -> dBFS
pub fn linear_zu_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        return -100.0;
    }
    20.0 * linear.log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stille_ist_untergrenze() {
        let mut m = PegelMesser::neu();
        assert_eq!(m.messen(&[0.0; 960]), MIN_DBFS);
        assert_eq!(m.mittel_db(), MIN_DBFS);
    }

    #[test]
    fn vollaussteuerung_ist_null_db() {
        let mut m = PegelMesser::neu();
        assert!(m.messen(&[1.0, -1.0]).abs() < 1e-5);
        assert_eq!(m.messen(&[4.0]), 0.0);
    }

    #[test]
    fn mittel_ueber_fenster() {
        let mut m = PegelMesser::neu();
        for _ in 0..FENSTER_FRAMES {
            m.messen(&[0.0]);
        }
        for _ in 0..FENSTER_FRAMES {
            m.messen(&[1.0]);
        }
        // Stille ist komplett aus dem Fenster gefallen
        assert!(m.mittel_db().abs() < 1e-4);
        assert!(m.aktuell_db().abs() < 1e-5);
    }

    #[test]
    fn halbe_amplitude_minus_sechs_db() {
        let mut m = PegelMesser::neu();
        assert!((m.messen(&[0.5]) + 6.02).abs() < 0.01);
    }
}
