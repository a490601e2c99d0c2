//! Packet Loss Concealment (PLC) im PCM-Bereich
//!
//! Ersetzt fehlende Frames, wenn der Codec selbst keine Verdeckung
//! liefern kann (G.711) oder seine Verdeckung fehlschlaegt.
//!
//! ## Strategien
//! 1. **Wiederholung mit Fade**: Der letzte gueltige Frame wird wiederholt,
//!    mit abnehmendem Pegel (Rampe innerhalb des Frames, keine Spruenge).
//! 2. **Stille**: Nach `MAX_WIEDERHOLUNGEN` aufeinanderfolgenden Verlusten.

/// Maximale Anzahl von Frame-Wiederholungen vor dem Uebergang zu Stille
pub const MAX_WIEDERHOLUNGEN: u32 = 3;

/// Fade-Faktor pro Wiederholung (0.75 = 25% Abnahme pro Frame)
pub const FADE_FAKTOR: f32 = 0.75;

// ---------------------------------------------------------------------------
// Statistiken
// ---------------------------------------------------------------------------

/// PLC-Statistiken
#[derive(Debug, Clone, Default)]
pub struct PlcStatistik {
    /// Regulaer dekodierte Frames
    pub originale: u64,
    /// Durch Wiederholung verdeckte Frames
    pub wiederholungen: u64,
    /// Durch Stille ersetzte Frames
    pub stille_eingefuegt: u64,
    /// Alle verdeckten Frames
    pub gesamt_verloren: u64,
}

impl PlcStatistik {
    /// Verlustrate (0.0–1.0)
    pub fn verlust_rate(&self) -> f64 {
        let gesamt = self.originale + self.gesamt_verloren;
        if gesamt == 0 {
            0.0
        } else {
            self.gesamt_verloren as f64 / gesamt as f64
        }
    }
}

// ---------------------------------------------------------------------------
// PacketLossConcealer
// ---------------------------------------------------------------------------

/// Verdeckt Verluste eines einzelnen Sprachstroms
pub struct PacketLossConcealer {
    /// Letzter regulaer dekodierter Frame
    letzter_frame: Vec<f32>,
    /// Anzahl aufeinanderfolgender Verluste
    aufeinanderfolgende_verluste: u32,
    /// Pegel am Ende des zuletzt verdeckten Frames
    aktueller_fade: f32,
    statistik: PlcStatistik,
}

impl Default for PacketLossConcealer {
    fn default() -> Self {
        Self::neu()
    }
}

impl PacketLossConcealer {
    pub fn neu() -> Self {
        Self {
            letzter_frame: Vec::new(),
            aufeinanderfolgende_verluste: 0,
            aktueller_fade: 1.0,
            statistik: PlcStatistik::default(),
        }
    }

    /// Merkt sich einen regulaer dekodierten Frame
    pub fn original(&mut self, samples: &[f32]) {
        self.letzter_frame.clear();
        self.letzter_frame.extend_from_slice(samples);
        self.aufeinanderfolgende_verluste = 0;
        self.aktueller_fade = 1.0;
        self.statistik.originale += 1;
    }

    /// Erzeugt einen Ersatz-Frame der Laenge `frame_laenge`
    pub fn verdecken(&mut self, frame_laenge: usize) -> Vec<f32> {
        self.aufeinanderfolgende_verluste += 1;
        self.statistik.gesamt_verloren += 1;

        if self.letzter_frame.is_empty() || self.aufeinanderfolgende_verluste > MAX_WIEDERHOLUNGEN
        {
            self.statistik.stille_eingefuegt += 1;
            tracing::trace!(
                verluste = self.aufeinanderfolgende_verluste,
                "PLC: Stille eingefuegt"
            );
            return vec![0.0; frame_laenge];
        }

        let start = self.aktueller_fade;
        let ende = if self.aufeinanderfolgende_verluste == MAX_WIEDERHOLUNGEN {
            0.0
        } else {
            start * FADE_FAKTOR
        };
        self.aktueller_fade = ende;
        self.statistik.wiederholungen += 1;

        let n = frame_laenge.max(1) as f32;
        (0..frame_laenge)
            .map(|i| {
                let gain = start + (ende - start) * (i as f32 / n);
                self.letzter_frame.get(i).copied().unwrap_or(0.0) * gain
            })
            .collect()
    }

    /// Anzahl aufeinanderfolgender Verluste seit dem letzten Original
    pub fn aufeinanderfolgende_verluste(&self) -> u32 {
        self.aufeinanderfolgende_verluste
    }

    pub fn statistik(&self) -> &PlcStatistik {
        &self.statistik
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ohne_vorgaenger_stille() {
        let mut plc = PacketLossConcealer::neu();
        let ersatz = plc.verdecken(160);
        assert_eq!(ersatz.len(), 160);
        assert!(ersatz.iter().all(|s| *s == 0.0));
        assert_eq!(plc.statistik().stille_eingefuegt, 1);
    }

    #[test]
    fn wiederholung_mit_abnehmendem_pegel() {
        let mut plc = PacketLossConcealer::neu();
        plc.original(&[0.8; 160]);

        let erster = plc.verdecken(160);
        let zweiter = plc.verdecken(160);
        assert!(erster[0] > 0.7, "erster Ersatz beginnt mit vollem Pegel");
        assert!(zweiter[0] < erster[0]);
        assert!(zweiter[159] < zweiter[0], "Rampe innerhalb des Frames");
        assert_eq!(plc.statistik().wiederholungen, 2);
    }

    #[test]
    fn nach_max_wiederholungen_stille() {
        let mut plc = PacketLossConcealer::neu();
        plc.original(&[0.5; 160]);
        for _ in 0..MAX_WIEDERHOLUNGEN {
            plc.verdecken(160);
        }
        let danach = plc.verdecken(160);
        assert!(danach.iter().all(|s| *s == 0.0));
        assert_eq!(plc.aufeinanderfolgende_verluste(), MAX_WIEDERHOLUNGEN + 1);
    }

    #[test]
    fn original_setzt_zaehler_zurueck() {
        let mut plc = PacketLossConcealer::neu();
        plc.original(&[0.5; 160]);
        plc.verdecken(160);
        plc.original(&[0.5; 160]);
        assert_eq!(plc.aufeinanderfolgende_verluste(), 0);
        assert!((plc.statistik().verlust_rate() - 1.0 / 3.0).abs() < 1e-9);
    }
}
