//! Master-Ausgabe: Lautstaerke je Frequenz und Summierung
//!
//! Jede abonnierte Frequenz liefert pro Takt einen gemischten Frame. Der
//! `AusgabeMixer` gewichtet sie mit ihrer Frequenz-Lautstaerke, summiert,
//! wendet die Master-Lautstaerke an und begrenzt weich. Lautstaerke-
//! Aenderungen werden ueber den Frame gerampt (keine Klicks).

use std::collections::HashMap;

use skyband_core::FrequencyHz;

use crate::dsp::limiter::SoftLimiter;
use crate::frame::{AudioFrame, MIX_RATE};

/// Obergrenze fuer alle Lautstaerken
pub const MAX_LAUTSTAERKE: f32 = 2.0;

#[derive(Debug, Clone, Copy)]
struct Kanal {
    aktuell: f32,
    ziel: f32,
    stumm: bool,
}

impl Kanal {
    fn neu(wert: f32) -> Self {
        Self {
            aktuell: wert,
            ziel: wert,
            stumm: false,
        }
    }

    /// Start- und Endwert der Rampe fuer diesen Frame
    fn rampe(&mut self) -> (f32, f32) {
        let start = self.aktuell;
        let ende = if self.stumm { 0.0 } else { self.ziel };
        self.aktuell = ende;
        (start, ende)
    }
}

/// Summiert die Frequenz-Frames zur Geraete-Ausgabe
pub struct AusgabeMixer {
    master: Kanal,
    frequenzen: HashMap<FrequencyHz, Kanal>,
    limiter: SoftLimiter,
    summe: Vec<f32>,
}

impl Default for AusgabeMixer {
    fn default() -> Self {
        Self::neu()
    }
}

impl AusgabeMixer {
    pub fn neu() -> Self {
        Self {
            master: Kanal::neu(1.0),
            frequenzen: HashMap::new(),
            limiter: SoftLimiter::default(),
            summe: Vec::new(),
        }
    }

    pub fn master_setzen(&mut self, lautstaerke: f32) {
        self.master.ziel = lautstaerke.clamp(0.0, MAX_LAUTSTAERKE);
    }

    pub fn master(&self) -> f32 {
        self.master.ziel
    }

    pub fn master_stumm(&mut self, stumm: bool) {
        self.master.stumm = stumm;
    }

    /// Legt den Kanal einer abonnierten Frequenz an (Lautstaerke 1.0)
    pub fn frequenz_hinzufuegen(&mut self, frequenz: FrequencyHz) {
        self.frequenzen
            .entry(frequenz)
            .or_insert_with(|| Kanal::neu(1.0));
    }

    /// Setzt die Lautstaerke einer angelegten Frequenz; unbekannte
    /// Frequenzen werden ignoriert (`false`)
    pub fn lautstaerke_setzen(&mut self, frequenz: FrequencyHz, lautstaerke: f32) -> bool {
        match self.frequenzen.get_mut(&frequenz) {
            Some(kanal) => {
                kanal.ziel = lautstaerke.clamp(0.0, MAX_LAUTSTAERKE);
                true
            }
            None => false,
        }
    }

    /// Lautstaerke einer Frequenz (1.0 wenn nie gesetzt)
    pub fn lautstaerke(&self, frequenz: FrequencyHz) -> f32 {
        self.frequenzen.get(&frequenz).map_or(1.0, |k| k.ziel)
    }

    pub fn frequenz_stumm(&mut self, frequenz: FrequencyHz, stumm: bool) -> bool {
        match self.frequenzen.get_mut(&frequenz) {
            Some(kanal) => {
                kanal.stumm = stumm;
                true
            }
            None => false,
        }
    }

    /// Vergisst die Einstellungen einer Frequenz (nach dem Abbestellen)
    pub fn frequenz_entfernen(&mut self, frequenz: FrequencyHz) {
        self.frequenzen.remove(&frequenz);
    }

    /// Anzahl angelegter Frequenz-Kanaele
    pub fn kanaele(&self) -> usize {
        self.frequenzen.len()
    }

    /// Mischt alle Frequenz-Frames zu einem Geraete-Frame (48 kHz)
    pub fn mischen<'a>(
        &mut self,
        eingaben: impl IntoIterator<Item = (FrequencyHz, &'a AudioFrame)>,
    ) -> AudioFrame {
        let laenge = crate::frame::MIX_FRAME_SAMPLES;
        self.summe.clear();
        self.summe.resize(laenge, 0.0);

        for (frequenz, frame) in eingaben {
            // Nicht angelegte Frequenzen laufen mit 1.0, ohne Eintrag
            let (start, ende) = self
                .frequenzen
                .get_mut(&frequenz)
                .map_or((1.0, 1.0), Kanal::rampe);
            rampe_addieren(&mut self.summe, frame.samples(), start, ende);
        }

        let (start, ende) = self.master.rampe();
        let n = laenge as f32;
        let mut ausgabe = Vec::with_capacity(laenge);
        for (i, s) in self.summe.iter().enumerate() {
            let gain = start + (ende - start) * (i as f32 / n);
            ausgabe.push(self.limiter.sample(s * gain));
        }
        AudioFrame::neu(ausgabe, MIX_RATE)
    }
}

fn rampe_addieren(summe: &mut [f32], samples: &[f32], start: f32, ende: f32) {
    let n = summe.len().max(1) as f32;
    for (i, (out, s)) in summe.iter_mut().zip(samples).enumerate() {
        let gain = start + (ende - start) * (i as f32 / n);
        *out += s * gain;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWR: FrequencyHz = FrequencyHz(118_300_000);
    const GND: FrequencyHz = FrequencyHz(121_900_000);

    fn konstant(wert: f32) -> AudioFrame {
        AudioFrame::neu(vec![wert; 960], MIX_RATE)
    }

    #[test]
    fn ohne_eingaben_stille() {
        let mut m = AusgabeMixer::neu();
        let frame = m.mischen(std::iter::empty());
        assert_eq!(frame.len(), 960);
        assert!(frame.ist_stille());
    }

    #[test]
    fn frequenzen_werden_addiert() {
        let mut m = AusgabeMixer::neu();
        let a = konstant(0.1);
        let b = konstant(0.2);
        let frame = m.mischen([(TWR, &a), (GND, &b)]);
        assert!(frame.samples().iter().all(|s| (s - 0.3).abs() < 1e-6));
    }

    #[test]
    fn lautstaerke_wird_gerampt() {
        let mut m = AusgabeMixer::neu();
        let a = konstant(0.5);
        m.frequenz_hinzufuegen(TWR);
        m.mischen([(TWR, &a)]);
        assert!(m.lautstaerke_setzen(TWR, 0.0));

        let frame = m.mischen([(TWR, &a)]);
        assert!((frame.samples()[0] - 0.5).abs() < 1e-6, "Rampe beginnt beim alten Wert");
        assert!(frame.samples()[959] < 0.01);

        let danach = m.mischen([(TWR, &a)]);
        assert!(danach.ist_stille());
    }

    #[test]
    fn master_stumm() {
        let mut m = AusgabeMixer::neu();
        m.master_stumm(true);
        let a = konstant(0.5);
        m.mischen([(TWR, &a)]);
        assert!(m.mischen([(TWR, &a)]).ist_stille());
    }

    #[test]
    fn lautstaerke_begrenzt() {
        let mut m = AusgabeMixer::neu();
        m.master_setzen(99.0);
        assert_eq!(m.master(), MAX_LAUTSTAERKE);
        m.frequenz_hinzufuegen(TWR);
        m.lautstaerke_setzen(TWR, -1.0);
        assert_eq!(m.lautstaerke(TWR), 0.0);
        assert_eq!(m.lautstaerke(GND), 1.0);
    }

    #[test]
    fn unbekannte_frequenzen_legen_keinen_kanal_an() {
        let mut m = AusgabeMixer::neu();
        m.frequenz_hinzufuegen(TWR);
        for i in 0..1000u32 {
            let f = FrequencyHz(130_000_000 + i * 25_000);
            assert!(!m.lautstaerke_setzen(f, 0.5));
            assert!(!m.frequenz_stumm(f, true));
        }
        let a = konstant(0.1);
        m.mischen([(GND, &a)]);
        assert_eq!(m.kanaele(), 1);

        assert!(m.frequenz_stumm(TWR, true));
        m.frequenz_entfernen(TWR);
        assert_eq!(m.kanaele(), 0);
    }

    #[test]
    fn summe_bleibt_unter_eins() {
        let mut m = AusgabeMixer::neu();
        let laut = konstant(0.9);
        let frame = m.mischen([(TWR, &laut), (GND, &laut)]);
        assert!(frame.spitze() < 1.0);
    }
}
