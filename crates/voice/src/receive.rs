//! Receive Pipeline – Empfangsweg aller entfernten Sender
//!
//! Pakete landen (ueber die Paket-Queue der Sitzung) im Jitter Buffer
//! ihrer Quelle. Jeder Audio-Takt zieht aus jeder Quelle genau einen
//! Beitrag, verteilt ihn auf die abonnierten Frequenzen und liefert pro
//! Frequenz genau einen gemischten Frame an die `AusgabeSenke`.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use skyband_audio::{AudioFrame, MIX_RATE};
use skyband_core::{Callsign, FrequencyHz, SkybandError};
use skyband_protocol::VoicePacket;
use tracing::{debug, info, trace, warn};

use crate::jitter_buffer::JitterBufferConfig;
use crate::mixer::{MischEingabe, MixerConfig, RadioChannelMixer};
use crate::remote_source::{QuellenArena, QuellenId, QuellenTakt, RemoteSource};

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveConfig {
    /// Obergrenze gleichzeitig verfolgter Sender
    pub max_quellen: usize,
    /// Sender ohne Pakete fuer diese Zeit werden entfernt
    pub stille_timeout_ms: u64,
    /// Obergrenze abonnierter Frequenzen
    pub max_frequenzen: usize,
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            max_quellen: 32,
            stille_timeout_ms: 3000,
            max_frequenzen: 16,
        }
    }
}

// ---------------------------------------------------------------------------
// Ausgabe
// ---------------------------------------------------------------------------

/// Abnehmer der gemischten Frequenz-Frames (Audio-Ausgabe)
pub trait AusgabeSenke {
    fn frequenz_frame(&mut self, frequenz: FrequencyHz, frame: &AudioFrame);
}

/// Sammelt alle Frames eines Takts (Tests, einfache Ausgaben)
#[derive(Debug, Default)]
pub struct FrameSammlung {
    pub frames: Vec<(FrequencyHz, AudioFrame)>,
}

impl AusgabeSenke for FrameSammlung {
    fn frequenz_frame(&mut self, frequenz: FrequencyHz, frame: &AudioFrame) {
        self.frames.push((frequenz, frame.clone()));
    }
}

// ---------------------------------------------------------------------------
// Statistik
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ReceiveStatistik {
    pub pakete: u64,
    /// Eigene Pakete (Echo des Servers)
    pub eigene: u64,
    pub quellen_erstellt: u64,
    pub quellen_verdraengt: u64,
    pub quellen_abgelaufen: u64,
    pub aktive_quellen: usize,
    pub verdeckt: u64,
    pub verspaetet: u64,
    pub duplikate: u64,
    pub takte: u64,
}

/// Zaehler bereits entfernter Quellen, damit Summen nicht zurueckspringen
#[derive(Debug, Clone, Default)]
struct Abgeschlossen {
    verspaetet: u64,
    duplikate: u64,
}

// ---------------------------------------------------------------------------
// FrequencySubscription
// ---------------------------------------------------------------------------

/// Eine abonnierte Frequenz mit ihrem Mixer
pub struct FrequencySubscription {
    frequenz: FrequencyHz,
    /// Quellen, die im letzten Takt auf dieser Frequenz hoerbar waren
    aktive: Vec<QuellenId>,
    mixer: RadioChannelMixer,
    /// Sender, die ohne Funk-Effekte durchgereicht werden
    direkt: Vec<Callsign>,
    seit: Instant,
}

impl FrequencySubscription {
    pub fn frequenz(&self) -> FrequencyHz {
        self.frequenz
    }

    pub fn aktive(&self) -> &[QuellenId] {
        &self.aktive
    }

    pub fn mixer(&self) -> &RadioChannelMixer {
        &self.mixer
    }

    pub fn ist_direkt(&self, callsign: &Callsign) -> bool {
        self.direkt.contains(callsign)
    }
}

// ---------------------------------------------------------------------------
// ReceivePipeline
// ---------------------------------------------------------------------------

pub struct ReceivePipeline {
    eigenes_callsign: Callsign,
    config: ReceiveConfig,
    jitter: JitterBufferConfig,
    mixer: MixerConfig,
    quellen: QuellenArena,
    abos: Vec<FrequencySubscription>,
    /// Frequenzen, auf denen gerade selbst gesendet wird (Halbduplex)
    gesperrt: Vec<FrequencyHz>,
    /// Beitraege des laufenden Takts (wiederverwendet)
    takte: Vec<(QuellenId, QuellenTakt)>,
    abgeschlossen: Abgeschlossen,
    statistik: ReceiveStatistik,
}

impl ReceivePipeline {
    pub fn neu(
        eigenes_callsign: Callsign,
        config: ReceiveConfig,
        jitter: JitterBufferConfig,
        mixer: MixerConfig,
    ) -> Self {
        Self {
            eigenes_callsign,
            quellen: QuellenArena::neu(config.max_quellen),
            abos: Vec::with_capacity(config.max_frequenzen),
            gesperrt: Vec::with_capacity(config.max_frequenzen),
            takte: Vec::with_capacity(config.max_quellen),
            config,
            jitter,
            mixer,
            abgeschlossen: Abgeschlossen::default(),
            statistik: ReceiveStatistik::default(),
        }
    }

    /// Ordnet ein Paket seiner Quelle zu (legt sie bei Bedarf an)
    pub fn paket_empfangen(&mut self, paket: VoicePacket, jetzt: Instant) {
        if paket.callsign == self.eigenes_callsign {
            self.statistik.eigene += 1;
            return;
        }
        self.statistik.pakete += 1;

        let id = match self.quellen.suchen(&paket.callsign) {
            Some(id) => id,
            None => {
                let quelle = RemoteSource::neu(
                    paket.callsign.clone(),
                    self.jitter.clone(),
                    jetzt,
                );
                let (id, verdraengt) = self.quellen.einfuegen(quelle);
                self.statistik.quellen_erstellt += 1;
                if let Some(alt) = verdraengt {
                    self.statistik.quellen_verdraengt += 1;
                    self.abschliessen(&alt);
                }
                id
            }
        };

        if let Some(quelle) = self.quellen.get_mut(id) {
            trace!(callsign = %paket.callsign, sequence = paket.sequence, "Paket eingereiht");
            quelle.paket_empfangen(paket, jetzt);
        }
    }

    /// Ein Audio-Takt: genau ein Frame pro abonnierter Frequenz
    pub fn tick(&mut self, jetzt: Instant, senke: &mut dyn AusgabeSenke) {
        self.statistik.takte += 1;
        self.stille_quellen_entfernen(jetzt);

        let Self {
            quellen,
            abos,
            gesperrt,
            takte,
            statistik,
            ..
        } = self;

        takte.clear();
        for (id, quelle) in quellen.iter_mut() {
            if let Some(takt) = quelle.tick(jetzt) {
                if takt.verdeckt {
                    statistik.verdeckt += 1;
                }
                takte.push((id, takt));
            }
        }
        let quellen = &*quellen;

        let mut eingaben: Vec<MischEingabe<'_>> = Vec::with_capacity(takte.len());
        for abo in abos.iter_mut() {
            abo.aktive.clear();

            // Halbduplex: waehrend eigener Sendung bleibt die Frequenz stumm
            if gesperrt.contains(&abo.frequenz) {
                abo.mixer.zuruecksetzen();
                senke.frequenz_frame(abo.frequenz, &AudioFrame::stille(MIX_RATE));
                continue;
            }

            eingaben.clear();
            for (id, takt) in takte.iter() {
                if let Some(signal) = takt.signal_auf(abo.frequenz) {
                    abo.aktive.push(*id);
                    let bypass = !abo.direkt.is_empty()
                        && quellen
                            .get(*id)
                            .is_some_and(|q| abo.direkt.contains(q.callsign()));
                    eingaben.push(MischEingabe {
                        frame: &takt.frame,
                        signal,
                        anfang: takt.anfang,
                        ende: takt.ende,
                        bypass,
                    });
                }
            }
            let frame = abo.mixer.mischen(&eingaben);
            senke.frequenz_frame(abo.frequenz, &frame);
        }
    }

    /// Frequenzen, auf denen gerade gesendet wird; ersetzt die vorherige Sperre
    pub fn sendesperre_setzen(&mut self, frequenzen: &[FrequencyHz]) {
        if self.gesperrt.as_slice() == frequenzen {
            return;
        }
        self.gesperrt.clear();
        self.gesperrt
            .extend(frequenzen.iter().take(self.config.max_frequenzen).copied());
        trace!(frequenzen = self.gesperrt.len(), "Sendesperre gesetzt");
    }

    pub fn ist_gesperrt(&self, frequenz: FrequencyHz) -> bool {
        self.gesperrt.contains(&frequenz)
    }

    /// Funk-Effekte einer Frequenz an/aus; `false` wenn nicht abonniert
    pub fn effekte_setzen(&mut self, frequenz: FrequencyHz, an: bool) -> bool {
        match self.abos.iter_mut().find(|a| a.frequenz == frequenz) {
            Some(abo) => {
                abo.mixer.effekte_setzen(an);
                info!(frequenz = %frequenz, an, "Funk-Effekte umgeschaltet");
                true
            }
            None => false,
        }
    }

    /// Reicht einen Sender auf `frequenz` ohne Funk-Effekte durch
    ///
    /// `false` wenn die Frequenz nicht abonniert ist oder die Liste voll ist.
    pub fn direkt_setzen(&mut self, frequenz: FrequencyHz, callsign: &Callsign, an: bool) -> bool {
        let max = self.config.max_quellen.max(1);
        let Some(abo) = self.abos.iter_mut().find(|a| a.frequenz == frequenz) else {
            return false;
        };
        if an {
            if !abo.direkt.contains(callsign) {
                if abo.direkt.len() >= max {
                    warn!(frequenz = %frequenz, callsign = %callsign, "Direkt-Liste voll");
                    return false;
                }
                abo.direkt.push(callsign.clone());
            }
        } else {
            abo.direkt.retain(|c| c != callsign);
        }
        debug!(frequenz = %frequenz, callsign = %callsign, an, "Direktweg gesetzt");
        true
    }

    /// Abonniert eine Frequenz
    ///
    /// Ist die Obergrenze erreicht, wird das aelteste Abonnement beendet
    /// und seine Frequenz zurueckgegeben.
    pub fn abonnieren(&mut self, frequenz: FrequencyHz, jetzt: Instant) -> Option<FrequencyHz> {
        if self.abos.iter().any(|a| a.frequenz == frequenz) {
            return None;
        }

        let verdraengt = if self.abos.len() >= self.config.max_frequenzen.max(1) {
            let aeltestes = self
                .abos
                .iter()
                .enumerate()
                .min_by_key(|(_, a)| a.seit)
                .map(|(i, _)| i);
            aeltestes.map(|i| {
                let alt = self.abos.remove(i).frequenz;
                let fehler = SkybandError::ResourceExhaustion(format!(
                    "{} Frequenzen abonniert, {alt} verdraengt",
                    self.config.max_frequenzen
                ));
                warn!(fehler = %fehler, neu = %frequenz, "Abonnement verdraengt");
                alt
            })
        } else {
            None
        };

        info!(frequenz = %frequenz, "Frequenz abonniert");
        self.abos.push(FrequencySubscription {
            frequenz,
            aktive: Vec::new(),
            mixer: RadioChannelMixer::neu(frequenz, self.mixer.clone()),
            direkt: Vec::new(),
            seit: jetzt,
        });
        verdraengt
    }

    /// Beendet ein Abonnement; `false` wenn die Frequenz nicht abonniert war
    pub fn abbestellen(&mut self, frequenz: FrequencyHz) -> bool {
        let vorher = self.abos.len();
        self.abos.retain(|a| a.frequenz != frequenz);
        let entfernt = self.abos.len() != vorher;
        if entfernt {
            info!(frequenz = %frequenz, "Frequenz abbestellt");
        }
        entfernt
    }

    pub fn ist_abonniert(&self, frequenz: FrequencyHz) -> bool {
        self.abos.iter().any(|a| a.frequenz == frequenz)
    }

    pub fn abonnements(&self) -> impl Iterator<Item = &FrequencySubscription> {
        self.abos.iter()
    }

    pub fn abonnement(&self, frequenz: FrequencyHz) -> Option<&FrequencySubscription> {
        self.abos.iter().find(|a| a.frequenz == frequenz)
    }

    /// Callsigns der Quellen, die im letzten Takt auf `frequenz` hoerbar waren
    pub fn aktive_sender(&self, frequenz: FrequencyHz) -> Vec<Callsign> {
        self.abonnement(frequenz)
            .map(|abo| {
                abo.aktive
                    .iter()
                    .filter_map(|id| self.quellen.get(*id))
                    .map(|q| q.callsign().clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn quellen(&self) -> &QuellenArena {
        &self.quellen
    }

    /// Verwirft alle Quellen und Abonnements-Zustaende (Sitzungsende)
    pub fn leeren(&mut self) {
        let ids: Vec<QuellenId> = self.quellen.iter().map(|(id, _)| id).collect();
        for id in ids {
            if let Some(quelle) = self.quellen.entfernen(id) {
                self.abschliessen(&quelle);
            }
        }
        for abo in self.abos.iter_mut() {
            abo.aktive.clear();
        }
        self.takte.clear();
        debug!("Empfangsweg geleert");
    }

    pub fn statistik(&self) -> ReceiveStatistik {
        let mut s = self.statistik.clone();
        s.aktive_quellen = self.quellen.len();
        s.verspaetet = self.abgeschlossen.verspaetet;
        s.duplikate = self.abgeschlossen.duplikate;
        for (_, quelle) in self.quellen.iter() {
            let j = quelle.jitter().statistik();
            s.verspaetet += j.verspaetet;
            s.duplikate += j.duplikate;
        }
        s
    }

    fn stille_quellen_entfernen(&mut self, jetzt: Instant) {
        let timeout = Duration::from_millis(self.config.stille_timeout_ms);
        let abgelaufen: Vec<QuellenId> = self
            .quellen
            .iter()
            .filter(|(_, q)| jetzt.saturating_duration_since(q.zuletzt_gehoert()) > timeout)
            .map(|(id, _)| id)
            .collect();

        for id in abgelaufen {
            if let Some(quelle) = self.quellen.entfernen(id) {
                debug!(callsign = %quelle.callsign(), "Quelle nach Stille entfernt");
                self.statistik.quellen_abgelaufen += 1;
                self.abschliessen(&quelle);
            }
        }
    }

    fn abschliessen(&mut self, quelle: &RemoteSource) {
        let j = quelle.jitter().statistik();
        self.abgeschlossen.verspaetet += j.verspaetet;
        self.abgeschlossen.duplikate += j.duplikate;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jitter_buffer::JitterBufferModus;
    use bytes::Bytes;
    use skyband_protocol::{CodecArt, Zielfrequenz};

    const TWR: FrequencyHz = FrequencyHz(118_300_000);
    const GND: FrequencyHz = FrequencyHz(121_900_000);

    fn pipeline() -> ReceivePipeline {
        ReceivePipeline::neu(
            Callsign::neu("EDDF_TWR").unwrap(),
            ReceiveConfig::default(),
            JitterBufferConfig {
                modus: JitterBufferModus::Fest,
                ..JitterBufferConfig::default()
            },
            MixerConfig::ohne_effekte(),
        )
    }

    fn paket(von: &str, seq: u32, frequenzen: &[FrequencyHz]) -> VoicePacket {
        VoicePacket {
            callsign: Callsign::neu(von).unwrap(),
            sequence: seq,
            frequenzen: frequenzen.iter().copied().map(Zielfrequenz::voll).collect(),
            payload: Bytes::from(vec![0xA0u8; 160]),
            start: seq == 0,
            ende: false,
            zeitstempel_ms: 0,
            codec: CodecArt::Pcmu,
        }
    }

    #[test]
    fn eigene_pakete_werden_ignoriert() {
        let mut rx = pipeline();
        rx.paket_empfangen(paket("EDDF_TWR", 0, &[TWR]), Instant::now());
        assert_eq!(rx.statistik().eigene, 1);
        assert!(rx.quellen().is_empty());
    }

    #[test]
    fn ein_frame_pro_frequenz_und_takt() {
        let mut rx = pipeline();
        let t = Instant::now();
        rx.abonnieren(TWR, t);
        rx.abonnieren(GND, t);

        for takt in 0..5 {
            let mut senke = FrameSammlung::default();
            rx.tick(t, &mut senke);
            assert_eq!(senke.frames.len(), 2, "Takt {takt}");
            assert!(senke.frames.iter().all(|(_, f)| f.ist_stille()));
        }
    }

    /// Spielt `n` Takte und sammelt alle Frames
    fn abspielen(rx: &mut ReceivePipeline, t: Instant, n: usize) -> FrameSammlung {
        let mut senke = FrameSammlung::default();
        for _ in 0..n {
            rx.tick(t, &mut senke);
        }
        senke
    }

    fn hoerbar(senke: &FrameSammlung, frequenz: FrequencyHz) -> bool {
        senke
            .frames
            .iter()
            .any(|(f, frame)| *f == frequenz && !frame.ist_stille())
    }

    #[test]
    fn sender_landet_nur_auf_seiner_frequenz() {
        let mut rx = pipeline();
        let t = Instant::now();
        rx.abonnieren(TWR, t);
        rx.abonnieren(GND, t);
        for seq in 0..8 {
            rx.paket_empfangen(paket("DLH4CK", seq, &[TWR]), t);
        }

        let senke = abspielen(&mut rx, t, 4);
        assert_eq!(senke.frames.len(), 8);
        assert!(hoerbar(&senke, TWR));
        assert!(!hoerbar(&senke, GND));
        assert_eq!(rx.aktive_sender(TWR), vec![Callsign::neu("DLH4CK").unwrap()]);
        assert!(rx.aktive_sender(GND).is_empty());
    }

    #[test]
    fn ein_sender_auf_mehreren_frequenzen() {
        let mut rx = pipeline();
        let t = Instant::now();
        rx.abonnieren(TWR, t);
        rx.abonnieren(GND, t);
        for seq in 0..8 {
            rx.paket_empfangen(paket("DLH4CK", seq, &[TWR, GND]), t);
        }

        let senke = abspielen(&mut rx, t, 4);
        assert!(hoerbar(&senke, TWR));
        assert!(hoerbar(&senke, GND));
        assert_eq!(rx.quellen().len(), 1);
    }

    #[test]
    fn abbestellen_und_verdraengen() {
        let mut rx = ReceivePipeline::neu(
            Callsign::neu("EDDF_TWR").unwrap(),
            ReceiveConfig {
                max_frequenzen: 2,
                ..ReceiveConfig::default()
            },
            JitterBufferConfig::default(),
            MixerConfig::default(),
        );
        let t = Instant::now();
        assert_eq!(rx.abonnieren(TWR, t), None);
        assert_eq!(rx.abonnieren(TWR, t), None);
        assert_eq!(rx.abonnieren(GND, t + Duration::from_millis(1)), None);
        let dritte = FrequencyHz(124_850_000);
        assert_eq!(rx.abonnieren(dritte, t + Duration::from_millis(2)), Some(TWR));
        assert!(!rx.ist_abonniert(TWR));

        assert!(rx.abbestellen(GND));
        assert!(!rx.abbestellen(GND));
        assert_eq!(rx.abonnements().count(), 1);
    }

    #[test]
    fn zu_viele_quellen_verdraengen_die_aelteste() {
        let mut rx = ReceivePipeline::neu(
            Callsign::neu("EDDF_TWR").unwrap(),
            ReceiveConfig {
                max_quellen: 2,
                ..ReceiveConfig::default()
            },
            JitterBufferConfig::default(),
            MixerConfig::default(),
        );
        let t = Instant::now();
        rx.paket_empfangen(paket("A1", 0, &[TWR]), t);
        rx.paket_empfangen(paket("B2", 0, &[TWR]), t + Duration::from_millis(10));
        rx.paket_empfangen(paket("C3", 0, &[TWR]), t + Duration::from_millis(20));
        assert_eq!(rx.quellen().len(), 2);
        assert!(rx.quellen().suchen(&Callsign::neu("A1").unwrap()).is_none());
        assert_eq!(rx.statistik().quellen_verdraengt, 1);
    }

    #[test]
    fn leeren_verwirft_alle_quellen() {
        let mut rx = pipeline();
        let t = Instant::now();
        rx.abonnieren(TWR, t);
        rx.paket_empfangen(paket("DLH4CK", 0, &[TWR]), t);
        rx.paket_empfangen(paket("DLH4CK", 1, &[TWR]), t);
        rx.leeren();
        assert!(rx.quellen().is_empty());

        let mut senke = FrameSammlung::default();
        rx.tick(t, &mut senke);
        assert_eq!(senke.frames.len(), 1);
        assert!(senke.frames[0].1.ist_stille());
    }

    fn mit_effekte() -> ReceivePipeline {
        ReceivePipeline::neu(
            Callsign::neu("EDDF_TWR").unwrap(),
            ReceiveConfig::default(),
            JitterBufferConfig {
                modus: JitterBufferModus::Fest,
                ..JitterBufferConfig::default()
            },
            MixerConfig::default(),
        )
    }

    /// Spielt dieselben Pakete ab und liefert die Tower-Frames
    fn tower_frames(rx: &mut ReceivePipeline, von: &str) -> Vec<Vec<f32>> {
        let t = Instant::now();
        rx.abonnieren(TWR, t);
        for seq in 0..8 {
            rx.paket_empfangen(paket(von, seq, &[TWR]), t);
        }
        abspielen(rx, t, 6)
            .frames
            .into_iter()
            .filter(|(f, _)| *f == TWR)
            .map(|(_, frame)| frame.samples().to_vec())
            .collect()
    }

    #[test]
    fn direkt_sender_klingt_wie_ohne_effekte() {
        let referenz = tower_frames(&mut pipeline(), "DLH4CK");

        let mut rx = mit_effekte();
        rx.abonnieren(TWR, Instant::now());
        assert!(rx.direkt_setzen(TWR, &Callsign::neu("DLH4CK").unwrap(), true));
        assert_eq!(tower_frames(&mut rx, "DLH4CK"), referenz);

        // Andere Sender bleiben auf dem Funkweg
        let mut rx = mit_effekte();
        rx.abonnieren(TWR, Instant::now());
        rx.direkt_setzen(TWR, &Callsign::neu("DLH4CK").unwrap(), true);
        assert_ne!(tower_frames(&mut rx, "BAW12"), referenz);
    }

    #[test]
    fn effekte_pro_frequenz_abschaltbar() {
        let referenz = tower_frames(&mut pipeline(), "DLH4CK");

        let mut rx = mit_effekte();
        rx.abonnieren(TWR, Instant::now());
        assert!(rx.effekte_setzen(TWR, false));
        assert!(!rx.effekte_setzen(GND, false));
        assert_eq!(tower_frames(&mut rx, "DLH4CK"), referenz);
    }

    #[test]
    fn direkt_nur_fuer_abonnierte_frequenzen() {
        let mut rx = ReceivePipeline::neu(
            Callsign::neu("EDDF_TWR").unwrap(),
            ReceiveConfig {
                max_quellen: 1,
                ..ReceiveConfig::default()
            },
            JitterBufferConfig::default(),
            MixerConfig::default(),
        );
        let a = Callsign::neu("DLH4CK").unwrap();
        let b = Callsign::neu("BAW12").unwrap();
        assert!(!rx.direkt_setzen(TWR, &a, true));

        rx.abonnieren(TWR, Instant::now());
        assert!(rx.direkt_setzen(TWR, &a, true));
        assert!(rx.direkt_setzen(TWR, &a, true));
        assert!(!rx.direkt_setzen(TWR, &b, true));
        assert!(rx.abonnement(TWR).unwrap().ist_direkt(&a));

        assert!(rx.direkt_setzen(TWR, &a, false));
        assert!(!rx.abonnement(TWR).unwrap().ist_direkt(&a));
        assert!(rx.direkt_setzen(TWR, &b, true));
    }

    #[test]
    fn sendesperre_macht_nur_die_sendefrequenz_stumm() {
        let mut rx = pipeline();
        let t = Instant::now();
        rx.abonnieren(TWR, t);
        rx.abonnieren(GND, t);
        for seq in 0..12 {
            rx.paket_empfangen(paket("DLH4CK", seq, &[TWR, GND]), t);
        }

        rx.sendesperre_setzen(&[TWR]);
        assert!(rx.ist_gesperrt(TWR));
        let senke = abspielen(&mut rx, t, 4);
        assert_eq!(senke.frames.len(), 8);
        assert!(!hoerbar(&senke, TWR));
        assert!(hoerbar(&senke, GND));
        assert!(rx.aktive_sender(TWR).is_empty());
        assert_eq!(rx.aktive_sender(GND).len(), 1);

        // Nach dem Loslassen ist der Sender wieder zu hoeren
        rx.sendesperre_setzen(&[]);
        let senke = abspielen(&mut rx, t, 2);
        assert!(hoerbar(&senke, TWR));
    }

    /// Deterministischer Zufall fuer Verlust und Umordnung
    struct XorShift(u64);

    impl XorShift {
        fn naechste(&mut self) -> u64 {
            self.0 ^= self.0 << 13;
            self.0 ^= self.0 >> 7;
            self.0 ^= self.0 << 17;
            self.0
        }
    }

    #[test]
    fn verlust_und_umordnung_liefern_weiter_einen_frame_pro_takt() {
        let mut rx = ReceivePipeline::neu(
            Callsign::neu("EDDF_TWR").unwrap(),
            ReceiveConfig::default(),
            JitterBufferConfig::default(),
            MixerConfig::default(),
        );
        let t0 = Instant::now();
        rx.abonnieren(TWR, t0);
        rx.abonnieren(GND, t0);

        // Sendezeit 20 ms * seq, Ankunft bis zu drei Takte spaeter, 20 % Verlust
        let mut zufall = XorShift(0x5eed_cafe_f00d);
        let mut unterwegs: Vec<(u64, VoicePacket)> = Vec::new();
        for (von, frequenz) in [("DLH4CK", TWR), ("BAW12", GND)] {
            for seq in 0..150u32 {
                if zufall.naechste() % 5 == 0 {
                    continue;
                }
                let verzug = zufall.naechste() % 4;
                let mut p = paket(von, seq, &[frequenz]);
                p.ende = seq == 149;
                unterwegs.push(((u64::from(seq) + verzug) * 20, p));
            }
        }
        unterwegs.sort_by_key(|(ankunft, _)| *ankunft);

        let mut ankuenfte = unterwegs.into_iter().peekable();
        let mut senke = FrameSammlung::default();
        let mut tower_hoerbar = false;
        let mut ground_hoerbar = false;
        for k in 0..200u64 {
            let jetzt = t0 + Duration::from_millis(k * 20);
            while let Some((_, p)) = ankuenfte.next_if(|(ankunft, _)| *ankunft <= k * 20) {
                rx.paket_empfangen(p, jetzt);
            }

            senke.frames.clear();
            rx.tick(jetzt, &mut senke);
            assert_eq!(senke.frames.len(), 2, "Takt {k}");
            assert_eq!(senke.frames.iter().filter(|(f, _)| *f == TWR).count(), 1);
            assert_eq!(senke.frames.iter().filter(|(f, _)| *f == GND).count(), 1);
            tower_hoerbar |= !rx.aktive_sender(TWR).is_empty();
            ground_hoerbar |= !rx.aktive_sender(GND).is_empty();
        }

        assert!(tower_hoerbar && ground_hoerbar);
        assert!(rx.statistik().verdeckt > 0);
        assert_eq!(rx.statistik().takte, 200);
    }
}
