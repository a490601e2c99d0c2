//! Transmit Pipeline – Sendeweg des lokalen Operators
//!
//! Zustandsautomat pro Capture-Takt:
//!
//! ```text
//! Idle ──(PTT/VAD)──► Armed ──(erster Frame kodiert, START)──► Transmitting
//!   ▲                   │                                          │
//!   └──(Absicht weg)────┘◄──────(Loslassen/Stille/Mute, ENDE)──────┘
//! ```
//!
//! Die Sequenznummer zaehlt in jedem Takt weiter, auch im Idle. Dadurch
//! sieht der Jitter Buffer der Gegenstellen eine durchgehende Zeitbasis.

use skyband_audio::{AudioFrame, CodecAdapter, PegelMesser, PttController, PttMode, VadConfig};
use skyband_core::{Callsign, FrequencyHz, SkybandError};
use skyband_protocol::{CodecConfig, VoicePacket, Zielfrequenz};
use bytes::Bytes;
use tracing::{debug, warn};

/// Zustand des Sendewegs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendeZustand {
    Idle,
    /// Sendeabsicht erkannt, noch kein Paket gesendet
    Armed,
    Transmitting,
}

/// Zaehler des Sendewegs
#[derive(Debug, Clone, Default)]
pub struct SendeStatistik {
    pub takte: u64,
    pub pakete: u64,
    pub bytes: u64,
    /// Begonnene Uebertragungen
    pub uebertragungen: u64,
    pub encode_fehler: u64,
}

pub struct TransmitPipeline {
    callsign: Callsign,
    codec: CodecAdapter,
    ptt: PttController,
    zustand: SendeZustand,
    sequenz: u32,
    frequenzen: Vec<Zielfrequenz>,
    pegel: PegelMesser,
    statistik: SendeStatistik,
}

impl TransmitPipeline {
    pub fn neu(
        callsign: Callsign,
        codec: CodecConfig,
        vad: VadConfig,
        ptt_modus: PttMode,
    ) -> Result<Self, SkybandError> {
        let codec = CodecAdapter::neu(codec, vad)?;
        Ok(Self {
            callsign,
            codec,
            ptt: PttController::neu(ptt_modus),
            zustand: SendeZustand::Idle,
            sequenz: 0,
            frequenzen: Vec::new(),
            pegel: PegelMesser::neu(),
            statistik: SendeStatistik::default(),
        })
    }

    /// Verarbeitet einen Capture-Frame; liefert hoechstens ein Paket
    pub fn tick(&mut self, capture: &AudioFrame, zeitstempel_ms: u64) -> Option<VoicePacket> {
        let sequenz = self.sequenz;
        self.sequenz = self.sequenz.wrapping_add(1);
        self.statistik.takte += 1;

        self.pegel.messen(capture.samples());
        let sprache = self.codec.detect_voice_activity(capture);
        self.ptt.vad_setzen(sprache);
        let absicht = self.sendeabsicht();

        match (self.zustand, absicht) {
            (SendeZustand::Idle, false) => None,
            (SendeZustand::Armed, false) => {
                debug!("Sendeabsicht vor dem ersten Frame zurueckgenommen");
                self.zustand = SendeZustand::Idle;
                None
            }
            (SendeZustand::Idle | SendeZustand::Armed, true) => {
                self.zustand = SendeZustand::Armed;
                let payload = self.kodieren(capture)?;
                self.zustand = SendeZustand::Transmitting;
                self.statistik.uebertragungen += 1;
                debug!(sequence = sequenz, frequenzen = self.frequenzen.len(), "Uebertragung beginnt");
                Some(self.paket(sequenz, payload, true, false, zeitstempel_ms))
            }
            (SendeZustand::Transmitting, true) => {
                let payload = self.kodieren(capture)?;
                Some(self.paket(sequenz, payload, false, false, zeitstempel_ms))
            }
            (SendeZustand::Transmitting, false) => {
                // Ende-Marker geht auch ohne Nutzdaten raus
                let payload = self.kodieren(capture).unwrap_or_default();
                self.zustand = SendeZustand::Idle;
                debug!(sequence = sequenz, "Uebertragung endet");
                Some(self.paket(sequenz, payload, false, true, zeitstempel_ms))
            }
        }
    }

    pub fn ptt_druecken(&mut self) {
        self.ptt.taste_druecken();
        self.absicht_vormerken();
    }

    pub fn ptt_loslassen(&mut self) {
        self.ptt.taste_loslassen();
    }

    /// Mute beendet eine laufende Uebertragung mit dem naechsten Takt
    pub fn stummschalten(&mut self, stumm: bool) {
        self.ptt.stumm_setzen(stumm);
    }

    pub fn ptt_modus_setzen(&mut self, modus: PttMode) {
        self.ptt.modus_setzen(modus);
    }

    /// Frequenzen, auf denen gesendet wird; leer = nicht senden
    pub fn frequenzen_setzen(&mut self, frequenzen: &[FrequencyHz]) {
        self.frequenzen.clear();
        self.frequenzen
            .extend(frequenzen.iter().copied().map(Zielfrequenz::voll));
    }

    pub fn frequenzen(&self) -> impl Iterator<Item = FrequencyHz> + '_ {
        self.frequenzen.iter().map(|z| z.frequenz)
    }

    pub fn zustand(&self) -> SendeZustand {
        self.zustand
    }

    pub fn ptt_modus(&self) -> PttMode {
        self.ptt.mode()
    }

    pub fn ist_stumm(&self) -> bool {
        self.ptt.ist_stumm()
    }

    pub fn pegel(&self) -> &PegelMesser {
        &self.pegel
    }

    /// Naechste zu vergebende Sequenznummer
    pub fn sequenz(&self) -> u32 {
        self.sequenz
    }

    pub fn statistik(&self) -> &SendeStatistik {
        &self.statistik
    }

    fn sendeabsicht(&self) -> bool {
        self.ptt.sendeabsicht() && !self.frequenzen.is_empty()
    }

    fn absicht_vormerken(&mut self) {
        if self.zustand == SendeZustand::Idle && self.sendeabsicht() {
            self.zustand = SendeZustand::Armed;
        }
    }

    fn kodieren(&mut self, capture: &AudioFrame) -> Option<Bytes> {
        let codec_frame = self.codec.resample(capture, self.codec.codec_rate());
        match self.codec.encode(&codec_frame) {
            Ok(bytes) => Some(Bytes::from(bytes)),
            Err(e) => {
                self.statistik.encode_fehler += 1;
                warn!(fehler = %e, "Frame nicht kodierbar, wird ausgelassen");
                None
            }
        }
    }

    fn paket(
        &mut self,
        sequence: u32,
        payload: Bytes,
        start: bool,
        ende: bool,
        zeitstempel_ms: u64,
    ) -> VoicePacket {
        self.statistik.pakete += 1;
        self.statistik.bytes += payload.len() as u64;
        VoicePacket {
            callsign: self.callsign.clone(),
            sequence,
            frequenzen: self.frequenzen.clone(),
            payload,
            start,
            ende,
            zeitstempel_ms,
            codec: self.codec.config().art,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyband_protocol::codec::FunkPreset;

    const TWR: FrequencyHz = FrequencyHz(118_300_000);

    fn pipeline(modus: PttMode) -> TransmitPipeline {
        let mut p = TransmitPipeline::neu(
            Callsign::neu("EDDF_TWR").unwrap(),
            FunkPreset::Schmalband.config(),
            VadConfig::default(),
            modus,
        )
        .unwrap();
        p.frequenzen_setzen(&[TWR]);
        p
    }

    fn sprache(i: usize) -> AudioFrame {
        let samples = (0..160)
            .map(|n| {
                let t = (i * 160 + n) as f32 / 8000.0;
                (2.0 * std::f32::consts::PI * 300.0 * t).sin() * 0.5
            })
            .collect();
        AudioFrame::neu(samples, 8000)
    }

    fn stille() -> AudioFrame {
        AudioFrame::stille(8000)
    }

    #[test]
    fn hold_start_und_ende_marker() {
        let mut p = pipeline(PttMode::Hold);
        assert!(p.tick(&stille(), 0).is_none());

        p.ptt_druecken();
        assert_eq!(p.zustand(), SendeZustand::Armed);
        let erstes = p.tick(&sprache(0), 20).unwrap();
        assert!(erstes.start);
        assert!(!erstes.ende);
        assert_eq!(p.zustand(), SendeZustand::Transmitting);
        assert_eq!(erstes.payload.len(), 160);
        assert_eq!(erstes.frequenzen, vec![Zielfrequenz::voll(TWR)]);

        let mitte = p.tick(&sprache(1), 40).unwrap();
        assert!(!mitte.start && !mitte.ende);

        p.ptt_loslassen();
        let letztes = p.tick(&sprache(2), 60).unwrap();
        assert!(letztes.ende);
        assert_eq!(p.zustand(), SendeZustand::Idle);
        assert!(p.tick(&sprache(3), 80).is_none());
        assert_eq!(p.statistik().uebertragungen, 1);
    }

    #[test]
    fn sequenz_steigt_streng_und_zaehlt_im_idle_weiter() {
        let mut p = pipeline(PttMode::Hold);
        for _ in 0..5 {
            p.tick(&stille(), 0);
        }
        p.ptt_druecken();
        let mut letzte = None;
        for i in 0..10 {
            let paket = p.tick(&sprache(i), 0).unwrap();
            if let Some(l) = letzte {
                assert_eq!(paket.sequence, l + 1);
            }
            letzte = Some(paket.sequence);
        }
        assert_eq!(letzte, Some(14));
    }

    #[test]
    fn sequenz_laeuft_ueber() {
        let mut p = pipeline(PttMode::Hold);
        p.sequenz = u32::MAX;
        p.ptt_druecken();
        assert_eq!(p.tick(&sprache(0), 0).unwrap().sequence, u32::MAX);
        assert_eq!(p.tick(&sprache(1), 0).unwrap().sequence, 0);
    }

    #[test]
    fn ohne_frequenz_wird_nicht_gesendet() {
        let mut p = pipeline(PttMode::Hold);
        p.frequenzen_setzen(&[]);
        p.ptt_druecken();
        assert_eq!(p.zustand(), SendeZustand::Idle);
        assert!(p.tick(&sprache(0), 0).is_none());
    }

    #[test]
    fn mute_beendet_uebertragung() {
        let mut p = pipeline(PttMode::Toggle);
        p.ptt_druecken();
        assert!(p.tick(&sprache(0), 0).unwrap().start);
        p.stummschalten(true);
        assert!(p.tick(&sprache(1), 0).unwrap().ende);
        assert!(p.tick(&sprache(2), 0).is_none());
        assert!(p.ist_stumm());
    }

    #[test]
    fn toggle_schaltet_um() {
        let mut p = pipeline(PttMode::Toggle);
        p.ptt_druecken();
        p.ptt_loslassen();
        assert!(p.tick(&sprache(0), 0).unwrap().start);
        assert!(p.tick(&sprache(1), 0).is_some());
        p.ptt_druecken();
        assert!(p.tick(&sprache(2), 0).unwrap().ende);
    }

    #[test]
    fn sprachaktivierung_mit_nachlauf() {
        let mut p = pipeline(PttMode::VoiceActivation);
        assert!(p.tick(&stille(), 0).is_none());

        let erstes = p.tick(&sprache(0), 0).unwrap();
        assert!(erstes.start);

        // Nachlauf haelt die Uebertragung, danach kommt der Ende-Marker
        let mut ende_nach = None;
        for i in 0..40 {
            if let Some(paket) = p.tick(&stille(), 0) {
                if paket.ende {
                    ende_nach = Some(i);
                    break;
                }
            }
        }
        let ende_nach = ende_nach.expect("Ende-Marker nach Stille");
        assert!(ende_nach >= 10, "Nachlauf zu kurz: {ende_nach}");
        assert_eq!(p.zustand(), SendeZustand::Idle);
    }

    #[test]
    fn loslassen_vor_erstem_frame() {
        let mut p = pipeline(PttMode::Hold);
        p.ptt_druecken();
        p.ptt_loslassen();
        assert_eq!(p.zustand(), SendeZustand::Armed);
        assert!(p.tick(&sprache(0), 0).is_none());
        assert_eq!(p.zustand(), SendeZustand::Idle);
    }

    #[test]
    fn falsche_frame_laenge_wird_ausgelassen() {
        let mut p = pipeline(PttMode::Hold);
        p.ptt_druecken();
        let kaputt = AudioFrame::neu(vec![0.1; 100], 8000);
        assert!(p.tick(&kaputt, 0).is_none());
        assert_eq!(p.statistik().encode_fehler, 1);
        assert_eq!(p.zustand(), SendeZustand::Armed);
        assert!(p.tick(&sprache(1), 0).unwrap().start);
    }

    #[test]
    fn pegel_wird_gemessen() {
        let mut p = pipeline(PttMode::Hold);
        p.tick(&sprache(0), 0);
        assert!(p.pegel().aktuell_db() > -10.0);
    }
}
