//! Codec-Adapter: Encode/Decode, Resampling und VAD hinter einer API
//!
//! Kapselt audiopus (Opus) und G.711 mu-law (PCMU). Der Decode-Pfad
//! liefert immer einen Frame: defekte Nutzdaten oder verlorene Pakete
//! werden verdeckt, nie als Fehler nach oben gereicht.

use audiopus::{
    coder::{Decoder, Encoder},
    Application, Channels, SampleRate as OpusRate,
};
use skyband_protocol::codec::{
    samples_pro_frame, CodecArt, CodecConfig, OpusApplication, SampleRate, FRAME_DAUER_MS,
};
use tracing::{debug, trace};

use crate::dsp::vad::{Vad, VadConfig};
use crate::error::{AudioError, AudioResult};
use crate::frame::AudioFrame;
use crate::plc::PacketLossConcealer;
use crate::resample::FrameResampler;

/// Groesster Opus-Frame, der bei 20ms entstehen kann
const MAX_OPUS_BYTES: usize = 1275;

/// Eingang des Decoders: empfangene Nutzdaten oder Verlustmarke
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeQuelle<'a> {
    /// Nutzdaten eines empfangenen Pakets
    Live(&'a [u8]),
    /// Paket fehlt, Ersatz-Frame erzeugen
    Verdeckung,
}

/// Zaehler des Adapters
#[derive(Debug, Clone, Default)]
pub struct CodecStatistik {
    pub kodiert: u64,
    pub dekodiert: u64,
    /// Defekte Nutzdaten, die verdeckt wurden
    pub dekodier_fehler: u64,
    /// Alle verdeckten Frames (Verlust + Fehler)
    pub verdeckt: u64,
}

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

struct OpusCodec {
    config: CodecConfig,
    /// Wird erst beim ersten Senden erstellt (Empfangsquellen brauchen keinen)
    encoder: Option<Encoder>,
    decoder: Decoder,
    ausgabe: Vec<f32>,
}

impl OpusCodec {
    fn neu(config: &CodecConfig) -> AudioResult<Self> {
        let decoder = Decoder::new(opus_rate(config.sample_rate), Channels::Mono)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
        Ok(Self {
            config: config.clone(),
            encoder: None,
            decoder,
            ausgabe: vec![0.0; config.samples_pro_frame()],
        })
    }

    fn encoder(&mut self) -> AudioResult<&mut Encoder> {
        if self.encoder.is_none() {
            let c = &self.config;
            let application = match c.application {
                OpusApplication::Voip => Application::Voip,
                OpusApplication::RestrictedLowdelay => Application::LowDelay,
            };
            let mut encoder = Encoder::new(opus_rate(c.sample_rate), Channels::Mono, application)
                .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
            encoder
                .set_bitrate(audiopus::Bitrate::BitsPerSecond(
                    (c.bitrate_kbps as i32) * 1000,
                ))
                .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
            encoder
                .set_complexity(c.complexity)
                .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
            encoder
                .set_vbr(c.vbr_enabled)
                .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
            encoder
                .set_inband_fec(c.fec_enabled)
                .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

            debug!(
                bitrate_kbps = c.bitrate_kbps,
                rate = c.sample_rate.hz(),
                "Opus-Encoder erstellt"
            );
            self.encoder = Some(encoder);
        }
        self.encoder
            .as_mut()
            .ok_or_else(|| AudioError::CodecFehler("Opus-Encoder fehlt".into()))
    }

    fn encode(&mut self, pcm: &[f32]) -> AudioResult<Vec<u8>> {
        let mut output = vec![0u8; MAX_OPUS_BYTES];
        let written = self
            .encoder()?
            .encode_float(pcm, &mut output)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
        output.truncate(written);
        Ok(output)
    }

    fn decode(&mut self, daten: Option<&[u8]>) -> AudioResult<Vec<f32>> {
        self.ausgabe.fill(0.0);
        let decoded = match daten {
            Some(d) => self.decoder.decode_float(Some(d), &mut self.ausgabe, false),
            None => self
                .decoder
                .decode_float(None::<&[u8]>, &mut self.ausgabe, false),
        }
        .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
        Ok(self.ausgabe[..decoded.min(self.ausgabe.len())].to_vec())
    }
}

fn opus_rate(rate: SampleRate) -> OpusRate {
    match rate {
        SampleRate::Hz8000 => OpusRate::Hz8000,
        SampleRate::Hz12000 => OpusRate::Hz12000,
        SampleRate::Hz16000 => OpusRate::Hz16000,
        SampleRate::Hz24000 => OpusRate::Hz24000,
        SampleRate::Hz48000 => OpusRate::Hz48000,
    }
}

enum CodecBackend {
    Opus(Box<OpusCodec>),
    /// PCMU ist zustandslos; die Rate ergibt sich aus der Nutzdatenlaenge
    Pcmu,
}

// ---------------------------------------------------------------------------
// CodecAdapter
// ---------------------------------------------------------------------------

/// Codec, Resampler und VAD fuer einen Sprachstrom
pub struct CodecAdapter {
    config: CodecConfig,
    backend: CodecBackend,
    vad: Vad,
    plc: PacketLossConcealer,
    /// Resampler je Ratenpaar, entstehen bei Bedarf
    resampler: Vec<FrameResampler>,
    /// Rate des zuletzt dekodierten Frames (fuer Verdeckung)
    letzte_rate: u32,
    statistik: CodecStatistik,
}

impl CodecAdapter {
    pub fn neu(config: CodecConfig, vad: VadConfig) -> AudioResult<Self> {
        config.validieren().map_err(AudioError::Konfiguration)?;

        let backend = match config.art {
            CodecArt::Opus => CodecBackend::Opus(Box::new(OpusCodec::neu(&config)?)),
            CodecArt::Pcmu => CodecBackend::Pcmu,
        };

        debug!(codec = ?config.art, rate = config.sample_rate.hz(), "CodecAdapter erstellt");

        Ok(Self {
            letzte_rate: config.sample_rate.hz(),
            config,
            backend,
            vad: Vad::neu(vad),
            plc: PacketLossConcealer::neu(),
            resampler: Vec::with_capacity(2),
            statistik: CodecStatistik::default(),
        })
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Abtastrate, mit der `encode` Frames erwartet
    pub fn codec_rate(&self) -> u32 {
        self.config.sample_rate.hz()
    }

    /// Kodiert einen Frame der Codec-Rate
    pub fn encode(&mut self, frame: &AudioFrame) -> AudioResult<Vec<u8>> {
        let erwartet = self.config.samples_pro_frame();
        if frame.len() != erwartet || frame.sample_rate() != self.codec_rate() {
            return Err(AudioError::FrameLaenge {
                erwartet,
                erhalten: frame.len(),
            });
        }

        let bytes = match &mut self.backend {
            CodecBackend::Opus(opus) => opus.encode(frame.samples())?,
            CodecBackend::Pcmu => frame.samples().iter().map(|s| pcmu_kodieren(*s)).collect(),
        };
        self.statistik.kodiert += 1;
        Ok(bytes)
    }

    /// Dekodiert Nutzdaten oder erzeugt einen Verdeckungs-Frame
    ///
    /// Liefert immer einen vollstaendigen 20ms-Frame.
    pub fn decode(&mut self, quelle: DecodeQuelle<'_>) -> AudioFrame {
        if let DecodeQuelle::Live(daten) = quelle {
            match self.live_dekodieren(daten) {
                Ok(frame) => {
                    self.plc.original(frame.samples());
                    self.letzte_rate = frame.sample_rate();
                    self.statistik.dekodiert += 1;
                    return frame;
                }
                Err(e) => {
                    self.statistik.dekodier_fehler += 1;
                    debug!(fehler = %e, bytes = daten.len(), "Nutzdaten defekt, verdecke Frame");
                }
            }
        }
        self.verdecken()
    }

    fn live_dekodieren(&mut self, daten: &[u8]) -> AudioResult<AudioFrame> {
        match &mut self.backend {
            CodecBackend::Opus(opus) => {
                let rate = self.config.sample_rate.hz();
                let samples = opus.decode(Some(daten))?;
                Ok(AudioFrame::neu(auf_frame_laenge(samples, rate), rate))
            }
            CodecBackend::Pcmu => {
                let rate = pcmu_rate(daten.len()).ok_or_else(|| {
                    AudioError::CodecFehler(format!("PCMU-Laenge {} passt zu keiner Rate", daten.len()))
                })?;
                let samples = daten.iter().map(|b| pcmu_dekodieren(*b)).collect();
                Ok(AudioFrame::neu(samples, rate))
            }
        }
    }

    fn verdecken(&mut self) -> AudioFrame {
        self.statistik.verdeckt += 1;
        let rate = self.letzte_rate;
        let laenge = samples_pro_frame(rate);

        // Opus verdeckt selbst, solange der Verlust kurz ist
        if let CodecBackend::Opus(opus) = &mut self.backend {
            if self.plc.aufeinanderfolgende_verluste() < crate::plc::MAX_WIEDERHOLUNGEN {
                match opus.decode(None) {
                    Ok(samples) => {
                        trace!("Opus-PLC");
                        // Zaehler des PCM-PLC mitfuehren, damit die Grenze greift
                        self.plc.verdecken(0);
                        return AudioFrame::neu(auf_frame_laenge(samples, rate), rate);
                    }
                    Err(e) => debug!(fehler = %e, "Opus-PLC fehlgeschlagen"),
                }
            }
        }
        AudioFrame::neu(self.plc.verdecken(laenge), rate)
    }

    /// Bringt einen Frame auf die Zielrate; bei gleicher Rate unveraendert
    ///
    /// Schlaegt das Resampling fehl, entsteht Stille der Zielrate.
    pub fn resample(&mut self, frame: &AudioFrame, ziel: u32) -> AudioFrame {
        let von = frame.sample_rate();
        if von == ziel {
            return frame.clone();
        }

        let index = match self
            .resampler
            .iter()
            .position(|r| r.von() == von && r.nach() == ziel)
        {
            Some(i) => i,
            None => match FrameResampler::neu(von, ziel) {
                Ok(r) => {
                    self.resampler.push(r);
                    self.resampler.len() - 1
                }
                Err(e) => {
                    debug!(fehler = %e, "Resampler nicht verfuegbar");
                    return AudioFrame::stille(ziel);
                }
            },
        };

        match self.resampler[index].verarbeiten(frame.samples()) {
            Ok(samples) => AudioFrame::neu(samples, ziel),
            Err(e) => {
                debug!(fehler = %e, von, ziel, "Resampling fehlgeschlagen");
                AudioFrame::stille(ziel)
            }
        }
    }

    /// Sprachaktivitaet im Frame (mit Nachlauf)
    pub fn detect_voice_activity(&mut self, frame: &AudioFrame) -> bool {
        self.vad.erkennen(frame.samples())
    }

    pub fn vad(&self) -> &Vad {
        &self.vad
    }

    pub fn vad_mut(&mut self) -> &mut Vad {
        &mut self.vad
    }

    /// Verwirft Verdeckungs- und Resampler-Historie (neues Sprachsegment)
    pub fn segment_zuruecksetzen(&mut self) {
        self.plc = PacketLossConcealer::neu();
        for r in self.resampler.iter_mut() {
            r.reset();
        }
    }

    pub fn statistik(&self) -> &CodecStatistik {
        &self.statistik
    }
}

fn auf_frame_laenge(mut samples: Vec<f32>, rate: u32) -> Vec<f32> {
    samples.resize(samples_pro_frame(rate), 0.0);
    samples
}

/// Rate eines PCMU-Frames aus seiner Laenge (ein Byte pro Sample, 20ms)
fn pcmu_rate(bytes: usize) -> Option<u32> {
    let rate = u32::try_from(bytes).ok()? * (1000 / FRAME_DAUER_MS);
    [
        SampleRate::Hz8000,
        SampleRate::Hz12000,
        SampleRate::Hz16000,
        SampleRate::Hz24000,
        SampleRate::Hz48000,
    ]
    .iter()
    .any(|r| r.hz() == rate)
    .then_some(rate)
}

// ---------------------------------------------------------------------------
// G.711 mu-law
// ---------------------------------------------------------------------------

const ULAW_BIAS: i32 = 0x84;
const ULAW_CLIP: i32 = 32_635;

fn pcmu_kodieren(sample: f32) -> u8 {
    let mut pcm = (sample.clamp(-1.0, 1.0) * 32_767.0) as i32;
    let vorzeichen = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };
    pcm = pcm.min(ULAW_CLIP) + ULAW_BIAS;

    let mut exponent = 7;
    let mut maske = 0x4000;
    while exponent > 0 && pcm & maske == 0 {
        exponent -= 1;
        maske >>= 1;
    }
    let mantisse = (pcm >> (exponent + 3)) & 0x0F;
    !(vorzeichen | (exponent << 4) as u8 | mantisse as u8)
}

fn pcmu_dekodieren(byte: u8) -> f32 {
    let u = !byte;
    let exponent = ((u >> 4) & 0x07) as i32;
    let mantisse = (u & 0x0F) as i32;
    let betrag = (((mantisse << 3) + ULAW_BIAS) << exponent) - ULAW_BIAS;
    let pcm = if u & 0x80 != 0 { -betrag } else { betrag };
    pcm as f32 / 32_768.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyband_protocol::codec::FunkPreset;

    fn sinus(rate: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate as f32).sin() * 0.5)
            .collect()
    }

    fn pcmu(rate: SampleRate) -> CodecAdapter {
        let config = CodecConfig {
            art: CodecArt::Pcmu,
            sample_rate: rate,
            ..FunkPreset::Schmalband.config()
        };
        CodecAdapter::neu(config, VadConfig::default()).unwrap()
    }

    #[test]
    fn mulaw_bekannte_werte() {
        assert_eq!(pcmu_kodieren(0.0), 0xFF);
        assert_eq!(pcmu_dekodieren(0xFF), 0.0);
        assert!(pcmu_dekodieren(pcmu_kodieren(1.0)) > 0.95);
        assert!(pcmu_dekodieren(pcmu_kodieren(-1.0)) < -0.95);
    }

    #[test]
    fn pcmu_roundtrip_nahe_am_original() {
        let mut codec = pcmu(SampleRate::Hz48000);
        let eingabe = AudioFrame::neu(sinus(48_000, 960), 48_000);
        let bytes = codec.encode(&eingabe).unwrap();
        assert_eq!(bytes.len(), 960);

        let ausgabe = codec.decode(DecodeQuelle::Live(&bytes));
        assert_eq!(ausgabe.sample_rate(), 48_000);
        for (a, b) in eingabe.samples().iter().zip(ausgabe.samples()) {
            assert!((a - b).abs() < 0.02, "{a} vs {b}");
        }
    }

    #[test]
    fn falsche_frame_laenge_ist_fehler() {
        let mut codec = pcmu(SampleRate::Hz8000);
        let falsch = AudioFrame::neu(vec![0.0; 100], 8000);
        assert!(matches!(
            codec.encode(&falsch),
            Err(AudioError::FrameLaenge { erwartet: 160, erhalten: 100 })
        ));
    }

    #[test]
    fn defekte_nutzdaten_werden_verdeckt() {
        let mut codec = pcmu(SampleRate::Hz8000);
        let frame = codec.decode(DecodeQuelle::Live(&[1, 2, 3, 4, 5, 6, 7]));
        assert_eq!(frame.len(), 160);
        assert!(frame.ist_stille());
        assert_eq!(codec.statistik().dekodier_fehler, 1);
        assert_eq!(codec.statistik().verdeckt, 1);
    }

    #[test]
    fn verdeckung_wiederholt_letzten_frame_leiser() {
        let mut codec = pcmu(SampleRate::Hz8000);
        let eingabe = AudioFrame::neu(sinus(8000, 160), 8000);
        let bytes = codec.encode(&eingabe).unwrap();
        let original = codec.decode(DecodeQuelle::Live(&bytes));
        let ersatz = codec.decode(DecodeQuelle::Verdeckung);
        assert_eq!(ersatz.len(), 160);
        assert!(ersatz.energie() > 0.0);
        assert!(ersatz.energie() < original.energie());
    }

    #[test]
    fn resample_gleiche_rate_unveraendert() {
        let mut codec = pcmu(SampleRate::Hz8000);
        let frame = AudioFrame::neu(sinus(48_000, 960), 48_000);
        assert_eq!(codec.resample(&frame, 48_000), frame);
    }

    #[test]
    fn resample_liefert_ziel_frame() {
        let mut codec = pcmu(SampleRate::Hz8000);
        let frame = AudioFrame::neu(sinus(8000, 160), 8000);
        for _ in 0..3 {
            let hoch = codec.resample(&frame, 48_000);
            assert_eq!(hoch.len(), 960);
            assert_eq!(hoch.sample_rate(), 48_000);
        }
    }

    #[test]
    fn vad_ueber_adapter() {
        let mut codec = pcmu(SampleRate::Hz48000);
        assert!(!codec.detect_voice_activity(&AudioFrame::stille(48_000)));
    }

    #[test]
    fn opus_roundtrip_frame_laenge() {
        let config = FunkPreset::Funk.config();
        let mut codec = CodecAdapter::neu(config, VadConfig::default()).unwrap();
        let eingabe = AudioFrame::neu(sinus(16_000, 320), 16_000);
        let bytes = codec.encode(&eingabe).unwrap();
        assert!(!bytes.is_empty());

        let ausgabe = codec.decode(DecodeQuelle::Live(&bytes));
        assert_eq!(ausgabe.len(), 320);
        let plc = codec.decode(DecodeQuelle::Verdeckung);
        assert_eq!(plc.len(), 320);
    }

    #[test]
    fn opus_muell_bricht_nicht_ab() {
        let config = CodecConfig {
            sample_rate: SampleRate::Hz48000,
            ..FunkPreset::Funk.config()
        };
        let mut codec = CodecAdapter::neu(config, VadConfig::default()).unwrap();
        for mull in [&[][..], &[0xFF; 3][..], &[0x00; 400][..]] {
            assert_eq!(codec.decode(DecodeQuelle::Live(mull)).len(), 960);
        }
    }

    #[test]
    fn ungueltige_konfiguration() {
        let config = CodecConfig {
            bitrate_kbps: 2,
            ..FunkPreset::Funk.config()
        };
        assert!(CodecAdapter::neu(config, VadConfig::default()).is_err());
    }
}
