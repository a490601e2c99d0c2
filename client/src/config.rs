//! Client-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen (`SKYBAND_CONFIG`,
//! Standard `skyband.toml`). Alle Felder haben Standardwerte, sodass der
//! Client ohne Konfigurationsdatei gegen einen lokalen Server laeuft.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use skyband_audio::{PttMode, VadConfig};
use skyband_core::{Callsign, FrequencyHz, SkybandError};
use skyband_observability::{LogConfig, MetrikConfig};
use skyband_protocol::codec::FunkPreset;
use skyband_protocol::CodecConfig;
use skyband_voice::{JitterBufferConfig, MixerConfig, ReceiveConfig, SessionConfig};

/// Vollstaendige Client-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub sitzung: SitzungsEinstellungen,
    pub audio: AudioEinstellungen,
    pub jitter: JitterBufferConfig,
    pub mixer: MixerConfig,
    pub empfang: ReceiveConfig,
    pub logging: LogConfig,
    pub metriken: MetrikConfig,
}

/// Verbindung zum Voice-Server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SitzungsEinstellungen {
    pub callsign: String,
    /// Adresse des Voice-Servers (`host:port`)
    pub server: String,
    pub bind: String,
    pub keepalive_ms: u64,
    pub max_socket_fehler: u32,
    pub paket_queue: usize,
    pub befehl_queue: usize,
    pub sende_queue: usize,
    /// Abonnierte Frequenzen in MHz (`"118.300"`)
    pub frequenzen: Vec<String>,
    /// Sendefrequenzen in MHz
    pub sende_frequenzen: Vec<String>,
}

impl Default for SitzungsEinstellungen {
    fn default() -> Self {
        Self {
            callsign: "SKYBAND".into(),
            server: "127.0.0.1:9987".into(),
            bind: "0.0.0.0:0".into(),
            keepalive_ms: 5000,
            max_socket_fehler: 50,
            paket_queue: 256,
            befehl_queue: 64,
            sende_queue: 64,
            frequenzen: vec!["118.300".into()],
            sende_frequenzen: vec!["118.300".into()],
        }
    }
}

/// Simulierte Audio-Eingabe (ohne Geraete-Backend)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eingang {
    #[default]
    Stille,
    /// Sinus-Testton mit `ton_hz`
    Ton,
}

/// Codec, PTT und Geraete-Takt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioEinstellungen {
    /// Vorgabe; `codec` ueberschreibt sie, wenn gesetzt
    pub preset: FunkPreset,
    pub codec: Option<CodecConfig>,
    pub ptt_modus: PttMode,
    /// PTT ab dem Start gedrueckt halten
    pub ptt_beim_start: bool,
    pub vad: VadConfig,
    pub eingang: Eingang,
    pub ton_hz: f64,
    pub ton_pegel: f32,
    /// Master-Lautstaerke 0.0..=2.0
    pub master: f32,
    /// Kapazitaet der Geraete-Ringpuffer in Frames
    pub puffer_frames: usize,
}

impl Default for AudioEinstellungen {
    fn default() -> Self {
        Self {
            preset: FunkPreset::Funk,
            codec: None,
            ptt_modus: PttMode::Hold,
            ptt_beim_start: false,
            vad: VadConfig::default(),
            eingang: Eingang::Stille,
            ton_hz: 1000.0,
            ton_pegel: 0.3,
            master: 1.0,
            puffer_frames: 8,
        }
    }
}

impl AudioEinstellungen {
    pub fn codec(&self) -> CodecConfig {
        self.codec.clone().unwrap_or_else(|| self.preset.config())
    }
}

impl ClientConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Baut die Sitzungs-Konfiguration und prueft alle Abschnitte
    pub fn session_config(&self) -> Result<SessionConfig, SkybandError> {
        self.logging
            .validieren()
            .map_err(SkybandError::Konfiguration)?;

        let s = &self.sitzung;
        let callsign = Callsign::neu(&s.callsign)
            .map_err(|e| SkybandError::Konfiguration(format!("Callsign '{}': {e}", s.callsign)))?;
        let server = adresse(&s.server, "server")?;

        let mut config = SessionConfig::neu(callsign, server);
        config.bind = adresse(&s.bind, "bind")?;
        config.keepalive_ms = s.keepalive_ms;
        config.max_socket_fehler = s.max_socket_fehler;
        config.paket_queue = s.paket_queue;
        config.befehl_queue = s.befehl_queue;
        config.sende_queue = s.sende_queue;
        config.codec = self.audio.codec();
        config.ptt_modus = self.audio.ptt_modus;
        config.vad = self.audio.vad.clone();
        config.jitter = self.jitter.clone();
        config.mixer = self.mixer.clone();
        config.empfang = self.empfang.clone();
        config.frequenzen = frequenzen(&s.frequenzen)?;
        config.sende_frequenzen = frequenzen(&s.sende_frequenzen)?;

        config.validieren()?;
        Ok(config)
    }
}

fn adresse(text: &str, feld: &str) -> Result<SocketAddr, SkybandError> {
    text.parse()
        .map_err(|e| SkybandError::Konfiguration(format!("{feld} '{text}': {e}")))
}

fn frequenzen(texte: &[String]) -> Result<Vec<FrequencyHz>, SkybandError> {
    texte
        .iter()
        .map(|t| frequenz_parsen(t).map_err(SkybandError::Konfiguration))
        .collect()
}

/// Liest eine Frequenz in MHz (`"118.300"`, `"121.5"`, `"5.649"`)
pub fn frequenz_parsen(text: &str) -> Result<FrequencyHz, String> {
    let text = text.trim();
    let (mhz, rest) = text.split_once('.').unwrap_or((text, ""));
    if rest.len() > 6 || !rest.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("Frequenz '{text}' ungueltig"));
    }
    let mhz: u32 = mhz
        .parse()
        .map_err(|_| format!("Frequenz '{text}' ungueltig"))?;
    let mut nachkomma: u32 = 0;
    for (i, c) in rest.chars().chain(std::iter::repeat('0')).take(6).enumerate() {
        let ziffer = c.to_digit(10).unwrap_or(0);
        nachkomma += ziffer * 10u32.pow(5 - i as u32);
    }
    mhz.checked_mul(1_000_000)
        .and_then(|hz| hz.checked_add(nachkomma))
        .filter(|hz| *hz > 0)
        .map(FrequencyHz)
        .ok_or_else(|| format!("Frequenz '{text}' ausserhalb des Bereichs"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyband_protocol::CodecArt;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ClientConfig::default();
        let sitzung = cfg.session_config().unwrap();
        assert_eq!(sitzung.frequenzen, vec![FrequencyHz(118_300_000)]);
        assert_eq!(sitzung.codec.art, CodecArt::Opus);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [sitzung]
            callsign = "EDDF_TWR"
            server = "10.0.0.5:9987"
            frequenzen = ["118.300", "121.900"]

            [audio]
            preset = "schmalband"
            ptt_modus = "voice_activation"

            [jitter]
            modus = "fest"
            min_tiefe = 3

            [mixer]
            squelch_reihenfolge = "daempfung_nach_squelch"

            [metriken]
            textfile = "/var/lib/node_exporter/skyband.prom"
        "#;
        let cfg: ClientConfig = toml::from_str(toml).unwrap();
        let sitzung = cfg.session_config().unwrap();
        assert_eq!(sitzung.callsign.as_str(), "EDDF_TWR");
        assert_eq!(sitzung.server.port(), 9987);
        assert_eq!(sitzung.frequenzen.len(), 2);
        assert_eq!(sitzung.codec.art, CodecArt::Pcmu);
        assert_eq!(sitzung.ptt_modus, PttMode::VoiceActivation);
        assert_eq!(sitzung.jitter.min_tiefe, 3);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(sitzung.jitter.max_tiefe, 6);
        assert_eq!(sitzung.keepalive_ms, 5000);
        assert!(cfg.metriken.textfile.is_some());
    }

    #[test]
    fn ungueltige_werte_werden_gemeldet() {
        let mut cfg = ClientConfig::default();
        cfg.sitzung.server = "kein-host".into();
        assert!(matches!(
            cfg.session_config(),
            Err(SkybandError::Konfiguration(_))
        ));

        let mut cfg = ClientConfig::default();
        cfg.sitzung.callsign = "mit leerzeichen".into();
        assert!(cfg.session_config().is_err());

        let mut cfg = ClientConfig::default();
        cfg.jitter.min_tiefe = 9;
        assert!(cfg.session_config().is_err());
    }

    #[test]
    fn frequenzen_parsen() {
        assert_eq!(frequenz_parsen("118.300"), Ok(FrequencyHz(118_300_000)));
        assert_eq!(frequenz_parsen("121.5"), Ok(FrequencyHz(121_500_000)));
        assert_eq!(frequenz_parsen("118.2750"), Ok(FrequencyHz(118_275_000)));
        assert_eq!(frequenz_parsen("5.649"), Ok(FrequencyHz(5_649_000)));
        assert_eq!(frequenz_parsen(" 124 "), Ok(FrequencyHz(124_000_000)));
        assert!(frequenz_parsen("118,300").is_err());
        assert!(frequenz_parsen("abc").is_err());
        assert!(frequenz_parsen("0").is_err());
        assert!(frequenz_parsen("9999.0").is_err());
    }

    #[test]
    fn fehlende_datei_ergibt_standardwerte() {
        let cfg = ClientConfig::laden("/nicht/vorhanden/skyband.toml").unwrap();
        assert_eq!(cfg.sitzung.callsign, "SKYBAND");
    }
}
