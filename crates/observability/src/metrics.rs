//! Prometheus-Metriken der Voice-Sitzung
//!
//! Registrierte Metriken:
//! - `skyband_voice_pakete_empfangen_total` – Counter: Empfangene Voice-Pakete
//! - `skyband_voice_bytes_empfangen_total` – Counter: Empfangene Bytes
//! - `skyband_voice_pakete_gesendet_total` – Counter: Gesendete Voice-Pakete
//! - `skyband_voice_bytes_gesendet_total` – Counter: Gesendete Bytes
//! - `skyband_voice_keepalives_total` – Counter: Gesendete Keepalives
//! - `skyband_voice_verworfen_total` – CounterVec: Verworfene Pakete (grund)
//! - `skyband_voice_verdeckte_frames_total` – Counter: Verdeckte Frames
//! - `skyband_voice_quellen_entfernt_total` – Counter: Entfernte Sender
//! - `skyband_voice_sende_fehler_total` – Counter: Fehlgeschlagene Sendungen
//! - `skyband_voice_aktive_quellen` – Gauge: Verfolgte Sender
//! - `skyband_voice_empfang_bps` / `skyband_voice_sende_bps` – Gauge: Bitraten
//! - `skyband_voice_verdeckungs_rate` – Gauge: Anteil verdeckter Frames
//!
//! Ein HTTP-Endpunkt gibt es nicht: der Client schreibt die Metriken
//! periodisch als Textfile fuer den node_exporter.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use skyband_voice::TelemetrieSnapshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Abschnitt `[metriken]` der Client-Konfiguration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetrikConfig {
    /// Zieldatei; ohne Pfad werden keine Metriken geschrieben
    pub textfile: Option<PathBuf>,
    pub intervall_s: u64,
}

impl Default for MetrikConfig {
    fn default() -> Self {
        Self {
            textfile: None,
            intervall_s: 10,
        }
    }
}

/// Alle Prometheus-Metriken einer Voice-Sitzung
pub struct VoiceMetriken {
    pub registry: Arc<Registry>,

    pub pakete_empfangen: IntCounter,
    pub bytes_empfangen: IntCounter,
    pub pakete_gesendet: IntCounter,
    pub bytes_gesendet: IntCounter,
    pub keepalives: IntCounter,
    pub verworfen: IntCounterVec,
    pub verdeckte_frames: IntCounter,
    pub quellen_entfernt: IntCounter,
    pub sende_fehler: IntCounter,

    pub aktive_quellen: IntGauge,
    pub empfang_bps: Gauge,
    pub sende_bps: Gauge,
    pub verdeckungs_rate: Gauge,

    /// Letzter uebernommener Stand (Counter wachsen um die Differenz)
    letzter: Mutex<TelemetrieSnapshot>,
}

impl VoiceMetriken {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let counter = |name: &str, hilfe: &str| -> Result<IntCounter> {
            let c = IntCounter::with_opts(Opts::new(name, hilfe))?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };
        let pakete_empfangen = counter(
            "skyband_voice_pakete_empfangen_total",
            "Empfangene Voice-Pakete",
        )?;
        let bytes_empfangen = counter("skyband_voice_bytes_empfangen_total", "Empfangene Bytes")?;
        let pakete_gesendet = counter(
            "skyband_voice_pakete_gesendet_total",
            "Gesendete Voice-Pakete",
        )?;
        let bytes_gesendet = counter("skyband_voice_bytes_gesendet_total", "Gesendete Bytes")?;
        let keepalives = counter("skyband_voice_keepalives_total", "Gesendete Keepalives")?;
        let verdeckte_frames = counter(
            "skyband_voice_verdeckte_frames_total",
            "Durch Verdeckung ersetzte Frames",
        )?;
        let quellen_entfernt = counter(
            "skyband_voice_quellen_entfernt_total",
            "Nach Stille oder Verdraengung entfernte Sender",
        )?;
        let sende_fehler = counter(
            "skyband_voice_sende_fehler_total",
            "Fehlgeschlagene Sendungen",
        )?;

        let verworfen = IntCounterVec::new(
            Opts::new("skyband_voice_verworfen_total", "Verworfene Pakete nach Grund"),
            &["grund"],
        )?;
        registry.register(Box::new(verworfen.clone()))?;

        let aktive_quellen = IntGauge::with_opts(Opts::new(
            "skyband_voice_aktive_quellen",
            "Aktuell verfolgte entfernte Sender",
        ))?;
        registry.register(Box::new(aktive_quellen.clone()))?;

        let empfang_bps = Gauge::with_opts(Opts::new(
            "skyband_voice_empfang_bps",
            "Mittlere Empfangs-Bitrate in Bits pro Sekunde",
        ))?;
        registry.register(Box::new(empfang_bps.clone()))?;

        let sende_bps = Gauge::with_opts(Opts::new(
            "skyband_voice_sende_bps",
            "Mittlere Sende-Bitrate in Bits pro Sekunde",
        ))?;
        registry.register(Box::new(sende_bps.clone()))?;

        let verdeckungs_rate = Gauge::with_opts(Opts::new(
            "skyband_voice_verdeckungs_rate",
            "Anteil verdeckter an allen wiedergegebenen Frames (0.0 bis 1.0)",
        ))?;
        registry.register(Box::new(verdeckungs_rate.clone()))?;

        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(Self {
            registry: Arc::new(registry),
            pakete_empfangen,
            bytes_empfangen,
            pakete_gesendet,
            bytes_gesendet,
            keepalives,
            verworfen,
            verdeckte_frames,
            quellen_entfernt,
            sende_fehler,
            aktive_quellen,
            empfang_bps,
            sende_bps,
            verdeckungs_rate,
            letzter: Mutex::new(TelemetrieSnapshot::default()),
        })
    }

    /// Uebernimmt einen Telemetrie-Stand
    ///
    /// Counter wachsen um die Differenz zum letzten Stand. Ist ein Wert
    /// kleiner geworden (neue Sitzung), zaehlt er vollstaendig.
    pub fn aktualisieren(&self, neu: &TelemetrieSnapshot) {
        let mut alt = self.letzter.lock();

        nachziehen(&self.pakete_empfangen, alt.pakete_empfangen, neu.pakete_empfangen);
        nachziehen(&self.bytes_empfangen, alt.bytes_empfangen, neu.bytes_empfangen);
        nachziehen(&self.pakete_gesendet, alt.pakete_gesendet, neu.pakete_gesendet);
        nachziehen(&self.bytes_gesendet, alt.bytes_gesendet, neu.bytes_gesendet);
        nachziehen(&self.keepalives, alt.keepalives_gesendet, neu.keepalives_gesendet);
        nachziehen(&self.verdeckte_frames, alt.verdeckte_frames, neu.verdeckte_frames);
        nachziehen(&self.quellen_entfernt, alt.quellen_entfernt, neu.quellen_entfernt);
        nachziehen(&self.sende_fehler, alt.sende_fehler, neu.sende_fehler);

        for (grund, a, n) in [
            ("parse_fehler", alt.parse_fehler, neu.parse_fehler),
            ("queue_voll", alt.queue_verworfen, neu.queue_verworfen),
            ("verspaetet", alt.verspaetete_pakete, neu.verspaetete_pakete),
            ("duplikat", alt.duplikate, neu.duplikate),
        ] {
            nachziehen(&self.verworfen.with_label_values(&[grund]), a, n);
        }

        self.aktive_quellen.set(neu.aktive_quellen as i64);
        self.empfang_bps.set(neu.empfang_bps() as f64);
        self.sende_bps.set(neu.sende_bps() as f64);
        self.verdeckungs_rate.set(neu.verdeckungs_rate());

        *alt = neu.clone();
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Schreibt die Metriken atomar nach `pfad` (temporaere Datei + rename)
    pub fn in_datei_schreiben(&self, pfad: &Path) -> Result<()> {
        let text = self.exportieren()?;
        let tmp = pfad.with_extension("prom.tmp");
        std::fs::write(&tmp, text)
            .with_context(|| format!("Metriken nach {} schreiben", tmp.display()))?;
        std::fs::rename(&tmp, pfad)
            .with_context(|| format!("Metriken nach {} verschieben", pfad.display()))?;
        Ok(())
    }
}

fn nachziehen(counter: &IntCounter, alt: u64, neu: u64) {
    let delta = if neu >= alt { neu - alt } else { neu };
    if delta > 0 {
        counter.inc_by(delta);
    }
}

/// Startet den periodischen Textfile-Export
///
/// `quelle` liefert den aktuellen Telemetrie-Stand. Beim Abbruch ueber
/// `token` wird ein letztes Mal geschrieben.
pub fn textfile_exporter_starten<F>(
    metriken: Arc<VoiceMetriken>,
    config: MetrikConfig,
    quelle: F,
    token: CancellationToken,
) -> Option<JoinHandle<()>>
where
    F: Fn() -> TelemetrieSnapshot + Send + 'static,
{
    let pfad = config.textfile?;
    let intervall = Duration::from_secs(config.intervall_s.max(1));
    tracing::info!(pfad = %pfad.display(), intervall_s = intervall.as_secs(), "Metriken-Export gestartet");

    Some(tokio::spawn(async move {
        let mut takt = tokio::time::interval(intervall);
        loop {
            let ende = tokio::select! {
                _ = token.cancelled() => true,
                _ = takt.tick() => false,
            };
            metriken.aktualisieren(&quelle());
            if let Err(e) = metriken.in_datei_schreiben(&pfad) {
                tracing::warn!(fehler = %e, "Metriken-Export fehlgeschlagen");
            }
            if ende {
                break;
            }
        }
        tracing::debug!("Metriken-Export beendet");
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stand(pakete: u64) -> TelemetrieSnapshot {
        TelemetrieSnapshot {
            pakete_empfangen: pakete,
            bytes_empfangen: pakete * 172,
            parse_fehler: 2,
            aktive_quellen: 3,
            takte: 100,
            verdeckte_frames: 5,
            laufzeit_s: 2.0,
            ..Default::default()
        }
    }

    #[test]
    fn metriken_erstellen_erfolgreich() {
        let metriken = VoiceMetriken::neu().unwrap();
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn counter_wachsen_um_die_differenz() {
        let metriken = VoiceMetriken::neu().unwrap();
        metriken.aktualisieren(&stand(10));
        metriken.aktualisieren(&stand(25));
        assert_eq!(metriken.pakete_empfangen.get(), 25);
        assert_eq!(metriken.bytes_empfangen.get(), 25 * 172);
        assert_eq!(
            metriken.verworfen.with_label_values(&["parse_fehler"]).get(),
            2
        );
        assert_eq!(metriken.aktive_quellen.get(), 3);
        assert!((metriken.verdeckungs_rate.get() - 5.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn neue_sitzung_zaehlt_weiter() {
        let metriken = VoiceMetriken::neu().unwrap();
        metriken.aktualisieren(&stand(40));
        metriken.aktualisieren(&stand(5));
        assert_eq!(metriken.pakete_empfangen.get(), 45);
    }

    #[test]
    fn metriken_export_prometheus_format() {
        let metriken = VoiceMetriken::neu().unwrap();
        metriken.aktualisieren(&stand(7));

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("skyband_voice_pakete_empfangen_total 7"));
        assert!(output.contains("skyband_voice_verworfen_total{grund=\"parse_fehler\"} 2"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn textfile_wird_geschrieben() {
        let metriken = VoiceMetriken::neu().unwrap();
        metriken.aktualisieren(&stand(3));
        let pfad = std::env::temp_dir().join(format!("skyband-test-{}.prom", std::process::id()));
        metriken.in_datei_schreiben(&pfad).unwrap();
        let inhalt = std::fs::read_to_string(&pfad).unwrap();
        std::fs::remove_file(&pfad).unwrap();
        assert!(inhalt.contains("skyband_voice_pakete_empfangen_total 3"));
        assert!(!pfad.with_extension("prom.tmp").exists());
    }

    #[tokio::test]
    async fn exporter_ohne_pfad_startet_nicht() {
        let metriken = Arc::new(VoiceMetriken::neu().unwrap());
        let handle = textfile_exporter_starten(
            metriken,
            MetrikConfig::default(),
            TelemetrieSnapshot::default,
            CancellationToken::new(),
        );
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn exporter_schreibt_beim_beenden() {
        let metriken = Arc::new(VoiceMetriken::neu().unwrap());
        let pfad = std::env::temp_dir().join(format!("skyband-export-{}.prom", std::process::id()));
        let token = CancellationToken::new();
        let handle = textfile_exporter_starten(
            Arc::clone(&metriken),
            MetrikConfig {
                textfile: Some(pfad.clone()),
                intervall_s: 3600,
            },
            || stand(9),
            token.clone(),
        )
        .unwrap();

        token.cancel();
        handle.await.unwrap();
        let inhalt = std::fs::read_to_string(&pfad).unwrap();
        std::fs::remove_file(&pfad).unwrap();
        assert!(inhalt.contains("skyband_voice_pakete_empfangen_total 9"));
    }
}
