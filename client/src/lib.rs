//! skyband-client – Bibliotheks-Root
//!
//! Verbindet Konfiguration, Voice-Sitzung, Geraete-Takt, Bedienung und
//! Metriken-Export zu einem lauffaehigen Client.

pub mod befehle;
pub mod config;
pub mod geraet;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use config::ClientConfig;
use skyband_observability::{textfile_exporter_starten, VoiceMetriken};
use skyband_voice::VoiceSession;
use tokio_util::sync::CancellationToken;

/// Abstand der Status-Zeilen im Log
const STATUS_INTERVALL: Duration = Duration::from_secs(30);

/// Haelt die Client-Konfiguration zusammen
pub struct Client {
    pub config: ClientConfig,
}

impl Client {
    pub fn neu(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Verbindet, startet Geraete-Takt und Nebenaufgaben und laeuft bis
    /// Ctrl-C, `ende` auf stdin oder einem fatalen Sitzungsfehler
    pub async fn starten(self) -> Result<()> {
        let session_config = self.config.session_config()?;
        tracing::info!(
            callsign = %session_config.callsign,
            server = %session_config.server,
            frequenzen = ?session_config.frequenzen,
            "Client startet"
        );

        let (sitzung, handle, takt) = VoiceSession::verbinden(session_config).await?;
        handle.master(self.config.audio.master)?;
        if self.config.audio.ptt_beim_start {
            handle.ptt(true)?;
        }

        let geraet = geraet::geraete_thread_starten(takt, &self.config.audio)
            .context("Geraete-Thread nicht startbar")?;

        let token = CancellationToken::new();
        let metriken = Arc::new(VoiceMetriken::neu()?);
        let export = {
            let handle = handle.clone();
            textfile_exporter_starten(
                metriken,
                self.config.metriken.clone(),
                move || handle.telemetrie(),
                token.clone(),
            )
        };
        let bedienung = tokio::spawn(befehle::stdin_lesen(handle.clone(), token.clone()));

        let warten = sitzung.warten();
        tokio::pin!(warten);
        let mut status = tokio::time::interval(STATUS_INTERVALL);
        status.tick().await;

        let ergebnis = loop {
            tokio::select! {
                r = &mut warten => break r,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown-Signal empfangen, Sitzung wird beendet");
                    handle.beenden();
                }
                _ = status.tick() => {
                    tracing::info!(status = %handle.telemetrie().zusammenfassung(), "Status");
                }
            }
        };

        token.cancel();
        if let Some(export) = export {
            export.await.context("Metriken-Export")?;
        }
        bedienung.abort();

        let statistik = tokio::task::spawn_blocking(move || geraet.join())
            .await
            .context("Geraete-Thread")?
            .map_err(|_| anyhow::anyhow!("Geraete-Thread ist abgestuerzt"))?;
        tracing::debug!(?statistik, "Geraete-Statistik");
        tracing::info!(status = %handle.telemetrie().zusammenfassung(), "Client beendet");

        ergebnis?;
        Ok(())
    }
}
