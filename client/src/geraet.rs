//! Simulierter Geraete-Takt
//!
//! Ohne Audio-Backend ersetzt ein eigener Thread die Callbacks von
//! Mikrofon und Lautsprecher: alle 20ms schreibt er einen Capture-Block in
//! den Eingangs-Ring, laesst den `AudioTakt` alle vollstaendigen Frames
//! verarbeiten und liest einen Block aus dem Playback-Ring.
//!
//! ```text
//! Testton/Stille -> CaptureEingang ==ring==> AudioTakt ==ring==> PlaybackAusgang -> Pegel
//! ```
//!
//! Der Thread blockiert nie auf Netz oder Locks; er endet, sobald der
//! Takt die abgebaute Sitzung gemeldet hat.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use skyband_audio::dsp::ton::Sinuston;
use skyband_audio::{capture_puffer, playback_puffer, PegelMesser, MIX_FRAME_SAMPLES, MIX_RATE};
use skyband_voice::AudioTakt;
use tracing::{debug, info, trace, warn};

use crate::config::{AudioEinstellungen, Eingang};

const TAKT: Duration = Duration::from_millis(20);

/// Takte zwischen zwei Pegel-Meldungen (5s)
const PEGEL_INTERVALL: u64 = 250;

/// Startet den Geraete-Thread
pub fn geraete_thread_starten(
    takt: AudioTakt,
    einstellungen: &AudioEinstellungen,
) -> std::io::Result<JoinHandle<GeraeteStatistik>> {
    let eingang = einstellungen.eingang;
    let ton = Sinuston::neu(einstellungen.ton_hz, MIX_RATE);
    let ton_pegel = einstellungen.ton_pegel;
    let puffer_frames = einstellungen.puffer_frames;

    std::thread::Builder::new()
        .name("audio-takt".into())
        .spawn(move || geraete_schleife(takt, eingang, ton, ton_pegel, puffer_frames))
}

/// Zaehler des Geraete-Threads nach Ende
#[derive(Debug, Clone, Default)]
pub struct GeraeteStatistik {
    pub takte: u64,
    pub capture_verworfen: u64,
    pub playback_verworfen: u64,
    pub unterlaeufe: u64,
    /// Takte, die mehr als eine Periode zu spaet kamen
    pub verspaetet: u64,
}

fn geraete_schleife(
    mut takt: AudioTakt,
    eingang: Eingang,
    mut ton: Sinuston,
    ton_pegel: f32,
    puffer_frames: usize,
) -> GeraeteStatistik {
    let (mut capture, mut sammler) = capture_puffer(MIX_FRAME_SAMPLES, MIX_RATE, puffer_frames);
    let (mut ausgabe, mut playback) = playback_puffer(MIX_FRAME_SAMPLES, puffer_frames);
    let mut block = vec![0.0f32; MIX_FRAME_SAMPLES];
    let mut lautsprecher = vec![0.0f32; MIX_FRAME_SAMPLES];
    let mut pegel = PegelMesser::neu();
    let mut statistik = GeraeteStatistik::default();

    debug!(eingang = ?eingang, "Geraete-Takt gestartet");
    let mut naechster = Instant::now();

    while !takt.ist_abgebaut() {
        // Mikrofon-Callback
        block.fill(0.0);
        if eingang == Eingang::Ton {
            ton.addieren(&mut block, ton_pegel);
        }
        capture.schreiben(&block);

        statistik.takte += takt.callback_verarbeiten(&mut sammler, &mut ausgabe) as u64;

        // Lautsprecher-Callback
        playback.fuellen(&mut lautsprecher);
        let db = pegel.messen(&lautsprecher);
        trace!(pegel_db = db, "Ausgabe");
        if statistik.takte % PEGEL_INTERVALL == 0 {
            debug!(ausgabe_db = pegel.mittel_db(), "Ausgabepegel");
        }

        naechster += TAKT;
        let jetzt = Instant::now();
        if naechster > jetzt {
            std::thread::sleep(naechster - jetzt);
        } else if jetzt - naechster > TAKT {
            // Nicht nachholen: der naechste Takt beginnt jetzt
            statistik.verspaetet += 1;
            naechster = jetzt;
        }
    }

    statistik.capture_verworfen = capture.verworfen();
    statistik.playback_verworfen = ausgabe.verworfen();
    statistik.unterlaeufe = playback.unterlaeufe();
    if statistik.verspaetet > 0 {
        warn!(verspaetet = statistik.verspaetet, "Geraete-Takt hat Perioden verpasst");
    }
    info!(takte = statistik.takte, unterlaeufe = statistik.unterlaeufe, "Geraete-Takt beendet");
    statistik
}
