//! Telemetrie der Voice-Sitzung
//!
//! Zaehler werden vom Audio-Takt und von den Netzwerk-Tasks ohne Locks
//! hochgezaehlt (Relaxed-Atomics). Ein `TelemetrieSnapshot` ist eine
//! konsistente-genug Momentaufnahme fuer Logs und Metrik-Export.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Momentaufnahme aller Zaehler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrieSnapshot {
    pub pakete_empfangen: u64,
    pub bytes_empfangen: u64,
    pub pakete_gesendet: u64,
    pub bytes_gesendet: u64,
    pub keepalives_gesendet: u64,
    /// Nicht parsebare Datagramme
    pub parse_fehler: u64,
    /// Wegen voller Queue verworfene Pakete
    pub queue_verworfen: u64,
    pub verdeckte_frames: u64,
    pub verspaetete_pakete: u64,
    pub duplikate: u64,
    /// Verdraengte oder wegen Stille entfernte Sender
    pub quellen_entfernt: u64,
    pub aktive_quellen: u64,
    pub sende_fehler: u64,
    /// Ausgefuehrte Audio-Takte
    pub takte: u64,
    /// Laufzeit in Sekunden
    pub laufzeit_s: f64,
}

impl TelemetrieSnapshot {
    /// Empfangs-Bitrate ueber die gesamte Laufzeit in bps
    pub fn empfang_bps(&self) -> u64 {
        bitrate(self.bytes_empfangen, self.laufzeit_s)
    }

    /// Sende-Bitrate ueber die gesamte Laufzeit in bps
    pub fn sende_bps(&self) -> u64 {
        bitrate(self.bytes_gesendet, self.laufzeit_s)
    }

    /// Anteil verdeckter Frames an allen Takten mit aktiven Sendern
    pub fn verdeckungs_rate(&self) -> f64 {
        let gesamt = self.pakete_empfangen + self.verdeckte_frames;
        if gesamt == 0 {
            0.0
        } else {
            self.verdeckte_frames as f64 / gesamt as f64
        }
    }

    /// Gibt eine lesbare Zusammenfassung zurueck
    pub fn zusammenfassung(&self) -> String {
        format!(
            "Rx={} ({}kbps) Tx={} ({}kbps) Quellen={} Verdeckt={:.1}% Verspaetet={} Parse={} Queue={} Takte={}",
            self.pakete_empfangen,
            self.empfang_bps() / 1000,
            self.pakete_gesendet,
            self.sende_bps() / 1000,
            self.aktive_quellen,
            self.verdeckungs_rate() * 100.0,
            self.verspaetete_pakete,
            self.parse_fehler,
            self.queue_verworfen,
            self.takte,
        )
    }
}

fn bitrate(bytes: u64, sekunden: f64) -> u64 {
    if sekunden <= 0.0 {
        0
    } else {
        (bytes as f64 * 8.0 / sekunden) as u64
    }
}

// ---------------------------------------------------------------------------
// Telemetrie
// ---------------------------------------------------------------------------

/// Gemeinsame Zaehler einer Sitzung (per `Arc` geteilt)
#[derive(Debug)]
pub struct Telemetrie {
    start: Instant,
    pakete_empfangen: AtomicU64,
    bytes_empfangen: AtomicU64,
    pakete_gesendet: AtomicU64,
    bytes_gesendet: AtomicU64,
    keepalives_gesendet: AtomicU64,
    parse_fehler: AtomicU64,
    queue_verworfen: AtomicU64,
    verdeckte_frames: AtomicU64,
    verspaetete_pakete: AtomicU64,
    duplikate: AtomicU64,
    quellen_entfernt: AtomicU64,
    aktive_quellen: AtomicU64,
    sende_fehler: AtomicU64,
    takte: AtomicU64,
}

impl Default for Telemetrie {
    fn default() -> Self {
        Self::neu()
    }
}

impl Telemetrie {
    pub fn neu() -> Self {
        Self {
            start: Instant::now(),
            pakete_empfangen: AtomicU64::new(0),
            bytes_empfangen: AtomicU64::new(0),
            pakete_gesendet: AtomicU64::new(0),
            bytes_gesendet: AtomicU64::new(0),
            keepalives_gesendet: AtomicU64::new(0),
            parse_fehler: AtomicU64::new(0),
            queue_verworfen: AtomicU64::new(0),
            verdeckte_frames: AtomicU64::new(0),
            verspaetete_pakete: AtomicU64::new(0),
            duplikate: AtomicU64::new(0),
            quellen_entfernt: AtomicU64::new(0),
            aktive_quellen: AtomicU64::new(0),
            sende_fehler: AtomicU64::new(0),
            takte: AtomicU64::new(0),
        }
    }

    pub fn paket_empfangen(&self, bytes: usize) {
        self.pakete_empfangen.fetch_add(1, Ordering::Relaxed);
        self.bytes_empfangen
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn paket_gesendet(&self, bytes: usize) {
        self.pakete_gesendet.fetch_add(1, Ordering::Relaxed);
        self.bytes_gesendet.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn keepalive_gesendet(&self) {
        self.keepalives_gesendet.fetch_add(1, Ordering::Relaxed);
    }

    pub fn parse_fehler(&self) {
        self.parse_fehler.fetch_add(1, Ordering::Relaxed);
    }

    pub fn queue_verworfen(&self) {
        self.queue_verworfen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sende_fehler(&self) {
        self.sende_fehler.fetch_add(1, Ordering::Relaxed);
    }

    pub fn quelle_entfernt(&self) {
        self.quellen_entfernt.fetch_add(1, Ordering::Relaxed);
    }

    pub fn takt(&self) {
        self.takte.fetch_add(1, Ordering::Relaxed);
    }

    /// Uebernimmt Werte, die der Empfangspfad selbst zaehlt
    pub fn empfang_aktualisieren(
        &self,
        aktive_quellen: usize,
        verdeckte_frames: u64,
        verspaetete_pakete: u64,
        duplikate: u64,
    ) {
        self.aktive_quellen
            .store(aktive_quellen as u64, Ordering::Relaxed);
        self.verdeckte_frames
            .store(verdeckte_frames, Ordering::Relaxed);
        self.verspaetete_pakete
            .store(verspaetete_pakete, Ordering::Relaxed);
        self.duplikate.store(duplikate, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrieSnapshot {
        TelemetrieSnapshot {
            pakete_empfangen: self.pakete_empfangen.load(Ordering::Relaxed),
            bytes_empfangen: self.bytes_empfangen.load(Ordering::Relaxed),
            pakete_gesendet: self.pakete_gesendet.load(Ordering::Relaxed),
            bytes_gesendet: self.bytes_gesendet.load(Ordering::Relaxed),
            keepalives_gesendet: self.keepalives_gesendet.load(Ordering::Relaxed),
            parse_fehler: self.parse_fehler.load(Ordering::Relaxed),
            queue_verworfen: self.queue_verworfen.load(Ordering::Relaxed),
            verdeckte_frames: self.verdeckte_frames.load(Ordering::Relaxed),
            verspaetete_pakete: self.verspaetete_pakete.load(Ordering::Relaxed),
            duplikate: self.duplikate.load(Ordering::Relaxed),
            quellen_entfernt: self.quellen_entfernt.load(Ordering::Relaxed),
            aktive_quellen: self.aktive_quellen.load(Ordering::Relaxed),
            sende_fehler: self.sende_fehler.load(Ordering::Relaxed),
            takte: self.takte.load(Ordering::Relaxed),
            laufzeit_s: self.start.elapsed().as_secs_f64(),
        }
    }
}
