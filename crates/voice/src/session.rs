//! Session/Transport Manager – Sitzung mit dem Voice-Server
//!
//! Eine Sitzung besteht aus drei tokio-Tasks und dem Audio-Takt:
//!
//! ```text
//!                 ┌──────────── tokio ────────────┐
//! Transport ─────►│ Empfangs-Task (parse_frame)   │──Paket-Queue──┐
//!    ▲            │ Sende-Task                    │◄─Sende-Queue─┐│
//!    └────────────│ Keepalive-Task                │              ││
//!                 └───────────────────────────────┘              ││
//!                                                                ▼▼
//! Anwendung ──SessionHandle──Befehls-Queue──► AudioTakt (Geraete-Thread)
//!                                              Transmit / Receive / Ausgabe
//! ```
//!
//! Der Audio-Takt besitzt alle Quellen und Abonnements allein. Die Tasks
//! reichen nur Nachrichten ueber begrenzte Queues weiter; der Takt liest
//! sie nicht-blockierend an seinen Grenzen. Beim Abbau leert der Takt
//! seine Tabellen selbst, ein halb abgebauter Zustand ist nie sichtbar.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use parking_lot::Mutex;
use skyband_audio::{
    AudioFrame, AusgabeMixer, FrameAusgabe, FrameSammler, PttMode, VadConfig, MIX_RATE,
};
use skyband_core::{Callsign, FrequencyHz, SitzungsId, SkybandError};
use skyband_protocol::voice::MAX_FREQUENZEN;
use skyband_protocol::{parse_frame, serialize, serialize_frame, CodecConfig, Frame, Keepalive, VoicePacket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn, Instrument};

use crate::jitter_buffer::JitterBufferConfig;
use crate::mixer::MixerConfig;
use crate::receive::{FrameSammlung, ReceiveConfig, ReceivePipeline};
use crate::telemetry::{Telemetrie, TelemetrieSnapshot};
use crate::transmit::{SendeZustand, TransmitPipeline};
use crate::transport::{DatagramTransport, UdpTransport, DATAGRAMM_PUFFER};

/// Obergrenze verarbeiteter Befehle pro Takt
const MAX_BEFEHLE_PRO_TAKT: usize = 16;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Vollstaendige Konfiguration einer Sitzung
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub callsign: Callsign,
    /// Adresse des Voice-Servers
    pub server: SocketAddr,
    /// Lokale Bind-Adresse (Port 0 = beliebig)
    pub bind: SocketAddr,
    pub keepalive_ms: u64,
    /// Aufeinanderfolgende Socket-Fehler bis zum Sitzungsabbruch
    pub max_socket_fehler: u32,
    /// Kapazitaet Netz -> Audio-Takt (Pakete)
    pub paket_queue: usize,
    pub befehl_queue: usize,
    /// Kapazitaet Audio-Takt -> Sende-Task (Pakete)
    pub sende_queue: usize,
    pub codec: CodecConfig,
    pub ptt_modus: PttMode,
    pub vad: VadConfig,
    pub jitter: JitterBufferConfig,
    pub mixer: MixerConfig,
    pub empfang: ReceiveConfig,
    /// Beim Start abonnierte Frequenzen
    pub frequenzen: Vec<FrequencyHz>,
    /// Frequenzen, auf denen gesendet wird
    pub sende_frequenzen: Vec<FrequencyHz>,
}

impl SessionConfig {
    /// Standardwerte fuer `callsign` und `server`
    pub fn neu(callsign: Callsign, server: SocketAddr) -> Self {
        Self {
            callsign,
            server,
            bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            keepalive_ms: 5000,
            max_socket_fehler: 50,
            paket_queue: 256,
            befehl_queue: 64,
            sende_queue: 64,
            codec: CodecConfig::default(),
            ptt_modus: PttMode::default(),
            vad: VadConfig::default(),
            jitter: JitterBufferConfig::default(),
            mixer: MixerConfig::default(),
            empfang: ReceiveConfig::default(),
            frequenzen: Vec::new(),
            sende_frequenzen: Vec::new(),
        }
    }

    pub fn validieren(&self) -> Result<(), SkybandError> {
        self.codec
            .validieren()
            .map_err(SkybandError::Konfiguration)?;
        self.jitter
            .validieren()
            .map_err(SkybandError::Konfiguration)?;
        if self.keepalive_ms == 0 {
            return Err(SkybandError::Konfiguration(
                "keepalive_ms muss groesser 0 sein".into(),
            ));
        }
        if self.paket_queue == 0 || self.befehl_queue == 0 || self.sende_queue == 0 {
            return Err(SkybandError::Konfiguration(
                "Queue-Groessen muessen groesser 0 sein".into(),
            ));
        }
        if self.max_socket_fehler == 0 {
            return Err(SkybandError::Konfiguration(
                "max_socket_fehler muss groesser 0 sein".into(),
            ));
        }
        if self.sende_frequenzen.len() > MAX_FREQUENZEN {
            return Err(SkybandError::Konfiguration(format!(
                "hoechstens {MAX_FREQUENZEN} Sendefrequenzen"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Befehle
// ---------------------------------------------------------------------------

/// Befehle der Anwendung an den Audio-Takt
#[derive(Debug, Clone, PartialEq)]
pub enum Befehl {
    Abonnieren(FrequencyHz),
    Abbestellen(FrequencyHz),
    SendeFrequenzen(Vec<FrequencyHz>),
    PttDruecken,
    PttLoslassen,
    Stumm(bool),
    PttModus(PttMode),
    Lautstaerke(FrequencyHz, f32),
    Master(f32),
    /// Funk-Effekte einer Frequenz an/aus
    Effekte(FrequencyHz, bool),
    /// Sender auf einer Frequenz ohne Effekte durchreichen
    Direkt(FrequencyHz, Callsign, bool),
}

/// Vom Empfangs-Task geparstes Paket
#[derive(Debug)]
struct EmpfangenesPaket {
    paket: VoicePacket,
    empfangen: Instant,
}

// ---------------------------------------------------------------------------
// Geteilter Zustand
// ---------------------------------------------------------------------------

/// Socket-Richtung; jede zaehlt ihre Fehler in Folge getrennt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Richtung {
    Empfang,
    /// Sprachpakete und Keepalives
    Senden,
}

/// Zustand, den Tasks, Audio-Takt und Anwendung gemeinsam sehen
#[derive(Debug)]
struct Geteilt {
    telemetrie: Telemetrie,
    sendet: AtomicBool,
    /// f32-Bits des mittleren Eingangspegels (dBFS)
    pegel_db: AtomicU32,
    fehler_empfang: AtomicU32,
    fehler_senden: AtomicU32,
    max_fehler: u32,
    fatal: Mutex<Option<String>>,
    token: CancellationToken,
}

impl Geteilt {
    fn neu(max_fehler: u32, token: CancellationToken) -> Self {
        Self {
            telemetrie: Telemetrie::neu(),
            sendet: AtomicBool::new(false),
            pegel_db: AtomicU32::new(skyband_audio::meter::MIN_DBFS.to_bits()),
            fehler_empfang: AtomicU32::new(0),
            fehler_senden: AtomicU32::new(0),
            max_fehler,
            fatal: Mutex::new(None),
            token,
        }
    }

    fn zaehler(&self, richtung: Richtung) -> &AtomicU32 {
        match richtung {
            Richtung::Empfang => &self.fehler_empfang,
            Richtung::Senden => &self.fehler_senden,
        }
    }

    fn erfolg(&self, richtung: Richtung) {
        self.zaehler(richtung).store(0, Ordering::Relaxed);
    }

    /// Zaehlt einen Socket-Fehler; bricht die Sitzung ab, wenn er fatal ist
    /// oder in seiner Richtung zu viele in Folge auftreten
    fn fehler(&self, richtung: Richtung, fehler: &SkybandError, quelle: &'static str) {
        let in_folge = self.zaehler(richtung).fetch_add(1, Ordering::Relaxed) + 1;
        if fehler.ist_fatal() || in_folge >= self.max_fehler {
            self.abbrechen(format!("{quelle}: {fehler} ({in_folge} Fehler in Folge)"));
        } else {
            warn!(fehler = %fehler, in_folge, quelle, "Socket-Fehler");
        }
    }

    fn abbrechen(&self, grund: String) {
        let mut fatal = self.fatal.lock();
        if fatal.is_none() {
            error!(grund = %grund, "Sitzung abgebrochen");
            *fatal = Some(grund);
        }
        drop(fatal);
        self.token.cancel();
    }
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Steuerung der Sitzung aus der Anwendung (klonbar, thread-safe)
#[derive(Clone)]
pub struct SessionHandle {
    id: SitzungsId,
    befehle: Sender<Befehl>,
    geteilt: Arc<Geteilt>,
}

impl SessionHandle {
    pub fn id(&self) -> SitzungsId {
        self.id
    }

    pub fn abonnieren(&self, frequenz: FrequencyHz) -> Result<(), SkybandError> {
        self.befehl(Befehl::Abonnieren(frequenz))
    }

    pub fn abbestellen(&self, frequenz: FrequencyHz) -> Result<(), SkybandError> {
        self.befehl(Befehl::Abbestellen(frequenz))
    }

    pub fn sende_frequenzen(&self, frequenzen: Vec<FrequencyHz>) -> Result<(), SkybandError> {
        self.befehl(Befehl::SendeFrequenzen(frequenzen))
    }

    /// PTT gedrueckt (`true`) oder losgelassen (`false`)
    pub fn ptt(&self, gedrueckt: bool) -> Result<(), SkybandError> {
        self.befehl(if gedrueckt {
            Befehl::PttDruecken
        } else {
            Befehl::PttLoslassen
        })
    }

    pub fn stumm(&self, stumm: bool) -> Result<(), SkybandError> {
        self.befehl(Befehl::Stumm(stumm))
    }

    pub fn ptt_modus(&self, modus: PttMode) -> Result<(), SkybandError> {
        self.befehl(Befehl::PttModus(modus))
    }

    pub fn lautstaerke(&self, frequenz: FrequencyHz, wert: f32) -> Result<(), SkybandError> {
        self.befehl(Befehl::Lautstaerke(frequenz, wert))
    }

    pub fn master(&self, wert: f32) -> Result<(), SkybandError> {
        self.befehl(Befehl::Master(wert))
    }

    pub fn effekte(&self, frequenz: FrequencyHz, an: bool) -> Result<(), SkybandError> {
        self.befehl(Befehl::Effekte(frequenz, an))
    }

    pub fn direkt(&self, frequenz: FrequencyHz, callsign: Callsign, an: bool) -> Result<(), SkybandError> {
        self.befehl(Befehl::Direkt(frequenz, callsign, an))
    }

    /// Beendet die Sitzung (nicht-blockierend)
    pub fn beenden(&self) {
        self.geteilt.token.cancel();
    }

    pub fn ist_beendet(&self) -> bool {
        self.geteilt.token.is_cancelled()
    }

    /// Sendet der lokale Operator gerade?
    pub fn sendet(&self) -> bool {
        self.geteilt.sendet.load(Ordering::Relaxed)
    }

    /// Mittlerer Eingangspegel der letzten 300ms in dBFS
    pub fn eingangspegel_db(&self) -> f32 {
        f32::from_bits(self.geteilt.pegel_db.load(Ordering::Relaxed))
    }

    pub fn telemetrie(&self) -> TelemetrieSnapshot {
        self.geteilt.telemetrie.snapshot()
    }

    /// Reicht einen Befehl an den Audio-Takt weiter (nicht-blockierend)
    pub fn befehl(&self, befehl: Befehl) -> Result<(), SkybandError> {
        if let Befehl::SendeFrequenzen(f) = &befehl {
            if f.len() > MAX_FREQUENZEN {
                return Err(SkybandError::ResourceExhaustion(format!(
                    "{} Sendefrequenzen, hoechstens {MAX_FREQUENZEN}",
                    f.len()
                )));
            }
        }
        if self.ist_beendet() {
            return Err(SkybandError::fatal("Sitzung beendet"));
        }
        self.befehle.try_send(befehl).map_err(|e| match e {
            TrySendError::Full(_) => SkybandError::ResourceExhaustion("Befehls-Queue voll".into()),
            TrySendError::Disconnected(_) => SkybandError::fatal("Audio-Takt beendet"),
        })
    }
}

// ---------------------------------------------------------------------------
// AudioTakt
// ---------------------------------------------------------------------------

/// Audio-Seite der Sitzung; lebt im Geraete-Thread
///
/// Kein Aufruf blockiert auf Netz oder Locks. Jeder `tick` liefert genau
/// einen Ausgabe-Frame (48 kHz), auch wenn nichts empfangen wurde.
pub struct AudioTakt {
    senden: TransmitPipeline,
    empfang: ReceivePipeline,
    ausgabe: AusgabeMixer,
    sammlung: FrameSammlung,
    /// Frequenzen der laufenden eigenen Sendung
    sperre: Vec<FrequencyHz>,
    pakete: Receiver<EmpfangenesPaket>,
    befehle: Receiver<Befehl>,
    sende_tx: mpsc::Sender<Bytes>,
    geteilt: Arc<Geteilt>,
    max_pakete_pro_takt: usize,
    /// Bereits an die Telemetrie gemeldete entfernte Quellen
    entfernt_gemeldet: u64,
    abgebaut: bool,
}

impl AudioTakt {
    /// Ein Takt: Befehle, Pakete, Senden, Empfangen, Ausgabe
    pub fn tick(&mut self, capture: &AudioFrame) -> AudioFrame {
        if self.geteilt.token.is_cancelled() {
            if !self.abgebaut {
                self.abbauen();
            }
            return AudioFrame::stille(MIX_RATE);
        }
        let jetzt = Instant::now();
        self.geteilt.telemetrie.takt();

        self.befehle_verarbeiten(jetzt);

        for _ in 0..self.max_pakete_pro_takt {
            match self.pakete.try_recv() {
                Ok(p) => self.empfang.paket_empfangen(p.paket, p.empfangen),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        let zeitstempel_ms = chrono::Utc::now().timestamp_millis().max(0) as u64;
        if let Some(paket) = self.senden.tick(capture, zeitstempel_ms) {
            match serialize(&paket) {
                Ok(daten) => match self.sende_tx.try_send(daten) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        self.geteilt.telemetrie.queue_verworfen();
                        trace!(sequence = paket.sequence, "Sende-Queue voll");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {}
                },
                Err(e) => warn!(fehler = %e, sequence = paket.sequence, "Paket nicht serialisierbar"),
            }
        }
        let sendet = self.senden.zustand() == SendeZustand::Transmitting;
        self.geteilt.sendet.store(sendet, Ordering::Relaxed);

        self.sperre.clear();
        if sendet {
            self.sperre.extend(self.senden.frequenzen());
        }
        self.empfang.sendesperre_setzen(&self.sperre);
        self.geteilt
            .pegel_db
            .store(self.senden.pegel().mittel_db().to_bits(), Ordering::Relaxed);

        self.sammlung.frames.clear();
        self.empfang.tick(jetzt, &mut self.sammlung);
        let frame = self.ausgabe.mischen(
            self.sammlung
                .frames
                .iter()
                .map(|(frequenz, frame)| (*frequenz, frame)),
        );

        let s = self.empfang.statistik();
        self.geteilt
            .telemetrie
            .empfang_aktualisieren(s.aktive_quellen, s.verdeckt, s.verspaetet, s.duplikate);
        let entfernt = s.quellen_verdraengt + s.quellen_abgelaufen;
        for _ in self.entfernt_gemeldet..entfernt {
            self.geteilt.telemetrie.quelle_entfernt();
        }
        self.entfernt_gemeldet = entfernt;
        frame
    }

    /// Verarbeitet alle vollstaendigen Capture-Frames und schreibt die
    /// Ausgabe in den Playback-Ring; liefert die Anzahl der Takte
    pub fn callback_verarbeiten(
        &mut self,
        eingang: &mut FrameSammler,
        ausgang: &mut FrameAusgabe,
    ) -> usize {
        let mut takte = 0;
        while let Some(capture) = eingang.naechster_frame() {
            let frame = self.tick(&capture);
            ausgang.schreiben(&frame);
            takte += 1;
        }
        takte
    }

    pub fn ist_abgebaut(&self) -> bool {
        self.abgebaut
    }

    pub fn empfang(&self) -> &ReceivePipeline {
        &self.empfang
    }

    pub fn senden(&self) -> &TransmitPipeline {
        &self.senden
    }

    fn befehle_verarbeiten(&mut self, jetzt: Instant) {
        for _ in 0..MAX_BEFEHLE_PRO_TAKT {
            let befehl = match self.befehle.try_recv() {
                Ok(b) => b,
                Err(_) => break,
            };
            debug!(befehl = ?befehl, "Befehl");
            match befehl {
                Befehl::Abonnieren(f) => {
                    if let Some(alt) = self.empfang.abonnieren(f, jetzt) {
                        self.ausgabe.frequenz_entfernen(alt);
                    }
                    self.ausgabe.frequenz_hinzufuegen(f);
                }
                Befehl::Abbestellen(f) => {
                    self.empfang.abbestellen(f);
                    self.ausgabe.frequenz_entfernen(f);
                }
                Befehl::SendeFrequenzen(f) => self.senden.frequenzen_setzen(&f),
                Befehl::PttDruecken => self.senden.ptt_druecken(),
                Befehl::PttLoslassen => self.senden.ptt_loslassen(),
                Befehl::Stumm(s) => self.senden.stummschalten(s),
                Befehl::PttModus(m) => self.senden.ptt_modus_setzen(m),
                Befehl::Lautstaerke(f, w) => {
                    if !self.ausgabe.lautstaerke_setzen(f, w) {
                        warn!(frequenz = %f, "Lautstaerke fuer nicht abonnierte Frequenz");
                    }
                }
                Befehl::Master(w) => self.ausgabe.master_setzen(w),
                Befehl::Effekte(f, an) => {
                    if !self.empfang.effekte_setzen(f, an) {
                        warn!(frequenz = %f, "Effekte fuer nicht abonnierte Frequenz");
                    }
                }
                Befehl::Direkt(f, c, an) => {
                    if !self.empfang.direkt_setzen(f, &c, an) {
                        warn!(frequenz = %f, callsign = %c, "Direktweg nicht gesetzt");
                    }
                }
            }
        }
    }

    fn abbauen(&mut self) {
        self.empfang.leeren();
        while self.pakete.try_recv().is_ok() {}
        while self.befehle.try_recv().is_ok() {}
        self.geteilt.sendet.store(false, Ordering::Relaxed);
        self.geteilt.telemetrie.empfang_aktualisieren(0, 0, 0, 0);
        self.abgebaut = true;
        info!("Audio-Takt abgebaut");
    }
}

// ---------------------------------------------------------------------------
// VoiceSession
// ---------------------------------------------------------------------------

/// Laufende Sitzung (Besitzer der Netzwerk-Tasks)
pub struct VoiceSession {
    id: SitzungsId,
    geteilt: Arc<Geteilt>,
    tasks: Vec<JoinHandle<()>>,
}

impl VoiceSession {
    /// Bindet einen UDP-Transport laut Konfiguration und startet die Sitzung
    pub async fn verbinden(
        config: SessionConfig,
    ) -> Result<(VoiceSession, SessionHandle, AudioTakt), SkybandError> {
        let transport = UdpTransport::verbinden(config.bind, config.server).await?;
        Self::starten(config, Arc::new(transport))
    }

    /// Startet die Sitzung ueber einen beliebigen Transport
    ///
    /// Muss innerhalb einer tokio-Runtime aufgerufen werden.
    pub fn starten(
        config: SessionConfig,
        transport: Arc<dyn DatagramTransport>,
    ) -> Result<(VoiceSession, SessionHandle, AudioTakt), SkybandError> {
        config.validieren()?;

        let id = SitzungsId::new();
        let span = tracing::info_span!("sitzung", id = %id, callsign = %config.callsign);
        let token = CancellationToken::new();
        let geteilt = Arc::new(Geteilt::neu(config.max_socket_fehler, token.clone()));

        let (paket_tx, paket_rx) = crossbeam_channel::bounded(config.paket_queue);
        let (befehl_tx, befehl_rx) = crossbeam_channel::bounded(config.befehl_queue);
        let (sende_tx, sende_rx) = mpsc::channel(config.sende_queue);

        let mut senden = TransmitPipeline::neu(
            config.callsign.clone(),
            config.codec.clone(),
            config.vad.clone(),
            config.ptt_modus,
        )?;
        senden.frequenzen_setzen(&config.sende_frequenzen);

        let mut empfang = ReceivePipeline::neu(
            config.callsign.clone(),
            config.empfang.clone(),
            config.jitter.clone(),
            config.mixer.clone(),
        );
        let mut ausgabe = AusgabeMixer::neu();
        let jetzt = Instant::now();
        for frequenz in &config.frequenzen {
            if let Some(alt) = empfang.abonnieren(*frequenz, jetzt) {
                ausgabe.frequenz_entfernen(alt);
            }
            ausgabe.frequenz_hinzufuegen(*frequenz);
        }

        let tasks = vec![
            tokio::spawn(
                empfangs_task(Arc::clone(&transport), paket_tx, Arc::clone(&geteilt))
                    .instrument(span.clone()),
            ),
            tokio::spawn(
                sende_task(Arc::clone(&transport), sende_rx, Arc::clone(&geteilt))
                    .instrument(span.clone()),
            ),
            tokio::spawn(
                keepalive_task(
                    transport,
                    config.callsign.clone(),
                    Duration::from_millis(config.keepalive_ms),
                    Arc::clone(&geteilt),
                )
                .instrument(span.clone()),
            ),
        ];

        span.in_scope(|| {
            info!(
                server = %config.server,
                codec = ?config.codec.art,
                frequenzen = config.frequenzen.len(),
                "Sitzung gestartet"
            )
        });

        let takt = AudioTakt {
            senden,
            empfang,
            ausgabe,
            sammlung: FrameSammlung::default(),
            sperre: Vec::with_capacity(MAX_FREQUENZEN),
            pakete: paket_rx,
            befehle: befehl_rx,
            sende_tx,
            geteilt: Arc::clone(&geteilt),
            max_pakete_pro_takt: config.paket_queue,
            entfernt_gemeldet: 0,
            abgebaut: false,
        };
        let handle = SessionHandle {
            id,
            befehle: befehl_tx,
            geteilt: Arc::clone(&geteilt),
        };
        Ok((VoiceSession { id, geteilt, tasks }, handle, takt))
    }

    pub fn id(&self) -> SitzungsId {
        self.id
    }

    /// Stoesst den Abbau an (nicht-blockierend)
    pub fn beenden(&self) {
        self.geteilt.token.cancel();
    }

    /// Wartet auf das Ende aller Tasks
    ///
    /// Liefert `FatalSession`, wenn die Sitzung wegen Socket-Fehlern
    /// abgebrochen wurde.
    pub async fn warten(mut self) -> Result<(), SkybandError> {
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(fehler = %e, "Sitzungs-Task abgebrochen");
            }
        }
        let fatal = self.geteilt.fatal.lock().take();
        match fatal {
            Some(grund) => Err(SkybandError::FatalSession(grund)),
            None => {
                info!(id = %self.id, "Sitzung beendet");
                Ok(())
            }
        }
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.geteilt.token.cancel();
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn empfangs_task(
    transport: Arc<dyn DatagramTransport>,
    pakete: Sender<EmpfangenesPaket>,
    geteilt: Arc<Geteilt>,
) {
    let mut puffer = vec![0u8; DATAGRAMM_PUFFER];
    debug!("Empfangs-Task gestartet");

    loop {
        let ergebnis = tokio::select! {
            biased;
            _ = geteilt.token.cancelled() => break,
            r = transport.empfangen(&mut puffer) => r,
        };

        let laenge = match ergebnis {
            Ok(n) => {
                geteilt.erfolg(Richtung::Empfang);
                n
            }
            Err(e) => {
                geteilt.fehler(Richtung::Empfang, &e, "empfangen");
                // Kurze Pause gegen Busy-Loop bei dauerhaftem Fehler
                tokio::time::sleep(Duration::from_millis(1)).await;
                continue;
            }
        };

        match parse_frame(&puffer[..laenge]) {
            Ok(Frame::Voice(paket)) => {
                geteilt.telemetrie.paket_empfangen(laenge);
                let eintrag = EmpfangenesPaket {
                    paket,
                    empfangen: Instant::now(),
                };
                match pakete.try_send(eintrag) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        geteilt.telemetrie.queue_verworfen();
                        trace!("Paket-Queue voll, Paket verworfen");
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
            Ok(Frame::Keepalive(k)) => {
                trace!(callsign = %k.callsign, "Keepalive empfangen");
            }
            Err(e) => {
                geteilt.telemetrie.parse_fehler();
                let fehler: SkybandError = e.into();
                debug!(fehler = %fehler, bytes = laenge, "Datagramm verworfen");
            }
        }
    }
    debug!("Empfangs-Task beendet");
}

async fn sende_task(
    transport: Arc<dyn DatagramTransport>,
    mut queue: mpsc::Receiver<Bytes>,
    geteilt: Arc<Geteilt>,
) {
    debug!("Sende-Task gestartet");
    loop {
        let daten = tokio::select! {
            biased;
            _ = geteilt.token.cancelled() => break,
            d = queue.recv() => match d {
                Some(d) => d,
                None => break,
            },
        };
        match transport.senden(&daten).await {
            Ok(()) => {
                geteilt.erfolg(Richtung::Senden);
                geteilt.telemetrie.paket_gesendet(daten.len());
            }
            Err(e) => {
                geteilt.telemetrie.sende_fehler();
                geteilt.fehler(Richtung::Senden, &e, "senden");
            }
        }
    }
    debug!("Sende-Task beendet");
}

async fn keepalive_task(
    transport: Arc<dyn DatagramTransport>,
    callsign: Callsign,
    intervall: Duration,
    geteilt: Arc<Geteilt>,
) {
    let mut takt = tokio::time::interval(intervall);
    takt.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = geteilt.token.cancelled() => break,
            _ = takt.tick() => {}
        }
        let frame = Frame::Keepalive(Keepalive {
            callsign: callsign.clone(),
            zeitstempel_ms: chrono::Utc::now().timestamp_millis().max(0) as u64,
        });
        let daten = match serialize_frame(&frame) {
            Ok(d) => d,
            Err(e) => {
                warn!(fehler = %e, "Keepalive nicht serialisierbar");
                continue;
            }
        };
        match transport.senden(&daten).await {
            Ok(()) => {
                geteilt.erfolg(Richtung::Senden);
                geteilt.telemetrie.keepalive_gesendet();
            }
            Err(e) => {
                geteilt.telemetrie.sende_fehler();
                geteilt.fehler(Richtung::Senden, &e, "keepalive");
            }
        }
    }
    debug!("Keepalive-Task beendet");
}
