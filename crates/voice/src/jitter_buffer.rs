//! Adaptiver Jitter Buffer fuer einen entfernten Sender
//!
//! Ordnet eingehende Voice-Pakete nach Sequenznummer und gibt sie im
//! festen 20ms-Takt des Audio-Geraets wieder ab. Fehlt das Paket am
//! Cursor, meldet der Buffer `Verdeckung` statt zu warten: der Takt
//! kommt vom Audio-Geraet, nicht vom Netz.
//!
//! ## Sequenzraum
//! Sequenznummern werden modular (u32) empfangen und intern auf einen
//! fortlaufenden i64-Raum erweitert. Ein Paket nach `u32::MAX` mit
//! Nummer 0 gilt damit als naechstes, nicht als uraltes Paket.
//!
//! ## Tiefe
//! - **Adaptiv**: Zieltiefe folgt dem gemessenen Ankunfts-Jitter
//!   (Abweichung Ankunftszeit zu erwarteter Zeit), begrenzt auf
//!   `min_tiefe..=max_tiefe`
//! - **Fest**: Zieltiefe bleibt `min_tiefe`

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use skyband_protocol::codec::FRAME_DAUER_MS;
use skyband_protocol::VoicePacket;

/// Abstand (in Frames), ab dem ein Paket als Neustart des Senders gilt
const NEUSTART_ABSTAND: i64 = 1000;

/// Ueberschreitet der Fuellstand das Ziel um mehr als das, wird ein Frame uebersprungen
const UEBERFUELLUNG: usize = 2;

/// Glaettung der Jitter-Schaetzung (1/16 wie bei RTP)
const JITTER_GLAETTUNG: f64 = 1.0 / 16.0;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Modus des Jitter Buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterBufferModus {
    /// Zieltiefe passt sich dem gemessenen Jitter an
    Adaptiv,
    /// Konstante Zieltiefe `min_tiefe` (deterministische Latenz)
    Fest,
}

/// Konfiguration fuer den Jitter Buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterBufferConfig {
    pub modus: JitterBufferModus,
    /// Untergrenze der Zieltiefe in Frames
    pub min_tiefe: usize,
    /// Obergrenze der Zieltiefe in Frames
    pub max_tiefe: usize,
    /// Fenster ab dem Cursor; weiter entfernte Pakete schieben den Cursor vor
    pub kapazitaet: usize,
    /// Sicherheitsfaktor auf die Jitter-Standardabweichung
    pub jitter_faktor: f64,
    /// Ohne Pakete fuer diese Zeit beginnt ein neues Segment
    pub segment_timeout_ms: u64,
    /// Aufeinanderfolgende Verdeckungen bis der Sender als verstummt gilt
    pub max_verdeckte_frames: u32,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            modus: JitterBufferModus::Adaptiv,
            min_tiefe: 2,
            max_tiefe: 6,
            kapazitaet: 32,
            jitter_faktor: 2.0,
            segment_timeout_ms: 500,
            max_verdeckte_frames: 5,
        }
    }
}

impl JitterBufferConfig {
    pub fn validieren(&self) -> Result<(), String> {
        if self.min_tiefe == 0 || self.min_tiefe > self.max_tiefe {
            return Err(format!(
                "Tiefe {}..{} ungueltig",
                self.min_tiefe, self.max_tiefe
            ));
        }
        if self.kapazitaet <= self.max_tiefe + UEBERFUELLUNG {
            return Err(format!(
                "Kapazitaet {} muss groesser als max_tiefe + {UEBERFUELLUNG} sein",
                self.kapazitaet
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Statistiken
// ---------------------------------------------------------------------------

/// Statistiken des Jitter Buffers
#[derive(Debug, Clone, Default)]
pub struct JitterBufferStatistik {
    pub empfangen: u64,
    pub abgespielt: u64,
    pub duplikate: u64,
    /// Pakete hinter dem Cursor (zu spaet)
    pub verspaetet: u64,
    /// Ausgegebene Verdeckungen
    pub verdeckt: u64,
    /// Verworfen, weil ein neueres Paket das Fenster vorgeschoben hat
    pub verloren: u64,
    /// Bei Ueberfuellung uebersprungene Frames
    pub uebersprungen: u64,
    /// Begonnene Sprachsegmente
    pub segmente: u64,
    /// Geschaetzter Jitter (Standardabweichung) in ms
    pub jitter_ms: f64,
    pub fuellstand: usize,
    pub ziel_tiefe: usize,
}

// ---------------------------------------------------------------------------
// Ausgabe
// ---------------------------------------------------------------------------

/// Ergebnis eines Wiedergabe-Takts
#[derive(Debug, Clone, PartialEq)]
pub enum JitterAusgabe {
    /// Paket am Cursor liegt vor
    Frame(VoicePacket),
    /// Paket fehlt: Verdeckungs-Frame erzeugen
    Verdeckung,
    /// Sender stumm (vor dem Vorpuffern, nach Ende oder Timeout)
    Inaktiv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zustand {
    /// Kein Segment oder Segment beendet
    Inaktiv,
    /// Segment begonnen, warte auf Zieltiefe
    Puffern,
    Abspielen,
}

// ---------------------------------------------------------------------------
// AdaptiveJitterBuffer
// ---------------------------------------------------------------------------

/// Jitter Buffer eines Senders. Nicht thread-safe, gehoert dem Audio-Takt.
pub struct AdaptiveJitterBuffer {
    config: JitterBufferConfig,
    pakete: BTreeMap<i64, VoicePacket>,
    /// Naechste abzuspielende (erweiterte) Sequenznummer; laeuft innerhalb
    /// eines Segments nie zurueck
    cursor: Option<i64>,
    /// Beim Vorpuffern: fruehestes angenommenes Paket des Segments. Der
    /// Cursor wird erst beim Abspielstart darauf gesetzt.
    anfang: Option<i64>,
    zustand: Zustand,
    verdeckt_in_folge: u32,
    letzte_ankunft: Option<Instant>,
    /// Bezugspunkt fuer die erwartete Ankunftszeit
    anker: Option<(i64, Instant)>,
    jitter_mittel: f64,
    jitter_varianz: f64,
    ziel_tiefe: usize,
    statistik: JitterBufferStatistik,
}

impl AdaptiveJitterBuffer {
    pub fn neu(config: JitterBufferConfig) -> Self {
        let ziel_tiefe = config.min_tiefe;
        Self {
            config,
            pakete: BTreeMap::new(),
            cursor: None,
            anfang: None,
            zustand: Zustand::Inaktiv,
            verdeckt_in_folge: 0,
            letzte_ankunft: None,
            anker: None,
            jitter_mittel: 0.0,
            jitter_varianz: 0.0,
            ziel_tiefe,
            statistik: JitterBufferStatistik {
                ziel_tiefe,
                ..Default::default()
            },
        }
    }

    pub fn standard() -> Self {
        Self::neu(JitterBufferConfig::default())
    }

    /// Nimmt ein Paket an
    ///
    /// Verspaetete Pakete und Duplikate werden verworfen. Liegt das Paket
    /// jenseits des Fensters, rueckt der Cursor nach.
    pub fn push(&mut self, paket: VoicePacket, jetzt: Instant) {
        self.statistik.empfangen += 1;

        let timeout = self.segment_timeout();
        let pause = self
            .letzte_ankunft
            .is_some_and(|t| jetzt.saturating_duration_since(t) > timeout);
        self.letzte_ankunft = Some(jetzt);

        let seq = match self.bezug() {
            None => {
                let seq = paket.sequence as i64;
                self.segment_beginnen(seq);
                seq
            }
            Some(bezug) => {
                let seq = erweitern(paket.sequence, bezug);
                let abstand = seq - bezug;

                if self.zustand == Zustand::Inaktiv {
                    if abstand < 0 && abstand > -NEUSTART_ABSTAND && !pause {
                        self.statistik.verspaetet += 1;
                        tracing::trace!(sequence = paket.sequence, "Nachzuegler nach Segmentende");
                        return;
                    }
                    self.segment_beginnen(seq);
                } else if pause || abstand.abs() > NEUSTART_ABSTAND {
                    tracing::debug!(
                        sequence = paket.sequence,
                        abstand,
                        pause,
                        "Neues Segment"
                    );
                    self.segment_beginnen(seq);
                } else if abstand < 0
                    && self.zustand == Zustand::Puffern
                    && abstand > -(self.config.max_tiefe as i64)
                    && self.spanne_bis(seq) < self.config.kapazitaet as i64
                {
                    // Noch nichts abgespielt: Segmentanfang nach vorne verlegen
                    self.anfang = Some(seq);
                } else if abstand < 0 {
                    self.statistik.verspaetet += 1;
                    tracing::trace!(sequence = paket.sequence, abstand, "Verspaetetes Paket");
                    return;
                }
                seq
            }
        };

        if self.pakete.contains_key(&seq) {
            self.statistik.duplikate += 1;
            tracing::trace!(sequence = paket.sequence, "Duplikat verworfen");
            return;
        }

        self.jitter_messen(seq, jetzt);
        self.fenster_nachziehen(seq);
        self.pakete.insert(seq, paket);

        if self.config.modus == JitterBufferModus::Adaptiv {
            self.ziel_tiefe_anpassen();
        }
        self.statistik.fuellstand = self.pakete.len();
    }

    /// Ein Wiedergabe-Takt (20ms)
    pub fn tick(&mut self, jetzt: Instant) -> JitterAusgabe {
        if self.zustand == Zustand::Inaktiv {
            return JitterAusgabe::Inaktiv;
        }

        let verstummt = self
            .letzte_ankunft
            .map_or(true, |t| jetzt.saturating_duration_since(t) > self.segment_timeout());

        if self.zustand == Zustand::Puffern {
            let ende_gepuffert = self.pakete.values().any(|p| p.ende);
            if self.pakete.len() >= self.ziel_tiefe
                || ende_gepuffert
                // Kurzes Segment ohne Ende-Marker: trotzdem abspielen
                || (verstummt && !self.pakete.is_empty())
            {
                self.abspielen_beginnen();
            } else {
                if verstummt {
                    self.segment_beenden();
                }
                return JitterAusgabe::Inaktiv;
            }
        }

        let Some(mut cursor) = self.cursor else {
            return JitterAusgabe::Inaktiv;
        };

        // Zu voll: einen Frame auslassen, damit die Latenz sinkt
        if self.config.modus == JitterBufferModus::Adaptiv
            && self.pakete.len() > self.ziel_tiefe + UEBERFUELLUNG
        {
            if self.pakete.remove(&cursor).is_some() {
                self.statistik.uebersprungen += 1;
                tracing::trace!(cursor, "Ueberfuellung, Frame uebersprungen");
            }
            cursor += 1;
        }

        let ausgabe = match self.pakete.remove(&cursor) {
            Some(paket) => {
                self.cursor = Some(cursor + 1);
                self.verdeckt_in_folge = 0;
                self.statistik.abgespielt += 1;
                if paket.ende {
                    self.segment_beenden();
                }
                JitterAusgabe::Frame(paket)
            }
            None => {
                self.cursor = Some(cursor + 1);
                self.verdeckt_in_folge += 1;
                if self.pakete.is_empty()
                    && (verstummt || self.verdeckt_in_folge > self.config.max_verdeckte_frames)
                {
                    tracing::debug!(cursor, "Sender verstummt ohne Ende-Marker");
                    self.segment_beenden();
                    JitterAusgabe::Inaktiv
                } else {
                    self.statistik.verdeckt += 1;
                    JitterAusgabe::Verdeckung
                }
            }
        };

        self.statistik.fuellstand = self.pakete.len();
        ausgabe
    }

    /// Verwirft alle gepufferten Pakete
    pub fn leeren(&mut self) {
        self.pakete.clear();
        self.anfang = None;
        self.zustand = Zustand::Inaktiv;
        self.statistik.fuellstand = 0;
    }

    /// Spielt gerade ein Segment (inkl. Vorpuffern)?
    pub fn ist_aktiv(&self) -> bool {
        self.zustand != Zustand::Inaktiv
    }

    pub fn statistik(&self) -> &JitterBufferStatistik {
        &self.statistik
    }

    pub fn fuellstand(&self) -> usize {
        self.pakete.len()
    }

    pub fn ziel_tiefe(&self) -> usize {
        self.ziel_tiefe
    }

    /// Geschaetzter Jitter (Standardabweichung) in ms
    pub fn jitter_ms(&self) -> f64 {
        self.jitter_varianz.max(0.0).sqrt()
    }

    // -----------------------------------------------------------------------
    // Interne Hilfsfunktionen
    // -----------------------------------------------------------------------

    fn segment_timeout(&self) -> Duration {
        Duration::from_millis(self.config.segment_timeout_ms)
    }

    /// Bezugspunkt fuer neue Sequenznummern: Segmentanfang beim
    /// Vorpuffern, sonst der Cursor
    fn bezug(&self) -> Option<i64> {
        self.anfang.or(self.cursor)
    }

    /// Abstand von `seq` zum hoechsten gepufferten Paket
    fn spanne_bis(&self, seq: i64) -> i64 {
        self.pakete
            .keys()
            .next_back()
            .map_or(0, |hoechstes| hoechstes - seq)
    }

    fn segment_beginnen(&mut self, seq: i64) {
        self.pakete.clear();
        self.anfang = Some(seq);
        self.zustand = Zustand::Puffern;
        self.verdeckt_in_folge = 0;
        self.anker = None;
        self.statistik.segmente += 1;
    }

    /// Legt den Cursor auf das frueheste gepufferte Paket
    fn abspielen_beginnen(&mut self) {
        let erstes = self.pakete.keys().next().copied();
        if let Some(start) = erstes.or(self.anfang) {
            self.cursor = Some(start);
        }
        self.anfang = None;
        self.zustand = Zustand::Abspielen;
    }

    fn segment_beenden(&mut self) {
        // Cursor bleibt stehen, damit Nachzuegler als verspaetet erkannt werden
        self.pakete.clear();
        self.anfang = None;
        self.zustand = Zustand::Inaktiv;
        self.verdeckt_in_folge = 0;
    }

    /// Schiebt den Cursor vor, wenn `seq` ausserhalb des Fensters liegt
    fn fenster_nachziehen(&mut self, seq: i64) {
        let Some(cursor) = self.bezug() else {
            return;
        };
        let kapazitaet = self.config.kapazitaet as i64;
        if seq < cursor + kapazitaet {
            return;
        }
        let neuer_cursor = seq - kapazitaet + 1;
        self.pakete = self.pakete.split_off(&neuer_cursor);
        self.statistik.verloren += (neuer_cursor - cursor) as u64;
        if self.anfang.is_some() {
            self.anfang = Some(neuer_cursor);
        } else {
            self.cursor = Some(neuer_cursor);
        }
        tracing::debug!(
            alter_cursor = cursor,
            neuer_cursor,
            "Fenster ueberschritten, Cursor vorgezogen"
        );
    }

    /// Abweichung der Ankunftszeit von der erwarteten Zeit (EWMA von
    /// Mittelwert und Varianz)
    fn jitter_messen(&mut self, seq: i64, jetzt: Instant) {
        let Some((anker_seq, anker_zeit)) = self.anker else {
            self.anker = Some((seq, jetzt));
            return;
        };

        let erwartet_ms = (seq - anker_seq) as f64 * FRAME_DAUER_MS as f64;
        let tatsaechlich_ms = if jetzt >= anker_zeit {
            (jetzt - anker_zeit).as_secs_f64() * 1000.0
        } else {
            -((anker_zeit - jetzt).as_secs_f64() * 1000.0)
        };
        let abweichung = tatsaechlich_ms - erwartet_ms;

        let delta = abweichung - self.jitter_mittel;
        self.jitter_mittel += JITTER_GLAETTUNG * delta;
        self.jitter_varianz += JITTER_GLAETTUNG * (delta * delta - self.jitter_varianz);
        self.statistik.jitter_ms = self.jitter_ms();
    }

    fn ziel_tiefe_anpassen(&mut self) {
        let frames = (self.jitter_ms() * self.config.jitter_faktor / FRAME_DAUER_MS as f64).ceil();
        let ziel = self.config.min_tiefe + frames.max(0.0) as usize;
        let ziel = ziel.clamp(self.config.min_tiefe, self.config.max_tiefe);
        if ziel != self.ziel_tiefe {
            tracing::debug!(
                alt = self.ziel_tiefe,
                neu = ziel,
                jitter_ms = self.jitter_ms(),
                "Zieltiefe angepasst"
            );
            self.ziel_tiefe = ziel;
        }
        self.statistik.ziel_tiefe = ziel;
    }
}

/// Erweitert eine modulare Sequenznummer relativ zu `referenz`
///
/// Abstaende ueber 2^31 zaehlen als rueckwaerts.
fn erweitern(seq: u32, referenz: i64) -> i64 {
    let differenz = seq.wrapping_sub(referenz as u32) as i32;
    referenz + differenz as i64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
