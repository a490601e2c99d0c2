//! Entfernte Sender und ihre Arena
//!
//! Eine `RemoteSource` buendelt Jitter Buffer und Decoder eines Rufzeichens.
//! Alle Quellen einer Sitzung liegen in der `QuellenArena`; Frequenz-
//! Abonnements verweisen nur ueber `QuellenId`-Handles auf sie. Eine
//! entfernte Quelle macht alte Handles ungueltig (Generationszaehler).

use std::collections::HashMap;
use std::time::Instant;

use skyband_audio::{AudioFrame, CodecAdapter, DecodeQuelle, VadConfig, MIX_RATE};
use skyband_core::{Callsign, FrequencyHz, SkybandError};
use skyband_protocol::codec::{CodecArt, CodecConfig, SampleRate};
use skyband_protocol::{VoicePacket, Zielfrequenz};

use crate::jitter_buffer::{AdaptiveJitterBuffer, JitterAusgabe, JitterBufferConfig};

// ---------------------------------------------------------------------------
// QuellenTakt
// ---------------------------------------------------------------------------

/// Beitrag einer Quelle zu einem Wiedergabe-Takt
#[derive(Debug, Clone)]
pub struct QuellenTakt {
    /// Dekodierter oder verdeckter Frame (48 kHz)
    pub frame: AudioFrame,
    /// Frequenzen, auf denen die Quelle gerade sendet
    pub frequenzen: Vec<Zielfrequenz>,
    /// Erster hoerbarer Frame der Uebertragung
    pub anfang: bool,
    /// Letzter hoerbarer Frame der Uebertragung
    pub ende: bool,
    pub verdeckt: bool,
}

impl QuellenTakt {
    /// Signalverhaeltnis auf `frequenz`, falls die Quelle dort sendet
    pub fn signal_auf(&self, frequenz: FrequencyHz) -> Option<f32> {
        self.frequenzen
            .iter()
            .find(|z| z.frequenz == frequenz)
            .map(|z| z.signal)
    }
}

// ---------------------------------------------------------------------------
// RemoteSource
// ---------------------------------------------------------------------------

/// Ein Sprecher, der gerade verfolgt wird
pub struct RemoteSource {
    callsign: Callsign,
    jitter: AdaptiveJitterBuffer,
    /// Entsteht mit dem ersten abgespielten Paket, wechselt mit dem Codec des Senders
    codec: Option<CodecAdapter>,
    zuletzt_gehoert: Instant,
    frequenzen: Vec<Zielfrequenz>,
    /// Im letzten Takt hoerbar
    hoerbar: bool,
}

impl RemoteSource {
    pub fn neu(callsign: Callsign, jitter: JitterBufferConfig, jetzt: Instant) -> Self {
        tracing::debug!(callsign = %callsign, "Neue Quelle");
        Self {
            callsign,
            jitter: AdaptiveJitterBuffer::neu(jitter),
            codec: None,
            zuletzt_gehoert: jetzt,
            frequenzen: Vec::new(),
            hoerbar: false,
        }
    }

    pub fn callsign(&self) -> &Callsign {
        &self.callsign
    }

    pub fn zuletzt_gehoert(&self) -> Instant {
        self.zuletzt_gehoert
    }

    pub fn jitter(&self) -> &AdaptiveJitterBuffer {
        &self.jitter
    }

    /// Hoerbar im letzten Takt
    pub fn ist_hoerbar(&self) -> bool {
        self.hoerbar
    }

    /// Frequenzen des zuletzt abgespielten Pakets
    pub fn frequenzen(&self) -> &[Zielfrequenz] {
        &self.frequenzen
    }

    pub fn paket_empfangen(&mut self, paket: VoicePacket, jetzt: Instant) {
        self.zuletzt_gehoert = jetzt;
        self.jitter.push(paket, jetzt);
    }

    /// Ein Wiedergabe-Takt; `None` wenn die Quelle nichts beitraegt
    pub fn tick(&mut self, jetzt: Instant) -> Option<QuellenTakt> {
        match self.jitter.tick(jetzt) {
            JitterAusgabe::Frame(paket) => {
                let anfang = !self.hoerbar || paket.start;
                if anfang {
                    if let Some(codec) = self.codec.as_mut() {
                        codec.segment_zuruecksetzen();
                    }
                }
                self.frequenzen.clear();
                self.frequenzen.extend_from_slice(&paket.frequenzen);

                let frame = match self.decoder(paket.codec) {
                    Some(codec) => {
                        let roh = codec.decode(DecodeQuelle::Live(&paket.payload[..]));
                        codec.resample(&roh, MIX_RATE)
                    }
                    None => AudioFrame::stille(MIX_RATE),
                };
                self.hoerbar = !paket.ende;
                Some(self.takt(frame, anfang, paket.ende, false))
            }
            JitterAusgabe::Verdeckung => {
                let anfang = !self.hoerbar;
                let frame = match self.codec.as_mut() {
                    Some(codec) => {
                        let roh = codec.decode(DecodeQuelle::Verdeckung);
                        codec.resample(&roh, MIX_RATE)
                    }
                    None => AudioFrame::stille(MIX_RATE),
                };
                self.hoerbar = true;
                Some(self.takt(frame, anfang, false, true))
            }
            JitterAusgabe::Inaktiv if self.hoerbar => {
                // Ohne Ende-Marker verstummt: Squelch trotzdem schliessen
                self.hoerbar = false;
                Some(self.takt(AudioFrame::stille(MIX_RATE), false, true, true))
            }
            JitterAusgabe::Inaktiv => None,
        }
    }

    fn takt(&self, frame: AudioFrame, anfang: bool, ende: bool, verdeckt: bool) -> QuellenTakt {
        QuellenTakt {
            frame,
            frequenzen: self.frequenzen.clone(),
            anfang,
            ende,
            verdeckt,
        }
    }

    /// Decoder fuer `art`; wird neu erstellt, wenn der Sender den Codec wechselt
    fn decoder(&mut self, art: CodecArt) -> Option<&mut CodecAdapter> {
        let passt = self.codec.as_ref().is_some_and(|c| c.config().art == art);
        if !passt {
            let config = CodecConfig {
                art,
                sample_rate: SampleRate::Hz48000,
                ..CodecConfig::default()
            };
            // Squelch-Grenzen kommen aus den Paket-Markern, die VAD des Decoders bleibt ungenutzt
            match CodecAdapter::neu(config, VadConfig::default()) {
                Ok(codec) => self.codec = Some(codec),
                Err(e) => {
                    tracing::warn!(callsign = %self.callsign, fehler = %e, "Decoder nicht verfuegbar");
                    self.codec = None;
                }
            }
        }
        self.codec.as_mut()
    }
}

// ---------------------------------------------------------------------------
// QuellenArena
// ---------------------------------------------------------------------------

/// Handle auf eine Quelle in der Arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuellenId {
    index: u32,
    generation: u32,
}

struct Slot {
    generation: u32,
    quelle: Option<RemoteSource>,
}

/// Alle verfolgten Quellen einer Sitzung, begrenzt auf `max_quellen`
pub struct QuellenArena {
    slots: Vec<Slot>,
    frei: Vec<u32>,
    nach_callsign: HashMap<Callsign, QuellenId>,
    max_quellen: usize,
}

impl QuellenArena {
    pub fn neu(max_quellen: usize) -> Self {
        let max_quellen = max_quellen.max(1);
        Self {
            slots: Vec::with_capacity(max_quellen),
            frei: Vec::with_capacity(max_quellen),
            nach_callsign: HashMap::with_capacity(max_quellen),
            max_quellen,
        }
    }

    pub fn suchen(&self, callsign: &Callsign) -> Option<QuellenId> {
        self.nach_callsign.get(callsign).copied()
    }

    pub fn get(&self, id: QuellenId) -> Option<&RemoteSource> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.quelle.as_ref())
    }

    pub fn get_mut(&mut self, id: QuellenId) -> Option<&mut RemoteSource> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.quelle.as_mut())
    }

    /// Fuegt eine Quelle ein
    ///
    /// Ist die Arena voll, wird die am laengsten nicht gehoerte Quelle
    /// verdraengt und zurueckgegeben.
    pub fn einfuegen(&mut self, quelle: RemoteSource) -> (QuellenId, Option<RemoteSource>) {
        let verdraengt = if self.nach_callsign.len() >= self.max_quellen {
            self.aelteste().and_then(|id| self.entfernen(id))
        } else {
            None
        };
        if let Some(alt) = &verdraengt {
            let fehler = SkybandError::ResourceExhaustion(format!(
                "{} Quellen verfolgt, {} verdraengt",
                self.max_quellen,
                alt.callsign()
            ));
            tracing::warn!(fehler = %fehler, neu = %quelle.callsign(), "Quelle verdraengt");
        }

        let callsign = quelle.callsign().clone();
        let id = match self.frei.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.quelle = Some(quelle);
                QuellenId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    quelle: Some(quelle),
                });
                QuellenId {
                    index,
                    generation: 0,
                }
            }
        };
        self.nach_callsign.insert(callsign, id);
        (id, verdraengt)
    }

    /// Entfernt eine Quelle; das Handle wird ungueltig
    pub fn entfernen(&mut self, id: QuellenId) -> Option<RemoteSource> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)?;
        let quelle = slot.quelle.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.frei.push(id.index);
        self.nach_callsign.remove(quelle.callsign());
        Some(quelle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (QuellenId, &RemoteSource)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.quelle.as_ref().map(|q| {
                (
                    QuellenId {
                        index: i as u32,
                        generation: s.generation,
                    },
                    q,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (QuellenId, &mut RemoteSource)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| {
            let generation = s.generation;
            s.quelle.as_mut().map(|q| {
                (
                    QuellenId {
                        index: i as u32,
                        generation,
                    },
                    q,
                )
            })
        })
    }

    /// Entfernt alle Quellen; bestehende Handles werden ungueltig
    pub fn leeren(&mut self) -> usize {
        let ids: Vec<QuellenId> = self.iter().map(|(id, _)| id).collect();
        let anzahl = ids.len();
        for id in ids {
            self.entfernen(id);
        }
        anzahl
    }

    pub fn len(&self) -> usize {
        self.nach_callsign.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nach_callsign.is_empty()
    }

    pub fn max_quellen(&self) -> usize {
        self.max_quellen
    }

    fn aelteste(&self) -> Option<QuellenId> {
        self.iter()
            .min_by_key(|(_, q)| q.zuletzt_gehoert())
            .map(|(id, _)| id)
    }
}
