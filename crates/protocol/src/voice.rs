//! Voice-Protokoll (UDP)
//!
//! Binaeres, versioniertes Wire-Format fuer Voice- und Control-Frames.
//! Nach einem festen Vorspann folgen feldmarkierte Eintraege
//! (Tag-Laenge-Wert), damit unbekannte Felder neuerer Sender
//! uebersprungen werden koennen.
//!
//! ## Paketformat
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       2   Kennung "SB"
//!  2       1   Version
//!  3       1   Frame-Typ (1 = Voice, 2 = Keepalive)
//!  4+      N   Felder: Tag (u8) | Laenge (u16 BE) | Wert
//! ```
//!
//! ## Felder
//!
//! ```text
//! Tag   Feld          Wert
//! ----  ------------  ----
//! 0x01  Rufzeichen    UTF-8 (ASCII), 1..32 Bytes
//! 0x02  Sequenz       u32 BE
//! 0x03  Frequenz      u32 BE Hz + f32 BE Signalverhaeltnis (wiederholbar)
//! 0x04  Nutzdaten     Codec-Bytes, max. 1280
//! 0x05  Marker        u8 Bits (0x01 Start, 0x02 Ende)
//! 0x06  Zeitstempel   u64 BE, Millisekunden seit Epoch
//! 0x07  Codec         u8 (siehe `CodecArt::wire_id`)
//! ```
//!
//! Tags ab 0x80 muessen verstanden werden: ein unbekanntes Feld in
//! diesem Bereich macht das Paket ungueltig. Unbekannte Tags darunter
//! werden ignoriert.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use skyband_core::{Callsign, FrequencyHz, SkybandError};
use thiserror::Error;

use crate::codec::CodecArt;

/// Aktuelle Protokollversion
pub const PROTOKOLL_VERSION: u8 = 1;

/// Kennung am Paketanfang
pub const KENNUNG: [u8; 2] = *b"SB";

/// Groesse des festen Vorspanns (Kennung + Version + Frame-Typ)
pub const VORSPANN_GROESSE: usize = 4;

/// Groesse eines Feld-Kopfes (Tag + Laenge)
const FELD_KOPF_GROESSE: usize = 3;

/// Maximale Nutzdaten-Laenge (1280 Bytes, typisches MTU-Limit)
pub const MAX_NUTZDATEN_LAENGE: usize = 1280;

/// Maximale Anzahl Zielfrequenzen pro Paket
pub const MAX_FREQUENZEN: usize = 16;

/// Ab diesem Tag muss ein Feld verstanden werden
const PFLICHT_TAG_BEREICH: u8 = 0x80;

mod tag {
    pub const CALLSIGN: u8 = 0x01;
    pub const SEQUENZ: u8 = 0x02;
    pub const FREQUENZ: u8 = 0x03;
    pub const NUTZDATEN: u8 = 0x04;
    pub const MARKER: u8 = 0x05;
    pub const ZEITSTEMPEL: u8 = 0x06;
    pub const CODEC: u8 = 0x07;
}

mod frame_typ {
    pub const VOICE: u8 = 1;
    pub const KEEPALIVE: u8 = 2;
}

/// Bit-Masken fuer das Marker-Feld
pub struct MarkerFlags;

impl MarkerFlags {
    /// Erster Frame einer Uebertragung
    pub const START: u8 = 0x01;
    /// Letzter Frame einer Uebertragung
    pub const ENDE: u8 = 0x02;
}

// ---------------------------------------------------------------------------
// ParseError / SerializeError
// ---------------------------------------------------------------------------

/// Fehler beim Lesen eines Frames
///
/// Der Aufrufer verwirft das Paket und macht weiter; ein einzelnes
/// fehlerhaftes Paket beendet nie die Sitzung.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Paket abgeschnitten: {benoetigt} Bytes benoetigt, {vorhanden} vorhanden")]
    Abgeschnitten { benoetigt: usize, vorhanden: usize },

    #[error("Ungueltige Paketkennung")]
    FalscheKennung,

    #[error("Protokollversion nicht unterstuetzt: erwartet={erwartet}, erhalten={erhalten}")]
    Version { erwartet: u8, erhalten: u8 },

    #[error("Unbekannter Frame-Typ: {0}")]
    UnbekannterFrameTyp(u8),

    #[error("Unbekanntes Pflichtfeld: Tag 0x{0:02x}")]
    UnbekanntesPflichtfeld(u8),

    #[error("Pflichtfeld fehlt: {0}")]
    FehlendesFeld(&'static str),

    #[error("Feld mehrfach vorhanden: {0}")]
    DoppeltesFeld(&'static str),

    #[error("Ungueltiges Feld {feld}: {grund}")]
    UngueltigesFeld { feld: &'static str, grund: String },

    #[error("Kein Voice-Frame")]
    KeinVoiceFrame,
}

/// Paket kann nicht geschrieben werden, ohne beim Empfaenger abgelehnt
/// oder verstuemmelt zu werden
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SerializeError {
    #[error("Paket ohne Zielfrequenz")]
    KeineFrequenz,

    #[error("{0} Zielfrequenzen (Maximum {MAX_FREQUENZEN})")]
    ZuVieleFrequenzen(usize),

    #[error("Ungueltige Zielfrequenz {0}")]
    UngueltigeFrequenz(FrequencyHz),

    #[error("Ungueltiges Signalverhaeltnis {signal} auf {frequenz}")]
    UngueltigesSignal { frequenz: FrequencyHz, signal: f32 },

    #[error("Nutzdaten mit {0} Bytes (Maximum {MAX_NUTZDATEN_LAENGE})")]
    NutzdatenZuGross(usize),

    #[error("Feld 0x{tag:02x} mit {laenge} Bytes passt nicht in das Laengenfeld")]
    FeldZuLang { tag: u8, laenge: usize },
}

impl From<SerializeError> for SkybandError {
    fn from(e: SerializeError) -> Self {
        SkybandError::MalformedPacket(e.to_string())
    }
}

impl From<ParseError> for SkybandError {
    fn from(e: ParseError) -> Self {
        SkybandError::MalformedPacket(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Datentypen
// ---------------------------------------------------------------------------

/// Zielfrequenz eines Pakets mit Empfangsstaerke
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zielfrequenz {
    /// Frequenz, auf der gesendet wird
    pub frequenz: FrequencyHz,
    /// Verhaeltnis Reichweite/Distanz (1.0 = voller Empfang, kleiner = schwaecher)
    pub signal: f32,
}

impl Zielfrequenz {
    /// Zielfrequenz mit vollem Empfang
    pub fn voll(frequenz: FrequencyHz) -> Self {
        Self {
            frequenz,
            signal: 1.0,
        }
    }
}

/// Voice-Paket eines Senders
#[derive(Debug, Clone, PartialEq)]
pub struct VoicePacket {
    /// Rufzeichen des Senders
    pub callsign: Callsign,
    /// Pro Sender streng monoton steigend (ausser bei Sitzungs-Neustart)
    pub sequence: u32,
    /// Alle Frequenzen, auf denen der Sender gerade sendet (mind. eine)
    pub frequenzen: Vec<Zielfrequenz>,
    /// Codec-Nutzdaten (max. `MAX_NUTZDATEN_LAENGE` Bytes)
    pub payload: Bytes,
    /// Erster Frame einer Uebertragung
    pub start: bool,
    /// Letzter Frame einer Uebertragung
    pub ende: bool,
    /// Sendezeitpunkt in Millisekunden seit Epoch
    pub zeitstempel_ms: u64,
    /// Codec der Nutzdaten
    pub codec: CodecArt,
}

impl VoicePacket {
    /// Prueft ob das Paket auf der gegebenen Frequenz gesendet wird
    pub fn sendet_auf(&self, frequenz: FrequencyHz) -> bool {
        self.frequenzen.iter().any(|z| z.frequenz == frequenz)
    }
}

/// Keepalive eines Clients (haelt den Server-Eintrag und NAT-Bindungen offen)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keepalive {
    pub callsign: Callsign,
    pub zeitstempel_ms: u64,
}

/// Alle Frame-Arten des Wire-Formats
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Voice(VoicePacket),
    Keepalive(Keepalive),
}

// ---------------------------------------------------------------------------
// Serialisierung
// ---------------------------------------------------------------------------

/// Serialisiert ein Voice-Paket
///
/// Lehnt Pakete ab, die `parse` nicht wieder lesen koennte (keine oder zu
/// viele Frequenzen, zu grosse Nutzdaten, ungueltiges Signal).
pub fn serialize(paket: &VoicePacket) -> Result<Bytes, SerializeError> {
    paket_pruefen(paket)?;

    let mut buf = BytesMut::with_capacity(
        VORSPANN_GROESSE
            + 6 * FELD_KOPF_GROESSE
            + paket.callsign.as_str().len()
            + paket.frequenzen.len() * (FELD_KOPF_GROESSE + 8)
            + paket.payload.len()
            + 18,
    );
    vorspann_schreiben(&mut buf, frame_typ::VOICE);

    feld_schreiben(&mut buf, tag::CALLSIGN, paket.callsign.as_str().as_bytes())?;
    feld_schreiben(&mut buf, tag::SEQUENZ, &paket.sequence.to_be_bytes())?;
    for ziel in &paket.frequenzen {
        let mut wert = [0u8; 8];
        wert[..4].copy_from_slice(&ziel.frequenz.hz().to_be_bytes());
        wert[4..].copy_from_slice(&ziel.signal.to_be_bytes());
        feld_schreiben(&mut buf, tag::FREQUENZ, &wert)?;
    }
    feld_schreiben(&mut buf, tag::NUTZDATEN, &paket.payload)?;

    let mut marker = 0u8;
    if paket.start {
        marker |= MarkerFlags::START;
    }
    if paket.ende {
        marker |= MarkerFlags::ENDE;
    }
    if marker != 0 {
        feld_schreiben(&mut buf, tag::MARKER, &[marker])?;
    }

    feld_schreiben(&mut buf, tag::ZEITSTEMPEL, &paket.zeitstempel_ms.to_be_bytes())?;
    feld_schreiben(&mut buf, tag::CODEC, &[paket.codec.wire_id()])?;

    Ok(buf.freeze())
}

/// Serialisiert einen beliebigen Frame
pub fn serialize_frame(frame: &Frame) -> Result<Bytes, SerializeError> {
    match frame {
        Frame::Voice(paket) => serialize(paket),
        Frame::Keepalive(k) => {
            let mut buf = BytesMut::with_capacity(VORSPANN_GROESSE + 2 * FELD_KOPF_GROESSE + 40);
            vorspann_schreiben(&mut buf, frame_typ::KEEPALIVE);
            feld_schreiben(&mut buf, tag::CALLSIGN, k.callsign.as_str().as_bytes())?;
            feld_schreiben(&mut buf, tag::ZEITSTEMPEL, &k.zeitstempel_ms.to_be_bytes())?;
            Ok(buf.freeze())
        }
    }
}

/// Dieselben Grenzen, die `parse` beim Lesen durchsetzt
fn paket_pruefen(paket: &VoicePacket) -> Result<(), SerializeError> {
    match paket.frequenzen.len() {
        0 => return Err(SerializeError::KeineFrequenz),
        n if n > MAX_FREQUENZEN => return Err(SerializeError::ZuVieleFrequenzen(n)),
        _ => {}
    }
    for ziel in &paket.frequenzen {
        if ziel.frequenz.hz() == 0 {
            return Err(SerializeError::UngueltigeFrequenz(ziel.frequenz));
        }
        if !ziel.signal.is_finite() || ziel.signal <= 0.0 {
            return Err(SerializeError::UngueltigesSignal {
                frequenz: ziel.frequenz,
                signal: ziel.signal,
            });
        }
    }
    if paket.payload.len() > MAX_NUTZDATEN_LAENGE {
        return Err(SerializeError::NutzdatenZuGross(paket.payload.len()));
    }
    Ok(())
}

fn vorspann_schreiben(buf: &mut BytesMut, typ: u8) {
    buf.put_slice(&KENNUNG);
    buf.put_u8(PROTOKOLL_VERSION);
    buf.put_u8(typ);
}

fn feld_schreiben(buf: &mut BytesMut, tag: u8, wert: &[u8]) -> Result<(), SerializeError> {
    let laenge = u16::try_from(wert.len()).map_err(|_| SerializeError::FeldZuLang {
        tag,
        laenge: wert.len(),
    })?;
    buf.put_u8(tag);
    buf.put_u16(laenge);
    buf.put_slice(wert);
    Ok(())
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Liest ein Voice-Paket
///
/// # Fehler
/// - abgeschnittene Eingabe, falsche Kennung oder Version
/// - unbekanntes Pflichtfeld, fehlende oder ungueltige Felder
/// - Keepalive statt Voice-Frame
pub fn parse(daten: &[u8]) -> Result<VoicePacket, ParseError> {
    match parse_frame(daten)? {
        Frame::Voice(paket) => Ok(paket),
        Frame::Keepalive(_) => Err(ParseError::KeinVoiceFrame),
    }
}

/// Liest einen beliebigen Frame
pub fn parse_frame(daten: &[u8]) -> Result<Frame, ParseError> {
    let mut buf = daten;
    if buf.remaining() < VORSPANN_GROESSE {
        return Err(ParseError::Abgeschnitten {
            benoetigt: VORSPANN_GROESSE,
            vorhanden: buf.remaining(),
        });
    }
    if buf[..2] != KENNUNG {
        return Err(ParseError::FalscheKennung);
    }
    buf.advance(2);

    let version = buf.get_u8();
    if version != PROTOKOLL_VERSION {
        return Err(ParseError::Version {
            erwartet: PROTOKOLL_VERSION,
            erhalten: version,
        });
    }

    let typ = buf.get_u8();
    if typ != frame_typ::VOICE && typ != frame_typ::KEEPALIVE {
        return Err(ParseError::UnbekannterFrameTyp(typ));
    }

    let felder = felder_lesen(buf)?;

    match typ {
        frame_typ::VOICE => felder.voice_paket().map(Frame::Voice),
        _ => felder.keepalive().map(Frame::Keepalive),
    }
}

/// Zwischenstand beim Einlesen der Felder
#[derive(Default)]
struct Felder {
    callsign: Option<Callsign>,
    sequence: Option<u32>,
    frequenzen: Vec<Zielfrequenz>,
    payload: Option<Bytes>,
    marker: Option<u8>,
    zeitstempel_ms: Option<u64>,
    codec: Option<CodecArt>,
}

fn felder_lesen(mut buf: &[u8]) -> Result<Felder, ParseError> {
    let mut felder = Felder::default();

    while buf.has_remaining() {
        if buf.remaining() < FELD_KOPF_GROESSE {
            return Err(ParseError::Abgeschnitten {
                benoetigt: FELD_KOPF_GROESSE,
                vorhanden: buf.remaining(),
            });
        }
        let tag = buf.get_u8();
        let laenge = buf.get_u16() as usize;
        if buf.remaining() < laenge {
            return Err(ParseError::Abgeschnitten {
                benoetigt: laenge,
                vorhanden: buf.remaining(),
            });
        }
        let wert = &buf[..laenge];
        buf.advance(laenge);

        match tag {
            tag::CALLSIGN => {
                let text = std::str::from_utf8(wert).map_err(|e| ParseError::UngueltigesFeld {
                    feld: "callsign",
                    grund: e.to_string(),
                })?;
                let callsign =
                    Callsign::neu(text).map_err(|e| ParseError::UngueltigesFeld {
                        feld: "callsign",
                        grund: e.to_string(),
                    })?;
                einmal_setzen(&mut felder.callsign, callsign, "callsign")?;
            }
            tag::SEQUENZ => {
                let seq = u32::from_be_bytes(feste_laenge(wert, "sequence")?);
                einmal_setzen(&mut felder.sequence, seq, "sequence")?;
            }
            tag::FREQUENZ => {
                let roh: [u8; 8] = feste_laenge(wert, "frequenz")?;
                let hz = u32::from_be_bytes([roh[0], roh[1], roh[2], roh[3]]);
                let signal = f32::from_be_bytes([roh[4], roh[5], roh[6], roh[7]]);
                if hz == 0 {
                    return Err(ParseError::UngueltigesFeld {
                        feld: "frequenz",
                        grund: "0 Hz".into(),
                    });
                }
                if !signal.is_finite() || signal <= 0.0 {
                    return Err(ParseError::UngueltigesFeld {
                        feld: "frequenz",
                        grund: format!("Signalverhaeltnis {signal}"),
                    });
                }
                if felder.frequenzen.len() >= MAX_FREQUENZEN {
                    return Err(ParseError::UngueltigesFeld {
                        feld: "frequenz",
                        grund: format!("mehr als {MAX_FREQUENZEN} Frequenzen"),
                    });
                }
                felder.frequenzen.push(Zielfrequenz {
                    frequenz: FrequencyHz(hz),
                    signal,
                });
            }
            tag::NUTZDATEN => {
                if wert.len() > MAX_NUTZDATEN_LAENGE {
                    return Err(ParseError::UngueltigesFeld {
                        feld: "payload",
                        grund: format!(
                            "{} Bytes (Maximum {MAX_NUTZDATEN_LAENGE})",
                            wert.len()
                        ),
                    });
                }
                einmal_setzen(&mut felder.payload, Bytes::copy_from_slice(wert), "payload")?;
            }
            tag::MARKER => {
                let [bits] = feste_laenge::<1>(wert, "marker")?;
                einmal_setzen(&mut felder.marker, bits, "marker")?;
            }
            tag::ZEITSTEMPEL => {
                let ms = u64::from_be_bytes(feste_laenge(wert, "zeitstempel")?);
                einmal_setzen(&mut felder.zeitstempel_ms, ms, "zeitstempel")?;
            }
            tag::CODEC => {
                let [id] = feste_laenge::<1>(wert, "codec")?;
                let codec = CodecArt::from_wire_id(id).ok_or_else(|| {
                    ParseError::UngueltigesFeld {
                        feld: "codec",
                        grund: format!("unbekannte Codec-Kennung {id}"),
                    }
                })?;
                einmal_setzen(&mut felder.codec, codec, "codec")?;
            }
            unbekannt if unbekannt >= PFLICHT_TAG_BEREICH => {
                return Err(ParseError::UnbekanntesPflichtfeld(unbekannt));
            }
            // Optionales Feld einer neueren Version
            _ => {}
        }
    }

    Ok(felder)
}

impl Felder {
    fn voice_paket(self) -> Result<VoicePacket, ParseError> {
        if self.frequenzen.is_empty() {
            return Err(ParseError::FehlendesFeld("frequenz"));
        }
        let marker = self.marker.unwrap_or(0);
        Ok(VoicePacket {
            callsign: self.callsign.ok_or(ParseError::FehlendesFeld("callsign"))?,
            sequence: self.sequence.ok_or(ParseError::FehlendesFeld("sequence"))?,
            frequenzen: self.frequenzen,
            payload: self.payload.ok_or(ParseError::FehlendesFeld("payload"))?,
            start: marker & MarkerFlags::START != 0,
            ende: marker & MarkerFlags::ENDE != 0,
            zeitstempel_ms: self
                .zeitstempel_ms
                .ok_or(ParseError::FehlendesFeld("zeitstempel"))?,
            codec: self.codec.unwrap_or_default(),
        })
    }

    fn keepalive(self) -> Result<Keepalive, ParseError> {
        Ok(Keepalive {
            callsign: self.callsign.ok_or(ParseError::FehlendesFeld("callsign"))?,
            zeitstempel_ms: self
                .zeitstempel_ms
                .ok_or(ParseError::FehlendesFeld("zeitstempel"))?,
        })
    }
}

fn einmal_setzen<T>(ziel: &mut Option<T>, wert: T, feld: &'static str) -> Result<(), ParseError> {
    if ziel.is_some() {
        return Err(ParseError::DoppeltesFeld(feld));
    }
    *ziel = Some(wert);
    Ok(())
}

fn feste_laenge<const N: usize>(wert: &[u8], feld: &'static str) -> Result<[u8; N], ParseError> {
    wert.try_into().map_err(|_| ParseError::UngueltigesFeld {
        feld,
        grund: format!("Laenge {} statt {N}", wert.len()),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn make_paket(seq: u32) -> VoicePacket {
        VoicePacket {
            callsign: Callsign::neu("DLH4CK").unwrap(),
            sequence: seq,
            frequenzen: vec![Zielfrequenz::voll(FrequencyHz(118_300_000))],
            payload: Bytes::from(vec![0xAB; 60]),
            start: false,
            ende: false,
            zeitstempel_ms: 1_700_000_000_000,
            codec: CodecArt::Opus,
        }
    }

    #[test]
    fn voice_paket_roundtrip() {
        let mut paket = make_paket(42);
        paket.start = true;
        paket.frequenzen.push(Zielfrequenz {
            frequenz: FrequencyHz(121_500_000),
            signal: 0.4,
        });
        let bytes = serialize(&paket).unwrap();
        assert_eq!(&bytes[..2], b"SB");
        assert_eq!(parse(&bytes).unwrap(), paket);
    }

    #[test]
    fn keepalive_roundtrip() {
        let frame = Frame::Keepalive(Keepalive {
            callsign: Callsign::neu("EDDF_TWR").unwrap(),
            zeitstempel_ms: 5,
        });
        let bytes = serialize_frame(&frame).unwrap();
        assert_eq!(parse_frame(&bytes).unwrap(), frame);
        assert_eq!(parse(&bytes), Err(ParseError::KeinVoiceFrame));
    }

    #[test]
    fn abgeschnittenes_paket() {
        let bytes = serialize(&make_paket(1)).unwrap();
        for laenge in [0, 3, 10, bytes.len() - 1] {
            assert!(
                matches!(parse(&bytes[..laenge]), Err(ParseError::Abgeschnitten { .. })),
                "Laenge {laenge}"
            );
        }
    }

    #[test]
    fn falsche_version() {
        let mut bytes = serialize(&make_paket(1)).unwrap().to_vec();
        bytes[2] = 9;
        assert_eq!(
            parse(&bytes),
            Err(ParseError::Version {
                erwartet: PROTOKOLL_VERSION,
                erhalten: 9
            })
        );
    }

    #[test]
    fn falsche_kennung() {
        let mut bytes = serialize(&make_paket(1)).unwrap().to_vec();
        bytes[0] = b'X';
        assert_eq!(parse(&bytes), Err(ParseError::FalscheKennung));
    }

    #[test]
    fn unbekanntes_optionales_feld_wird_ignoriert() {
        let paket = make_paket(7);
        let mut bytes = serialize(&paket).unwrap().to_vec();
        // Feld 0x42 mit drei Bytes anhaengen
        bytes.extend_from_slice(&[0x42, 0x00, 0x03, 1, 2, 3]);
        assert_eq!(parse(&bytes).unwrap(), paket);
    }

    #[test]
    fn unbekanntes_pflichtfeld_wird_abgelehnt() {
        let mut bytes = serialize(&make_paket(7)).unwrap().to_vec();
        bytes.extend_from_slice(&[0x90, 0x00, 0x01, 0xFF]);
        assert_eq!(parse(&bytes), Err(ParseError::UnbekanntesPflichtfeld(0x90)));
    }

    /// Baut einen Voice-Frame aus rohen Feldern (auch solche, die
    /// `serialize` ablehnt)
    fn roh_frame(felder: &[(u8, Vec<u8>)]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        vorspann_schreiben(&mut buf, frame_typ::VOICE);
        for (tag, wert) in felder {
            feld_schreiben(&mut buf, *tag, wert).unwrap();
        }
        buf.to_vec()
    }

    fn pflichtfelder_ohne_frequenz() -> Vec<(u8, Vec<u8>)> {
        vec![
            (tag::CALLSIGN, b"DLH4CK".to_vec()),
            (tag::SEQUENZ, 1u32.to_be_bytes().to_vec()),
            (tag::NUTZDATEN, vec![0xAB; 60]),
            (tag::ZEITSTEMPEL, 0u64.to_be_bytes().to_vec()),
        ]
    }

    #[test]
    fn fehlende_frequenz() {
        let bytes = roh_frame(&pflichtfelder_ohne_frequenz());
        assert_eq!(parse(&bytes), Err(ParseError::FehlendesFeld("frequenz")));
    }

    #[test]
    fn doppelte_sequenz() {
        let mut bytes = serialize(&make_paket(1)).unwrap().to_vec();
        bytes.extend_from_slice(&[tag::SEQUENZ, 0x00, 0x04, 0, 0, 0, 2]);
        assert_eq!(parse(&bytes), Err(ParseError::DoppeltesFeld("sequence")));
    }

    #[test]
    fn zu_grosse_nutzdaten_werden_beim_lesen_abgelehnt() {
        let mut felder = pflichtfelder_ohne_frequenz();
        felder.push((tag::FREQUENZ, {
            let mut wert = 118_300_000u32.to_be_bytes().to_vec();
            wert.extend_from_slice(&1.0f32.to_be_bytes());
            wert
        }));
        felder[2].1 = vec![0u8; MAX_NUTZDATEN_LAENGE + 1];
        assert!(matches!(
            parse(&roh_frame(&felder)),
            Err(ParseError::UngueltigesFeld { feld: "payload", .. })
        ));
    }

    #[test]
    fn serialize_lehnt_unlesbare_pakete_ab() {
        let mut paket = make_paket(1);
        paket.frequenzen.clear();
        assert_eq!(serialize(&paket), Err(SerializeError::KeineFrequenz));

        let mut paket = make_paket(1);
        paket.frequenzen = (1..=MAX_FREQUENZEN as u32 + 1)
            .map(|i| Zielfrequenz::voll(FrequencyHz(118_000_000 + i * 25_000)))
            .collect();
        assert_eq!(
            serialize(&paket),
            Err(SerializeError::ZuVieleFrequenzen(MAX_FREQUENZEN + 1))
        );

        let mut paket = make_paket(1);
        paket.payload = Bytes::from(vec![0u8; MAX_NUTZDATEN_LAENGE + 1]);
        assert_eq!(
            serialize(&paket),
            Err(SerializeError::NutzdatenZuGross(MAX_NUTZDATEN_LAENGE + 1))
        );

        // Mehr als u16::MAX Bytes duerfen nicht mit abgeschnittener Laenge rausgehen
        let mut paket = make_paket(1);
        paket.payload = Bytes::from(vec![0u8; 70_000]);
        assert!(serialize(&paket).is_err());

        for signal in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let mut paket = make_paket(1);
            paket.frequenzen[0].signal = signal;
            assert!(
                matches!(serialize(&paket), Err(SerializeError::UngueltigesSignal { .. })),
                "Signal {signal}"
            );
        }

        let mut paket = make_paket(1);
        paket.frequenzen[0].frequenz = FrequencyHz(0);
        assert!(serialize(&paket).is_err());
    }

    #[test]
    fn feld_laenge_wird_nicht_abgeschnitten() {
        let mut buf = BytesMut::new();
        let zu_lang = vec![0u8; u16::MAX as usize + 1];
        assert_eq!(
            feld_schreiben(&mut buf, tag::NUTZDATEN, &zu_lang),
            Err(SerializeError::FeldZuLang {
                tag: tag::NUTZDATEN,
                laenge: u16::MAX as usize + 1
            })
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn ende_marker_mit_leeren_nutzdaten() {
        let mut paket = make_paket(9);
        paket.ende = true;
        paket.payload = Bytes::new();
        let geparst = parse(&serialize(&paket).unwrap()).unwrap();
        assert!(geparst.ende);
        assert!(!geparst.start);
        assert!(geparst.payload.is_empty());
    }

    #[test]
    fn parse_error_wird_malformed_packet() {
        let e: SkybandError = ParseError::FalscheKennung.into();
        assert!(matches!(e, SkybandError::MalformedPacket(_)));
        assert!(!e.ist_fatal());
    }

    fn callsign_strategie() -> impl Strategy<Value = Callsign> {
        "[A-Z0-9_]{1,12}".prop_map(|s| Callsign::neu(s).unwrap())
    }

    fn paket_strategie() -> impl Strategy<Value = VoicePacket> {
        (
            callsign_strategie(),
            any::<u32>(),
            prop::collection::vec((1u32..=u32::MAX, 0.001f32..10.0), 1..=MAX_FREQUENZEN),
            prop::collection::vec(any::<u8>(), 0..=MAX_NUTZDATEN_LAENGE),
            any::<bool>(),
            any::<bool>(),
            any::<u64>(),
            prop_oneof![Just(CodecArt::Opus), Just(CodecArt::Pcmu)],
        )
            .prop_map(
                |(callsign, sequence, freqs, payload, start, ende, zeitstempel_ms, codec)| {
                    VoicePacket {
                        callsign,
                        sequence,
                        frequenzen: freqs
                            .into_iter()
                            .map(|(hz, signal)| Zielfrequenz {
                                frequenz: FrequencyHz(hz),
                                signal,
                            })
                            .collect(),
                        payload: Bytes::from(payload),
                        start,
                        ende,
                        zeitstempel_ms,
                        codec,
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn parse_serialize_roundtrip(paket in paket_strategie()) {
            prop_assert_eq!(parse(&serialize(&paket).unwrap()).unwrap(), paket);
        }

        #[test]
        fn volle_grenzen_bleiben_lesbar(mut paket in paket_strategie()) {
            paket.frequenzen = (0..MAX_FREQUENZEN as u32)
                .map(|i| Zielfrequenz { frequenz: FrequencyHz(118_000_000 + i * 8_333), signal: 0.5 })
                .collect();
            paket.payload = Bytes::from(vec![0x5A; MAX_NUTZDATEN_LAENGE]);
            prop_assert_eq!(parse(&serialize(&paket).unwrap()).unwrap(), paket);
        }

        #[test]
        fn jenseits_der_grenzen_wird_nichts_geschrieben(
            mut paket in paket_strategie(),
            extra_freq in 1usize..8,
            extra_bytes in 1usize..4096,
        ) {
            let mut zu_viele = paket.clone();
            zu_viele.frequenzen = vec![Zielfrequenz::voll(FrequencyHz(121_500_000)); MAX_FREQUENZEN + extra_freq];
            prop_assert!(serialize(&zu_viele).is_err());

            paket.payload = Bytes::from(vec![0u8; MAX_NUTZDATEN_LAENGE + extra_bytes]);
            prop_assert!(serialize(&paket).is_err());
        }

        #[test]
        fn fehlerhafte_eingabe_bleibt_fehlerhaft(daten in prop::collection::vec(any::<u8>(), 0..256)) {
            // Zufaellige Bytes ohne Kennung sind nie gueltig, und jede Wiederholung
            // liefert denselben Fehler.
            prop_assume!(daten.len() < 2 || daten[..2] != KENNUNG);
            let erster = parse(&daten);
            prop_assert!(erster.is_err());
            for _ in 0..3 {
                prop_assert_eq!(parse(&daten), erster.clone());
            }
        }

        #[test]
        fn abgeschnittene_pakete_sind_deterministisch(paket in paket_strategie(), schnitt in 0usize..64) {
            let bytes = serialize(&paket).unwrap();
            let ende = bytes.len().saturating_sub(schnitt + 1);
            // Schnitte auf Feldgrenzen koennen gueltige Pakete ohne optionale
            // Felder ergeben; das Ergebnis muss aber stabil sein.
            let erster = parse(&bytes[..ende]);
            prop_assert_eq!(parse(&bytes[..ende]), erster);
        }
    }
}
