//! skyband-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert das binaere Wire-Format der Voice- und
//! Control-Frames sowie die Codec-Konfiguration, auf die sich Sender
//! und Empfaenger einigen. Reine Funktionen, kein I/O.

pub mod codec;
pub mod voice;

pub use codec::{CodecArt, CodecConfig, SampleRate};
pub use voice::{
    parse, parse_frame, serialize, serialize_frame, Frame, Keepalive, ParseError, SerializeError,
    VoicePacket, Zielfrequenz,
};
