//! skyband-audio – Audio-Bausteine der Voice-Engine
//!
//! Alles, was Samples anfasst, aber kein Netzwerk kennt:
//! - Codec-Adapter (Opus / G.711 mu-law) mit Packet Loss Concealment
//! - Resampling zwischen Codec-Rate und 48 kHz Mixer-Rate
//! - Voice Activity Detection und Push-to-Talk
//! - Funk-DSP: Biquad-Filter, Rauschen, Blockierton, Soft-Limiter
//! - Frame-Groessen-Adapter fuer Geraete-Callbacks
//! - Pegelmesser fuer das Mikrofon und Master-Ausgabe

pub mod adapter;
pub mod codec;
pub mod dsp;
pub mod error;
pub mod frame;
pub mod meter;
pub mod plc;
pub mod ptt;
pub mod resample;
pub mod volume;

// Bequeme Re-Exporte der wichtigsten Typen
pub use adapter::{
    capture_puffer, playback_puffer, CaptureEingang, FrameAusgabe, FrameSammler, PlaybackAusgang,
};
pub use codec::{CodecAdapter, CodecStatistik, DecodeQuelle};
pub use dsp::vad::VadConfig;
pub use dsp::AudioProcessor;
pub use error::{AudioError, AudioResult};
pub use frame::{AudioFrame, MIX_FRAME_SAMPLES, MIX_RATE};
pub use meter::PegelMesser;
pub use ptt::{PttController, PttMode};
pub use volume::AusgabeMixer;
