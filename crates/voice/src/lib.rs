//! skyband-voice – Voice-Engine des ATC-Clients
//!
//! Verbindet Audio-Bausteine und Wire-Format zu einer Funk-Sitzung.
//!
//! ## Module
//! - [`jitter_buffer`] – Adaptiver Jitter Buffer pro Sender
//! - [`remote_source`] – Entfernter Sender (Decoder, Jitter Buffer, VAD)
//! - [`mixer`] – Funkkanal-Mixer pro Frequenz (Effekte, Ueberlagerung)
//! - [`transmit`] – Sendeweg: VAD/PTT, Encoder, Paketierung
//! - [`receive`] – Empfangsweg: Quellen, Abonnements, Mischung
//! - [`transport`] – Datagramm-Transport (UDP)
//! - [`session`] – Sitzung: Netzwerk-Tasks und Audio-Takt
//! - [`telemetry`] – Atomare Zaehler fuer Metriken

pub mod jitter_buffer;
pub mod mixer;
pub mod receive;
pub mod remote_source;
pub mod session;
pub mod telemetry;
pub mod transmit;
pub mod transport;

pub use jitter_buffer::{AdaptiveJitterBuffer, JitterAusgabe, JitterBufferConfig, JitterBufferModus};
pub use mixer::{MischEingabe, MixerConfig, RadioChannelMixer, SquelchReihenfolge};
pub use receive::{AusgabeSenke, FrameSammlung, ReceiveConfig, ReceivePipeline};
pub use remote_source::{QuellenArena, QuellenId, RemoteSource};
pub use session::{AudioTakt, Befehl, SessionConfig, SessionHandle, VoiceSession};
pub use telemetry::{Telemetrie, TelemetrieSnapshot};
pub use transmit::{SendeZustand, TransmitPipeline};
pub use transport::{DatagramTransport, UdpTransport};
