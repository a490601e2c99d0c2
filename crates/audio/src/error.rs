//! Fehlertypen fuer die Audio-Bausteine

use skyband_core::SkybandError;
use thiserror::Error;

/// Alle moeglichen Fehler der Audio-Bausteine
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Codec-Fehler: {0}")]
    CodecFehler(String),

    #[error("Resampling-Fehler: {0}")]
    Resampling(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Frame-Laenge {erhalten} statt {erwartet} Samples")]
    FrameLaenge { erwartet: usize, erhalten: usize },

    #[error("Unerwarteter Fehler: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;

impl From<AudioError> for SkybandError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::Konfiguration(msg) => SkybandError::Konfiguration(msg),
            andere => SkybandError::Codec(andere.to_string()),
        }
    }
}
