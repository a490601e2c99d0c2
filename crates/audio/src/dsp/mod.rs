//! DSP-Bausteine fuer Sende- und Empfangsweg
//!
//! Die Funk-Effekte (Bandpass, Rauschen, Knacken, Squelch, Blockierton)
//! sowie Limiter und VAD implementieren das `AudioProcessor` Trait, damit
//! der Mixer sie einheitlich in Reihe schalten kann.

pub mod biquad;
pub mod funkfilter;
pub mod limiter;
pub mod rauschen;
pub mod ton;
pub mod vad;

/// Gemeinsames Trait fuer alle Audio-Prozessoren
///
/// Prozessoren arbeiten in-place auf einem Frame und sind `Send`, damit
/// sie zusammen mit dem Mixer in den Audio-Thread verschoben werden koennen.
pub trait AudioProcessor: Send {
    /// Verarbeitet einen Puffer von Samples in-place
    fn process(&mut self, samples: &mut [f32]);

    /// Setzt den internen Zustand zurueck (Filter-Historie, Phasen)
    fn reset(&mut self);

    fn is_enabled(&self) -> bool;

    fn set_enabled(&mut self, enabled: bool);
}
