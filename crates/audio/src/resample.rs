//! Frame-Resampling zwischen Codec-Rate und Mixer-Rate
//!
//! Synchrones FFT-Resampling via rubato. Jeder Aufruf nimmt genau einen
//! 20ms-Frame der Quellrate und liefert genau einen 20ms-Frame der
//! Zielrate; die Verzoegerung des Resamplers wird anfangs mit Stille
//! aufgefuellt, damit der Takt nie reisst.

use audioadapter_buffers::direct::SequentialSliceOfVecs;
use rubato::{Fft, FixedSync, Resampler};
use skyband_protocol::codec::samples_pro_frame;

use crate::error::{AudioError, AudioResult};

/// Mono
const KANAELE: usize = 1;

/// Anzahl Sub-Chunks des FFT-Resamplers (1 = niedrigste Latenz)
const SUB_CHUNKS: usize = 1;

/// Resampler fuer eine feste Ratenpaarung
pub struct FrameResampler {
    von: u32,
    nach: u32,
    resampler: Fft<f32>,
    /// Angesammelte Eingabe (Quellrate)
    eingabe: Vec<f32>,
    /// Angesammelte Ausgabe (Zielrate)
    ausgabe: Vec<f32>,
    work_in: Vec<Vec<f32>>,
    work_out: Vec<Vec<f32>>,
}

impl FrameResampler {
    /// Erstellt einen Resampler `von` Hz -> `nach` Hz
    pub fn neu(von: u32, nach: u32) -> AudioResult<Self> {
        let resampler = Fft::<f32>::new(
            von as usize,
            nach as usize,
            samples_pro_frame(von),
            SUB_CHUNKS,
            KANAELE,
            FixedSync::Input,
        )
        .map_err(|e| AudioError::Resampling(format!("{von} -> {nach} Hz: {e}")))?;

        let input_frames_max = resampler.input_frames_max();
        let output_frames_max = resampler.output_frames_max();

        tracing::debug!(von, nach, "FrameResampler erstellt");

        Ok(Self {
            von,
            nach,
            resampler,
            eingabe: Vec::with_capacity(input_frames_max * 2),
            ausgabe: Vec::with_capacity(output_frames_max * 2),
            work_in: vec![vec![0.0; input_frames_max]],
            work_out: vec![vec![0.0; output_frames_max]],
        })
    }

    pub fn von(&self) -> u32 {
        self.von
    }

    pub fn nach(&self) -> u32 {
        self.nach
    }

    /// Resampelt einen Frame und liefert genau einen Frame der Zielrate
    pub fn verarbeiten(&mut self, samples: &[f32]) -> AudioResult<Vec<f32>> {
        self.eingabe.extend_from_slice(samples);

        while self.eingabe.len() >= self.resampler.input_frames_next() {
            let frames_needed = self.resampler.input_frames_next();
            self.work_in[0][..frames_needed].copy_from_slice(&self.eingabe[..frames_needed]);
            self.eingabe.drain(..frames_needed);

            let input_adapter =
                SequentialSliceOfVecs::new(&self.work_in[..], KANAELE, frames_needed)
                    .map_err(|e| AudioError::Resampling(e.to_string()))?;

            let output_frames = self.resampler.output_frames_next();
            let mut output_adapter =
                SequentialSliceOfVecs::new_mut(&mut self.work_out[..], KANAELE, output_frames)
                    .map_err(|e| AudioError::Resampling(e.to_string()))?;

            let (_, frames_written) = self
                .resampler
                .process_into_buffer(&input_adapter, &mut output_adapter, None)
                .map_err(|e| AudioError::Resampling(e.to_string()))?;

            self.ausgabe
                .extend_from_slice(&self.work_out[0][..frames_written]);
        }

        let ziel = samples_pro_frame(self.nach);
        let mut frame = Vec::with_capacity(ziel);
        if self.ausgabe.len() < ziel {
            // Anlaufverzoegerung: fehlender Anfang wird Stille
            frame.resize(ziel - self.ausgabe.len(), 0.0);
            frame.append(&mut self.ausgabe);
        } else {
            frame.extend(self.ausgabe.drain(..ziel));
        }

        // Ueberhang begrenzen, damit die Latenz nicht waechst
        if self.ausgabe.len() > ziel {
            let ueberschuss = self.ausgabe.len() - ziel;
            self.ausgabe.drain(..ueberschuss);
        }

        Ok(frame)
    }

    /// Verwirft angesammelte Samples (z.B. bei neuem Sprachsegment)
    pub fn reset(&mut self) {
        self.eingabe.clear();
        self.ausgabe.clear();
    }
}
