//! Preprocessing orchestration
//!
//! Owns the original and cleaned sample buffers and runs the cleaning
//! stages in order: copy the source, denoise the working copy per channel
//! through the 16 kHz / 48 kHz bridge, downmix stereo, then gate by the
//! voice-activity mask. Results are exposed as borrowed views; the
//! original view never carries stereo even when the source did.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::buffer::{BufferView, SourceBuffer};
use crate::denoise::{DenoiserBank, DenoiserFactory, RnnoiseFactory};
use crate::error::CleanError;
use crate::resample::{round_up, NATIVE_FRAME};
use crate::vad::{speech_mask, EnergyClassifier, SpeechClassifier, NON_SPEECH_ATTENUATION};

/// Options controlling the preprocessing stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessOptions {
    /// Enable neural denoising of the working copy
    pub denoise_enabled: bool,
    /// Enable voice-activity gating
    pub gate_enabled: bool,
    /// Attenuation applied to non-speech frames (0-1)
    pub gate_attenuation: f32,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            denoise_enabled: true,
            gate_enabled: true,
            gate_attenuation: NON_SPEECH_ATTENUATION,
        }
    }
}

/// One-shot speech preprocessor.
///
/// Each [`initialize`](Self::initialize) call is self-contained: it creates
/// fresh denoiser sessions, resets the speech classifier, and rebuilds both
/// output buffers. On failure no usable views remain. Synchronous and
/// single-threaded; independent instances share no state.
pub struct Preprocessor {
    factory: Box<dyn DenoiserFactory>,
    classifier: Box<dyn SpeechClassifier>,
    options: PreprocessOptions,
    original_mono: Vec<f32>,
    cleaned_mono: Vec<f32>,
    /// Interleaved; empty when the source was mono.
    cleaned_stereo: Vec<f32>,
    time_offset: i64,
}

impl Preprocessor {
    /// Preprocessor with the default backends: RNNoise denoising and the
    /// energy-based speech classifier.
    pub fn new() -> Self {
        Self::with_backends(
            Box::new(RnnoiseFactory),
            Box::new(EnergyClassifier::default()),
            PreprocessOptions::default(),
        )
    }

    /// Preprocessor with caller-supplied backends.
    pub fn with_backends(
        factory: Box<dyn DenoiserFactory>,
        classifier: Box<dyn SpeechClassifier>,
        options: PreprocessOptions,
    ) -> Self {
        Self {
            factory,
            classifier,
            options,
            original_mono: Vec::new(),
            cleaned_mono: Vec::new(),
            cleaned_stereo: Vec::new(),
            time_offset: 0,
        }
    }

    /// Run the full pipeline over `source`.
    ///
    /// On success [`cleaned_buffer`](Self::cleaned_buffer) and
    /// [`original_buffer`](Self::original_buffer) expose the results until
    /// the next call. On failure both are emptied.
    pub fn initialize(&mut self, source: &dyn SourceBuffer) -> Result<(), CleanError> {
        if let Err(err) = self.run(source) {
            self.original_mono.clear();
            self.cleaned_mono.clear();
            self.cleaned_stereo.clear();
            return Err(err);
        }
        Ok(())
    }

    fn run(&mut self, source: &dyn SourceBuffer) -> Result<(), CleanError> {
        if source.sample_count() == 0 {
            return Err(CleanError::EmptyInput);
        }
        let mono = source.pcm_mono().ok_or(CleanError::MissingMonoPcm)?;
        if mono.is_empty() {
            return Err(CleanError::EmptyInput);
        }
        let count = mono.len();

        copy_into(&mut self.original_mono, mono)?;
        copy_into(&mut self.cleaned_mono, mono)?;

        let has_stereo = match source.pcm_stereo() {
            Some(stereo) => {
                if stereo.len() != count * 2 {
                    return Err(CleanError::ChannelLengthMismatch {
                        expected: count * 2,
                        actual: stereo.len(),
                    });
                }
                copy_into(&mut self.cleaned_stereo, stereo)?;
                true
            }
            None => {
                self.cleaned_stereo.clear();
                false
            }
        };
        self.time_offset = source.time_offset();
        debug!(
            "preprocess: {} samples, stereo={}, t={}",
            count, has_stereo, self.time_offset
        );

        if self.options.denoise_enabled {
            self.denoise(count, has_stereo)?;
        } else if has_stereo {
            // Gate decisions are made on the channel mean even when the
            // denoise stage is skipped; the source's own mono track may
            // not be that mean.
            for i in 0..count {
                self.cleaned_mono[i] =
                    0.5 * (self.cleaned_stereo[i * 2] + self.cleaned_stereo[i * 2 + 1]);
            }
        }

        if self.options.gate_enabled {
            let attenuation = self.options.gate_attenuation;
            let mask = speech_mask(&mut *self.classifier, &self.cleaned_mono, attenuation);
            for (sample, weight) in self.cleaned_mono.iter_mut().zip(&mask) {
                *sample *= weight;
            }
            if has_stereo {
                // Same per-frame weight on both channels: the activity
                // decision is made on the downmix, not per channel.
                for (i, weight) in mask.iter().enumerate() {
                    self.cleaned_stereo[i * 2] *= weight;
                    self.cleaned_stereo[i * 2 + 1] *= weight;
                }
            }
        }
        Ok(())
    }

    /// Denoise the working copy in place through fresh per-channel sessions.
    fn denoise(&mut self, count: usize, has_stereo: bool) -> Result<(), CleanError> {
        let padded = round_up(count, NATIVE_FRAME);
        let channels = if has_stereo { 2 } else { 1 };
        let mut bank = DenoiserBank::new(channels, &*self.factory)?;
        debug!(
            "neural denoise: {} samples padded to {}, {} channel(s)",
            count, padded, channels
        );

        if has_stereo {
            let mut left = alloc_zeroed(padded)?;
            let mut right = alloc_zeroed(padded)?;
            for i in 0..count {
                left[i] = self.cleaned_stereo[i * 2];
                right[i] = self.cleaned_stereo[i * 2 + 1];
            }
            bank.process_planar(&mut [&mut left, &mut right])?;
            for i in 0..count {
                let l = left[i];
                let r = right[i];
                self.cleaned_stereo[i * 2] = l;
                self.cleaned_stereo[i * 2 + 1] = r;
                self.cleaned_mono[i] = 0.5 * (l + r);
            }
        } else {
            let mut padded_mono = alloc_zeroed(padded)?;
            padded_mono[..count].copy_from_slice(&self.cleaned_mono);
            bank.process_planar(&mut [&mut padded_mono])?;
            self.cleaned_mono.copy_from_slice(&padded_mono[..count]);
        }
        Ok(())
    }

    /// Denoised, gated audio: mono plus stereo when the source had it.
    pub fn cleaned_buffer(&self) -> BufferView<'_> {
        let stereo = if self.cleaned_stereo.is_empty() {
            None
        } else {
            Some(self.cleaned_stereo.as_slice())
        };
        BufferView::new(&self.cleaned_mono, stereo, self.time_offset)
    }

    /// Untouched copy of the source mono track. Never carries stereo.
    pub fn original_buffer(&self) -> BufferView<'_> {
        BufferView::new(&self.original_mono, None, self.time_offset)
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

fn copy_into(dst: &mut Vec<f32>, src: &[f32]) -> Result<(), CleanError> {
    dst.clear();
    dst.try_reserve(src.len())
        .map_err(|_| CleanError::Allocation(src.len()))?;
    dst.extend_from_slice(src);
    Ok(())
}

fn alloc_zeroed(len: usize) -> Result<Vec<f32>, CleanError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| CleanError::Allocation(len))?;
    buf.resize(len, 0.0);
    Ok(buf)
}
