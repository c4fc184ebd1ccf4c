//! Voice activity gating
//!
//! Classifies fixed-size frames of the denoised mono signal as speech or
//! non-speech and produces a per-sample attenuation mask. The decision rule
//! is causal with bounded lookahead: a frame counts as clean speech only
//! once the classifier has confirmed speech activity through the end of
//! that frame. Ambiguous activity is biased toward suppression.

use crate::resample::round_up;

/// Attenuation applied to frames classified as non-speech.
pub const NON_SPEECH_ATTENUATION: f32 = 0.1;

/// External speech classifier over frame-aligned audio.
///
/// Stateful across `detect` calls within one preprocessing pass; `clear`
/// resets that state at the start of each pass.
pub trait SpeechClassifier {
    /// Fixed analysis window, in samples.
    fn frame_size(&self) -> usize;

    /// Reset internal state.
    fn clear(&mut self);

    /// Analyze `samples[..upto]` and return the largest sample index
    /// confirmed as speech so far. Must not read past `upto`.
    fn detect(&mut self, samples: &[f32], upto: usize) -> usize;
}

/// Compute the per-sample attenuation mask for `samples`.
///
/// Inputs shorter than the classifier's window get an all-1.0 mask (too
/// short to analyze reliably). Otherwise the buffer is zero-padded to a
/// multiple of the window and frames are classified in increasing order:
/// frame `k` keeps weight 1.0 only if the classifier's confirmed-speech
/// boundary reaches `(k + 1) * W`, and gets `attenuation` otherwise.
/// Padding samples are never written into the mask.
pub fn speech_mask(
    classifier: &mut dyn SpeechClassifier,
    samples: &[f32],
    attenuation: f32,
) -> Vec<f32> {
    let count = samples.len();
    let mut mask = vec![1.0f32; count];
    let window = classifier.frame_size();
    if window == 0 || count < window {
        return mask;
    }

    classifier.clear();

    let padded = round_up(count, window);
    let mut analysis = vec![0.0f32; padded];
    analysis[..count].copy_from_slice(samples);

    for frame in 0..padded / window {
        let upto = (frame + 1) * window;
        let last_speech = classifier.detect(&analysis, upto);
        let weight = if last_speech >= upto { 1.0 } else { attenuation };
        let start = frame * window;
        let end = upto.min(count);
        for m in &mut mask[start..end] {
            *m = weight;
        }
    }
    mask
}

/// Energy-based speech classifier.
///
/// Combines RMS energy with zero-crossing rate: speech carries energy
/// above the threshold with a moderate ZCR, while hiss and static push the
/// ZCR higher. The confirmed-speech boundary only ever moves forward
/// within one pass.
pub struct EnergyClassifier {
    frame_size: usize,
    energy_threshold: f32,
    zcr_threshold: f32,
    last_confirmed: usize,
    /// End of the last whole frame already analyzed; `detect` resumes here
    /// instead of rescanning from the start of the buffer.
    analyzed_upto: usize,
}

impl EnergyClassifier {
    /// Default analysis window: 32 ms at 16 kHz.
    pub const DEFAULT_FRAME_SIZE: usize = 512;

    pub fn new(frame_size: usize, energy_threshold: f32, zcr_threshold: f32) -> Self {
        Self {
            frame_size,
            energy_threshold,
            zcr_threshold,
            last_confirmed: 0,
            analyzed_upto: 0,
        }
    }
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        // Speech ZCR sits around 0.1-0.3; noise and static run higher.
        Self::new(Self::DEFAULT_FRAME_SIZE, 0.01, 0.4)
    }
}

impl SpeechClassifier for EnergyClassifier {
    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn clear(&mut self) {
        self.last_confirmed = 0;
        self.analyzed_upto = 0;
    }

    fn detect(&mut self, samples: &[f32], upto: usize) -> usize {
        let upto = upto.min(samples.len());
        let mut confirmed = self.last_confirmed;
        let mut pos = self.analyzed_upto;
        while pos + self.frame_size <= upto {
            let frame = &samples[pos..pos + self.frame_size];
            let rms = calculate_rms(frame);
            let zcr = calculate_zcr(frame);
            if rms > self.energy_threshold && zcr < self.zcr_threshold {
                confirmed = confirmed.max(pos + self.frame_size);
            }
            pos += self.frame_size;
        }
        self.analyzed_upto = pos;
        self.last_confirmed = confirmed;
        confirmed
    }
}

/// RMS energy of a frame.
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Zero-crossing rate of a frame.
fn calculate_zcr(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let mut crossings = 0;
    for i in 1..samples.len() {
        if (samples[i] >= 0.0) != (samples[i - 1] >= 0.0) {
            crossings += 1;
        }
    }
    crossings as f32 / (samples.len() - 1) as f32
}
