//! Source audio buffers and non-owning result views

/// Caller-supplied audio buffer consumed by the pipeline.
///
/// Exposes a sample count, mono PCM, optional interleaved stereo PCM, and
/// a capture-offset timestamp. A source without mono PCM is a fatal input
/// error; stereo, when present, holds exactly `2 * sample_count()`
/// interleaved samples.
pub trait SourceBuffer {
    fn sample_count(&self) -> usize;
    fn pcm_mono(&self) -> Option<&[f32]>;
    fn pcm_stereo(&self) -> Option<&[f32]>;
    /// Capture offset of the first sample.
    fn time_offset(&self) -> i64;
}

/// Owned captured audio implementing [`SourceBuffer`].
#[derive(Debug, Clone, Default)]
pub struct CapturedAudio {
    mono: Vec<f32>,
    stereo: Option<Vec<f32>>,
    time_offset: i64,
}

impl CapturedAudio {
    pub fn mono(samples: Vec<f32>, time_offset: i64) -> Self {
        Self {
            mono: samples,
            stereo: None,
            time_offset,
        }
    }

    /// Build from interleaved stereo; the mono track is the per-sample
    /// mean of both channels. An odd trailing sample is dropped.
    pub fn stereo(interleaved: Vec<f32>, time_offset: i64) -> Self {
        let mono: Vec<f32> = interleaved
            .chunks_exact(2)
            .map(|pair| 0.5 * (pair[0] + pair[1]))
            .collect();
        let mut stereo = interleaved;
        stereo.truncate(mono.len() * 2);
        Self {
            mono,
            stereo: Some(stereo),
            time_offset,
        }
    }
}

impl SourceBuffer for CapturedAudio {
    fn sample_count(&self) -> usize {
        self.mono.len()
    }

    fn pcm_mono(&self) -> Option<&[f32]> {
        Some(&self.mono)
    }

    fn pcm_stereo(&self) -> Option<&[f32]> {
        self.stereo.as_deref()
    }

    fn time_offset(&self) -> i64 {
        self.time_offset
    }
}

/// Non-owning, read-only view of a processed buffer pair.
///
/// Borrows the owning [`Preprocessor`](crate::preprocess::Preprocessor)'s
/// buffers; the borrow checker invalidates it when the owner is mutated or
/// dropped.
#[derive(Debug, Clone, Copy)]
pub struct BufferView<'a> {
    mono: &'a [f32],
    stereo: Option<&'a [f32]>,
    time_offset: i64,
}

impl<'a> BufferView<'a> {
    pub(crate) fn new(mono: &'a [f32], stereo: Option<&'a [f32]>, time_offset: i64) -> Self {
        Self {
            mono,
            stereo,
            time_offset,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.mono.len()
    }

    pub fn pcm_mono(&self) -> &'a [f32] {
        self.mono
    }

    /// Interleaved stereo samples, when the source carried them.
    pub fn pcm_stereo(&self) -> Option<&'a [f32]> {
        self.stereo
    }

    pub fn time_offset(&self) -> i64 {
        self.time_offset
    }
}
