//! Speech preprocessing pipeline for transcription
//!
//! Takes one time-stamped PCM capture (mono, optionally interleaved
//! stereo) and produces two parallel views: the untouched original and a
//! cleaned version with background noise suppressed and non-speech
//! attenuated. Stages, in order:
//! 1. Copy the source into original and working buffers
//! 2. Neural denoising (RNNoise via nnnoiseless), per channel, bridged
//!    between the 16 kHz pipeline rate and the model's 48 kHz frames
//! 3. Stereo downmix of the denoised channels
//! 4. Voice-activity gating: per-frame attenuation mask from the downmix,
//!    applied to mono and both stereo channels
//!
//! ```no_run
//! use speech_scrubs::{CapturedAudio, Preprocessor};
//!
//! let capture = CapturedAudio::mono(vec![0.0; 16_000], 0);
//! let mut pre = Preprocessor::new();
//! pre.initialize(&capture)?;
//! let cleaned = pre.cleaned_buffer();
//! let original = pre.original_buffer();
//! # Ok::<(), speech_scrubs::CleanError>(())
//! ```
//!
//! The denoiser and the speech classifier are capability traits; the
//! defaults can be swapped for any conforming implementation, including
//! test stubs. One `initialize` call runs start to finish on the calling
//! thread; views borrow the preprocessor and expire at its next use.

pub mod buffer;
pub mod denoise;
pub mod error;
pub mod preprocess;
pub mod resample;
pub mod vad;

pub use buffer::{BufferView, CapturedAudio, SourceBuffer};
pub use denoise::{DenoiserBank, DenoiserFactory, DenoiserSession, RnnoiseFactory, RnnoiseSession};
pub use error::CleanError;
pub use preprocess::{PreprocessOptions, Preprocessor};
pub use vad::{speech_mask, EnergyClassifier, SpeechClassifier, NON_SPEECH_ATTENUATION};
