//! Denoiser session management
//!
//! The neural model is an opaque, stateful, per-channel session consuming
//! fixed 480-sample frames at 48 kHz. [`DenoiserBank`] owns one session per
//! audio channel and walks arbitrary frame-aligned buffers in 160-sample
//! blocks, bridging each block up to the model rate and back down in place.
//! Sessions carry recurrent model state, so blocks must reach a given
//! channel's session in strict temporal order.
//!
//! The default backend is RNNoise via `nnnoiseless`; any conforming
//! [`DenoiserSession`] implementation can be substituted.

use log::debug;
use nnnoiseless::DenoiseState;

use crate::error::CleanError;
use crate::resample::{
    downsample_average, upsample_hold, DENOISER_FRAME, NATIVE_FRAME, UPSAMPLE_FACTOR,
};

/// One stateful denoiser session for a single audio channel.
///
/// `frame` is always [`DENOISER_FRAME`] samples and is transformed in place.
/// Frames must arrive in strict temporal order; the session's hidden state
/// depends on everything it has seen.
pub trait DenoiserSession {
    fn process_frame(&mut self, frame: &mut [f32]) -> Result<(), CleanError>;
}

/// Creates fresh denoiser sessions, one per channel.
pub trait DenoiserFactory {
    fn create_session(&self) -> Result<Box<dyn DenoiserSession>, CleanError>;
}

/// RNNoise session backed by `nnnoiseless`.
pub struct RnnoiseSession {
    state: Box<DenoiseState<'static>>,
    out_buf: Vec<f32>,
}

impl RnnoiseSession {
    pub fn new() -> Self {
        Self {
            state: DenoiseState::new(),
            out_buf: vec![0.0; DENOISER_FRAME],
        }
    }
}

impl Default for RnnoiseSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DenoiserSession for RnnoiseSession {
    fn process_frame(&mut self, frame: &mut [f32]) -> Result<(), CleanError> {
        debug_assert_eq!(frame.len(), DENOISER_FRAME);
        self.state.process_frame(&mut self.out_buf, frame);
        frame.copy_from_slice(&self.out_buf);
        Ok(())
    }
}

/// Factory for [`RnnoiseSession`], the default backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct RnnoiseFactory;

impl DenoiserFactory for RnnoiseFactory {
    fn create_session(&self) -> Result<Box<dyn DenoiserSession>, CleanError> {
        Ok(Box::new(RnnoiseSession::new()))
    }
}

/// Per-channel denoiser sessions plus the scratch memory to drive them.
///
/// Scratch buffers grow to fit the largest request seen and are never
/// shrunk while the bank lives. Dropping the bank releases all sessions.
pub struct DenoiserBank {
    sessions: Vec<Box<dyn DenoiserSession>>,
    /// Upsampled-audio scratch, one [`DENOISER_FRAME`] region per channel.
    upsample_scratch: Vec<f32>,
    /// Per-channel planar scratch for the interleaved entry point.
    planar_scratch: Vec<f32>,
}

impl DenoiserBank {
    /// Create one session per channel. `channels` must be 1 or 2.
    ///
    /// If any session fails to allocate, the ones already created are
    /// released before the error is returned.
    pub fn new(channels: usize, factory: &dyn DenoiserFactory) -> Result<Self, CleanError> {
        if channels != 1 && channels != 2 {
            return Err(CleanError::InvalidChannelCount(channels));
        }
        let mut sessions = Vec::with_capacity(channels);
        for _ in 0..channels {
            sessions.push(factory.create_session()?);
        }
        debug!("denoiser bank ready: {} channel session(s)", channels);
        Ok(Self {
            sessions,
            upsample_scratch: Vec::new(),
            planar_scratch: Vec::new(),
        })
    }

    pub fn channels(&self) -> usize {
        self.sessions.len()
    }

    /// Grow the upsample scratch to fit `frame_len` samples per channel.
    /// Growth-only.
    fn ensure_upsample_scratch(&mut self, frame_len: usize) -> Result<(), CleanError> {
        let upsampled = frame_len * UPSAMPLE_FACTOR * self.sessions.len();
        grow(&mut self.upsample_scratch, upsampled)
    }

    /// Grow the planar scratch to fit `frame_len` samples per channel.
    /// Growth-only; only the interleaved entry point needs it.
    fn ensure_planar_scratch(&mut self, frame_len: usize) -> Result<(), CleanError> {
        let planar = frame_len * self.sessions.len();
        grow(&mut self.planar_scratch, planar)
    }

    /// Denoise per-channel planar buffers in place.
    ///
    /// Every channel must be the same length, a positive multiple of
    /// [`NATIVE_FRAME`]. Channels are processed independently, blocks in
    /// increasing order per channel.
    pub fn process_planar(&mut self, channels: &mut [&mut [f32]]) -> Result<(), CleanError> {
        if channels.len() != self.sessions.len() {
            return Err(CleanError::InvalidChannelCount(channels.len()));
        }
        let frame_len = channels[0].len();
        if frame_len == 0 || frame_len % NATIVE_FRAME != 0 {
            return Err(CleanError::MisalignedFrame(frame_len));
        }
        for channel in channels.iter() {
            if channel.len() != frame_len {
                return Err(CleanError::ChannelLengthMismatch {
                    expected: frame_len,
                    actual: channel.len(),
                });
            }
        }
        self.ensure_upsample_scratch(frame_len)?;

        let blocks = frame_len / NATIVE_FRAME;
        for block in 0..blocks {
            for (idx, channel) in channels.iter_mut().enumerate() {
                let samples = &mut channel[block * NATIVE_FRAME..(block + 1) * NATIVE_FRAME];
                let scratch =
                    &mut self.upsample_scratch[idx * DENOISER_FRAME..(idx + 1) * DENOISER_FRAME];
                upsample_hold(samples, scratch);
                self.sessions[idx].process_frame(scratch)?;
                downsample_average(scratch, samples);
            }
        }
        Ok(())
    }

    /// Denoise an interleaved buffer in place.
    ///
    /// De-interleaves into scratch, runs the planar path, re-interleaves.
    /// Results are bit-identical to calling [`Self::process_planar`] with
    /// equivalent per-channel buffers.
    pub fn process_interleaved(&mut self, pcm: &mut [f32]) -> Result<(), CleanError> {
        let channel_count = self.sessions.len();
        if pcm.is_empty() || pcm.len() % channel_count != 0 {
            return Err(CleanError::MisalignedFrame(pcm.len()));
        }
        let frame_len = pcm.len() / channel_count;
        if frame_len % NATIVE_FRAME != 0 {
            return Err(CleanError::MisalignedFrame(frame_len));
        }
        self.ensure_planar_scratch(frame_len)?;

        // The planar path only touches the upsample scratch, so taking the
        // planar buffer out for the duration of the delegation is free.
        let mut planar = std::mem::take(&mut self.planar_scratch);
        for i in 0..frame_len {
            for ch in 0..channel_count {
                planar[ch * frame_len + i] = pcm[i * channel_count + ch];
            }
        }

        let result = {
            let mut channels: Vec<&mut [f32]> =
                planar[..frame_len * channel_count].chunks_mut(frame_len).collect();
            self.process_planar(&mut channels)
        };

        if result.is_ok() {
            for i in 0..frame_len {
                for ch in 0..channel_count {
                    pcm[i * channel_count + ch] = planar[ch * frame_len + i];
                }
            }
        }
        self.planar_scratch = planar;
        result
    }
}

fn grow(buf: &mut Vec<f32>, len: usize) -> Result<(), CleanError> {
    if buf.len() >= len {
        return Ok(());
    }
    buf.try_reserve(len - buf.len())
        .map_err(|_| CleanError::Allocation(len))?;
    buf.resize(len, 0.0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Leaves every frame untouched.
    struct IdentitySession;

    impl DenoiserSession for IdentitySession {
        fn process_frame(&mut self, _frame: &mut [f32]) -> Result<(), CleanError> {
            Ok(())
        }
    }

    struct IdentityFactory;

    impl DenoiserFactory for IdentityFactory {
        fn create_session(&self) -> Result<Box<dyn DenoiserSession>, CleanError> {
            Ok(Box::new(IdentitySession))
        }
    }

    /// Halves every sample, deterministically.
    struct HalvingSession;

    impl DenoiserSession for HalvingSession {
        fn process_frame(&mut self, frame: &mut [f32]) -> Result<(), CleanError> {
            for s in frame.iter_mut() {
                *s *= 0.5;
            }
            Ok(())
        }
    }

    struct HalvingFactory;

    impl DenoiserFactory for HalvingFactory {
        fn create_session(&self) -> Result<Box<dyn DenoiserSession>, CleanError> {
            Ok(Box::new(HalvingSession))
        }
    }

    /// Records every frame it receives, per session.
    struct RecordingSession {
        frames: Rc<RefCell<Vec<Vec<f32>>>>,
    }

    impl DenoiserSession for RecordingSession {
        fn process_frame(&mut self, frame: &mut [f32]) -> Result<(), CleanError> {
            self.frames.borrow_mut().push(frame.to_vec());
            Ok(())
        }
    }

    struct RecordingFactory {
        logs: RefCell<Vec<Rc<RefCell<Vec<Vec<f32>>>>>>,
    }

    impl RecordingFactory {
        fn new() -> Self {
            Self {
                logs: RefCell::new(Vec::new()),
            }
        }
    }

    impl DenoiserFactory for RecordingFactory {
        fn create_session(&self) -> Result<Box<dyn DenoiserSession>, CleanError> {
            let frames = Rc::new(RefCell::new(Vec::new()));
            self.logs.borrow_mut().push(Rc::clone(&frames));
            Ok(Box::new(RecordingSession { frames }))
        }
    }

    /// Exactly representable under the hold/average bridge.
    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| (i % 8) as f32 * 0.25 - 0.5).collect()
    }

    #[test]
    fn rnnoise_frame_matches_bridge() {
        assert_eq!(DenoiseState::FRAME_SIZE, DENOISER_FRAME);
    }

    #[test]
    fn rejects_invalid_channel_counts() {
        assert!(matches!(
            DenoiserBank::new(0, &IdentityFactory),
            Err(CleanError::InvalidChannelCount(0))
        ));
        assert!(matches!(
            DenoiserBank::new(3, &IdentityFactory),
            Err(CleanError::InvalidChannelCount(3))
        ));
    }

    #[test]
    fn rejects_misaligned_frame_length() {
        let mut bank = DenoiserBank::new(1, &IdentityFactory).unwrap();
        let mut samples = vec![0.0f32; 100];
        assert!(matches!(
            bank.process_planar(&mut [&mut samples]),
            Err(CleanError::MisalignedFrame(100))
        ));
        let mut empty: Vec<f32> = Vec::new();
        assert!(matches!(
            bank.process_planar(&mut [&mut empty]),
            Err(CleanError::MisalignedFrame(0))
        ));
    }

    #[test]
    fn rejects_mismatched_channel_lengths() {
        let mut bank = DenoiserBank::new(2, &IdentityFactory).unwrap();
        let mut left = vec![0.0f32; 320];
        let mut right = vec![0.0f32; 160];
        assert!(matches!(
            bank.process_planar(&mut [&mut left, &mut right]),
            Err(CleanError::ChannelLengthMismatch {
                expected: 320,
                actual: 160
            })
        ));
    }

    #[test]
    fn identity_backend_preserves_input() {
        let mut bank = DenoiserBank::new(1, &IdentityFactory).unwrap();
        let original = ramp(NATIVE_FRAME * 3);
        let mut samples = original.clone();
        bank.process_planar(&mut [&mut samples]).unwrap();
        assert_eq!(samples, original);
    }

    #[test]
    fn identity_backend_keeps_silence_silent() {
        let mut bank = DenoiserBank::new(2, &IdentityFactory).unwrap();
        let mut left = vec![0.0f32; NATIVE_FRAME * 2];
        let mut right = vec![0.0f32; NATIVE_FRAME * 2];
        bank.process_planar(&mut [&mut left, &mut right]).unwrap();
        assert!(left.iter().chain(right.iter()).all(|&s| s == 0.0));
    }

    #[test]
    fn sessions_see_blocks_in_temporal_order() {
        let factory = RecordingFactory::new();
        let mut bank = DenoiserBank::new(2, &factory).unwrap();
        let left_in = ramp(NATIVE_FRAME * 4);
        let right_in: Vec<f32> = left_in.iter().map(|s| -s).collect();
        let mut left = left_in.clone();
        let mut right = right_in.clone();
        bank.process_planar(&mut [&mut left, &mut right]).unwrap();

        let logs = factory.logs.borrow();
        assert_eq!(logs.len(), 2);
        for (log, input) in logs.iter().zip([&left_in, &right_in]) {
            let frames = log.borrow();
            assert_eq!(frames.len(), 4);
            for (block, frame) in frames.iter().enumerate() {
                let mut expected = vec![0.0f32; DENOISER_FRAME];
                upsample_hold(
                    &input[block * NATIVE_FRAME..(block + 1) * NATIVE_FRAME],
                    &mut expected,
                );
                assert_eq!(frame, &expected, "channel frame {} out of order", block);
            }
        }
    }

    #[test]
    fn interleaved_matches_planar_bit_for_bit() {
        let frame_len = NATIVE_FRAME * 2;
        let left_in = ramp(frame_len);
        let right_in: Vec<f32> = left_in.iter().map(|s| s * 0.5).collect();

        let mut planar_bank = DenoiserBank::new(2, &HalvingFactory).unwrap();
        let mut left = left_in.clone();
        let mut right = right_in.clone();
        planar_bank.process_planar(&mut [&mut left, &mut right]).unwrap();

        let mut interleaved_bank = DenoiserBank::new(2, &HalvingFactory).unwrap();
        let mut interleaved: Vec<f32> = Vec::with_capacity(frame_len * 2);
        for i in 0..frame_len {
            interleaved.push(left_in[i]);
            interleaved.push(right_in[i]);
        }
        interleaved_bank.process_interleaved(&mut interleaved).unwrap();

        for i in 0..frame_len {
            assert_eq!(interleaved[i * 2], left[i]);
            assert_eq!(interleaved[i * 2 + 1], right[i]);
        }
    }

    /// Fails after a fixed number of successful creations; sessions report
    /// their release through a shared drop counter.
    struct FlakyFactory {
        allowed: RefCell<usize>,
        drops: Rc<std::cell::Cell<usize>>,
    }

    struct CountedSession {
        drops: Rc<std::cell::Cell<usize>>,
    }

    impl DenoiserSession for CountedSession {
        fn process_frame(&mut self, _frame: &mut [f32]) -> Result<(), CleanError> {
            Ok(())
        }
    }

    impl Drop for CountedSession {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    impl DenoiserFactory for FlakyFactory {
        fn create_session(&self) -> Result<Box<dyn DenoiserSession>, CleanError> {
            let mut allowed = self.allowed.borrow_mut();
            if *allowed == 0 {
                return Err(CleanError::SessionCreate);
            }
            *allowed -= 1;
            Ok(Box::new(CountedSession {
                drops: Rc::clone(&self.drops),
            }))
        }
    }

    #[test]
    fn failed_creation_releases_partial_sessions() {
        let drops = Rc::new(std::cell::Cell::new(0));
        let factory = FlakyFactory {
            allowed: RefCell::new(1),
            drops: Rc::clone(&drops),
        };
        assert!(matches!(
            DenoiserBank::new(2, &factory),
            Err(CleanError::SessionCreate)
        ));
        // The one session that was created must already be gone.
        assert_eq!(drops.get(), 1);
    }

    #[test]
    fn planar_path_leaves_planar_scratch_alone() {
        let mut bank = DenoiserBank::new(2, &IdentityFactory).unwrap();
        let mut left = vec![0.0f32; NATIVE_FRAME * 4];
        let mut right = vec![0.0f32; NATIVE_FRAME * 4];
        bank.process_planar(&mut [&mut left, &mut right]).unwrap();
        // Only the interleaved entry point pays for planar scratch.
        assert_eq!(bank.planar_scratch.len(), 0);
    }

    #[test]
    fn interleaved_scratch_survives_delegation() {
        let mut bank = DenoiserBank::new(2, &IdentityFactory).unwrap();
        let mut big = vec![0.0f32; NATIVE_FRAME * 8 * 2];
        bank.process_interleaved(&mut big).unwrap();
        let high_water = bank.planar_scratch.len();
        assert_eq!(high_water, NATIVE_FRAME * 8 * 2);

        let mut small = vec![0.0f32; NATIVE_FRAME * 2];
        bank.process_interleaved(&mut small).unwrap();
        assert_eq!(bank.planar_scratch.len(), high_water);
    }

    #[test]
    fn scratch_never_shrinks() {
        let mut bank = DenoiserBank::new(2, &IdentityFactory).unwrap();
        let mut big_l = vec![0.0f32; NATIVE_FRAME * 8];
        let mut big_r = vec![0.0f32; NATIVE_FRAME * 8];
        bank.process_planar(&mut [&mut big_l, &mut big_r]).unwrap();
        let high_water = bank.upsample_scratch.len();
        assert!(high_water >= NATIVE_FRAME * 8 * UPSAMPLE_FACTOR * 2);

        let mut small_l = vec![0.0f32; NATIVE_FRAME];
        let mut small_r = vec![0.0f32; NATIVE_FRAME];
        bank.process_planar(&mut [&mut small_l, &mut small_r]).unwrap();
        assert_eq!(bank.upsample_scratch.len(), high_water);
    }
}
