//! Sample-rate bridge between the native capture rate and the denoiser
//!
//! The denoiser model runs on fixed 480-sample frames at 48 kHz while the
//! pipeline carries audio at 16 kHz, so each 160-sample block is bridged up
//! and back down around the model. The bridge is a zero-order hold up and a
//! plain average down: lossy on purpose, cheap, and deterministic. A
//! band-limited resampler must not replace it; downstream behavior depends
//! on this exact transform.

/// Native pipeline sample rate (Hz).
pub const NATIVE_SAMPLE_RATE: u32 = 16_000;
/// Sample rate the denoiser model operates at (Hz).
pub const DENOISER_SAMPLE_RATE: u32 = 48_000;
/// Integer upsample factor between the two rates.
pub const UPSAMPLE_FACTOR: usize = 3;
/// Denoiser block size at the native rate (10 ms at 16 kHz).
pub const NATIVE_FRAME: usize = 160;
/// Frame size the denoiser model consumes (10 ms at 48 kHz).
pub const DENOISER_FRAME: usize = NATIVE_FRAME * UPSAMPLE_FACTOR;

/// Zero-order-hold upsample: each input sample replicated three times.
///
/// `output` must be exactly `UPSAMPLE_FACTOR` times as long as `input`.
pub fn upsample_hold(input: &[f32], output: &mut [f32]) {
    debug_assert_eq!(output.len(), input.len() * UPSAMPLE_FACTOR);
    for (i, &sample) in input.iter().enumerate() {
        let base = i * UPSAMPLE_FACTOR;
        output[base] = sample;
        output[base + 1] = sample;
        output[base + 2] = sample;
    }
}

/// Average each contiguous run of three samples back down to one.
///
/// `input` must be exactly `UPSAMPLE_FACTOR` times as long as `output`.
pub fn downsample_average(input: &[f32], output: &mut [f32]) {
    debug_assert_eq!(input.len(), output.len() * UPSAMPLE_FACTOR);
    for (i, out) in output.iter_mut().enumerate() {
        let base = i * UPSAMPLE_FACTOR;
        *out = (input[base] + input[base + 1] + input[base + 2]) / 3.0;
    }
}

/// Round `value` up to the next multiple of `block` (0 stays 0).
pub(crate) fn round_up(value: usize, block: usize) -> usize {
    if block == 0 || value == 0 {
        return value;
    }
    let rem = value % block;
    if rem == 0 {
        value
    } else {
        value + block - rem
    }
}
