//! Temporal dithering via per-pixel error feedback.
//!
//! The panel's native depth is 10 bits per channel, but the gamma expansion
//! produces 12-bit values. Instead of throwing the low bits away, each
//! pixel/channel keeps the post-truncation remainder and adds it back on the
//! next frame, so the time-averaged brightness converges to the untruncated
//! value. On low-resolution panels this visibly smooths the darkest
//! gradients where 10-bit quantization would otherwise band.
//!
//! The residual store is created once and never reset mid-stream; a reset
//! would transiently reintroduce the banding the dither exists to hide.

use crate::gamma::GAMMA_CIE_12BIT;

/// Bits of precision carried in the accumulator beyond the native depth.
pub const ACC_SHIFT: u32 = 2;

/// Maximum expanded value before truncation (12 bits).
const EXPANDED_MAX: u16 = 4095;

/// Per-pixel, per-channel dither residuals for one panel.
///
/// Three parallel arrays of `width * height` fixed-point remainders, each in
/// `[0, 1 << ACC_SHIFT)`. Updated in place on every conversion call.
pub struct DitherAccumulator<const PIXELS: usize> {
    acc_r: [u16; PIXELS],
    acc_g: [u16; PIXELS],
    acc_b: [u16; PIXELS],
}

impl<const PIXELS: usize> DitherAccumulator<PIXELS> {
    /// Create a zeroed accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            acc_r: [0; PIXELS],
            acc_g: [0; PIXELS],
            acc_b: [0; PIXELS],
        }
    }

    /// Expand one 8-bit RGB sample to 10 bits with error feedback.
    ///
    /// Expands each channel through the 12-bit gamma table, adds the stored
    /// residual, clamps to the expanded maximum (never wraps), truncates to
    /// 10 bits and keeps the cut-off low bits as the next frame's residual.
    #[inline]
    pub fn feed(&mut self, pixel: usize, r: u8, g: u8, b: u8) -> (u32, u32, u32) {
        let out_r = Self::feed_channel(&mut self.acc_r[pixel], r);
        let out_g = Self::feed_channel(&mut self.acc_g[pixel], g);
        let out_b = Self::feed_channel(&mut self.acc_b[pixel], b);
        (out_r, out_g, out_b)
    }

    #[inline]
    fn feed_channel(acc: &mut u16, sample: u8) -> u32 {
        let mut value = GAMMA_CIE_12BIT[sample as usize] + *acc;
        if value > EXPANDED_MAX {
            value = EXPANDED_MAX;
        }
        *acc = value & ((1 << ACC_SHIFT) - 1);
        u32::from(value >> ACC_SHIFT)
    }
}

impl<const PIXELS: usize> Default for DitherAccumulator<PIXELS> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    #[test]
    fn residuals_stay_bounded() {
        let mut acc = DitherAccumulator::<4>::new();
        for frame in 0..64 {
            for pixel in 0..4 {
                acc.feed(pixel, 13, 77, 201);
            }
            for pixel in 0..4 {
                assert!(acc.acc_r[pixel] < (1 << ACC_SHIFT), "frame {frame}");
                assert!(acc.acc_g[pixel] < (1 << ACC_SHIFT));
                assert!(acc.acc_b[pixel] < (1 << ACC_SHIFT));
            }
        }
    }

    #[test]
    fn output_fits_native_depth() {
        let mut acc = DitherAccumulator::<1>::new();
        for sample in 0..=255u8 {
            let (r, g, b) = acc.feed(0, sample, sample, sample);
            assert!(r <= 1023);
            assert!(g <= 1023);
            assert!(b <= 1023);
        }
    }

    #[test]
    fn time_average_converges() {
        // Feeding the same sample for N frames must yield a sum whose
        // average equals the expanded gamma value to within the residual
        // that is still in flight (strictly less than one native step).
        const N: u32 = 64;
        let mut acc = DitherAccumulator::<1>::new();
        for sample in [1u8, 13, 77, 128, 200, 254] {
            let mut sum = 0u32;
            for _ in 0..N {
                let (r, _, _) = acc.feed(0, sample, 0, 0);
                sum += r;
            }
            let expected = N * u32::from(GAMMA_CIE_12BIT[sample as usize]);
            let produced = sum << ACC_SHIFT;
            assert!(
                expected - produced < (1 << ACC_SHIFT),
                "sample {sample}: expected {expected}, produced {produced}"
            );
            // Reset between samples by draining the residual.
            acc = DitherAccumulator::new();
        }
    }

    #[test]
    fn full_scale_clamps_without_wrap() {
        let mut acc = DitherAccumulator::<1>::new();
        for _ in 0..16 {
            let (r, _, _) = acc.feed(0, 255, 0, 0);
            // 4095 >> 2 == 1023 every frame; the clamp discards the carried
            // residual instead of wrapping.
            assert_eq!(r, 1023);
        }
    }

    #[test]
    fn zero_stays_zero() {
        let mut acc = DitherAccumulator::<1>::new();
        for _ in 0..16 {
            assert_eq!(acc.feed(0, 0, 0, 0), (0, 0, 0));
        }
    }
}
