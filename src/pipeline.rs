//! Color conversion pipeline: logical frame in, device words out.
//!
//! Each conversion walks the DMA beats in order, fetches the source pixel
//! the [`PixelIndexMap`] assigns to that beat, ramps the 8-bit channels up
//! to the panel's 10-bit depth through the gamma table (optionally spending
//! dither residue on the way) and packs them into one device word.
//!
//! Geometry is validated once at configuration; the loops here are
//! branch-free per pixel apart from the single up-front dispatch on whether
//! dithering is active.

use crate::buffer::{DeviceFrameBuffer, DeviceWord};
use crate::dither::DitherAccumulator;
use crate::gamma::GAMMA_CIE_10BIT;
use crate::layout::PixelIndexMap;

/// A borrowed logical frame in one of the producer formats.
///
/// The core only borrows the buffer for the duration of one conversion
/// call; lifetime and reuse stay with the external renderer.
pub enum SourceFrame<'a, const PIXELS: usize> {
    /// One `0x00RR_GGBB` word per pixel, row-major.
    Packed(&'a [u32; PIXELS]),
    /// Three bytes per pixel in B, G, R order, row-major
    /// (`3 * PIXELS` bytes).
    PlanarBgr(&'a [u8]),
}

#[inline]
fn expand_direct(sample: u8) -> u32 {
    u32::from(GAMMA_CIE_10BIT[sample as usize])
}

/// Convert a packed RGB888 frame into the device buffer.
pub fn convert_packed<const PIXELS: usize>(
    src: &[u32; PIXELS],
    map: &PixelIndexMap<PIXELS>,
    dither: Option<&mut DitherAccumulator<PIXELS>>,
    dst: &mut DeviceFrameBuffer<PIXELS>,
) {
    let words = dst.words_mut();
    if let Some(acc) = dither {
        for (beat, word) in words.iter_mut().enumerate() {
            let j = map.source_index(beat);
            let pixel = src[j];
            let (r, g, b) = acc.feed(
                j,
                (pixel >> 16) as u8,
                (pixel >> 8) as u8,
                pixel as u8,
            );
            *word = DeviceWord::pack(r, g, b);
        }
    } else {
        for (beat, word) in words.iter_mut().enumerate() {
            let pixel = src[map.source_index(beat)];
            *word = DeviceWord::pack(
                expand_direct((pixel >> 16) as u8),
                expand_direct((pixel >> 8) as u8),
                expand_direct(pixel as u8),
            );
        }
    }
}

/// Convert a planar B, G, R byte frame into the device buffer.
///
/// `src` must hold exactly `3 * PIXELS` bytes; this is the producer's
/// contract and only checked by a debug assertion.
pub fn convert_planar_bgr<const PIXELS: usize>(
    src: &[u8],
    map: &PixelIndexMap<PIXELS>,
    dither: Option<&mut DitherAccumulator<PIXELS>>,
    dst: &mut DeviceFrameBuffer<PIXELS>,
) {
    debug_assert_eq!(src.len(), PIXELS * 3);
    let words = dst.words_mut();
    if let Some(acc) = dither {
        for (beat, word) in words.iter_mut().enumerate() {
            let j = map.source_index(beat);
            let k = j * 3;
            let (r, g, b) = acc.feed(j, src[k + 2], src[k + 1], src[k]);
            *word = DeviceWord::pack(r, g, b);
        }
    } else {
        for (beat, word) in words.iter_mut().enumerate() {
            let k = map.source_index(beat) * 3;
            *word = DeviceWord::pack(
                expand_direct(src[k + 2]),
                expand_direct(src[k + 1]),
                expand_direct(src[k]),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::vec;
    use std::vec::Vec;

    use super::*;
    use crate::gamma::GAMMA_CIE_12BIT;
    use crate::layout::Multiplex;

    const W: usize = 64;
    const H: usize = 64;
    const PIXELS: usize = W * H;

    fn uniform_packed(r: u8, g: u8, b: u8) -> Vec<u32> {
        let word = (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b);
        vec![word; PIXELS]
    }

    #[test]
    fn uniform_frame_round_trips_two_rows() {
        let src = uniform_packed(200, 100, 50);
        let src: &[u32; PIXELS] = src.as_slice().try_into().unwrap();
        let map = PixelIndexMap::<PIXELS>::build(Multiplex::TwoRows, W, H);
        let mut dst = DeviceFrameBuffer::<PIXELS>::new();
        convert_packed(src, &map, None, &mut dst);
        for beat in 0..PIXELS {
            let word = dst.word(beat);
            assert_eq!(word.red(), GAMMA_CIE_10BIT[200]);
            assert_eq!(word.green(), GAMMA_CIE_10BIT[100]);
            assert_eq!(word.blue(), GAMMA_CIE_10BIT[50]);
        }
    }

    #[test]
    fn uniform_frame_round_trips_four_rows() {
        for multiplex in [Multiplex::FourRowsPlaneWise, Multiplex::FourRowsLineWise] {
            let src = uniform_packed(10, 128, 255);
            let src: &[u32; PIXELS] = src.as_slice().try_into().unwrap();
            let map = PixelIndexMap::<PIXELS>::build(multiplex, W, H);
            let mut dst = DeviceFrameBuffer::<PIXELS>::new();
            convert_packed(src, &map, None, &mut dst);
            for beat in 0..PIXELS {
                let word = dst.word(beat);
                assert_eq!(word.red(), GAMMA_CIE_10BIT[10], "{multiplex:?}");
                assert_eq!(word.green(), GAMMA_CIE_10BIT[128]);
                assert_eq!(word.blue(), GAMMA_CIE_10BIT[255]);
            }
        }
    }

    #[test]
    fn distinct_pixels_land_in_mapped_slots() {
        // Encode each pixel's own index in its color so the interleave can
        // be read back exactly.
        let mut src = vec![0u32; PIXELS];
        for (j, pixel) in src.iter_mut().enumerate() {
            // 255 and 0 alternate per pixel index parity.
            *pixel = if j % 2 == 0 { 0x00ff_0000 } else { 0x0000_00ff };
        }
        let src: &[u32; PIXELS] = src.as_slice().try_into().unwrap();
        let map = PixelIndexMap::<PIXELS>::build(Multiplex::TwoRows, W, H);
        let mut dst = DeviceFrameBuffer::<PIXELS>::new();
        convert_packed(src, &map, None, &mut dst);
        for beat in 0..PIXELS {
            let j = map.source_index(beat);
            let word = dst.word(beat);
            if j % 2 == 0 {
                assert_eq!(word.red(), GAMMA_CIE_10BIT[255]);
                assert_eq!(word.blue(), 0);
            } else {
                assert_eq!(word.red(), 0);
                assert_eq!(word.blue(), GAMMA_CIE_10BIT[255]);
            }
        }
    }

    #[test]
    fn planar_bgr_routes_channels_to_fixed_fields() {
        let mut src = vec![0u8; PIXELS * 3];
        for pixel in src.chunks_exact_mut(3) {
            pixel[0] = 40; // blue
            pixel[1] = 80; // green
            pixel[2] = 160; // red
        }
        let map = PixelIndexMap::<PIXELS>::build(Multiplex::TwoRows, W, H);
        let mut dst = DeviceFrameBuffer::<PIXELS>::new();
        convert_planar_bgr(&src, &map, None, &mut dst);
        for beat in 0..PIXELS {
            let word = dst.word(beat);
            assert_eq!(word.red(), GAMMA_CIE_10BIT[160]);
            assert_eq!(word.green(), GAMMA_CIE_10BIT[80]);
            assert_eq!(word.blue(), GAMMA_CIE_10BIT[40]);
        }
    }

    #[test]
    fn dithered_average_converges_to_expanded_value() {
        const N: u32 = 64;
        let src = uniform_packed(77, 201, 13);
        let src: &[u32; PIXELS] = src.as_slice().try_into().unwrap();
        let map = PixelIndexMap::<PIXELS>::build(Multiplex::TwoRows, W, H);
        let mut acc = DitherAccumulator::<PIXELS>::new();
        let mut dst = DeviceFrameBuffer::<PIXELS>::new();

        let mut sum_r = 0u64;
        let mut sum_g = 0u64;
        let mut sum_b = 0u64;
        for _ in 0..N {
            convert_packed(src, &map, Some(&mut acc), &mut dst);
            let word = dst.word(0);
            sum_r += u64::from(word.red());
            sum_g += u64::from(word.green());
            sum_b += u64::from(word.blue());
        }
        // sum * 4 differs from N * expanded only by the residual still in
        // flight, i.e. the time average is within 1/N of a native step.
        for (sum, sample) in [(sum_r, 77u8), (sum_g, 201), (sum_b, 13)] {
            let expected = u64::from(N) * u64::from(GAMMA_CIE_12BIT[sample as usize]);
            let produced = sum << 2;
            assert!(
                expected - produced < 4,
                "sample {sample}: {expected} vs {produced}"
            );
        }
    }

    #[test]
    fn dithered_and_direct_agree_on_black_and_white() {
        let map = PixelIndexMap::<PIXELS>::build(Multiplex::TwoRows, W, H);
        let mut acc = DitherAccumulator::<PIXELS>::new();
        let mut dst = DeviceFrameBuffer::<PIXELS>::new();

        let black = uniform_packed(0, 0, 0);
        let black: &[u32; PIXELS] = black.as_slice().try_into().unwrap();
        convert_packed(black, &map, Some(&mut acc), &mut dst);
        assert!(dst.words().iter().all(|&w| w == 0));

        let white = uniform_packed(255, 255, 255);
        let white: &[u32; PIXELS] = white.as_slice().try_into().unwrap();
        convert_packed(white, &map, Some(&mut acc), &mut dst);
        for beat in 0..PIXELS {
            let word = dst.word(beat);
            assert_eq!(word.red(), 1023);
            assert_eq!(word.green(), 1023);
            assert_eq!(word.blue(), 1023);
        }
    }
}
