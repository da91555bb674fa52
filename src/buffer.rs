//! Device frame buffer and render-side source surfaces.
//!
//! [`DeviceFrameBuffer`] is the driver-owned, DMA-readable image: one 32-bit
//! word per DMA beat, each word carrying a full 10-bit R/G/B triple in the
//! interleaved order the panel wiring expects. It is allocated once for the
//! configured geometry and overwritten wholesale on every conversion call.
//!
//! [`Canvas`] is a convenience surface for the render side: an owned packed
//! RGB888 buffer implementing the `embedded-graphics` [`DrawTarget`] trait,
//! so effect generators can draw with ordinary primitives and hand the
//! result to the color pipeline.
//!
//! # Safety
//!
//! The device buffer is read by the scan-out DMA while the render context
//! overwrites it. There is deliberately no lock: any 32-bit word the DMA
//! reads is a fully formed, if possibly stale, pixel, and tearing across a
//! frame boundary is an accepted trade-off of the single-buffer design.

use core::convert::Infallible;

use bitfield::bitfield;
use embedded_dma::ReadBuffer;
use embedded_graphics::prelude::Point;

use super::Color;

bitfield! {
    /// One 32-bit device word: a 10-bit R/G/B triple consumed per DMA beat.
    ///
    /// The bit layout is fixed for all source formats:
    /// - Bits 29-20: Red channel
    /// - Bits 19-10: Green channel
    /// - Bits 9-0: Blue channel
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct DeviceWord(u32);
    impl Debug;
    pub u16, red, set_red: 29, 20;
    pub u16, green, set_green: 19, 10;
    pub u16, blue, set_blue: 9, 0;
}

impl DeviceWord {
    /// Wrap a raw device word.
    #[must_use]
    pub const fn from_raw(word: u32) -> Self {
        Self(word)
    }

    /// The raw 32-bit word.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Pack three native-depth channel values into a raw device word.
    #[inline]
    #[must_use]
    pub const fn pack(r: u32, g: u32, b: u32) -> u32 {
        (r << 20) | (g << 10) | b
    }
}

/// DMA-readable frame buffer in the panel's native interleaved format.
///
/// `PIXELS` is the total pixel count of the configured geometry (use
/// [`compute_pixels`](crate::compute_pixels)); there is exactly one word per
/// pixel regardless of wiring scheme.
#[derive(Clone)]
#[repr(C)]
#[repr(align(4))]
pub struct DeviceFrameBuffer<const PIXELS: usize> {
    words: [u32; PIXELS],
}

impl<const PIXELS: usize> DeviceFrameBuffer<PIXELS> {
    /// Create a zeroed (all black) buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self { words: [0; PIXELS] }
    }

    /// All device words in DMA beat order.
    #[must_use]
    pub fn words(&self) -> &[u32; PIXELS] {
        &self.words
    }

    /// Mutable view for the conversion pipeline.
    pub(crate) fn words_mut(&mut self) -> &mut [u32; PIXELS] {
        &mut self.words
    }

    /// The word consumed by DMA beat `beat`.
    #[must_use]
    pub fn word(&self, beat: usize) -> DeviceWord {
        DeviceWord::from_raw(self.words[beat])
    }
}

impl<const PIXELS: usize> Default for DeviceFrameBuffer<PIXELS> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<const PIXELS: usize> ReadBuffer for DeviceFrameBuffer<PIXELS> {
    type Word = u32;

    unsafe fn read_buffer(&self) -> (*const u32, usize) {
        (self.words.as_ptr(), PIXELS)
    }
}

unsafe impl<const PIXELS: usize> ReadBuffer for &mut DeviceFrameBuffer<PIXELS> {
    type Word = u32;

    unsafe fn read_buffer(&self) -> (*const u32, usize) {
        (self.words.as_ptr(), PIXELS)
    }
}

impl<const PIXELS: usize> core::fmt::Debug for DeviceFrameBuffer<PIXELS> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceFrameBuffer")
            .field("beats", &PIXELS)
            .field("size", &core::mem::size_of_val(&self.words))
            .finish()
    }
}

#[cfg(feature = "defmt")]
impl<const PIXELS: usize> defmt::Format for DeviceFrameBuffer<PIXELS> {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "DeviceFrameBuffer<{}>", PIXELS);
    }
}

/// Owned packed-RGB888 render surface.
///
/// One `0x00RR_GGBB` word per logical pixel in row-major order, the packed
/// [`SourceFrame`](crate::pipeline) format the color pipeline consumes.
/// Implements [`DrawTarget`] so renderers can use `embedded-graphics`
/// primitives directly.
///
/// # Example
/// ```rust
/// use embedded_graphics::prelude::*;
/// use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
/// use hub75_scanout::buffer::Canvas;
/// use hub75_scanout::{compute_pixels, Color};
///
/// const W: usize = 64;
/// const H: usize = 64;
/// let mut canvas = Canvas::<W, H, { compute_pixels(W, H) }>::new();
/// Rectangle::new(Point::new(10, 10), Size::new(20, 20))
///     .into_styled(PrimitiveStyle::with_fill(Color::RED))
///     .draw(&mut canvas)
///     .unwrap();
/// ```
pub struct Canvas<const WIDTH: usize, const HEIGHT: usize, const PIXELS: usize> {
    pixels: [u32; PIXELS],
}

impl<const WIDTH: usize, const HEIGHT: usize, const PIXELS: usize> Canvas<WIDTH, HEIGHT, PIXELS> {
    /// Create an all-black canvas.
    #[must_use]
    pub const fn new() -> Self {
        Self { pixels: [0; PIXELS] }
    }

    /// The packed pixel data, row-major.
    #[must_use]
    pub fn data(&self) -> &[u32; PIXELS] {
        &self.pixels
    }

    /// Fill the whole canvas with one color.
    pub fn fill(&mut self, color: Color) {
        let word = pack_rgb888(color);
        self.pixels.fill(word);
    }

    /// Set a pixel; out-of-bounds coordinates are ignored.
    pub fn set_pixel(&mut self, p: Point, color: Color) {
        if p.x < 0 || p.y < 0 {
            return;
        }
        self.set_pixel_internal(p.x as usize, p.y as usize, color);
    }

    fn set_pixel_internal(&mut self, x: usize, y: usize, color: Color) {
        if x >= WIDTH || y >= HEIGHT {
            return;
        }
        self.pixels[y * WIDTH + x] = pack_rgb888(color);
    }
}

fn pack_rgb888(color: Color) -> u32 {
    use embedded_graphics::pixelcolor::RgbColor;
    (u32::from(color.r()) << 16) | (u32::from(color.g()) << 8) | u32::from(color.b())
}

impl<const WIDTH: usize, const HEIGHT: usize, const PIXELS: usize> Default
    for Canvas<WIDTH, HEIGHT, PIXELS>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<const WIDTH: usize, const HEIGHT: usize, const PIXELS: usize>
    embedded_graphics::prelude::OriginDimensions for Canvas<WIDTH, HEIGHT, PIXELS>
{
    fn size(&self) -> embedded_graphics::prelude::Size {
        embedded_graphics::prelude::Size::new(WIDTH as u32, HEIGHT as u32)
    }
}

impl<const WIDTH: usize, const HEIGHT: usize, const PIXELS: usize>
    embedded_graphics::draw_target::DrawTarget for Canvas<WIDTH, HEIGHT, PIXELS>
{
    type Color = Color;

    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = embedded_graphics::Pixel<Self::Color>>,
    {
        for pixel in pixels {
            if pixel.0.x >= 0 && pixel.0.y >= 0 {
                self.set_pixel_internal(pixel.0.x as usize, pixel.0.y as usize, pixel.1);
            }
        }
        Ok(())
    }
}
