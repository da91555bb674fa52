//! BCM scan-out engine for HUB75 LED matrix displays.
//!
//! ## How HUB75 LED Displays Work
//!
//! HUB75 RGB LED matrix panels are scanned, time-multiplexed displays that
//! behave like a long daisy-chained shift register rather than a
//! random-access framebuffer.
//!
//! ### Signal names
//! - **R1 G1 B1 / R2 G2 B2** – Serial colour data for the row groups of the active scan line
//! - **CLK** – Shift-register clock; every rising edge pushes the colour bits one pixel to the right
//! - **LAT / STB** – Latch; copies the shift-register contents to the LED drivers for the row currently selected by the address lines
//! - **OEn** – Output-Enable (active LOW): LEDs are lit while OEn is LOW and blanked when it is HIGH
//! - **A B C D (E)** – Row-address select lines (choose which group of rows is lit)
//!
//! ### Scanning workflow
//! 1. While the panel is still displaying row N − 1, the controller shifts
//!    the colour data for row N into the chain.
//! 2. After the last pixel is clocked in, the controller blanks the LEDs
//!    (OEn HIGH), changes the address lines to select row N, pulses LAT to
//!    latch the freshly shifted data, and drives OEn LOW again for a
//!    controlled time, lighting row N.
//! 3. This repeats for every row fast enough (hundreds of Hz of whole-frame
//!    refresh) that the eye sees a steady image.
//!
//! ### Brightness and colour depth (Binary Code Modulation)
//! Full colour is achieved with **Binary Code Modulation (BCM)**: each of
//! the [`BIT_DEPTH`] bit planes of a pixel value is displayed for a period
//! proportional to its binary weight (1, 2, 4, 8 …), yielding 2ⁿ intensity
//! levels per channel. See
//! [Batsocks – LED dimming using Binary Code Modulation](https://www.batsocks.co.uk/readme/art_bcm_1.htm)
//! for a deeper explanation. The OEn pulse length carries the plane weight,
//! so brightness control is purely a matter of scaling those pulses; see
//! [`brightness`].
//!
//! ## The Engine
//!
//! [`driver::ScanoutDriver`] ties the pieces together:
//!
//! - the **color pipeline** ([`pipeline`]) expands 8-bit sRGB input through
//!   a CIE 1931 gamma table ([`gamma`]) to 12 bits, optionally applies
//!   temporal dithering with per-pixel error feedback ([`dither`]), and
//!   packs the result into 30-bit device words ([`buffer`]) in the
//!   shift-order the panel's row multiplexing expects ([`layout`]);
//! - the **scan sequencer** ([`scan`]) walks rows and bit planes in the
//!   order the multiplex scheme requires and emits one
//!   [`driver::RowCommand`] per row pulse;
//! - the **brightness profile** ([`brightness`]) precomputes the
//!   pulse-length table so the row-finished interrupt never multiplies.
//!
//! The core is hardware independent and fully testable on the host. For
//! two-core targets, [`driver::ScanoutDriver::split`] divides it into a
//! render-side [`driver::FramePublisher`] and an interrupt-side
//! [`driver::ScanHandle`] so each core owns its half outright. The
//! `rp2040` feature adds the RP2040 wing: PIO programs for the data shifter
//! and row pulser, a chained four-channel DMA setup that streams whole rows
//! without CPU involvement, and the interrupt glue that runs the sequencer
//! from core 1.
//!
//! ## Available Feature Flags
//!
//! ### `rp2040` Feature
//! Enables the RP2040 PIO/DMA backend built on `rp2040-hal`. Without it the
//! crate is pure `no_std` Rust with no target requirements.
//!
//! ### `defmt` Feature
//! Implements `defmt::Format` for the engine's types so they can be emitted
//! with the `defmt` logging framework. No functional changes; purely adds
//! trait impls.
#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use embedded_graphics::pixelcolor::Rgb888;

pub mod brightness;
pub mod buffer;
pub mod dither;
pub mod driver;
pub mod gamma;
pub mod layout;
pub mod pipeline;
#[cfg(feature = "rp2040")]
pub mod rp2040;
pub mod scan;

use layout::Multiplex;

/// Color type accepted by the drawing surface
pub type Color = Rgb888;

/// Bit planes per color channel after gamma expansion.
///
/// Ten planes give 1024 intensity levels; a full refresh period is
/// `rows_per_group * BIT_DEPTH` row pulses.
pub const BIT_DEPTH: usize = 10;

/// Computes the `PIXELS` const parameter for a panel geometry
///
/// # Arguments
///
/// * `width` - Panel width in pixels
/// * `height` - Panel height in pixels
///
/// # Returns
///
/// Number of pixels, used as the array length of frame and device buffers
#[must_use]
pub const fn compute_pixels(width: usize, height: usize) -> usize {
    width * height
}

/// Driver-chip bring-up to run before the first frame.
///
/// Most panels use chips that need no setup, but some ship with drivers
/// that power up in a disabled state and want a register write clocked in
/// through the data lines first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipStartup {
    /// No bring-up sequence required
    #[default]
    Generic,
    /// FM6126A: write registers 12 and 13 before use
    Fm6126a,
    /// RUL6024: toggle the strobe while clocking an enable pattern
    Rul6024,
}

/// Static description of one panel and how to drive it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PanelConfig {
    /// Row multiplexing scheme, see [`Multiplex`]
    pub multiplex: Multiplex,
    /// Driver-chip bring-up sequence
    pub chip: ChipStartup,
    /// Whether the panel latches on an inverted strobe polarity
    pub inverted_strobe: bool,
    /// Enable temporal dithering in the color pipeline
    pub dithering: bool,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            multiplex: Multiplex::TwoRows,
            chip: ChipStartup::Generic,
            inverted_strobe: false,
            dithering: true,
        }
    }
}

/// Errors detected while validating a panel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// The width and height cannot be scanned with the chosen multiplex
    /// scheme
    UnsupportedGeometry {
        /// Panel width in pixels
        width: usize,
        /// Panel height in pixels
        height: usize,
        /// The multiplex scheme that rejected the geometry
        multiplex: Multiplex,
    },
    /// The `PIXELS` const parameter does not equal `width * height`
    PixelCountMismatch {
        /// Panel width in pixels
        width: usize,
        /// Panel height in pixels
        height: usize,
        /// The `PIXELS` parameter that was supplied
        pixels: usize,
    },
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnsupportedGeometry {
                width,
                height,
                multiplex,
            } => write!(
                f,
                "{width}x{height} panel is not expressible with {multiplex:?} multiplexing"
            ),
            Self::PixelCountMismatch {
                width,
                height,
                pixels,
            } => write!(
                f,
                "PIXELS parameter is {pixels} but a {width}x{height} panel has {} pixels",
                width * height
            ),
        }
    }
}

impl core::error::Error for ConfigError {}
