//! The scan-out driver: device framebuffer, color pipeline and scan state
//! under one roof.
//!
//! [`ScanoutDriver`] is the crate's hardware-independent core. Single-core
//! users (and the test suite) call everything on the driver directly: the
//! render context publishes frames and adjusts brightness, the platform wing
//! drives it one row at a time through
//! [`service_scan_advance`](ScanoutDriver::service_scan_advance) and feeds
//! the returned [`RowCommand`] to the DMA and shifter hardware.
//!
//! When the render context and the row-finished interrupt live on different
//! cores, [`split`](ScanoutDriver::split) divides the driver into two
//! disjoint halves that can each be moved to its own core:
//!
//! - [`FramePublisher`] holds the device buffer, index map and dither state
//!   exclusively, plus the brightness setters;
//! - [`ScanHandle`] holds the scan state exclusively, reads the brightness
//!   pulse table, and resolves [`RowCommand`]s to DMA addresses.
//!
//! The brightness profile is the only shared piece; it publishes its pulse
//! table through a critical section, so neither half ever blocks on the
//! other. The device buffer is written only by the publisher while the DMA
//! reads it; a frame caught mid-conversion shows one refresh of mixed rows,
//! which the temporal dithering feedback absorbs on the next frame.

use crate::brightness::BrightnessProfile;
use crate::buffer::DeviceFrameBuffer;
use crate::dither::DitherAccumulator;
use crate::layout::{Multiplex, PixelIndexMap};
use crate::pipeline::{self, SourceFrame};
use crate::scan::{control_word, ScanState};
use crate::{ConfigError, PanelConfig};

/// One row's worth of work for the shift-out hardware.
///
/// `row_start`/`row_len` select the device-buffer slice for the pixel DMA
/// channel, `control_word` goes to the row pulser, and `plane_select` is
/// `Some` when the data shifter needs its per-plane shift amount
/// reprogrammed before the row goes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RowCommand {
    /// Word for the row pulser: address lines plus OEn pulse length
    pub control_word: u32,
    /// First device-buffer word of the row, in words
    pub row_start: usize,
    /// Device words in the row
    pub row_len: usize,
    /// Bit plane to program into the data shifter, when it changed
    pub plane_select: Option<u8>,
}

/// BCM scan-out engine for one panel of `WIDTH` x `HEIGHT` pixels.
///
/// `PIXELS` must equal `WIDTH * HEIGHT` (see
/// [`compute_pixels`](crate::compute_pixels)); [`new`](Self::new) rejects
/// anything else. The type is large (device buffer, index map and optional
/// dither state are all inline arrays), so place it in a `static` rather
/// than on an embedded stack.
pub struct ScanoutDriver<const WIDTH: usize, const HEIGHT: usize, const PIXELS: usize> {
    config: PanelConfig,
    map: PixelIndexMap<PIXELS>,
    dither: Option<DitherAccumulator<PIXELS>>,
    brightness: BrightnessProfile,
    scan: ScanState,
    device: DeviceFrameBuffer<PIXELS>,
}

impl<const WIDTH: usize, const HEIGHT: usize, const PIXELS: usize>
    ScanoutDriver<WIDTH, HEIGHT, PIXELS>
{
    /// Build a driver for the given panel configuration.
    ///
    /// # Errors
    ///
    /// [`ConfigError::PixelCountMismatch`] when `PIXELS != WIDTH * HEIGHT`,
    /// or [`ConfigError::UnsupportedGeometry`] when the multiplex scheme
    /// cannot express this width and height.
    pub fn new(config: PanelConfig) -> Result<Self, ConfigError> {
        if PIXELS != WIDTH * HEIGHT {
            return Err(ConfigError::PixelCountMismatch {
                width: WIDTH,
                height: HEIGHT,
                pixels: PIXELS,
            });
        }
        config.multiplex.validate(WIDTH, HEIGHT)?;
        Ok(Self {
            map: PixelIndexMap::build(config.multiplex, WIDTH, HEIGHT),
            dither: if config.dithering {
                Some(DitherAccumulator::new())
            } else {
                None
            },
            brightness: BrightnessProfile::new(),
            scan: ScanState::new(),
            device: DeviceFrameBuffer::new(),
            config,
        })
    }

    /// The configuration this driver was built with.
    #[must_use]
    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    /// Divide the driver into its render-side and scan-side halves.
    ///
    /// Both halves borrow disjoint parts of the driver and are `Send`, so
    /// with a `&'static mut` driver the [`FramePublisher`] can move to the
    /// render core while the [`ScanHandle`] feeds the scan-out engine on the
    /// interrupt core. The brightness profile is shared by reference and is
    /// safe from both sides.
    pub fn split(&mut self) -> (FramePublisher<'_, PIXELS>, ScanHandle<'_, WIDTH, HEIGHT>) {
        let device_base = self.device.words().as_ptr() as usize;
        (
            FramePublisher {
                map: &self.map,
                dither: &mut self.dither,
                brightness: &self.brightness,
                device: &mut self.device,
            },
            ScanHandle {
                scan: &mut self.scan,
                config: &self.config,
                brightness: &self.brightness,
                device_base,
            },
        )
    }

    /// Run a source frame through the color pipeline into the device buffer.
    ///
    /// The scan-out side keeps reading the device buffer while this writes
    /// it; a frame caught mid-conversion shows one refresh of mixed rows,
    /// which the temporal dithering feedback absorbs on the next frame.
    pub fn publish(&mut self, frame: SourceFrame<'_, PIXELS>) {
        match frame {
            SourceFrame::Packed(src) => self.publish_packed(src),
            SourceFrame::PlanarBgr(src) => self.publish_planar_bgr(src),
        }
    }

    /// Publish a frame of `0x00RR_GGBB` words.
    pub fn publish_packed(&mut self, src: &[u32; PIXELS]) {
        pipeline::convert_packed(src, &self.map, self.dither.as_mut(), &mut self.device);
    }

    /// Publish a frame of B, G, R byte triples (`3 * PIXELS` bytes).
    pub fn publish_planar_bgr(&mut self, src: &[u8]) {
        pipeline::convert_planar_bgr(src, &self.map, self.dither.as_mut(), &mut self.device);
    }

    /// Coarse brightness, pulse length of bit plane 0. Safe to call while
    /// the engine is running.
    pub fn set_basis(&self, factor: u8) {
        self.brightness.set_basis(factor);
    }

    /// Fine intensity in `[0.0, 1.0]`. Safe to call while the engine is
    /// running.
    pub fn set_intensity(&self, intensity: f32) {
        self.brightness.set_intensity(intensity);
    }

    /// The brightness profile driving the OEn pulse table.
    #[must_use]
    pub fn brightness(&self) -> &BrightnessProfile {
        &self.brightness
    }

    /// The buffer the pixel DMA channel reads from.
    #[must_use]
    pub fn device_buffer(&self) -> &DeviceFrameBuffer<PIXELS> {
        &self.device
    }

    /// Command for the row the scan state currently points at, used to kick
    /// the engine off before the first interrupt.
    #[must_use]
    pub fn start_command(&self) -> RowCommand {
        command::<WIDTH>(
            &self.scan,
            self.config.multiplex,
            &self.brightness,
            Some(self.scan.bit_plane()),
        )
    }

    /// Advance to the next row and return its command.
    ///
    /// Called from the row-finished interrupt; does table lookups only, no
    /// multiplication and no floating point.
    pub fn service_scan_advance(&mut self) -> RowCommand {
        let plane_select = self.scan.advance(self.config.multiplex, HEIGHT);
        command::<WIDTH>(&self.scan, self.config.multiplex, &self.brightness, plane_select)
    }
}

fn command<const WIDTH: usize>(
    scan: &ScanState,
    multiplex: Multiplex,
    brightness: &BrightnessProfile,
    plane_select: Option<u8>,
) -> RowCommand {
    let row = scan.row_address();
    let pulse = brightness.scaled_basis(scan.bit_plane() as usize);
    let stride = multiplex.row_stride_words(WIDTH);
    RowCommand {
        control_word: control_word(row, pulse),
        row_start: row as usize * stride,
        row_len: stride,
        plane_select,
    }
}

/// Render-side half of a split driver.
///
/// Owns the device buffer, index map and dither state exclusively; shares
/// only the brightness profile with the [`ScanHandle`].
pub struct FramePublisher<'a, const PIXELS: usize> {
    map: &'a PixelIndexMap<PIXELS>,
    dither: &'a mut Option<DitherAccumulator<PIXELS>>,
    brightness: &'a BrightnessProfile,
    device: &'a mut DeviceFrameBuffer<PIXELS>,
}

impl<const PIXELS: usize> FramePublisher<'_, PIXELS> {
    /// Run a source frame through the color pipeline into the device buffer.
    pub fn publish(&mut self, frame: SourceFrame<'_, PIXELS>) {
        match frame {
            SourceFrame::Packed(src) => self.publish_packed(src),
            SourceFrame::PlanarBgr(src) => self.publish_planar_bgr(src),
        }
    }

    /// Publish a frame of `0x00RR_GGBB` words.
    pub fn publish_packed(&mut self, src: &[u32; PIXELS]) {
        pipeline::convert_packed(src, self.map, self.dither.as_mut(), self.device);
    }

    /// Publish a frame of B, G, R byte triples (`3 * PIXELS` bytes).
    pub fn publish_planar_bgr(&mut self, src: &[u8]) {
        pipeline::convert_planar_bgr(src, self.map, self.dither.as_mut(), self.device);
    }

    /// Coarse brightness, pulse length of bit plane 0.
    pub fn set_basis(&self, factor: u8) {
        self.brightness.set_basis(factor);
    }

    /// Fine intensity in `[0.0, 1.0]`.
    pub fn set_intensity(&self, intensity: f32) {
        self.brightness.set_intensity(intensity);
    }
}

/// Scan-side half of a split driver, owned by the scan-out engine.
///
/// Holds the scan state exclusively and captures the device buffer's base
/// address so the engine can re-arm the pixel DMA channel without touching
/// the buffer the [`FramePublisher`] is writing.
pub struct ScanHandle<'a, const WIDTH: usize, const HEIGHT: usize> {
    scan: &'a mut ScanState,
    config: &'a PanelConfig,
    brightness: &'a BrightnessProfile,
    device_base: usize,
}

impl<const WIDTH: usize, const HEIGHT: usize> ScanHandle<'_, WIDTH, HEIGHT> {
    /// The configuration the driver was built with.
    #[must_use]
    pub fn config(&self) -> &PanelConfig {
        self.config
    }

    /// Command for the row the scan state currently points at.
    #[must_use]
    pub fn start_command(&self) -> RowCommand {
        command::<WIDTH>(
            self.scan,
            self.config.multiplex,
            self.brightness,
            Some(self.scan.bit_plane()),
        )
    }

    /// Advance to the next row and return its command.
    pub fn service_scan_advance(&mut self) -> RowCommand {
        let plane_select = self.scan.advance(self.config.multiplex, HEIGHT);
        command::<WIDTH>(self.scan, self.config.multiplex, self.brightness, plane_select)
    }

    /// Bus address of a [`RowCommand::row_start`] offset, for the pixel DMA
    /// channel's read-address register.
    #[must_use]
    pub fn row_dma_address(&self, row_start: usize) -> usize {
        self.device_base + row_start * core::mem::size_of::<u32>()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::compute_pixels;
    use crate::gamma::GAMMA_CIE_10BIT;
    use crate::layout::Multiplex;
    use crate::ChipStartup;
    use crate::BIT_DEPTH;

    const W: usize = 64;
    const H: usize = 64;
    const PIXELS: usize = compute_pixels(W, H);

    fn driver(dithering: bool) -> ScanoutDriver<W, H, PIXELS> {
        ScanoutDriver::new(PanelConfig {
            multiplex: Multiplex::TwoRows,
            chip: ChipStartup::Generic,
            inverted_strobe: false,
            dithering,
        })
        .unwrap()
    }

    #[test]
    fn pixel_count_mismatch_is_rejected() {
        let result = ScanoutDriver::<64, 64, 100>::new(PanelConfig::default());
        assert!(matches!(
            result,
            Err(ConfigError::PixelCountMismatch {
                width: 64,
                height: 64,
                pixels: 100
            })
        ));
    }

    #[test]
    fn unsupported_geometry_is_rejected() {
        let config = PanelConfig {
            multiplex: Multiplex::FourRowsLineWise,
            ..PanelConfig::default()
        };
        let result = ScanoutDriver::<40, 64, { 40 * 64 }>::new(config);
        assert!(matches!(
            result,
            Err(ConfigError::UnsupportedGeometry { width: 40, .. })
        ));
    }

    #[test]
    fn panel_taller_than_address_range_is_rejected() {
        // A 64x128 TwoRows panel needs 64 row addresses but the control
        // word carries five address bits; rows 32..64 would alias the
        // first half while the pixel DMA streams the real row.
        let result = ScanoutDriver::<64, 128, { 64 * 128 }>::new(PanelConfig::default());
        assert!(matches!(
            result,
            Err(ConfigError::UnsupportedGeometry { height: 128, .. })
        ));
    }

    #[test]
    fn solid_red_frame_fills_every_word() {
        let mut driver = driver(false);
        driver.publish_packed(&[0x00FF_0000; PIXELS]);
        for beat in 0..PIXELS {
            let word = driver.device_buffer().word(beat);
            assert_eq!(word.red(), GAMMA_CIE_10BIT[255]);
            assert_eq!(word.green(), 0);
            assert_eq!(word.blue(), 0);
        }
    }

    #[test]
    fn planar_white_saturates_all_channels() {
        let mut driver = driver(false);
        let src = std::vec![0xFFu8; PIXELS * 3];
        driver.publish_planar_bgr(&src);
        for beat in 0..PIXELS {
            assert_eq!(driver.device_buffer().words()[beat], 0x3FFF_FFFF);
        }
    }

    #[test]
    fn source_frame_variants_match_direct_calls() {
        let mut via_enum = driver(false);
        let mut direct = driver(false);
        let packed = [0x0012_3456u32; PIXELS];
        via_enum.publish(SourceFrame::Packed(&packed));
        direct.publish_packed(&packed);
        assert_eq!(via_enum.device_buffer().words(), direct.device_buffer().words());
    }

    #[test]
    fn dithered_output_stays_in_field_range() {
        let mut driver = driver(true);
        for _ in 0..4 {
            driver.publish_packed(&[0x0080_8080; PIXELS]);
            for beat in 0..PIXELS {
                let word = driver.device_buffer().word(beat);
                assert!(word.red() <= 1023);
                assert!(word.green() <= 1023);
                assert!(word.blue() <= 1023);
            }
        }
    }

    #[test]
    fn scan_advances_rows_then_planes() {
        let mut driver = driver(false);
        let stride = Multiplex::TwoRows.row_stride_words(W);

        let start = driver.start_command();
        assert_eq!(start.row_start, 0);
        assert_eq!(start.row_len, stride);
        assert_eq!(start.plane_select, Some(0));

        for row in 1..32 {
            let cmd = driver.service_scan_advance();
            assert_eq!(cmd.row_start, row * stride);
            assert_eq!(cmd.plane_select, None);
            // Plane 0 pulse at default brightness.
            assert_eq!(cmd.control_word, row as u32 | (6 << 5));
        }
        let cmd = driver.service_scan_advance();
        assert_eq!(cmd.row_start, 0);
        assert_eq!(cmd.plane_select, Some(1));
        assert_eq!(cmd.control_word, 12 << 5);
    }

    #[test]
    fn full_period_returns_to_start_command() {
        let mut driver = driver(false);
        let start = driver.start_command();
        let period = Multiplex::TwoRows.rows_per_group(H) * BIT_DEPTH;
        let mut last = start;
        for _ in 0..period {
            last = driver.service_scan_advance();
        }
        assert_eq!(last.row_start, start.row_start);
        assert_eq!(last.control_word, start.control_word);
    }

    #[test]
    fn brightness_change_shows_in_next_command() {
        let mut driver = driver(false);
        driver.set_basis(10);
        driver.set_intensity(0.5);
        let cmd = driver.service_scan_advance();
        // Still on plane 0: basis 10 at half intensity.
        assert_eq!(cmd.control_word, 1 | (5 << 5));
    }

    #[test]
    fn split_halves_are_send() {
        fn assert_send<T: Send>(_: &T) {}
        let mut driver = driver(true);
        let (publisher, scan) = driver.split();
        assert_send(&publisher);
        assert_send(&scan);
    }

    #[test]
    fn split_publisher_matches_whole_driver() {
        let mut split_side = driver(false);
        let mut whole = driver(false);
        let packed = [0x0012_3456u32; PIXELS];
        {
            let (mut publisher, _) = split_side.split();
            publisher.publish_packed(&packed);
        }
        whole.publish_packed(&packed);
        assert_eq!(split_side.device_buffer().words(), whole.device_buffer().words());
    }

    #[test]
    fn split_scan_matches_whole_driver() {
        let mut split_side = driver(false);
        let mut whole = driver(false);
        let (_, mut scan) = split_side.split();
        assert_eq!(scan.start_command(), whole.start_command());
        for _ in 0..40 {
            assert_eq!(scan.service_scan_advance(), whole.service_scan_advance());
        }
    }

    #[test]
    fn publisher_brightness_reaches_scan_side() {
        let mut driver = driver(false);
        let (publisher, mut scan) = driver.split();
        publisher.set_basis(10);
        publisher.set_intensity(0.5);
        let cmd = scan.service_scan_advance();
        assert_eq!(cmd.control_word, 1 | (5 << 5));
    }

    #[test]
    fn row_dma_addresses_step_by_word_size() {
        let mut driver = driver(false);
        let (_, scan) = driver.split();
        let stride = Multiplex::TwoRows.row_stride_words(W);
        let base = scan.row_dma_address(0);
        assert_eq!(scan.row_dma_address(stride) - base, stride * 4);
        assert_eq!(scan.row_dma_address(2 * stride) - base, 2 * stride * 4);
    }
}
