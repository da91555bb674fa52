//! Panel wiring schemes and the beat-to-pixel index map.
//!
//! A HUB75 panel is not a linear framebuffer: its shift registers span
//! several physical rows at once, so the words streamed out by DMA must
//! interleave pixels from rows that are lit simultaneously. Which rows those
//! are depends on the panel's scan rate and internal wiring.
//!
//! [`Multiplex`] is the closed set of supported wiring schemes, selected once
//! at configuration time. Each scheme defines a closed-form mapping from a
//! physical DMA beat to the logical source pixel feeding it; the
//! [`PixelIndexMap`] materializes that mapping so the conversion loop is a
//! single branch-free indexed walk regardless of scheme.
//!
//! The map is built once from geometry constants and is bijective over the
//! pixel range: every logical pixel lands in exactly one device word.

use crate::ConfigError;

/// Row-multiplexing / wiring scheme of the attached panel.
///
/// A scan rate of 1:16 on a 64x64 panel lights 4 rows simultaneously, while
/// 1:32 on the same panel lights 2. The scheme is a property of the panel
/// hardware and cannot be detected at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Multiplex {
    /// Two rows lit simultaneously, paired at half the panel height
    /// (e.g. 64x64 at 1:32 scan).
    TwoRows,
    /// Four rows lit simultaneously, paired quarter-panel-wise; the bit
    /// plane advances after a full sweep of the row group.
    FourRowsPlaneWise,
    /// Four rows lit simultaneously with folded column pairing; the bit
    /// plane advances on every row step (more frequent shift reprogramming,
    /// trading overhead against visual quality).
    FourRowsLineWise,
}

impl Multiplex {
    /// Number of physical rows lit per scan step.
    #[must_use]
    pub const fn rows_lit(self) -> usize {
        match self {
            Self::TwoRows => 2,
            Self::FourRowsPlaneWise | Self::FourRowsLineWise => 4,
        }
    }

    /// Number of distinct row addresses the scan cycles through.
    #[must_use]
    pub const fn rows_per_group(self, height: usize) -> usize {
        height / self.rows_lit()
    }

    /// Device words consumed per row address (one word per beat).
    #[must_use]
    pub const fn row_stride_words(self, width: usize) -> usize {
        width * self.rows_lit()
    }

    /// Whether the bit plane advances on every row step (line-wise BCM)
    /// instead of once per row-group sweep (plane-wise BCM).
    #[must_use]
    pub const fn plane_advances_every_row(self) -> bool {
        matches!(self, Self::FourRowsLineWise)
    }

    /// Check that a panel geometry is expressible in this scheme.
    ///
    /// This runs once at configuration time; the conversion and scan-out hot
    /// paths never revalidate.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnsupportedGeometry`] when the width/height do not meet
    /// the scheme's divisibility requirements, or when the panel needs more
    /// row addresses than the control word can carry
    /// ([`MAX_ROW_ADDRESSES`](crate::scan::MAX_ROW_ADDRESSES)).
    pub fn validate(self, width: usize, height: usize) -> Result<(), ConfigError> {
        let ok = width > 0
            && height > 0
            && self.rows_per_group(height) <= crate::scan::MAX_ROW_ADDRESSES
            && match self {
                Self::TwoRows => height % 2 == 0,
                Self::FourRowsPlaneWise => height % 4 == 0,
                // The column-pair fold is a bit test, so the half-pair count
                // must be a power of two.
                Self::FourRowsLineWise => {
                    height % 4 == 0 && width % 4 == 0 && (width / 4).is_power_of_two()
                }
            };
        if ok {
            Ok(())
        } else {
            Err(ConfigError::UnsupportedGeometry {
                width,
                height,
                multiplex: self,
            })
        }
    }
}

/// Precomputed beat-to-source-pixel translation for one panel geometry.
///
/// Entry `i` is the logical pixel index feeding DMA beat `i`. Built once at
/// configuration from [`Multiplex`] and the panel geometry; bijective over
/// `0..PIXELS`.
pub struct PixelIndexMap<const PIXELS: usize> {
    entries: [u32; PIXELS],
}

impl<const PIXELS: usize> PixelIndexMap<PIXELS> {
    /// Build the map for the given scheme and geometry.
    ///
    /// The geometry must already have passed [`Multiplex::validate`] and
    /// `PIXELS` must equal `width * height`; this is guaranteed by the
    /// driver's configuration path.
    #[must_use]
    pub fn build(multiplex: Multiplex, width: usize, height: usize) -> Self {
        let mut entries = [0u32; PIXELS];
        match multiplex {
            Multiplex::TwoRows => Self::fill_two_rows(&mut entries, width, height),
            Multiplex::FourRowsPlaneWise => {
                Self::fill_four_rows_plane_wise(&mut entries, width, height);
            }
            Multiplex::FourRowsLineWise => {
                Self::fill_four_rows_line_wise(&mut entries, width, height);
            }
        }
        Self { entries }
    }

    /// Logical source pixel feeding DMA beat `beat`.
    #[inline]
    #[must_use]
    pub fn source_index(&self, beat: usize) -> usize {
        self.entries[beat] as usize
    }

    /// All entries, one per DMA beat.
    #[must_use]
    pub fn entries(&self) -> &[u32; PIXELS] {
        &self.entries
    }

    // Each beat pair interleaves a pixel from the upper half with its
    // partner half a panel below.
    fn fill_two_rows(entries: &mut [u32; PIXELS], width: usize, height: usize) {
        let offset = width * (height >> 1);
        for j in 0..offset {
            entries[j << 1] = j as u32;
            entries[(j << 1) + 1] = (j + offset) as u32;
        }
    }

    // Quarter-panel interleave: each output line carries pixels from the
    // second and fourth quarters, the following line from the first and
    // third, so four physical rows share one row address.
    fn fill_four_rows_plane_wise(entries: &mut [u32; PIXELS], width: usize, height: usize) {
        let quarter = (width * height) >> 2;
        let line_offset = 2 * width;
        for line in 0..(height >> 2) {
            for p in 0..width {
                let src = line * width + p;
                let dst = line * (line_offset << 1) + (p << 1);
                entries[dst] = (quarter + src) as u32;
                entries[dst + 1] = (3 * quarter + src) as u32;
                entries[dst + line_offset] = src as u32;
                entries[dst + line_offset + 1] = (2 * quarter + src) as u32;
            }
        }
    }

    // Folded column pairing: within each scan line, the first half of the
    // column pairs come from the row group itself and the second half from
    // the group one quarter-panel down, selected by a single bit of the
    // running pair counter.
    fn fill_four_rows_line_wise(entries: &mut [u32; PIXELS], width: usize, height: usize) {
        let column_pairs = width >> 1;
        let half_pairs = column_pairs >> 1;
        let half_shift = half_pairs.trailing_zeros() as usize;
        let group_row_offset = (height >> 2) * width;
        let half_panel_offset = (height >> 1) * width;
        let total_pairs = (width * height) >> 1;
        for j in 0..total_pairs {
            let line = j / column_pairs;
            let src = if j & half_pairs == 0 {
                j - (line << half_shift)
            } else {
                group_row_offset + j - ((line + 1) << half_shift)
            };
            entries[j << 1] = src as u32;
            entries[(j << 1) + 1] = (src + half_panel_offset) as u32;
        }
    }
}

impl<const PIXELS: usize> core::fmt::Debug for PixelIndexMap<PIXELS> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PixelIndexMap")
            .field("beats", &PIXELS)
            .finish()
    }
}
