//! Scan sequencing: which row and bit plane the engine outputs next.
//!
//! The scan-out interrupt fires once per row pulse. Each invocation advances
//! a `(row_address, bit_plane)` pair and emits one control word for the row
//! pulser: the row address in the low five bits, the pulse length above
//! them. The two multiplex families walk the pair in opposite orders, see
//! [`ScanState::advance`].

use bitfield::bitfield;

use crate::layout::Multiplex;
use crate::BIT_DEPTH;

bitfield! {
    /// Control word consumed by the row pulser: address lines then OEn time.
    pub struct RowControl(u32);
    impl Debug;
    /// Row address driven onto the panel's A..E select lines.
    pub u8, row_address, set_row_address: 4, 0;
    /// OEn pulse length in pulser cycles.
    pub u32, pulse, set_pulse: 31, 5;
}

/// Row addresses expressible in the control word's five address bits.
///
/// [`Multiplex::validate`] rejects any geometry whose
/// [`rows_per_group`](Multiplex::rows_per_group) exceeds this; without the
/// check, rows past address 31 would wrap on the select lines while the
/// pixel stream keeps advancing.
pub const MAX_ROW_ADDRESSES: usize = 32;

/// Pack a row address and pulse length into a pulser control word.
#[inline]
#[must_use]
pub fn control_word(row_address: u8, pulse: u32) -> u32 {
    let mut word = RowControl(0);
    word.set_row_address(row_address);
    word.set_pulse(pulse);
    word.0
}

/// Position of the scan-out engine within its refresh period.
///
/// A full period is `rows_per_group * BIT_DEPTH` steps; after that many
/// calls to [`advance`](Self::advance) the state is back at row 0, plane 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanState {
    row_address: u8,
    bit_plane: u8,
}

impl ScanState {
    /// Start of the refresh period: row 0, bit plane 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            row_address: 0,
            bit_plane: 0,
        }
    }

    /// Row address the next pulse will select.
    #[must_use]
    pub const fn row_address(&self) -> u8 {
        self.row_address
    }

    /// Bit plane the next pulse will display.
    #[must_use]
    pub const fn bit_plane(&self) -> u8 {
        self.bit_plane
    }

    /// Step to the next `(row, plane)` pair.
    ///
    /// Plane-wise schemes hold the bit plane while the row sweeps the group,
    /// then move to the next plane on row wrap-around. Line-wise schemes
    /// emit all bit planes of one row back to back, then step the row.
    ///
    /// Returns `Some(plane)` whenever the data shifter must be reprogrammed
    /// for a new per-plane shift amount: only on a plane change for
    /// plane-wise schemes, on every step for line-wise ones.
    pub fn advance(&mut self, multiplex: Multiplex, height: usize) -> Option<u8> {
        #[allow(clippy::cast_possible_truncation)]
        let rows = multiplex.rows_per_group(height) as u8;
        #[allow(clippy::cast_possible_truncation)]
        let planes = BIT_DEPTH as u8;
        if multiplex.plane_advances_every_row() {
            self.bit_plane += 1;
            if self.bit_plane == planes {
                self.bit_plane = 0;
                self.row_address += 1;
                if self.row_address == rows {
                    self.row_address = 0;
                }
            }
            Some(self.bit_plane)
        } else {
            self.row_address += 1;
            if self.row_address == rows {
                self.row_address = 0;
                self.bit_plane += 1;
                if self.bit_plane == planes {
                    self.bit_plane = 0;
                }
                Some(self.bit_plane)
            } else {
                None
            }
        }
    }
}

impl Default for ScanState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    #[test]
    fn control_word_packs_address_low_pulse_high() {
        assert_eq!(control_word(3, 6), 3 | (6 << 5));
        assert_eq!(control_word(31, 0), 31);
        assert_eq!(control_word(0, 0x07FF_FFFF), 0xFFFF_FFE0);
    }

    #[test]
    fn row_control_round_trips_fields() {
        let word = RowControl(control_word(17, 1234));
        assert_eq!(word.row_address(), 17);
        assert_eq!(word.pulse(), 1234);
    }

    #[test]
    fn plane_wise_sweeps_rows_within_a_plane() {
        let mut state = ScanState::new();
        // 64 rows lit two at a time: 32 addresses per plane.
        for row in 1..32u8 {
            assert_eq!(state.advance(Multiplex::TwoRows, 64), None);
            assert_eq!((state.row_address(), state.bit_plane()), (row, 0));
        }
        assert_eq!(state.advance(Multiplex::TwoRows, 64), Some(1));
        assert_eq!((state.row_address(), state.bit_plane()), (0, 1));
    }

    #[test]
    fn line_wise_sweeps_planes_within_a_row() {
        let mut state = ScanState::new();
        for plane in 1..10u8 {
            assert_eq!(state.advance(Multiplex::FourRowsLineWise, 64), Some(plane));
            assert_eq!((state.row_address(), state.bit_plane()), (0, plane));
        }
        assert_eq!(state.advance(Multiplex::FourRowsLineWise, 64), Some(0));
        assert_eq!((state.row_address(), state.bit_plane()), (1, 0));
    }

    #[test]
    fn full_period_returns_to_origin() {
        for (multiplex, height) in [
            (Multiplex::TwoRows, 64),
            (Multiplex::FourRowsPlaneWise, 64),
            (Multiplex::FourRowsLineWise, 32),
        ] {
            let period = multiplex.rows_per_group(height) * BIT_DEPTH;
            let mut state = ScanState::new();
            for step in 1..period {
                state.advance(multiplex, height);
                assert_ne!(state, ScanState::new(), "{multiplex:?} wrapped early at {step}");
            }
            state.advance(multiplex, height);
            assert_eq!(state, ScanState::new(), "{multiplex:?} period mismatch");
        }
    }

    #[test]
    fn plane_wise_reprograms_once_per_plane() {
        let mut state = ScanState::new();
        let period = Multiplex::FourRowsPlaneWise.rows_per_group(64) * BIT_DEPTH;
        let reprograms = (0..period)
            .filter(|_| state.advance(Multiplex::FourRowsPlaneWise, 64).is_some())
            .count();
        assert_eq!(reprograms, BIT_DEPTH);
    }
}
