//! Brightness control: basis factor, intensity and the per-bit-plane
//! pulse-length table.
//!
//! Brightness on a BCM-scanned panel is encoded entirely in the length of
//! each bit plane's output-enable pulse. Two user-facing knobs feed it:
//!
//! - the **basis factor** (coarse, default 6): the pulse length of bit
//!   plane 0, doubled for every further plane;
//! - the **intensity** (fine, `0.0..=1.0`): a Q16 fixed-point scale applied
//!   on top.
//!
//! The scan-out interrupt must never multiply or touch floating point, so
//! the scaled values are precomputed into `scaled_basis[BIT_DEPTH]` whenever
//! either knob changes. Recomputation uses 64-bit intermediates (factor up
//! to 255, Q16 intensity up to 65536, shift up to `BIT_DEPTH - 1` overflows
//! 32 bits) and the live table is replaced inside a critical section, so a
//! concurrent interrupt handler always observes a fully consistent table,
//! never one plane with the old intensity and another with the new.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::BIT_DEPTH;

/// Q format shift: Q16 gives 1.0 == `1 << 16`.
const INTENSITY_FP_SHIFT: u32 = 16;

/// Default coarse brightness factor.
pub const DEFAULT_BASIS: u8 = 6;

struct Inner {
    basis_factor: u32,
    intensity_q16: u32,
    scaled_basis: [u32; BIT_DEPTH],
}

/// User-facing brightness knobs plus the derived pulse-length table.
///
/// All methods take `&self`: the render context may call the setters at any
/// time while the scan-out interrupt performs lookups, which is the §6
/// contract the original driver met by disabling interrupts around the
/// table copy.
pub struct BrightnessProfile {
    inner: Mutex<RefCell<Inner>>,
}

const fn compute_table(basis_factor: u32, intensity_q16: u32) -> [u32; BIT_DEPTH] {
    let mut table = [0u32; BIT_DEPTH];
    let mut plane = 0;
    while plane < BIT_DEPTH {
        let base = (basis_factor as u64) << plane;
        table[plane] = ((base * intensity_q16 as u64) >> INTENSITY_FP_SHIFT) as u32;
        plane += 1;
    }
    table
}

impl BrightnessProfile {
    /// Create a profile with the default basis factor and full intensity.
    #[must_use]
    pub const fn new() -> Self {
        let basis_factor = DEFAULT_BASIS as u32;
        let intensity_q16 = 1 << INTENSITY_FP_SHIFT;
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                basis_factor,
                intensity_q16,
                scaled_basis: compute_table(basis_factor, intensity_q16),
            })),
        }
    }

    /// Set the coarse brightness factor (clamped to at least 1).
    pub fn set_basis(&self, factor: u8) {
        let factor = if factor == 0 { 1 } else { u32::from(factor) };
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.basis_factor = factor;
            inner.scaled_basis = compute_table(factor, inner.intensity_q16);
        });
    }

    /// Set the fine intensity in `[0.0, 1.0]`; out-of-range values clamp.
    pub fn set_intensity(&self, intensity: f32) {
        let q16 = if intensity <= 0.0 {
            0
        } else if intensity >= 1.0 {
            1 << INTENSITY_FP_SHIFT
        } else {
            (intensity * (1u32 << INTENSITY_FP_SHIFT) as f32 + 0.5) as u32
        };
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            inner.intensity_q16 = q16;
            inner.scaled_basis = compute_table(inner.basis_factor, q16);
        });
    }

    /// Pulse-length basis for one bit plane. This is the interrupt-side lookup.
    #[inline]
    #[must_use]
    pub fn scaled_basis(&self, bit_plane: usize) -> u32 {
        critical_section::with(|cs| self.inner.borrow_ref(cs).scaled_basis[bit_plane])
    }

    /// Consistent copy of the whole table.
    #[must_use]
    pub fn snapshot(&self) -> [u32; BIT_DEPTH] {
        critical_section::with(|cs| self.inner.borrow_ref(cs).scaled_basis)
    }
}

impl Default for BrightnessProfile {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for BrightnessProfile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (basis, q16) = critical_section::with(|cs| {
            let inner = self.inner.borrow_ref(cs);
            (inner.basis_factor, inner.intensity_q16)
        });
        f.debug_struct("BrightnessProfile")
            .field("basis_factor", &basis)
            .field("intensity_q16", &q16)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn default_table_doubles_per_plane() {
        let profile = BrightnessProfile::new();
        assert_eq!(profile.scaled_basis(0), 6);
        assert_eq!(profile.scaled_basis(1), 12);
        assert_eq!(profile.scaled_basis(9), 6 * 512);
        for plane in 0..BIT_DEPTH - 1 {
            assert_eq!(
                profile.scaled_basis(plane + 1),
                profile.scaled_basis(plane) * 2
            );
        }
    }

    #[test]
    fn table_is_monotonic_for_all_knob_values() {
        let profile = BrightnessProfile::new();
        for factor in [1u8, 2, 6, 100, 255] {
            for intensity in [0.0f32, 0.1, 0.33, 0.5, 0.99, 1.0] {
                profile.set_basis(factor);
                profile.set_intensity(intensity);
                let table = profile.snapshot();
                for plane in 0..BIT_DEPTH - 1 {
                    assert!(
                        table[plane] <= table[plane + 1],
                        "factor {factor} intensity {intensity} plane {plane}"
                    );
                }
            }
        }
    }

    #[test]
    fn basis_clamps_to_one() {
        let profile = BrightnessProfile::new();
        profile.set_intensity(1.0);
        profile.set_basis(0);
        assert_eq!(profile.scaled_basis(0), 1);
        assert_eq!(profile.scaled_basis(9), 512);
    }

    #[test]
    fn intensity_clamps_to_unit_range() {
        let profile = BrightnessProfile::new();
        profile.set_basis(6);

        profile.set_intensity(-0.5);
        assert_eq!(profile.snapshot(), [0; BIT_DEPTH]);

        profile.set_intensity(2.0);
        assert_eq!(profile.scaled_basis(0), 6);
        assert_eq!(profile.scaled_basis(9), 3072);
    }

    #[test]
    fn half_intensity_halves_the_table() {
        let profile = BrightnessProfile::new();
        profile.set_basis(6);
        profile.set_intensity(0.5);
        for plane in 0..BIT_DEPTH {
            assert_eq!(profile.scaled_basis(plane), (6u32 << plane) / 2);
        }
    }

    #[test]
    fn no_overflow_at_maximum_knobs() {
        let profile = BrightnessProfile::new();
        profile.set_basis(255);
        profile.set_intensity(1.0);
        // 255 << 9 == 130560; the u64 intermediate is 130560 * 65536, well
        // past 32 bits before the shift back down.
        assert_eq!(profile.scaled_basis(9), 255 << 9);
    }

    #[test]
    fn concurrent_reader_never_sees_mixed_table() {
        let profile = Arc::new(BrightnessProfile::new());
        profile.set_basis(6);
        profile.set_intensity(1.0);
        let full = profile.snapshot();
        profile.set_intensity(0.25);
        let quarter = profile.snapshot();

        let writer = {
            let profile = Arc::clone(&profile);
            thread::spawn(move || {
                for i in 0..2000 {
                    profile.set_intensity(if i % 2 == 0 { 1.0 } else { 0.25 });
                }
            })
        };

        for _ in 0..2000 {
            let seen = profile.snapshot();
            assert!(
                seen == full || seen == quarter,
                "observed mixed table: {seen:?}"
            );
        }
        writer.join().unwrap();
    }
}
