//! Utility functions and helpers for the emulator
//!
//! Small numeric helpers shared by the audio pipeline, the timing model and
//! the bus glue.

/// Reduce the fraction `n / d` and return the reduced denominator
pub fn reduced_denominator(n: u32, d: u32) -> u32 {
    let divisor = gcd(n, d);
    if divisor == 0 {
        d
    } else {
        d / divisor
    }
}

/// Greatest common divisor (Euclid)
pub fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Integer division rounding up
#[inline]
pub fn div_ceil(value: u64, divisor: u64) -> u64 {
    (value + divisor - 1) / divisor
}
