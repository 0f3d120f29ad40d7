//! FFT-related constants and utilities shared across the crate.

use rustfft::num_complex::Complex;
use std::f64::consts::PI;

/// Zero-valued complex number, used for FFT buffer initialization.
pub const COMPLEX_ZERO: Complex<f64> = Complex::new(0.0, 0.0);

/// Full turn in radians.
pub const TWO_PI: f64 = 2.0 * PI;

/// Floor for the overlap-add window-sum denominator. Samples whose squared
/// window sum falls below it are left at zero rather than amplified.
pub const WINDOW_SUM_EPSILON: f64 = 1e-12;

/// Number of non-redundant bins of a real FFT of `fft_size` points.
#[inline]
pub fn num_bins(fft_size: usize) -> usize {
    fft_size / 2 + 1
}

/// Wraps a phase value into (-PI, PI].
#[inline]
pub fn wrap_phase(phase: f64) -> f64 {
    phase - TWO_PI * ((phase - PI) / TWO_PI).ceil()
}

/// Nominal centre frequency of `bin` in Hz.
#[inline]
pub fn bin_frequency(bin: usize, fft_size: usize, sample_rate: u32) -> f64 {
    bin as f64 * sample_rate as f64 / fft_size as f64
}
