//! Window functions for spectral analysis and resynthesis.
//!
//! Windows are generated periodic (DFT-even: the denominator is the length,
//! not length - 1) so that squared windows overlap-add to an exact constant
//! at integer overlap factors.
//!
//! COLA here means the weighted overlap-add condition: the sum of *squared*
//! windows shifted by the hop size is constant over time. The analyzer applies
//! the window once and the synthesizer applies it again, so the squared sum is
//! what the overlap-add denominator sees.
//!
//! Hop requirements per window type (length `N`, hop `H`):
//!
//! | Type        | COLA when                                        |
//! |-------------|--------------------------------------------------|
//! | Rectangular | `H` divides `N`                                  |
//! | Hann        | `N / H` is an integer >= 3 (75% overlap or more) |
//! | Hamming     | `N / H` is an integer >= 3                       |
//! | Blackman    | `N / H` is an integer >= 5                       |
//! | Kaiser      | never exact; beta 8 needs `H <= N / 8`           |
//!
//! The table is guidance. The decision is made numerically by
//! [`Window::check_cola`], which rejects any combination whose measured ripple
//! exceeds [`COLA_RIPPLE_TOLERANCE`].

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OracleError, Result};

/// Hamming window coefficients.
const HAMMING_A0: f64 = 0.54;
const HAMMING_A1: f64 = 0.46;

/// Blackman window coefficients (3-term, classic).
const BLACKMAN_A0: f64 = 0.42;
const BLACKMAN_A1: f64 = 0.5;
const BLACKMAN_A2: f64 = 0.08;

/// Maximum relative ripple of the squared overlap-add accepted as COLA.
pub const COLA_RIPPLE_TOLERANCE: f64 = 1e-4;

/// Window function types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum WindowType {
    Rectangular,
    Hann,
    Hamming,
    Blackman,
    Kaiser(u32), // beta parameter scaled by 100 (e.g., 800 = 8.0)
}

impl WindowType {
    /// Stable numeric tag used by the binary stream format.
    pub(crate) fn tag(self) -> (u8, u32) {
        match self {
            WindowType::Rectangular => (0, 0),
            WindowType::Hann => (1, 0),
            WindowType::Hamming => (2, 0),
            WindowType::Blackman => (3, 0),
            WindowType::Kaiser(beta_100) => (4, beta_100),
        }
    }

    /// Inverse of [`WindowType::tag`].
    pub(crate) fn from_tag(tag: u8, param: u32) -> Result<Self> {
        match tag {
            0 => Ok(WindowType::Rectangular),
            1 => Ok(WindowType::Hann),
            2 => Ok(WindowType::Hamming),
            3 => Ok(WindowType::Blackman),
            4 => Ok(WindowType::Kaiser(param)),
            other => Err(OracleError::InvalidParameter(format!(
                "unsupported window tag {}",
                other
            ))),
        }
    }

    /// Kaiser beta as a float, or `None` for other window types.
    pub fn kaiser_beta(self) -> Option<f64> {
        match self {
            WindowType::Kaiser(beta_100) => Some(beta_100 as f64 / 100.0),
            _ => None,
        }
    }
}

impl fmt::Display for WindowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowType::Rectangular => write!(f, "rectangular"),
            WindowType::Hann => write!(f, "hann"),
            WindowType::Hamming => write!(f, "hamming"),
            WindowType::Blackman => write!(f, "blackman"),
            WindowType::Kaiser(beta_100) => {
                write!(f, "kaiser:{}.{:02}", beta_100 / 100, beta_100 % 100)
            }
        }
    }
}

impl FromStr for WindowType {
    type Err = OracleError;

    /// Parses `rectangular`, `hann`, `hamming`, `blackman`, or `kaiser:<beta>`.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "rectangular" | "rect" => return Ok(WindowType::Rectangular),
            "hann" | "hanning" => return Ok(WindowType::Hann),
            "hamming" => return Ok(WindowType::Hamming),
            "blackman" => return Ok(WindowType::Blackman),
            _ => {}
        }
        if let Some(beta) = lower.strip_prefix("kaiser:") {
            let beta: f64 = beta.parse().map_err(|_| {
                OracleError::InvalidParameter(format!("invalid kaiser beta in '{}'", s))
            })?;
            if !beta.is_finite() || beta < 0.0 || beta * 100.0 > u32::MAX as f64 {
                return Err(OracleError::InvalidParameter(format!(
                    "kaiser beta out of range: {}",
                    beta
                )));
            }
            return Ok(WindowType::Kaiser((beta * 100.0).round() as u32));
        }
        Err(OracleError::InvalidParameter(format!(
            "unsupported window type '{}'",
            s
        )))
    }
}

impl From<WindowType> for String {
    fn from(w: WindowType) -> Self {
        w.to_string()
    }
}

impl TryFrom<String> for WindowType {
    type Error = OracleError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// A generated window: fixed-length weights plus the type they came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    window_type: WindowType,
    coefficients: Vec<f64>,
}

impl Window {
    /// Window type.
    #[inline]
    pub fn window_type(&self) -> WindowType {
        self.window_type
    }

    /// Window length.
    #[inline]
    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    /// Always false; zero-length windows are rejected at generation.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }

    /// Window weights.
    #[inline]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Relative ripple of the squared windows overlap-added at `hop`.
    ///
    /// Returns `(max - min) / max` of the steady-state sum, `1.0` when the
    /// hop leaves gaps, and infinity for a zero hop or an all-zero window.
    pub fn cola_ripple(&self, hop: usize) -> f64 {
        let n = self.coefficients.len();
        if hop == 0 || n == 0 {
            return f64::INFINITY;
        }
        let mut min_sum = f64::MAX;
        let mut max_sum = 0.0f64;
        for offset in 0..hop {
            let sum: f64 = self
                .coefficients
                .iter()
                .skip(offset)
                .step_by(hop)
                .map(|w| w * w)
                .sum();
            min_sum = min_sum.min(sum);
            max_sum = max_sum.max(sum);
        }
        if max_sum <= 0.0 {
            return f64::INFINITY;
        }
        (max_sum - min_sum) / max_sum
    }

    /// Fails with `InvalidParameter` if this window is not COLA at `hop`.
    pub fn check_cola(&self, hop: usize) -> Result<()> {
        let ripple = self.cola_ripple(hop);
        if ripple > COLA_RIPPLE_TOLERANCE {
            return Err(OracleError::InvalidParameter(format!(
                "{} window of length {} is not COLA at hop {} (ripple {:.3e})",
                self.window_type,
                self.len(),
                hop,
                ripple
            )));
        }
        Ok(())
    }
}

/// Generates a window of the specified type and length.
///
/// # Errors
/// Returns `OracleError::InvalidParameter` if `length` is 0.
pub fn generate_window(window_type: WindowType, length: usize) -> Result<Window> {
    if length == 0 {
        return Err(OracleError::InvalidParameter(
            "window length must be greater than 0".to_string(),
        ));
    }
    let coefficients = match window_type {
        WindowType::Rectangular => vec![1.0; length],
        WindowType::Hann => cosine_window(length, &[0.5, 0.5]),
        WindowType::Hamming => cosine_window(length, &[HAMMING_A0, HAMMING_A1]),
        WindowType::Blackman => cosine_window(length, &[BLACKMAN_A0, BLACKMAN_A1, BLACKMAN_A2]),
        WindowType::Kaiser(beta_100) => kaiser_window(length, beta_100 as f64 / 100.0),
    };
    Ok(Window {
        window_type,
        coefficients,
    })
}

/// Generalized cosine window: `a0 - a1 cos(x) + a2 cos(2x) - ...`.
#[inline]
fn cosine_window(size: usize, terms: &[f64]) -> Vec<f64> {
    if size == 1 {
        return vec![1.0];
    }
    let n = size as f64;
    (0..size)
        .map(|i| {
            let x = 2.0 * PI * i as f64 / n;
            terms
                .iter()
                .enumerate()
                .map(|(k, &a)| {
                    let sign = if k % 2 == 0 { 1.0 } else { -1.0 };
                    sign * a * (k as f64 * x).cos()
                })
                .sum()
        })
        .collect()
}

/// Generates a Kaiser window using the zeroth-order modified Bessel function.
#[inline]
fn kaiser_window(size: usize, beta: f64) -> Vec<f64> {
    if size == 1 {
        return vec![1.0];
    }
    let n = size as f64;
    let denom = bessel_i0(beta);
    (0..size)
        .map(|i| {
            let x = 2.0 * i as f64 / n - 1.0;
            let arg = beta * (1.0 - x * x).max(0.0).sqrt();
            bessel_i0(arg) / denom
        })
        .collect()
}

/// Maximum number of series terms for Bessel I0 convergence.
const BESSEL_MAX_TERMS: usize = 50;
/// Relative convergence threshold for Bessel I0 series.
const BESSEL_CONVERGENCE: f64 = 1e-16;

/// Zeroth-order modified Bessel function of the first kind.
/// Computed via series expansion.
#[inline]
fn bessel_i0(x: f64) -> f64 {
    let mut sum = 1.0;
    let mut term = 1.0;
    let x_half = x / 2.0;
    for k in 1..BESSEL_MAX_TERMS {
        term *= (x_half / k as f64) * (x_half / k as f64);
        sum += term;
        if term < BESSEL_CONVERGENCE * sum {
            break;
        }
    }
    sum
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_length_rejected() {
        let err = generate_window(WindowType::Hann, 0).unwrap_err();
        assert!(matches!(err, OracleError::InvalidParameter(_)));
    }

    #[test]
    fn test_single_sample_window() {
        for wt in [
            WindowType::Rectangular,
            WindowType::Hann,
            WindowType::Hamming,
            WindowType::Blackman,
            WindowType::Kaiser(800),
        ] {
            assert_eq!(generate_window(wt, 1).unwrap().coefficients(), &[1.0]);
        }
    }

    #[test]
    fn test_hann_window_properties() {
        let w = generate_window(WindowType::Hann, 1024).unwrap();
        let c = w.coefficients();
        assert_eq!(c.len(), 1024);
        // Periodic: starts at zero, peaks at N/2, symmetric about N/2
        assert!(c[0].abs() < 1e-12);
        assert!((c[512] - 1.0).abs() < 1e-12);
        for i in 1..512 {
            assert!((c[i] - c[1024 - i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_hamming_and_blackman_endpoints() {
        let h = generate_window(WindowType::Hamming, 256).unwrap();
        assert!((h.coefficients()[0] - 0.08).abs() < 1e-12);
        let b = generate_window(WindowType::Blackman, 256).unwrap();
        assert!(b.coefficients()[0].abs() < 1e-12);
        assert!((b.coefficients()[128] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_kaiser_window_peak() {
        let w = generate_window(WindowType::Kaiser(800), 1024).unwrap();
        let c = w.coefficients();
        let mid = c[512];
        assert!((mid - 1.0).abs() < 1e-12);
        assert!(c.iter().all(|&v| v <= mid + 1e-12));
    }

    #[test]
    fn test_hann_cola_requirements() {
        let w = generate_window(WindowType::Hann, 1024).unwrap();
        assert!(w.check_cola(256).is_ok());
        assert!(w.check_cola(128).is_ok());
        // Squared Hann at 50% overlap ripples by 50%
        assert!(w.check_cola(512).is_err());
        assert!(w.check_cola(0).is_err());
        assert!(w.check_cola(2048).is_err());
    }

    #[test]
    fn test_rectangular_cola_requires_divisor() {
        let w = generate_window(WindowType::Rectangular, 1024).unwrap();
        assert!(w.check_cola(1024).is_ok());
        assert!(w.check_cola(256).is_ok());
        assert!(w.check_cola(300).is_err());
    }

    #[test]
    fn test_blackman_cola_requirements() {
        let w = generate_window(WindowType::Blackman, 1024).unwrap();
        assert!(w.check_cola(256).is_err());
        assert!(w.check_cola(128).is_ok());
    }

    #[test]
    fn test_kaiser_cola_requirements() {
        let w = generate_window(WindowType::Kaiser(800), 1024).unwrap();
        assert!(w.check_cola(512).is_err());
        assert!(w.check_cola(128).is_ok());
    }

    #[test]
    fn test_window_type_names() {
        assert_eq!("hann".parse::<WindowType>().unwrap(), WindowType::Hann);
        assert_eq!(
            "kaiser:8.0".parse::<WindowType>().unwrap(),
            WindowType::Kaiser(800)
        );
        assert_eq!(WindowType::Kaiser(850).to_string(), "kaiser:8.50");
        assert_eq!(
            WindowType::Kaiser(850).to_string().parse::<WindowType>().unwrap(),
            WindowType::Kaiser(850)
        );
        let err = "triangle".parse::<WindowType>().unwrap_err();
        assert!(matches!(err, OracleError::InvalidParameter(_)));
        assert!("kaiser:abc".parse::<WindowType>().is_err());
    }

    #[test]
    fn test_window_tag_round_trip() {
        for wt in [
            WindowType::Rectangular,
            WindowType::Hann,
            WindowType::Hamming,
            WindowType::Blackman,
            WindowType::Kaiser(425),
        ] {
            let (tag, param) = wt.tag();
            assert_eq!(WindowType::from_tag(tag, param).unwrap(), wt);
        }
        assert!(WindowType::from_tag(9, 0).is_err());
    }
}
