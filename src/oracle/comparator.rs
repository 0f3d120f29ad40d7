//! Oracle comparator: decides whether a candidate output is equivalent to a
//! reference output.
//!
//! Sample-domain metrics (max absolute and RMS difference) are reported next
//! to a spectral-magnitude correlation. A phase-only divergence can be
//! inaudible while failing a strict sample comparison; having both numbers
//! lets a caller tell "numerically different but equivalent" from "wrong".

use serde::{Deserialize, Serialize};

use crate::core::types::SampleBuffer;
use crate::error::{OracleError, Result};
use crate::oracle::tolerance::ToleranceConfig;
use crate::pvoc::analyzer::Analyzer;
use crate::pvoc::stream::AnalysisStream;

/// Energy below which a magnitude spectrum counts as silent.
const SILENCE_ENERGY: f64 = 1e-24;

/// Immutable result of one comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    /// Largest absolute difference (samples, or magnitudes for stream comparisons).
    pub max_abs_difference: f64,
    /// RMS difference (samples, or magnitudes for stream comparisons).
    pub rms_difference: f64,
    /// Mean per-frame cosine similarity of magnitude spectra.
    pub spectral_correlation: f64,
    /// Pearson correlation of the compared values.
    pub sample_correlation: f64,
    /// Whether every threshold in `tolerance` was met.
    pub passed: bool,
    /// Set when the lengths differed and were truncated to the common length.
    pub length_mismatch: bool,
    /// Reference length (samples per channel, or frames).
    pub reference_len: usize,
    /// Candidate length (samples per channel, or frames).
    pub candidate_len: usize,
    /// Length actually compared.
    pub compared_len: usize,
    /// Tolerances this report was judged against.
    pub tolerance: ToleranceConfig,
}

impl ComparisonReport {
    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} rms={:.3e} max={:.3e} spectral={:.6} sample_corr={:.6}{}",
            if self.passed { "PASS" } else { "FAIL" },
            self.rms_difference,
            self.max_abs_difference,
            self.spectral_correlation,
            self.sample_correlation,
            if self.length_mismatch {
                format!(
                    " (truncated {}/{} -> {})",
                    self.reference_len, self.candidate_len, self.compared_len
                )
            } else {
                String::new()
            }
        )
    }

    fn judge(&mut self) {
        let t = &self.tolerance;
        self.passed = self.rms_difference <= t.max_rms_difference
            && self.spectral_correlation >= t.min_spectral_correlation
            && t.max_abs_difference
                .map_or(true, |max| self.max_abs_difference <= max);
    }
}

/// Compares a candidate buffer against a reference buffer.
///
/// Pure: no side effects beyond logging.
///
/// # Errors
/// - `InvalidParameter` if `tolerance` is invalid.
/// - `InvalidInput` if channel counts or sample rates differ.
/// - `LengthMismatch` if the lengths differ by more than
///   `tolerance.length_allowance`. Smaller differences are truncated to the
///   common length and flagged in the report.
pub fn compare(
    reference: &SampleBuffer,
    candidate: &SampleBuffer,
    tolerance: &ToleranceConfig,
) -> Result<ComparisonReport> {
    tolerance.validate()?;
    if reference.channels() != candidate.channels() {
        return Err(OracleError::InvalidInput(format!(
            "channel count differs: reference {}, candidate {}",
            reference.channels(),
            candidate.channels()
        )));
    }
    if reference.sample_rate() != candidate.sample_rate() {
        return Err(OracleError::InvalidInput(format!(
            "sample rate differs: reference {}, candidate {}",
            reference.sample_rate(),
            candidate.sample_rate()
        )));
    }

    let reference_len = reference.num_frames();
    let candidate_len = candidate.num_frames();
    let compared_len = align(reference_len, candidate_len, tolerance.length_allowance)?;
    let length_mismatch = reference_len != candidate_len;
    if length_mismatch {
        log::warn!(
            "length differs ({} vs {}), comparing first {} samples",
            reference_len,
            candidate_len,
            compared_len
        );
    }

    let reference = reference.truncated(compared_len);
    let candidate = candidate.truncated(compared_len);
    let (max_abs_difference, rms_difference) =
        difference_metrics(reference.data().iter().zip(candidate.data()).map(|(&a, &b)| {
            (a as f64, b as f64)
        }));
    let sample_correlation = pearson(
        reference.data().iter().map(|&v| v as f64),
        candidate.data().iter().map(|&v| v as f64),
    );

    let analyzer = Analyzer::new(tolerance.analysis_params())?;
    let spectral_correlation =
        spectral_correlation(&analyzer.analyze(&reference)?, &analyzer.analyze(&candidate)?);

    let mut report = ComparisonReport {
        max_abs_difference,
        rms_difference,
        spectral_correlation,
        sample_correlation,
        passed: false,
        length_mismatch,
        reference_len,
        candidate_len,
        compared_len,
        tolerance: tolerance.clone(),
    };
    report.judge();
    Ok(report)
}

/// Compares two analysis streams directly.
///
/// Difference metrics and the Pearson correlation are measured on bin
/// magnitudes; lengths are frame counts. The length allowance is converted
/// to frames via the hop size.
///
/// # Errors
/// `InvalidInput` if the streams' transform metadata differ, plus the
/// conditions of [`compare`].
pub fn compare_streams(
    reference: &AnalysisStream,
    candidate: &AnalysisStream,
    tolerance: &ToleranceConfig,
) -> Result<ComparisonReport> {
    tolerance.validate()?;
    let (rm, cm) = (reference.metadata(), candidate.metadata());
    if rm.fft_size != cm.fft_size
        || rm.hop_size != cm.hop_size
        || rm.window_type != cm.window_type
        || rm.sample_rate != cm.sample_rate
        || rm.channel_count != cm.channel_count
    {
        return Err(OracleError::InvalidInput(format!(
            "stream metadata differs: {:?} vs {:?}",
            rm, cm
        )));
    }

    let reference_len = reference.frame_count();
    let candidate_len = candidate.frame_count();
    let allowance_frames = tolerance.length_allowance / rm.hop_size;
    let compared_len = align(reference_len, candidate_len, allowance_frames).map_err(|_| {
        OracleError::LengthMismatch {
            reference: reference_len * rm.hop_size,
            candidate: candidate_len * rm.hop_size,
            allowance: tolerance.length_allowance,
        }
    })?;

    let magnitudes = |stream: &AnalysisStream| -> Vec<f64> {
        stream
            .channels()
            .iter()
            .flat_map(|frames| frames[..compared_len].iter())
            .flat_map(|frame| frame.magnitudes.iter().copied())
            .collect()
    };
    let (ref_mags, cand_mags) = (magnitudes(reference), magnitudes(candidate));
    let (max_abs_difference, rms_difference) =
        difference_metrics(ref_mags.iter().copied().zip(cand_mags.iter().copied()));

    let mut report = ComparisonReport {
        max_abs_difference,
        rms_difference,
        spectral_correlation: spectral_correlation(reference, candidate),
        sample_correlation: pearson(ref_mags.iter().copied(), cand_mags.iter().copied()),
        passed: false,
        length_mismatch: reference_len != candidate_len,
        reference_len,
        candidate_len,
        compared_len,
        tolerance: tolerance.clone(),
    };
    report.judge();
    Ok(report)
}

/// Mean per-frame cosine similarity of magnitude spectra across all channels.
///
/// Frames are paired up to the shorter stream. Bit-identical frames and pairs
/// of silent frames score exactly 1.0; a silent frame against a non-silent one
/// scores 0.0. Two streams with no frames score 1.0.
pub fn spectral_correlation(a: &AnalysisStream, b: &AnalysisStream) -> f64 {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    for (frames_a, frames_b) in a.channels().iter().zip(b.channels()) {
        for (fa, fb) in frames_a.iter().zip(frames_b) {
            sum += frame_correlation(&fa.magnitudes, &fb.magnitudes);
            count += 1;
        }
    }
    if count == 0 {
        return if a.frame_count() == b.frame_count() { 1.0 } else { 0.0 };
    }
    sum / count as f64
}

/// Cosine similarity of two magnitude spectra.
fn frame_correlation(a: &[f64], b: &[f64]) -> f64 {
    if a == b {
        return 1.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    match (norm_a < SILENCE_ENERGY, norm_b < SILENCE_ENERGY) {
        (true, true) => 1.0,
        (true, false) | (false, true) => 0.0,
        (false, false) => (dot / (norm_a * norm_b).sqrt()).clamp(-1.0, 1.0),
    }
}

/// Pearson correlation. Identical constant inputs score 1.0, otherwise a
/// zero-variance input scores 0.0.
pub fn pearson(a: impl Iterator<Item = f64>, b: impl Iterator<Item = f64>) -> f64 {
    let mut n = 0.0f64;
    let (mut sum_a, mut sum_b, mut sum_aa, mut sum_bb, mut sum_ab) = (0.0, 0.0, 0.0, 0.0, 0.0);
    let mut identical = true;
    for (x, y) in a.zip(b) {
        n += 1.0;
        sum_a += x;
        sum_b += y;
        sum_aa += x * x;
        sum_bb += y * y;
        sum_ab += x * y;
        identical &= x == y;
    }
    if identical {
        return 1.0;
    }
    let var_a = n * sum_aa - sum_a * sum_a;
    let var_b = n * sum_bb - sum_b * sum_b;
    let denom = (var_a * var_b).sqrt();
    if denom <= 0.0 || !denom.is_finite() {
        return 0.0;
    }
    ((n * sum_ab - sum_a * sum_b) / denom).clamp(-1.0, 1.0)
}

/// Common length, or `LengthMismatch` if the lengths differ by more than `allowance`.
fn align(reference_len: usize, candidate_len: usize, allowance: usize) -> Result<usize> {
    if reference_len.abs_diff(candidate_len) > allowance {
        return Err(OracleError::LengthMismatch {
            reference: reference_len,
            candidate: candidate_len,
            allowance,
        });
    }
    Ok(reference_len.min(candidate_len))
}

/// Max absolute and RMS difference over paired values.
fn difference_metrics(pairs: impl Iterator<Item = (f64, f64)>) -> (f64, f64) {
    let mut max_abs = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut n = 0usize;
    for (a, b) in pairs {
        let d = a - b;
        max_abs = max_abs.max(d.abs());
        sum_sq += d * d;
        n += 1;
    }
    let rms = if n == 0 { 0.0 } else { (sum_sq / n as f64).sqrt() };
    (max_abs, rms)
}
