//! Pluggable operations on analysis streams.
//!
//! A [`SpectralTransform`] maps one [`AnalysisStream`] to another. Transforms
//! that alter magnitudes or frequencies re-integrate phases from the
//! instantaneous frequencies so the result stays resynthesizable.

use crate::core::fft::{bin_frequency, TWO_PI};
use crate::error::{OracleError, Result};
use crate::pvoc::stream::{expected_frame_count, AnalysisStream, SpectralFrame, StreamMetadata};

/// An operation on an analysis stream (blur, stretch, pitch-shift, ...).
pub trait SpectralTransform: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Produces a new stream; the input is left untouched.
    fn apply(&self, stream: &AnalysisStream) -> Result<AnalysisStream>;
}

/// Scales every magnitude by a constant factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralGain {
    gain: f64,
}

impl SpectralGain {
    /// # Errors
    /// `InvalidParameter` if `gain` is negative or not finite.
    pub fn new(gain: f64) -> Result<Self> {
        if !gain.is_finite() || gain < 0.0 {
            return Err(OracleError::InvalidParameter(format!(
                "spectral gain must be finite and non-negative, got {}",
                gain
            )));
        }
        Ok(Self { gain })
    }
}

impl SpectralTransform for SpectralGain {
    fn name(&self) -> &str {
        "gain"
    }

    fn apply(&self, stream: &AnalysisStream) -> Result<AnalysisStream> {
        let (metadata, mut channels) = stream.clone().into_parts();
        for frame in channels.iter_mut().flatten() {
            for m in frame.magnitudes.iter_mut() {
                *m *= self.gain;
            }
        }
        AnalysisStream::new(metadata, channels)
    }
}

/// Time-averages magnitudes and frequencies across neighbouring frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpectralBlur {
    windows: usize,
}

impl SpectralBlur {
    /// Averages across `windows` frames, rounded up to the next odd count.
    ///
    /// # Errors
    /// `InvalidParameter` if `windows` is 0.
    pub fn new(windows: usize) -> Result<Self> {
        if windows == 0 {
            return Err(OracleError::InvalidParameter(
                "blur window count must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            windows: windows | 1,
        })
    }

    /// Effective (odd) frame count averaged over.
    #[inline]
    pub fn windows(&self) -> usize {
        self.windows
    }
}

impl SpectralTransform for SpectralBlur {
    fn name(&self) -> &str {
        "blur"
    }

    fn apply(&self, stream: &AnalysisStream) -> Result<AnalysisStream> {
        let meta = *stream.metadata();
        let span = self.windows / 2;
        let channels = stream
            .channels()
            .iter()
            .map(|frames| {
                let n = frames.len();
                let averaged: Vec<(Vec<f64>, Vec<f64>)> = (0..n)
                    .map(|idx| {
                        let start = idx.saturating_sub(span);
                        let end = (idx + span + 1).min(n);
                        let neighbours = &frames[start..end];
                        (
                            mean_of(neighbours.iter().map(|f| f.magnitudes.as_slice())),
                            mean_of(neighbours.iter().map(|f| f.frequencies.as_slice())),
                        )
                    })
                    .collect();
                rebuild_frames(&meta, first_phases(frames), averaged)
            })
            .collect();
        AnalysisStream::new(meta, channels)
    }
}

/// Changes duration by resampling the frame sequence, keeping pitch.
///
/// Output frame `k` reads input position `k / factor`, linearly interpolating
/// magnitude and frequency between neighbouring frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeStretch {
    factor: f64,
}

/// Accepted stretch factor range.
const STRETCH_RANGE: std::ops::RangeInclusive<f64> = 0.01..=100.0;

impl TimeStretch {
    /// `factor > 1` lengthens, `factor < 1` shortens.
    ///
    /// # Errors
    /// `InvalidParameter` unless `factor` lies within 0.01..=100.
    pub fn new(factor: f64) -> Result<Self> {
        if !STRETCH_RANGE.contains(&factor) {
            return Err(OracleError::InvalidParameter(format!(
                "stretch factor must be between 0.01 and 100, got {}",
                factor
            )));
        }
        Ok(Self { factor })
    }

    /// The stretch factor.
    #[inline]
    pub fn factor(&self) -> f64 {
        self.factor
    }
}

impl SpectralTransform for TimeStretch {
    fn name(&self) -> &str {
        "stretch"
    }

    fn apply(&self, stream: &AnalysisStream) -> Result<AnalysisStream> {
        let mut meta = *stream.metadata();
        meta.sample_count = (meta.sample_count as f64 * self.factor).round() as usize;
        let in_frames = stream.frame_count();
        // Enough frames to cover the stretched length
        let out_frames = if in_frames == 0 {
            0
        } else {
            expected_frame_count(meta.sample_count, meta.fft_size, meta.hop_size).max(1)
        };

        let channels = stream
            .channels()
            .iter()
            .map(|frames| {
                let resampled: Vec<(Vec<f64>, Vec<f64>)> = (0..out_frames)
                    .map(|out_idx| {
                        let pos = out_idx as f64 / self.factor;
                        let idx = pos.floor() as usize;
                        if idx + 1 >= in_frames {
                            let last = &frames[in_frames - 1];
                            return (last.magnitudes.clone(), last.frequencies.clone());
                        }
                        let frac = pos - idx as f64;
                        let (a, b) = (&frames[idx], &frames[idx + 1]);
                        (
                            lerp(&a.magnitudes, &b.magnitudes, frac),
                            lerp(&a.frequencies, &b.frequencies, frac),
                        )
                    })
                    .collect();
                rebuild_frames(&meta, first_phases(frames), resampled)
            })
            .collect();
        AnalysisStream::new(meta, channels)
    }
}

/// Converts a pitch factor to semitones (2.0 is +12).
pub fn factor_to_semitones(factor: f64) -> f64 {
    12.0 * factor.log2()
}

/// Converts semitones to a pitch factor (-12 is 0.5).
pub fn semitones_to_factor(semitones: f64) -> f64 {
    2.0_f64.powf(semitones / 12.0)
}

/// Accepted pitch factor range.
const PITCH_RANGE: std::ops::RangeInclusive<f64> = 0.1..=10.0;

/// Bins either side of a bin averaged into the spectral envelope.
const ENVELOPE_HALF_WIDTH: usize = 8;

/// Changes pitch by moving bins, keeping duration.
///
/// Bin `b` moves to `round(b * factor)` with its frequency scaled by
/// `factor`; bins moved past Nyquist are dropped. Magnitudes landing on the
/// same bin add up. With formant preservation the shifted magnitudes are
/// reweighted so the smoothed spectral envelope stays where it was.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PitchShift {
    factor: f64,
    preserve_formants: bool,
}

impl PitchShift {
    /// `factor > 1` raises pitch, `factor < 1` lowers it.
    ///
    /// # Errors
    /// `InvalidParameter` unless `factor` lies within 0.1..=10.
    pub fn new(factor: f64) -> Result<Self> {
        if !PITCH_RANGE.contains(&factor) {
            return Err(OracleError::InvalidParameter(format!(
                "pitch factor must be between 0.1 and 10, got {}",
                factor
            )));
        }
        Ok(Self {
            factor,
            preserve_formants: false,
        })
    }

    /// Shift by a signed number of semitones.
    pub fn from_semitones(semitones: f64) -> Result<Self> {
        Self::new(semitones_to_factor(semitones))
    }

    /// Keep the spectral envelope in place while the partials move.
    pub fn with_formant_preservation(mut self) -> Self {
        self.preserve_formants = true;
        self
    }

    /// The pitch factor.
    #[inline]
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Shifted (magnitudes, frequencies, phases) of one frame.
    fn shift_frame(&self, frame: &SpectralFrame, meta: &StreamMetadata) -> [Vec<f64>; 3] {
        let bins = frame.num_bins();
        let mut magnitudes = vec![0.0; bins];
        let mut frequencies: Vec<f64> = (0..bins)
            .map(|b| bin_frequency(b, meta.fft_size, meta.sample_rate))
            .collect();
        let mut phases = vec![0.0; bins];
        // Strongest contribution so far per destination bin
        let mut strongest = vec![-1.0f64; bins];

        for src in 0..bins {
            let dst = (src as f64 * self.factor).round() as usize;
            if dst >= bins {
                break;
            }
            let mag = frame.magnitudes[src];
            magnitudes[dst] += mag;
            if mag > strongest[dst] {
                strongest[dst] = mag;
                frequencies[dst] = frame.frequencies[src] * self.factor;
                phases[dst] = frame.phases[src];
            }
        }

        if self.preserve_formants {
            let original = spectral_envelope(&frame.magnitudes);
            let shifted = spectral_envelope(&magnitudes);
            for ((m, &o), &s) in magnitudes.iter_mut().zip(&original).zip(&shifted) {
                if s > 0.0 {
                    *m *= o / s;
                }
            }
        }
        [magnitudes, frequencies, phases]
    }
}

impl SpectralTransform for PitchShift {
    fn name(&self) -> &str {
        "pitch"
    }

    fn apply(&self, stream: &AnalysisStream) -> Result<AnalysisStream> {
        let meta = *stream.metadata();
        let channels = stream
            .channels()
            .iter()
            .map(|frames| {
                let mut initial = Vec::new();
                let shifted: Vec<(Vec<f64>, Vec<f64>)> = frames
                    .iter()
                    .enumerate()
                    .map(|(idx, frame)| {
                        let [magnitudes, frequencies, phases] = self.shift_frame(frame, &meta);
                        if idx == 0 {
                            initial = phases;
                        }
                        (magnitudes, frequencies)
                    })
                    .collect();
                rebuild_frames(&meta, initial, shifted)
            })
            .collect();
        AnalysisStream::new(meta, channels)
    }
}

/// Moving average of `magnitudes` over `2 * ENVELOPE_HALF_WIDTH + 1` bins.
fn spectral_envelope(magnitudes: &[f64]) -> Vec<f64> {
    let n = magnitudes.len();
    (0..n)
        .map(|b| {
            let start = b.saturating_sub(ENVELOPE_HALF_WIDTH);
            let end = (b + ENVELOPE_HALF_WIDTH + 1).min(n);
            magnitudes[start..end].iter().sum::<f64>() / (end - start) as f64
        })
        .collect()
}

/// Builds frames from (magnitudes, frequencies) pairs, integrating phases
/// from the frequencies starting at `initial_phases`.
fn rebuild_frames(
    meta: &StreamMetadata,
    initial_phases: Vec<f64>,
    values: Vec<(Vec<f64>, Vec<f64>)>,
) -> Vec<SpectralFrame> {
    let scale = TWO_PI * meta.hop_size as f64 / meta.sample_rate as f64;
    let mut phases = initial_phases;
    values
        .into_iter()
        .enumerate()
        .map(|(idx, (magnitudes, frequencies))| {
            if idx > 0 {
                for (p, &f) in phases.iter_mut().zip(&frequencies) {
                    *p += f * scale;
                }
            }
            SpectralFrame::new(
                idx,
                meta.hop_size,
                meta.sample_rate,
                magnitudes,
                phases.clone(),
                frequencies,
            )
        })
        .collect()
}

fn first_phases(frames: &[SpectralFrame]) -> Vec<f64> {
    frames.first().map(|f| f.phases.clone()).unwrap_or_default()
}

fn mean_of<'a>(rows: impl Iterator<Item = &'a [f64]>) -> Vec<f64> {
    let mut sum: Vec<f64> = Vec::new();
    let mut count = 0usize;
    for row in rows {
        if sum.is_empty() {
            sum = vec![0.0; row.len()];
        }
        for (s, &v) in sum.iter_mut().zip(row) {
            *s += v;
        }
        count += 1;
    }
    if count > 0 {
        for s in sum.iter_mut() {
            *s /= count as f64;
        }
    }
    sum
}

#[inline]
fn lerp(a: &[f64], b: &[f64], frac: f64) -> Vec<f64> {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| x + (y - x) * frac)
        .collect()
}
