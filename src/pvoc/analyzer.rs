//! Forward STFT with per-bin instantaneous frequency tracking.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::core::fft::{bin_frequency, num_bins, wrap_phase, COMPLEX_ZERO, TWO_PI};
use crate::core::types::SampleBuffer;
use crate::core::window::{generate_window, Window, WindowType};
use crate::error::{OracleError, Result};
use crate::pvoc::stream::{expected_frame_count, AnalysisStream, SpectralFrame, StreamMetadata};

/// Default FFT size.
pub const DEFAULT_FFT_SIZE: usize = 1024;
/// Default hop size (75% overlap at the default FFT size).
pub const DEFAULT_HOP_SIZE: usize = 256;

/// STFT parameters shared by analysis and resynthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub fft_size: usize,
    pub hop_size: usize,
    pub window_type: WindowType,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            fft_size: DEFAULT_FFT_SIZE,
            hop_size: DEFAULT_HOP_SIZE,
            window_type: WindowType::Hann,
        }
    }
}

impl AnalysisParams {
    /// Create analysis parameters.
    pub fn new(fft_size: usize, hop_size: usize, window_type: WindowType) -> Self {
        Self {
            fft_size,
            hop_size,
            window_type,
        }
    }

    /// Validates the parameters and returns the analysis window.
    ///
    /// # Errors
    /// `InvalidInput` when `fft_size` or `hop_size` is 0 or `hop_size > fft_size`;
    /// `InvalidParameter` when the window is not COLA at `hop_size`.
    pub fn validate(&self) -> Result<Window> {
        if self.fft_size == 0 {
            return Err(OracleError::InvalidInput(
                "fft size must be greater than 0".to_string(),
            ));
        }
        if self.hop_size == 0 {
            return Err(OracleError::InvalidInput(
                "hop size must be greater than 0".to_string(),
            ));
        }
        if self.hop_size > self.fft_size {
            return Err(OracleError::InvalidInput(format!(
                "hop size {} exceeds fft size {}",
                self.hop_size, self.fft_size
            )));
        }
        let window = generate_window(self.window_type, self.fft_size)?;
        window.check_cola(self.hop_size)?;
        Ok(window)
    }
}

/// Forward STFT engine.
///
/// Holds only immutable state (window and FFT plan), so one analyzer can be
/// shared across threads and called concurrently.
pub struct Analyzer {
    params: AnalysisParams,
    window: Window,
    forward: Arc<dyn Fft<f64>>,
    /// Pre-computed expected phase advance per bin over one hop.
    expected_phase_advance: Vec<f64>,
}

impl Analyzer {
    /// Creates an analyzer after validating `params`.
    pub fn new(params: AnalysisParams) -> Result<Self> {
        let window = params.validate()?;
        let forward = FftPlanner::new().plan_fft_forward(params.fft_size);
        let expected_phase_advance = (0..num_bins(params.fft_size))
            .map(|bin| TWO_PI * bin as f64 * params.hop_size as f64 / params.fft_size as f64)
            .collect();
        Ok(Self {
            params,
            window,
            forward,
            expected_phase_advance,
        })
    }

    /// The parameters this analyzer was built with.
    #[inline]
    pub fn params(&self) -> &AnalysisParams {
        &self.params
    }

    /// Analyzes every channel of `buffer`.
    ///
    /// An empty buffer yields an empty stream. Identical input always yields
    /// a bit-identical stream.
    pub fn analyze(&self, buffer: &SampleBuffer) -> Result<AnalysisStream> {
        let metadata = StreamMetadata {
            fft_size: self.params.fft_size,
            hop_size: self.params.hop_size,
            window_type: self.params.window_type,
            sample_rate: buffer.sample_rate(),
            channel_count: buffer.channels(),
            sample_count: buffer.num_frames(),
        };
        let channels: Vec<Vec<SpectralFrame>> = buffer
            .to_channels()
            .iter()
            .map(|samples| self.analyze_channel(samples, buffer.sample_rate()))
            .collect();
        log::debug!(
            "analyzed {} channel(s), {} samples into {} frames (fft {}, hop {}, {})",
            metadata.channel_count,
            metadata.sample_count,
            channels.first().map_or(0, Vec::len),
            metadata.fft_size,
            metadata.hop_size,
            metadata.window_type
        );
        AnalysisStream::new(metadata, channels)
    }

    fn analyze_channel(&self, samples: &[f32], sample_rate: u32) -> Vec<SpectralFrame> {
        let fft_size = self.params.fft_size;
        let hop = self.params.hop_size;
        let bins = num_bins(fft_size);
        let num_frames = expected_frame_count(samples.len(), fft_size, hop);
        let window = self.window.coefficients();
        let freq_scale = sample_rate as f64 / (TWO_PI * hop as f64);

        let mut buffer = vec![COMPLEX_ZERO; fft_size];
        let mut scratch = vec![COMPLEX_ZERO; self.forward.get_inplace_scratch_len()];
        let mut prev_phase = vec![0.0f64; bins];
        let mut phase_accum = vec![0.0f64; bins];
        let mut frames = Vec::with_capacity(num_frames);

        for frame_idx in 0..num_frames {
            let start = frame_idx * hop;
            // Window, zero-padding past the end of the signal
            for (i, slot) in buffer.iter_mut().enumerate() {
                let sample = samples.get(start + i).copied().unwrap_or(0.0) as f64;
                *slot = Complex::new(sample * window[i], 0.0);
            }
            self.forward.process_with_scratch(&mut buffer, &mut scratch);

            let mut magnitudes = Vec::with_capacity(bins);
            let mut frequencies = Vec::with_capacity(bins);
            for bin in 0..bins {
                let c = buffer[bin];
                let phase = c.arg();
                magnitudes.push(c.norm());
                if frame_idx == 0 {
                    phase_accum[bin] = phase;
                    frequencies.push(bin_frequency(bin, fft_size, sample_rate));
                } else {
                    let expected = self.expected_phase_advance[bin];
                    let deviation = wrap_phase(phase - prev_phase[bin] - expected);
                    let advance = expected + deviation;
                    phase_accum[bin] += advance;
                    frequencies.push(advance * freq_scale);
                }
                prev_phase[bin] = phase;
            }
            frames.push(SpectralFrame::new(
                frame_idx,
                hop,
                sample_rate,
                magnitudes,
                phase_accum.clone(),
                frequencies,
            ));
        }
        frames
    }
}

/// Analyzes `buffer` with the given STFT parameters.
pub fn analyze(
    buffer: &SampleBuffer,
    fft_size: usize,
    hop_size: usize,
    window_type: WindowType,
) -> Result<AnalysisStream> {
    Analyzer::new(AnalysisParams::new(fft_size, hop_size, window_type))?.analyze(buffer)
}
