//! Inverse STFT: phase reconstruction and weighted overlap-add.

use rustfft::{num_complex::Complex, FftPlanner};

use crate::core::fft::{COMPLEX_ZERO, TWO_PI, WINDOW_SUM_EPSILON};
use crate::core::types::{Sample, SampleBuffer};
use crate::core::window::generate_window;
use crate::error::{OracleError, Result};
use crate::pvoc::stream::{max_sample_count, AnalysisStream, SpectralFrame};

/// Resynthesizes analysis streams, optionally at a different hop size.
///
/// With the synthesis hop equal to the analysis hop, frames are rebuilt from
/// their stored unwrapped phases. With a different hop, phases are integrated
/// from the stored instantaneous frequencies, which changes duration without
/// changing pitch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Synthesizer {
    synthesis_hop: Option<usize>,
}

impl Synthesizer {
    /// Resynthesizes at the stream's own hop size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resynthesizes at `synthesis_hop` instead of the analysis hop.
    pub fn with_hop(synthesis_hop: usize) -> Self {
        Self {
            synthesis_hop: Some(synthesis_hop),
        }
    }

    /// The configured synthesis hop, if overridden.
    #[inline]
    pub fn synthesis_hop(&self) -> Option<usize> {
        self.synthesis_hop
    }

    /// Rebuilds a sample buffer from `stream`.
    ///
    /// # Errors
    /// `InvalidInput` when the stream has no frames or incomplete metadata;
    /// `InvalidParameter` when the synthesis hop is 0, exceeds the FFT size,
    /// or is not COLA for the stream's window.
    pub fn synthesize(&self, stream: &AnalysisStream) -> Result<SampleBuffer> {
        let meta = *stream.metadata();
        meta.validate()?;
        if stream.is_empty() {
            return Err(OracleError::InvalidInput(
                "cannot synthesize an empty analysis stream".to_string(),
            ));
        }

        let fft_size = meta.fft_size;
        let analysis_hop = meta.hop_size;
        let synthesis_hop = self.synthesis_hop.unwrap_or(analysis_hop);
        if synthesis_hop == 0 || synthesis_hop > fft_size {
            return Err(OracleError::InvalidParameter(format!(
                "synthesis hop {} invalid for fft size {}",
                synthesis_hop, fft_size
            )));
        }
        let window = generate_window(meta.window_type, fft_size)?;
        window.check_cola(synthesis_hop)?;
        let window = window.coefficients();

        let num_frames = stream.frame_count();
        let output_len = output_length(meta.sample_count, analysis_hop, synthesis_hop)?;
        let ola_len = max_sample_count(num_frames, fft_size, synthesis_hop)
            .ok_or_else(|| {
                OracleError::InvalidInput(format!(
                    "{} frames at hop {} overflow the output buffer",
                    num_frames, synthesis_hop
                ))
            })?
            .max(output_len);

        let inverse = FftPlanner::new().plan_fft_inverse(fft_size);
        let mut buffer = vec![COMPLEX_ZERO; fft_size];
        let mut scratch = vec![COMPLEX_ZERO; inverse.get_inplace_scratch_len()];
        let norm = 1.0 / fft_size as f64;

        // Squared-window sum is identical for every channel
        let mut window_sum = vec![0.0f64; ola_len];
        for frame_idx in 0..num_frames {
            let pos = frame_idx * synthesis_hop;
            for (i, &w) in window.iter().enumerate() {
                window_sum[pos + i] += w * w;
            }
        }

        let mut channels_out: Vec<Vec<Sample>> = Vec::with_capacity(stream.channels().len());
        for frames in stream.channels() {
            let phases = synthesis_phases(frames, synthesis_hop, analysis_hop, meta.sample_rate);
            let mut output = vec![0.0f64; ola_len];

            for (frame_idx, (frame, frame_phases)) in frames.iter().zip(&phases).enumerate() {
                reconstruct_spectrum(&mut buffer, &frame.magnitudes, frame_phases);
                inverse.process_with_scratch(&mut buffer, &mut scratch);

                let pos = frame_idx * synthesis_hop;
                for (i, &w) in window.iter().enumerate() {
                    output[pos + i] += buffer[i].re * norm * w;
                }
            }

            normalize_output(&mut output, &window_sum);
            output.truncate(output_len);
            channels_out.push(output.into_iter().map(|s| s as Sample).collect());
        }

        log::debug!(
            "synthesized {} frames into {} samples per channel (hop {} -> {})",
            num_frames,
            output_len,
            analysis_hop,
            synthesis_hop
        );
        SampleBuffer::from_channels(&channels_out, meta.sample_rate)
    }
}

/// Output samples per channel: `sample_count` scaled by the hop ratio.
fn output_length(sample_count: usize, analysis_hop: usize, synthesis_hop: usize) -> Result<usize> {
    if synthesis_hop == analysis_hop {
        return Ok(sample_count);
    }
    let len = (sample_count as f64 * synthesis_hop as f64 / analysis_hop as f64).round();
    if len >= usize::MAX as f64 {
        return Err(OracleError::InvalidInput(format!(
            "{} samples at hop {} -> {} overflow the output length",
            sample_count, analysis_hop, synthesis_hop
        )));
    }
    Ok(len as usize)
}

/// Phases to resynthesize each frame with.
///
/// At the analysis hop these are the stored unwrapped phases. Otherwise the
/// first frame keeps its phase and each later frame advances by its
/// instantaneous frequency over one synthesis hop.
fn synthesis_phases(
    frames: &[SpectralFrame],
    synthesis_hop: usize,
    analysis_hop: usize,
    sample_rate: u32,
) -> Vec<Vec<f64>> {
    if synthesis_hop == analysis_hop {
        return frames.iter().map(|f| f.phases.clone()).collect();
    }
    let scale = TWO_PI * synthesis_hop as f64 / sample_rate as f64;
    let mut out: Vec<Vec<f64>> = Vec::with_capacity(frames.len());
    for frame in frames {
        let next = match out.last() {
            None => frame.phases.clone(),
            Some(prev) => prev
                .iter()
                .zip(&frame.frequencies)
                .map(|(&p, &f)| p + f * scale)
                .collect(),
        };
        out.push(next);
    }
    out
}

/// Fills `buffer` with the complex spectrum for the given bins and mirrors the
/// negative frequencies so the inverse FFT yields a real signal.
fn reconstruct_spectrum(buffer: &mut [Complex<f64>], magnitudes: &[f64], phases: &[f64]) {
    let fft_size = buffer.len();
    let bins = magnitudes.len();
    for bin in 0..bins {
        buffer[bin] = Complex::from_polar(magnitudes[bin], phases[bin]);
    }
    for bin in 1..bins {
        let mirror = fft_size - bin;
        if mirror >= bins {
            buffer[mirror] = buffer[bin].conj();
        }
    }
}

/// Divides each sample by the local squared-window sum (the COLA denominator).
/// Samples no window reaches are left at zero.
fn normalize_output(output: &mut [f64], window_sum: &[f64]) {
    for (sample, &ws) in output.iter_mut().zip(window_sum.iter()) {
        if ws > WINDOW_SUM_EPSILON {
            *sample /= ws;
        } else {
            *sample = 0.0;
        }
    }
}

/// Resynthesizes `stream` at its own hop size.
pub fn synthesize(stream: &AnalysisStream) -> Result<SampleBuffer> {
    Synthesizer::new().synthesize(stream)
}
