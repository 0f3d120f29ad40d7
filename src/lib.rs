#![forbid(unsafe_code)]
//! Phase vocoder analysis/resynthesis with an oracle-validation harness.
//!
//! `pvoc_oracle` converts audio into a time-frequency [`AnalysisStream`]
//! (magnitude, unwrapped phase and instantaneous frequency per bin) and back,
//! and decides whether a candidate implementation's output is equivalent to
//! a trusted reference within caller-supplied tolerances.
//!
//! # Quick Start
//!
//! ```
//! use pvoc_oracle::{SampleBuffer, ToleranceConfig, WindowType};
//!
//! // 1 second of 440 Hz sine at 44.1 kHz
//! let data: Vec<f32> = (0..44100)
//!     .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
//!     .collect();
//! let input = SampleBuffer::mono(data, 44100).unwrap();
//!
//! let stream = pvoc_oracle::analyze(&input, 1024, 256, WindowType::Hann).unwrap();
//! let output = pvoc_oracle::synthesize(&stream).unwrap();
//!
//! let report = pvoc_oracle::compare(&input, &output, &ToleranceConfig::strict()).unwrap();
//! assert!(report.passed);
//! ```
//!
//! # Validating a corpus
//!
//! Reference and candidate are anything implementing [`Implementation`]:
//! an in-process closure, [`PvocRoundTrip`], or an [`ExternalCommand`]
//! exchanging WAV files with an executable.
//!
//! ```
//! use pvoc_oracle::{standard_corpus, PvocRoundTrip, ToleranceConfig};
//!
//! let reference = PvocRoundTrip::new();
//! let candidate = PvocRoundTrip::new();
//! let report = pvoc_oracle::run_corpus(
//!     &standard_corpus(22050),
//!     Some(&reference),
//!     Some(&candidate),
//!     &ToleranceConfig::strict(),
//! )
//! .unwrap();
//! assert!(report.all_passed());
//! ```

pub mod core;
pub mod error;
pub mod io;
pub mod oracle;
pub mod pvoc;

pub use crate::core::types::{Sample, SampleBuffer};
pub use crate::core::window::{generate_window, Window, WindowType, COLA_RIPPLE_TOLERANCE};
pub use error::{ErrorKind, OracleError, Result};
pub use oracle::{
    standard_corpus, standard_signals, ComparisonReport, CorpusEntry, CorpusReport,
    EntryFailure, EntryReport, ExternalCommand, FailureStage, FnGenerator, FnImplementation,
    Implementation, ProcessParams, PvocRoundTrip, Regression, RunnerConfig, SignalGenerator,
    SignalSpec, TestSignal, ToleranceConfig, ValidationLedger, ValidationRunner,
};
pub use pvoc::{
    AnalysisParams, AnalysisStream, Analyzer, PitchShift, SpectralBlur, SpectralFrame,
    SpectralGain, SpectralTransform, StreamMetadata, Synthesizer, TimeStretch,
};

/// Forward STFT of every channel of `buffer`.
///
/// # Errors
/// [`OracleError::InvalidInput`] for a zero FFT or hop size or a hop larger
/// than the FFT; [`OracleError::InvalidParameter`] when the window is not
/// COLA at `hop_size`.
pub fn analyze(
    buffer: &SampleBuffer,
    fft_size: usize,
    hop_size: usize,
    window_type: WindowType,
) -> Result<AnalysisStream> {
    pvoc::analyzer::analyze(buffer, fft_size, hop_size, window_type)
}

/// Resynthesizes `stream` at its analysis hop.
///
/// # Errors
/// [`OracleError::InvalidInput`] when the stream has no frames.
pub fn synthesize(stream: &AnalysisStream) -> Result<SampleBuffer> {
    pvoc::synthesizer::synthesize(stream)
}

/// Compares a candidate buffer against a reference. See
/// [`oracle::comparator::compare`].
pub fn compare(
    reference: &SampleBuffer,
    candidate: &SampleBuffer,
    tolerance: &ToleranceConfig,
) -> Result<ComparisonReport> {
    oracle::comparator::compare(reference, candidate, tolerance)
}

/// Runs reference and candidate over `corpus`, one report entry per signal.
///
/// # Errors
/// [`OracleError::InvalidInput`] when the corpus is empty or an
/// implementation is missing. Failures of individual entries are recorded in
/// the report instead.
pub fn run_corpus(
    corpus: &[CorpusEntry],
    reference: Option<&dyn Implementation>,
    candidate: Option<&dyn Implementation>,
    tolerance: &ToleranceConfig,
) -> Result<CorpusReport> {
    oracle::runner::run_corpus(corpus, reference, candidate, tolerance)
}
