//! Phase vocoder: STFT analysis, resynthesis, the persisted analysis stream,
//! and spectral transforms over it.

pub mod analyzer;
pub mod stream;
pub mod synthesizer;
pub mod transform;

pub use analyzer::{analyze, AnalysisParams, Analyzer};
pub use stream::{
    expected_frame_count, max_sample_count, AnalysisStream, SpectralFrame, StreamMetadata,
};
pub use synthesizer::{synthesize, Synthesizer};
pub use transform::{
    factor_to_semitones, semitones_to_factor, PitchShift, SpectralBlur, SpectralGain,
    SpectralTransform, TimeStretch,
};
