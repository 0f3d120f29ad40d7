//! Deterministic test-signal generators for validation corpora.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::types::{Sample, SampleBuffer};
use crate::error::{OracleError, Result};

/// Produces one test signal per call. Must be deterministic.
pub trait SignalGenerator: Send + Sync {
    /// Stable name identifying the signal in reports and ledgers.
    fn name(&self) -> String;

    /// Generates the signal.
    fn generate(&self) -> Result<SampleBuffer>;
}

/// Waveform shapes the built-in generator can produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestSignal {
    /// Pure sine.
    Sine { frequency: f64, amplitude: f64 },
    /// Uniform white noise from a seeded linear congruential generator.
    WhiteNoise { seed: u32, amplitude: f64 },
    /// Linear frequency sweep at amplitude 0.5.
    Chirp { start_freq: f64, end_freq: f64 },
    /// Single unit impulse at the start of the buffer.
    Impulse,
    /// Equal-amplitude harmonics of a fundamental, normalised to peak 0.5.
    HarmonicSeries { fundamental: f64, harmonics: u32 },
    /// All zeros.
    Silence,
}

impl fmt::Display for TestSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestSignal::Sine { frequency, .. } => write!(f, "sine_{}hz", frequency),
            TestSignal::WhiteNoise { seed, .. } => write!(f, "noise_seed{}", seed),
            TestSignal::Chirp {
                start_freq,
                end_freq,
            } => write!(f, "chirp_{}_{}hz", start_freq, end_freq),
            TestSignal::Impulse => write!(f, "impulse"),
            TestSignal::HarmonicSeries {
                fundamental,
                harmonics,
            } => write!(f, "harmonics_{}hz_x{}", fundamental, harmonics),
            TestSignal::Silence => write!(f, "silence"),
        }
    }
}

/// A fully specified test signal: shape, duration, rate and channel count.
///
/// Multichannel signals duplicate the same waveform into every channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSpec {
    pub signal: TestSignal,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
}

impl SignalSpec {
    /// Mono signal.
    pub fn new(signal: TestSignal, duration_secs: f64, sample_rate: u32) -> Self {
        Self {
            signal,
            duration_secs,
            sample_rate,
            channels: 1,
        }
    }

    /// Duplicate into `channels` channels.
    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = channels;
        self
    }

    fn num_samples(&self) -> Result<usize> {
        if !self.duration_secs.is_finite() || self.duration_secs < 0.0 {
            return Err(OracleError::InvalidParameter(format!(
                "signal duration must be finite and non-negative, got {}",
                self.duration_secs
            )));
        }
        Ok((self.duration_secs * self.sample_rate as f64).round() as usize)
    }

    fn render(&self, n: usize) -> Result<Vec<f64>> {
        let sr = self.sample_rate as f64;
        let samples = match self.signal {
            TestSignal::Sine {
                frequency,
                amplitude,
            } => (0..n)
                .map(|i| amplitude * (2.0 * PI * frequency * i as f64 / sr).sin())
                .collect(),
            TestSignal::WhiteNoise { seed, amplitude } => {
                let mut lcg = Lcg::new(seed);
                (0..n).map(|_| amplitude * lcg.next_bipolar()).collect()
            }
            TestSignal::Chirp {
                start_freq,
                end_freq,
            } => {
                let duration = n as f64 / sr;
                let rate = if duration > 0.0 {
                    (end_freq - start_freq) / duration
                } else {
                    0.0
                };
                (0..n)
                    .map(|i| {
                        let t = i as f64 / sr;
                        0.5 * (2.0 * PI * (start_freq * t + 0.5 * rate * t * t)).sin()
                    })
                    .collect()
            }
            TestSignal::Impulse => {
                let mut out = vec![0.0; n];
                if let Some(first) = out.first_mut() {
                    *first = 1.0;
                }
                out
            }
            TestSignal::HarmonicSeries {
                fundamental,
                harmonics,
            } => {
                if harmonics == 0 {
                    return Err(OracleError::InvalidParameter(
                        "harmonic series needs at least one harmonic".to_string(),
                    ));
                }
                let raw: Vec<f64> = (0..n)
                    .map(|i| {
                        let t = i as f64 / sr;
                        (1..=harmonics)
                            .map(|h| (2.0 * PI * fundamental * h as f64 * t).sin())
                            .sum()
                    })
                    .collect();
                let peak = raw.iter().fold(0.0f64, |m, v| m.max(v.abs()));
                if peak > 0.0 {
                    raw.into_iter().map(|v| 0.5 * v / peak).collect()
                } else {
                    raw
                }
            }
            TestSignal::Silence => vec![0.0; n],
        };
        Ok(samples)
    }
}

impl SignalGenerator for SignalSpec {
    fn name(&self) -> String {
        let mut name = format!(
            "{}_{}ms_{}hz",
            self.signal,
            (self.duration_secs * 1000.0).round(),
            self.sample_rate
        );
        if self.channels > 1 {
            name.push_str(&format!("_{}ch", self.channels));
        }
        name
    }

    fn generate(&self) -> Result<SampleBuffer> {
        if self.channels == 0 {
            return Err(OracleError::InvalidParameter(
                "signal needs at least one channel".to_string(),
            ));
        }
        let n = self.num_samples()?;
        let mono = self.render(n)?;
        let channels = self.channels as usize;
        let mut data: Vec<Sample> = Vec::with_capacity(n * channels);
        for v in mono {
            let s = v as Sample;
            data.extend(std::iter::repeat(s).take(channels));
        }
        SampleBuffer::new(data, self.channels, self.sample_rate)
    }
}

/// Wraps a closure as a generator.
pub struct FnGenerator<F> {
    name: String,
    func: F,
}

impl<F> FnGenerator<F>
where
    F: Fn() -> Result<SampleBuffer> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> SignalGenerator for FnGenerator<F>
where
    F: Fn() -> Result<SampleBuffer> + Send + Sync,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    fn generate(&self) -> Result<SampleBuffer> {
        (self.func)()
    }
}

/// Classic `rand()`-style LCG; reproducible across platforms.
struct Lcg {
    state: u32,
}

impl Lcg {
    fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Next value in [-1, 1).
    fn next_bipolar(&mut self) -> f64 {
        self.state = self.state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let v = (self.state / 65_536) % 32_768;
        v as f64 / 16_384.0 - 1.0
    }
}

/// A mixed set of signals covering tonal, broadband, transient and silent
/// content, each half a second long.
pub fn standard_signals(sample_rate: u32) -> Vec<SignalSpec> {
    let d = 0.5;
    vec![
        SignalSpec::new(
            TestSignal::Sine {
                frequency: 440.0,
                amplitude: 0.8,
            },
            d,
            sample_rate,
        ),
        SignalSpec::new(
            TestSignal::Sine {
                frequency: 100.0,
                amplitude: 0.5,
            },
            d,
            sample_rate,
        ),
        SignalSpec::new(
            TestSignal::WhiteNoise {
                seed: 1,
                amplitude: 0.5,
            },
            d,
            sample_rate,
        ),
        SignalSpec::new(
            TestSignal::Chirp {
                start_freq: 100.0,
                end_freq: (sample_rate as f64 / 4.0).min(8000.0),
            },
            d,
            sample_rate,
        ),
        SignalSpec::new(TestSignal::Impulse, d, sample_rate),
        SignalSpec::new(
            TestSignal::HarmonicSeries {
                fundamental: 220.0,
                harmonics: 8,
            },
            d,
            sample_rate,
        ),
        SignalSpec::new(TestSignal::Silence, d, sample_rate),
        SignalSpec::new(
            TestSignal::Sine {
                frequency: 1000.0,
                amplitude: 0.5,
            },
            d,
            sample_rate,
        )
        .with_channels(2),
    ]
}
