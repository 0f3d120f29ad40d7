//! The single capability the runner needs from a reference or candidate:
//! `process(buffer, params) -> buffer`.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::types::SampleBuffer;
use crate::core::window::WindowType;
use crate::error::{OracleError, Result};
use crate::pvoc::analyzer::{AnalysisParams, Analyzer};
use crate::pvoc::synthesizer::Synthesizer;
use crate::pvoc::transform::SpectralTransform;

/// Parameters handed unchanged to an implementation.
///
/// `values` is an ordered key/value map; `args` are extra command-line style
/// arguments appended when the implementation is an external program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessParams {
    pub values: BTreeMap<String, String>,
    pub args: Vec<String>,
}

impl ProcessParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a key/value parameter.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.values.insert(key.into(), value.to_string());
        self
    }

    /// Append a raw argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Parses `key` if present.
    ///
    /// # Errors
    /// `InvalidParameter` if the value does not parse as `T`.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
                OracleError::InvalidParameter(format!("cannot parse parameter {}={:?}", key, raw))
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.args.is_empty()
    }
}

/// A reference or candidate implementation.
pub trait Implementation: Send + Sync {
    /// Name recorded in failure reports.
    fn name(&self) -> &str;

    /// Processes one buffer. Any error is recorded against the corpus entry.
    fn process(&self, input: &SampleBuffer, params: &ProcessParams) -> Result<SampleBuffer>;
}

/// Wraps a closure as an in-process implementation.
pub struct FnImplementation<F> {
    name: String,
    func: F,
}

impl<F> FnImplementation<F>
where
    F: Fn(&SampleBuffer, &ProcessParams) -> Result<SampleBuffer> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Implementation for FnImplementation<F>
where
    F: Fn(&SampleBuffer, &ProcessParams) -> Result<SampleBuffer> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, input: &SampleBuffer, params: &ProcessParams) -> Result<SampleBuffer> {
        (self.func)(input, params)
    }
}

/// Analyze, optionally transform, then resynthesize, all in-process.
///
/// Recognised parameters: `fft_size`, `hop_size`, `window` (a window name
/// such as `hann` or `kaiser:8`). Unset parameters fall back to the
/// configured defaults.
#[derive(Clone)]
pub struct PvocRoundTrip {
    name: String,
    defaults: AnalysisParams,
    transform: Option<Arc<dyn SpectralTransform>>,
}

impl PvocRoundTrip {
    /// Plain round trip with default STFT parameters.
    pub fn new() -> Self {
        Self {
            name: "pvoc".to_string(),
            defaults: AnalysisParams::default(),
            transform: None,
        }
    }

    /// Use `params` when the process parameters do not override them.
    pub fn with_params(mut self, params: AnalysisParams) -> Self {
        self.defaults = params;
        self
    }

    /// Apply `transform` between analysis and synthesis.
    pub fn with_transform(mut self, transform: Arc<dyn SpectralTransform>) -> Self {
        self.name = format!("pvoc+{}", transform.name());
        self.transform = Some(transform);
        self
    }

    fn resolve_params(&self, params: &ProcessParams) -> Result<AnalysisParams> {
        let mut resolved = self.defaults;
        if let Some(fft_size) = params.get_parsed("fft_size")? {
            resolved.fft_size = fft_size;
        }
        if let Some(hop_size) = params.get_parsed("hop_size")? {
            resolved.hop_size = hop_size;
        }
        if let Some(window) = params.get_parsed::<WindowType>("window")? {
            resolved.window_type = window;
        }
        Ok(resolved)
    }
}

impl Default for PvocRoundTrip {
    fn default() -> Self {
        Self::new()
    }
}

impl Implementation for PvocRoundTrip {
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, input: &SampleBuffer, params: &ProcessParams) -> Result<SampleBuffer> {
        let analyzer = Analyzer::new(self.resolve_params(params)?)?;
        if input.is_empty() {
            return Ok(input.clone());
        }
        let mut stream = analyzer.analyze(input)?;
        if let Some(transform) = &self.transform {
            stream = transform.apply(&stream)?;
        }
        Synthesizer::new().synthesize(&stream)
    }
}
