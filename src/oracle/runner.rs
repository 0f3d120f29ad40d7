//! Corpus-level validation: run reference and candidate over every test
//! signal and compare their outputs.
//!
//! Every entry is isolated. An error or panic in one implementation for one
//! signal is recorded against that entry and the run continues, so a report
//! always answers "how many of N configurations match".

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::types::SampleBuffer;
use crate::error::{ErrorKind, OracleError, Result};
use crate::oracle::comparator::{compare, ComparisonReport};
use crate::oracle::generator::{standard_signals, SignalGenerator};
use crate::oracle::implementation::{Implementation, ProcessParams};
use crate::oracle::tolerance::ToleranceConfig;

/// Runner settings.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// Evaluate entries on the rayon thread pool.
    pub parallel: bool,
    /// When set to `true`, entries not yet started are skipped.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl RunnerConfig {
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// One test signal plus the parameters both implementations receive.
#[derive(Clone)]
pub struct CorpusEntry {
    pub generator: Arc<dyn SignalGenerator>,
    pub params: ProcessParams,
}

impl CorpusEntry {
    pub fn new(generator: Arc<dyn SignalGenerator>, params: ProcessParams) -> Self {
        Self { generator, params }
    }
}

/// The standard signal mix with empty parameters.
pub fn standard_corpus(sample_rate: u32) -> Vec<CorpusEntry> {
    standard_signals(sample_rate)
        .into_iter()
        .map(|spec| CorpusEntry::new(Arc::new(spec), ProcessParams::new()))
        .collect()
}

/// Where an entry failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureStage {
    Generate,
    Reference,
    Candidate,
    Compare,
    Cancelled,
}

/// Why an entry has no passing comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryFailure {
    pub stage: FailureStage,
    /// `None` for cancellation.
    pub kind: Option<ErrorKind>,
    pub message: String,
    /// Captured process output or panic payload.
    pub diagnostics: String,
}

impl EntryFailure {
    fn from_error(stage: FailureStage, err: &OracleError) -> Self {
        Self {
            stage,
            kind: Some(err.kind()),
            message: err.to_string(),
            diagnostics: err.diagnostics().unwrap_or_default().to_string(),
        }
    }

    fn cancelled() -> Self {
        Self {
            stage: FailureStage::Cancelled,
            kind: None,
            message: "run cancelled before this entry started".to_string(),
            diagnostics: String::new(),
        }
    }
}

/// Outcome for one corpus entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryReport {
    pub index: usize,
    pub signal: String,
    pub params: ProcessParams,
    /// Present when both implementations produced output and comparison ran.
    pub comparison: Option<ComparisonReport>,
    pub failure: Option<EntryFailure>,
}

impl EntryReport {
    pub fn passed(&self) -> bool {
        self.failure.is_none() && self.comparison.as_ref().is_some_and(|c| c.passed)
    }

    /// Signal name plus any parameters; identifies the entry across runs.
    pub fn key(&self) -> String {
        if self.params.is_empty() {
            return self.signal.clone();
        }
        let mut key = self.signal.clone();
        for (k, v) in &self.params.values {
            key.push_str(&format!(" {}={}", k, v));
        }
        for arg in &self.params.args {
            key.push(' ');
            key.push_str(arg);
        }
        key
    }
}

/// Aggregate of one corpus run. Holds exactly one entry per corpus signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusReport {
    pub entries: Vec<EntryReport>,
    pub tolerance: ToleranceConfig,
}

impl CorpusReport {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pass_count(&self) -> usize {
        self.entries.iter().filter(|e| e.passed()).count()
    }

    pub fn fail_count(&self) -> usize {
        self.len() - self.pass_count()
    }

    pub fn all_passed(&self) -> bool {
        self.pass_count() == self.len()
    }

    /// Multi-line summary: the aggregate, then one line per entry.
    pub fn summary(&self) -> String {
        let mut out = format!("{}/{} entries passed\n", self.pass_count(), self.len());
        for entry in &self.entries {
            let detail = match (&entry.failure, &entry.comparison) {
                (Some(f), _) => format!("FAIL [{:?}] {}", f.stage, f.message),
                (None, Some(c)) => c.summary(),
                (None, None) => "no result".to_string(),
            };
            out.push_str(&format!("  #{:<3} {:<40} {}\n", entry.index, entry.key(), detail));
        }
        out
    }
}

/// Drives reference and candidate implementations over a corpus.
#[derive(Default)]
pub struct ValidationRunner {
    reference: Option<Arc<dyn Implementation>>,
    candidate: Option<Arc<dyn Implementation>>,
    config: RunnerConfig,
}

impl ValidationRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference(mut self, reference: Arc<dyn Implementation>) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_candidate(mut self, candidate: Arc<dyn Implementation>) -> Self {
        self.candidate = Some(candidate);
        self
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs every entry and aggregates the results.
    ///
    /// # Errors
    /// `InvalidInput` if the corpus is empty or an implementation is missing;
    /// `InvalidParameter` if `tolerance` is invalid. Per-entry failures never
    /// fail the run.
    pub fn run(&self, corpus: &[CorpusEntry], tolerance: &ToleranceConfig) -> Result<CorpusReport> {
        run_with(
            corpus,
            self.reference.as_deref(),
            self.candidate.as_deref(),
            tolerance,
            &self.config,
        )
    }
}

/// Sequential corpus run with default settings.
pub fn run_corpus(
    corpus: &[CorpusEntry],
    reference: Option<&dyn Implementation>,
    candidate: Option<&dyn Implementation>,
    tolerance: &ToleranceConfig,
) -> Result<CorpusReport> {
    run_with(corpus, reference, candidate, tolerance, &RunnerConfig::default())
}

fn run_with(
    corpus: &[CorpusEntry],
    reference: Option<&dyn Implementation>,
    candidate: Option<&dyn Implementation>,
    tolerance: &ToleranceConfig,
    config: &RunnerConfig,
) -> Result<CorpusReport> {
    if corpus.is_empty() {
        return Err(OracleError::InvalidInput("corpus is empty".to_string()));
    }
    let reference = reference
        .ok_or_else(|| OracleError::InvalidInput("reference implementation missing".to_string()))?;
    let candidate = candidate
        .ok_or_else(|| OracleError::InvalidInput("candidate implementation missing".to_string()))?;
    tolerance.validate()?;

    let evaluate = |(index, entry): (usize, &CorpusEntry)| {
        if config.is_cancelled() {
            return EntryReport {
                index,
                signal: entry.generator.name(),
                params: entry.params.clone(),
                comparison: None,
                failure: Some(EntryFailure::cancelled()),
            };
        }
        run_entry(index, entry, reference, candidate, tolerance)
    };
    let entries: Vec<EntryReport> = if config.parallel {
        corpus.par_iter().enumerate().map(evaluate).collect()
    } else {
        corpus.iter().enumerate().map(evaluate).collect()
    };

    let report = CorpusReport {
        entries,
        tolerance: tolerance.clone(),
    };
    log::info!(
        "{} vs {}: {}/{} entries passed",
        reference.name(),
        candidate.name(),
        report.pass_count(),
        report.len()
    );
    Ok(report)
}

fn run_entry(
    index: usize,
    entry: &CorpusEntry,
    reference: &dyn Implementation,
    candidate: &dyn Implementation,
    tolerance: &ToleranceConfig,
) -> EntryReport {
    let signal = guarded("generator", || entry.generator.name())
        .unwrap_or_else(|_| format!("entry_{}", index));
    let mut report = EntryReport {
        index,
        signal,
        params: entry.params.clone(),
        comparison: None,
        failure: None,
    };

    let outcome = evaluate_entry(entry, reference, candidate, tolerance);
    match outcome {
        Ok(comparison) => {
            log::debug!("#{} {}: {}", index, report.key(), comparison.summary());
            report.comparison = Some(comparison);
        }
        Err((stage, err)) => {
            log::warn!("#{} {} failed at {:?}: {}", index, report.key(), stage, err);
            report.failure = Some(EntryFailure::from_error(stage, &err));
        }
    }
    report
}

fn evaluate_entry(
    entry: &CorpusEntry,
    reference: &dyn Implementation,
    candidate: &dyn Implementation,
    tolerance: &ToleranceConfig,
) -> std::result::Result<ComparisonReport, (FailureStage, OracleError)> {
    let input = guarded("generator", || entry.generator.generate())
        .and_then(|r| r)
        .map_err(|e| (FailureStage::Generate, e))?;
    let expected = invoke(reference, &input, &entry.params)
        .map_err(|e| (FailureStage::Reference, e))?;
    let actual = invoke(candidate, &input, &entry.params)
        .map_err(|e| (FailureStage::Candidate, e))?;
    compare(&expected, &actual, tolerance).map_err(|e| (FailureStage::Compare, e))
}

/// Calls an implementation, turning errors and panics into
/// `ExternalProcessFailure` attributed to it.
fn invoke(
    implementation: &dyn Implementation,
    input: &SampleBuffer,
    params: &ProcessParams,
) -> Result<SampleBuffer> {
    let name = implementation.name();
    match guarded(name, || implementation.process(input, params))? {
        Ok(output) => Ok(output),
        Err(err @ OracleError::ExternalProcessFailure { .. }) => Err(err),
        Err(err) => Err(OracleError::ExternalProcessFailure {
            implementation: name.to_string(),
            reason: err.to_string(),
            diagnostics: String::new(),
        }),
    }
}

/// Runs `f`, converting a panic into `ExternalProcessFailure` with the panic
/// message as diagnostics.
fn guarded<T>(who: &str, f: impl FnOnce() -> T) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| OracleError::ExternalProcessFailure {
        implementation: who.to_string(),
        reason: "panicked".to_string(),
        diagnostics: panic_message(payload.as_ref()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
