//! Append-only record of validation runs.
//!
//! Recording a run never rewrites an earlier one, so a stricter or later run
//! that fails cannot hide the fact that an entry once passed. Regressions are
//! reported back to the caller instead.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::oracle::runner::CorpusReport;
use crate::oracle::tolerance::ToleranceConfig;

/// Per-entry result as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Entry key (signal name plus parameters).
    pub signal: String,
    pub passed: bool,
    pub rms_difference: Option<f64>,
    pub spectral_correlation: Option<f64>,
}

/// One recorded corpus run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRun {
    pub label: String,
    pub tolerance: ToleranceConfig,
    pub entries: Vec<LedgerEntry>,
}

/// An entry that passed in an earlier run and fails in the new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regression {
    pub signal: String,
    /// Label of the most recent earlier run in which the entry passed.
    pub last_passed_in: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationLedger {
    runs: Vec<LedgerRun>,
}

impl ValidationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runs(&self) -> &[LedgerRun] {
        &self.runs
    }

    /// Appends `report` as a new run and returns the regressions it shows.
    pub fn record(&mut self, label: impl Into<String>, report: &CorpusReport) -> Vec<Regression> {
        let label = label.into();
        let entries: Vec<LedgerEntry> = report
            .entries
            .iter()
            .map(|e| LedgerEntry {
                signal: e.key(),
                passed: e.passed(),
                rms_difference: e.comparison.as_ref().map(|c| c.rms_difference),
                spectral_correlation: e.comparison.as_ref().map(|c| c.spectral_correlation),
            })
            .collect();

        let regressions: Vec<Regression> = entries
            .iter()
            .filter(|e| !e.passed)
            .filter_map(|e| {
                self.last_pass(&e.signal).map(|(run, _)| Regression {
                    signal: e.signal.clone(),
                    last_passed_in: run.label.clone(),
                })
            })
            .collect();
        for r in &regressions {
            log::warn!(
                "regression in run '{}': {} passed in '{}'",
                label,
                r.signal,
                r.last_passed_in
            );
        }

        self.runs.push(LedgerRun {
            label,
            tolerance: report.tolerance.clone(),
            entries,
        });
        regressions
    }

    /// Most recent passing result for `signal`, with the run it came from.
    pub fn last_pass(&self, signal: &str) -> Option<(&LedgerRun, &LedgerEntry)> {
        self.find_latest(signal, |e| e.passed)
    }

    /// Most recent result for `signal`, passing or not.
    pub fn latest(&self, signal: &str) -> Option<(&LedgerRun, &LedgerEntry)> {
        self.find_latest(signal, |_| true)
    }

    fn find_latest(
        &self,
        signal: &str,
        accept: impl Fn(&LedgerEntry) -> bool,
    ) -> Option<(&LedgerRun, &LedgerEntry)> {
        for run in self.runs.iter().rev() {
            if let Some(entry) = run.entries.iter().find(|e| e.signal == signal) {
                if accept(entry) {
                    return Some((run, entry));
                }
            }
        }
        None
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Loads `path`, or starts an empty ledger if it does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::new())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::implementation::ProcessParams;
    use crate::oracle::runner::{EntryFailure, EntryReport, FailureStage};

    fn report(results: &[(&str, bool)], tolerance: ToleranceConfig) -> CorpusReport {
        let entries = results
            .iter()
            .enumerate()
            .map(|(index, &(name, ok))| EntryReport {
                index,
                signal: name.to_string(),
                params: ProcessParams::new(),
                comparison: None,
                failure: if ok {
                    None
                } else {
                    Some(EntryFailure {
                        stage: FailureStage::Candidate,
                        kind: None,
                        message: "diverged".to_string(),
                        diagnostics: String::new(),
                    })
                },
            })
            .collect();
        CorpusReport { entries, tolerance }
    }

    // Entries without a comparison never pass, so build passing ones from a
    // real comparison.
    fn passing_report(names: &[&str]) -> CorpusReport {
        use crate::core::types::SampleBuffer;
        use crate::oracle::comparator::compare;
        let buf = SampleBuffer::mono(vec![0.1; 64], 8000).unwrap();
        let tol = ToleranceConfig::strict();
        let cmp = compare(&buf, &buf, &tol).unwrap();
        let mut r = report(&names.iter().map(|n| (*n, true)).collect::<Vec<_>>(), tol);
        for e in r.entries.iter_mut() {
            e.comparison = Some(cmp.clone());
        }
        r
    }

    #[test]
    fn test_stricter_failing_run_does_not_hide_pass() {
        let mut ledger = ValidationLedger::new();
        assert!(ledger.record("loose", &passing_report(&["a", "b"])).is_empty());

        let strict = ToleranceConfig::strict().with_max_rms_difference(0.0);
        let regressions = ledger.record("strict", &report(&[("a", false), ("b", false)], strict));
        assert_eq!(regressions.len(), 2);
        assert_eq!(regressions[0].last_passed_in, "loose");

        assert_eq!(ledger.runs().len(), 2);
        let (run, entry) = ledger.last_pass("a").unwrap();
        assert_eq!(run.label, "loose");
        assert!(entry.passed);
        let (run, entry) = ledger.latest("a").unwrap();
        assert_eq!(run.label, "strict");
        assert!(!entry.passed);
    }

    #[test]
    fn test_new_failure_without_history_is_not_regression() {
        let mut ledger = ValidationLedger::new();
        let failing = report(&[("x", false)], ToleranceConfig::strict());
        let regressions = ledger.record("first", &failing);
        assert!(regressions.is_empty());
        assert!(ledger.last_pass("x").is_none());
        assert!(ledger.latest("missing").is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let mut ledger = ValidationLedger::load_or_default(&path).unwrap();
        ledger.record("run1", &passing_report(&["sine"]));
        ledger.save(&path).unwrap();
        let loaded = ValidationLedger::load(&path).unwrap();
        assert_eq!(loaded, ledger);
        assert!(loaded.last_pass("sine").is_some());
    }
}
