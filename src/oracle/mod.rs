//! Oracle validation: comparator, tolerances, test signals, implementations,
//! the corpus runner, and the run ledger.

pub mod comparator;
pub mod external;
pub mod generator;
pub mod implementation;
pub mod ledger;
pub mod runner;
pub mod tolerance;

pub use comparator::{compare, compare_streams, spectral_correlation, ComparisonReport};
pub use external::ExternalCommand;
pub use generator::{standard_signals, FnGenerator, SignalGenerator, SignalSpec, TestSignal};
pub use implementation::{FnImplementation, Implementation, ProcessParams, PvocRoundTrip};
pub use ledger::{LedgerEntry, LedgerRun, Regression, ValidationLedger};
pub use runner::{
    run_corpus, standard_corpus, CorpusEntry, CorpusReport, EntryFailure, EntryReport,
    FailureStage, RunnerConfig, ValidationRunner,
};
pub use tolerance::ToleranceConfig;
