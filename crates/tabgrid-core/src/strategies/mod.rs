//! Table detection strategies.
//!
//! Every strategy reads the same sanitised page and returns candidates
//! independently of the others; the orchestrator merges their output.

pub mod alignment;
pub mod bank_statement;
pub mod cluster;
pub mod fallback;
pub mod ruling;

use crate::config::ExtractionConfig;
use crate::error::StrategyError;
use crate::geometry::CleanPage;
use crate::model::{StrategyKind, TableCandidate};

pub use alignment::AlignmentClusterer;
pub use bank_statement::BankStatementRecognizer;
pub use fallback::FallbackExtractor;
pub use ruling::RulingGridBuilder;

/// Candidates of one strategy plus the counters it feeds into diagnostics.
#[derive(Debug, Clone, Default)]
pub struct StrategyOutput {
    pub candidates: Vec<TableCandidate>,
    pub tokens_dropped: usize,
    pub bands_rejected: usize,
}

/// A table detection heuristic.
///
/// Implementations are stateless: the same page and config always yield the
/// same output.
pub trait TableStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn detect(
        &self,
        page: &CleanPage,
        config: &ExtractionConfig,
    ) -> Result<StrategyOutput, StrategyError>;
}

/// The fixed priority list: rulings first, then the bank-statement layout,
/// then borderless alignment, then the fallback.
pub fn default_strategies() -> Vec<Box<dyn TableStrategy>> {
    vec![
        Box::new(RulingGridBuilder),
        Box::new(BankStatementRecognizer),
        Box::new(AlignmentClusterer),
        Box::new(FallbackExtractor),
    ]
}
