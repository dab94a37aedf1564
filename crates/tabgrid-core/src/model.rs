use crate::geometry::BBox;
use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;

/// Which detection strategy produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    RulingGrid,
    BankStatement,
    Alignment,
    Fallback,
}

impl StrategyKind {
    /// Run order and dedup tie-break; lower goes first.
    pub fn priority(self) -> u8 {
        match self {
            StrategyKind::RulingGrid => 0,
            StrategyKind::BankStatement => 1,
            StrategyKind::Alignment => 2,
            StrategyKind::Fallback => 3,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::RulingGrid => write!(f, "ruling_grid"),
            StrategyKind::BankStatement => write!(f, "bank_statement"),
            StrategyKind::Alignment => write!(f, "alignment"),
            StrategyKind::Fallback => write!(f, "fallback"),
        }
    }
}

/// One grid cell. Empty cells are valid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    pub bbox: BBox,
    /// Reading-order concatenation of the cell's tokens.
    pub text: String,
    pub token_count: usize,
    /// Signed value of an amount cell in a statement table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        self.token_count == 0
    }
}

/// A provisional table: a rectangular grid of cells plus provenance and a
/// confidence score. Only constructible through [`TableCandidate::new`],
/// which enforces the shape invariants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableCandidate {
    strategy: StrategyKind,
    bbox: BBox,
    confidence: f32,
    has_header: bool,
    rows: Vec<Vec<Cell>>,
}

impl TableCandidate {
    /// Returns `None` unless the grid is rectangular and at least
    /// `min_rows` x `min_cols`. Confidence is clamped to `[0, 1]`.
    pub fn new(
        strategy: StrategyKind,
        rows: Vec<Vec<Cell>>,
        confidence: f32,
        min_rows: usize,
        min_cols: usize,
    ) -> Option<Self> {
        let cols = rows.first()?.len();
        if rows.len() < min_rows.max(2) || cols < min_cols.max(2) {
            return None;
        }
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        let bbox = BBox::enclosing(rows.iter().flatten().map(|c| &c.bbox))?;
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Some(TableCandidate {
            strategy,
            bbox,
            confidence,
            has_header: false,
            rows,
        })
    }

    /// Mark row 0 as a header row.
    pub fn with_header(mut self) -> Self {
        self.has_header = true;
        self
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    pub fn bbox(&self) -> &BBox {
        &self.bbox
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn has_header(&self) -> bool {
        self.has_header
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn col_count(&self) -> usize {
        self.rows.first().map(|r| r.len()).unwrap_or(0)
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row)?.get(col)
    }

    /// Cell texts, row by row.
    pub fn text_grid(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|r| r.iter().map(|c| c.text.clone()).collect())
            .collect()
    }

    /// Share of cells holding at least one token.
    pub fn fill_ratio(&self) -> f32 {
        let total = self.row_count() * self.col_count();
        if total == 0 {
            return 0.0;
        }
        let filled = self.rows.iter().flatten().filter(|c| !c.is_empty()).count();
        filled as f32 / total as f32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyFailure {
    pub strategy: StrategyKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyTiming {
    pub strategy: StrategyKind,
    pub micros: u64,
    pub candidates: usize,
}

/// Diagnostic counters, attached to results only in debug mode.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub malformed_tokens: usize,
    pub malformed_segments: usize,
    /// Tokens that fell outside every cell of a produced grid.
    pub tokens_dropped: usize,
    /// Bands discarded for insufficient support or overlap.
    pub bands_rejected: usize,
    /// Candidates removed by the confidence floor or overlap dedup.
    pub candidates_discarded: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub strategy_failures: Vec<StrategyFailure>,
    pub timings: Vec<StrategyTiming>,
}

/// All candidates for one page, highest confidence first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub page_number: usize,
    pub candidates: Vec<TableCandidate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

impl ExtractionResult {
    pub fn empty(page_number: usize) -> Self {
        ExtractionResult {
            page_number,
            candidates: Vec::new(),
            diagnostics: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Per-page results of a multi-page run, in page order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentResult {
    pub pages: Vec<ExtractionResult>,
    /// Pages never dispatched because the run was cancelled.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cancelled_pages: Vec<usize>,
}

impl DocumentResult {
    pub fn table_count(&self) -> usize {
        self.pages.iter().map(|p| p.candidates.len()).sum()
    }
}
