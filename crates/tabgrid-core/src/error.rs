use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum TabgridError {
    #[error("PDF extraction failed: {0}")]
    Extraction(String),

    #[error("pdftotext not found. Install poppler: brew install poppler (macOS) or apt install poppler-utils (Linux)")]
    PdftotextNotFound,

    #[error("pdftotext failed with exit code {code}: {stderr}")]
    PdftotextFailed { code: i32, stderr: String },

    #[error("invalid page input: {0}")]
    InvalidInput(String),

    #[error("failed to load config from {path}: {reason}")]
    ConfigLoad { path: PathBuf, reason: String },

    #[error("invalid config: {0}")]
    ConfigInvalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure inside a single detection strategy.
///
/// Never surfaces from `extract_page`: the orchestrator treats the strategy
/// as having produced no candidates and records the failure in diagnostics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StrategyError {
    #[error("degenerate band set: {0}")]
    DegenerateBands(String),

    #[error("non-finite geometry: {0}")]
    NonFiniteGeometry(String),

    #[error("strategy panicked: {0}")]
    Panicked(String),
}
