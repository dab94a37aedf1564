pub mod batch;
pub mod config;
pub mod error;
pub mod extraction;
pub mod geometry;
pub mod model;
pub mod orchestrator;
pub mod statement;
pub mod strategies;

pub use batch::{extract_pages, CancelToken};
pub use config::ExtractionConfig;
pub use error::{StrategyError, TabgridError};
pub use geometry::{BBox, LineSegment, Orientation, PageInput, Point, Token};
pub use model::{
    Cell, Diagnostics, DocumentResult, ExtractionResult, StrategyKind, TableCandidate,
};
pub use orchestrator::{extract_page, resolve_candidates};

use extraction::PageSource;
use tracing::debug;

/// Main API entry point: find the tables of every page of a document.
///
/// The source turns the document bytes into page primitives; each page is
/// then extracted independently. Only the source can fail.
pub fn extract_pdf(
    bytes: &[u8],
    source: &dyn PageSource,
    config: &ExtractionConfig,
) -> Result<DocumentResult, TabgridError> {
    let pages = source.extract_pages(bytes)?;
    debug!(
        backend = source.backend_name(),
        pages = pages.len(),
        "document parsed"
    );
    Ok(extract_pages(&pages, config, &CancelToken::new()))
}
