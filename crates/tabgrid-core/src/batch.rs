//! Page-parallel extraction over a whole document.

use crate::config::ExtractionConfig;
use crate::geometry::PageInput;
use crate::model::{DocumentResult, ExtractionResult};
use crate::orchestrator::extract_page;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Cooperative cancellation flag shared between a batch and its caller.
///
/// Pages already running finish; pages not yet started are skipped.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Extract every page on the rayon pool. Results come back in input order;
/// pages skipped after cancellation are listed by page number.
pub fn extract_pages(
    pages: &[PageInput],
    config: &ExtractionConfig,
    cancel: &CancelToken,
) -> DocumentResult {
    let outcomes: Vec<Result<ExtractionResult, usize>> = pages
        .par_iter()
        .map(|page| {
            if cancel.is_cancelled() {
                Err(page.page_number)
            } else {
                Ok(extract_page(page, config))
            }
        })
        .collect();

    let mut result = DocumentResult::default();
    for outcome in outcomes {
        match outcome {
            Ok(page) => result.pages.push(page),
            Err(page_number) => result.cancelled_pages.push(page_number),
        }
    }

    info!(
        pages = result.pages.len(),
        cancelled = result.cancelled_pages.len(),
        tables = result.table_count(),
        "document extracted"
    );
    result
}
