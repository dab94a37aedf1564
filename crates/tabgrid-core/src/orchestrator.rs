//! Runs every strategy on a page and merges their candidates into the
//! page's ranked result.

use crate::config::ExtractionConfig;
use crate::error::StrategyError;
use crate::geometry::{CleanPage, PageInput};
use crate::model::{
    Diagnostics, ExtractionResult, StrategyFailure, StrategyKind, StrategyTiming, TableCandidate,
};
use crate::strategies::{default_strategies, StrategyOutput, TableStrategy};
use rayon::prelude::*;
use std::any::Any;
use std::cmp::Ordering;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, info, warn};

struct StrategyRun {
    kind: StrategyKind,
    result: Result<StrategyOutput, StrategyError>,
    micros: u64,
}

/// Extract the ranked table candidates of one page with the default
/// strategies. Never fails: a page with nothing tabular yields an empty
/// result.
pub fn extract_page(page: &PageInput, config: &ExtractionConfig) -> ExtractionResult {
    extract_page_with(page, config, &default_strategies())
}

/// Same as [`extract_page`] with an explicit strategy list.
pub fn extract_page_with(
    page: &PageInput,
    config: &ExtractionConfig,
    strategies: &[Box<dyn TableStrategy>],
) -> ExtractionResult {
    let clean = CleanPage::from_input(page);
    if clean.malformed_tokens > 0 || clean.malformed_segments > 0 {
        warn!(
            page = clean.page_number,
            tokens = clean.malformed_tokens,
            segments = clean.malformed_segments,
            "skipped malformed primitives"
        );
    }

    let runs: Vec<StrategyRun> = if config.parallel {
        strategies
            .par_iter()
            .map(|s| run_strategy(s.as_ref(), &clean, config))
            .collect()
    } else {
        strategies
            .iter()
            .map(|s| run_strategy(s.as_ref(), &clean, config))
            .collect()
    };

    let mut diagnostics = Diagnostics {
        malformed_tokens: clean.malformed_tokens,
        malformed_segments: clean.malformed_segments,
        ..Default::default()
    };
    let mut candidates = Vec::new();
    for run in runs {
        match run.result {
            Ok(output) => {
                debug!(
                    page = clean.page_number,
                    strategy = %run.kind,
                    candidates = output.candidates.len(),
                    micros = run.micros,
                    "strategy finished"
                );
                diagnostics.tokens_dropped += output.tokens_dropped;
                diagnostics.bands_rejected += output.bands_rejected;
                diagnostics.timings.push(StrategyTiming {
                    strategy: run.kind,
                    micros: run.micros,
                    candidates: output.candidates.len(),
                });
                candidates.extend(output.candidates);
            }
            Err(e) => {
                warn!(page = clean.page_number, strategy = %run.kind, error = %e, "strategy failed");
                diagnostics.strategy_failures.push(StrategyFailure {
                    strategy: run.kind,
                    message: e.to_string(),
                });
                diagnostics.timings.push(StrategyTiming {
                    strategy: run.kind,
                    micros: run.micros,
                    candidates: 0,
                });
            }
        }
    }

    let (candidates, discarded) = resolve_candidates(candidates, config);
    diagnostics.candidates_discarded = discarded;
    info!(
        page = clean.page_number,
        tables = candidates.len(),
        discarded,
        "page extracted"
    );

    ExtractionResult {
        page_number: clean.page_number,
        candidates,
        diagnostics: config.debug.then_some(diagnostics),
    }
}

fn run_strategy(
    strategy: &dyn TableStrategy,
    page: &CleanPage,
    config: &ExtractionConfig,
) -> StrategyRun {
    let started = Instant::now();
    let result = catch_unwind(AssertUnwindSafe(|| strategy.detect(page, config)))
        .unwrap_or_else(|payload| Err(StrategyError::Panicked(panic_message(payload.as_ref()))));
    StrategyRun {
        kind: strategy.kind(),
        result,
        micros: u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

/// Apply the confidence floor, drop overlapping duplicates and rank the
/// survivors. Returns the kept candidates and how many were discarded.
///
/// Fallback candidates bypass the floor but are only considered when no
/// other strategy produced an acceptable candidate.
pub fn resolve_candidates(
    candidates: Vec<TableCandidate>,
    config: &ExtractionConfig,
) -> (Vec<TableCandidate>, usize) {
    let total = candidates.len();
    let (primary, fallback): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|c| c.strategy() != StrategyKind::Fallback);
    let accepted: Vec<TableCandidate> = primary
        .into_iter()
        .filter(|c| c.confidence() >= config.min_confidence)
        .collect();
    let mut pool = if accepted.is_empty() { fallback } else { accepted };

    // Greedy: the best candidate claims its region, weaker overlapping
    // detections of the same table are dropped.
    pool.sort_by(claim_order);
    let mut kept: Vec<TableCandidate> = Vec::with_capacity(pool.len());
    for candidate in pool {
        if kept
            .iter()
            .all(|k| k.bbox().overlap_ratio(candidate.bbox()) <= config.overlap_ratio)
        {
            kept.push(candidate);
        }
    }

    kept.sort_by(rank_order);
    let discarded = total - kept.len();
    (kept, discarded)
}

fn by_position(a: &TableCandidate, b: &TableCandidate) -> Ordering {
    a.bbox()
        .y0
        .total_cmp(&b.bbox().y0)
        .then(a.bbox().x0.total_cmp(&b.bbox().x0))
}

fn claim_order(a: &TableCandidate, b: &TableCandidate) -> Ordering {
    b.confidence()
        .total_cmp(&a.confidence())
        .then(a.strategy().priority().cmp(&b.strategy().priority()))
        .then_with(|| by_position(a, b))
}

/// Confidence descending, then top to bottom.
fn rank_order(a: &TableCandidate, b: &TableCandidate) -> Ordering {
    b.confidence()
        .total_cmp(&a.confidence())
        .then_with(|| by_position(a, b))
        .then(a.strategy().priority().cmp(&b.strategy().priority()))
}
