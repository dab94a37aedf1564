use super::cluster::{cluster_1d, reading_order_text};
use super::{StrategyOutput, TableStrategy};
use crate::config::ExtractionConfig;
use crate::error::StrategyError;
use crate::geometry::{BBox, CleanPage, Token};
use crate::model::{Cell, StrategyKind, TableCandidate};

/// Last resort: columns by left edge, rows by overlapping vertical ranges.
///
/// Confidence is capped below the acceptance floor, so the orchestrator
/// only surfaces this when no other strategy produced a table.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackExtractor;

impl TableStrategy for FallbackExtractor {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Fallback
    }

    fn detect(
        &self,
        page: &CleanPage,
        config: &ExtractionConfig,
    ) -> Result<StrategyOutput, StrategyError> {
        let mut output = StrategyOutput::default();
        let tokens = &page.tokens;
        if tokens.is_empty() {
            return Ok(output);
        }

        let rows = overlapping_rows(tokens);
        let columns = column_of_tokens(tokens, config.column_tolerance);
        let n_cols = columns.iter().copied().max().map_or(0, |m| m + 1);

        let mut grid: Vec<Vec<Vec<usize>>> = Vec::new();
        for row in &rows {
            let mut slots = vec![Vec::new(); n_cols];
            for &i in row {
                slots[columns[i]].push(i);
            }
            if slots.iter().filter(|s| !s.is_empty()).count() >= 2 {
                grid.push(slots);
            } else {
                output.tokens_dropped += row.len();
                output.bands_rejected += 1;
            }
        }

        let used: Vec<usize> = (0..n_cols)
            .filter(|&c| grid.iter().any(|row| !row[c].is_empty()))
            .collect();
        output.bands_rejected += n_cols - used.len();
        if grid.len() < config.min_rows || used.len() < config.min_cols {
            return Ok(output);
        }

        let col_spans: Vec<(f32, f32)> = used
            .iter()
            .map(|&c| {
                grid.iter()
                    .flat_map(|row| row[c].iter())
                    .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &i| {
                        (lo.min(tokens[i].bbox.x0), hi.max(tokens[i].bbox.x1))
                    })
            })
            .collect();

        let cells: Vec<Vec<Cell>> = grid
            .iter()
            .enumerate()
            .map(|(r, row)| {
                let (y0, y1) = row.iter().flatten().fold(
                    (f32::INFINITY, f32::NEG_INFINITY),
                    |(lo, hi), &i| (lo.min(tokens[i].bbox.y0), hi.max(tokens[i].bbox.y1)),
                );
                used.iter()
                    .zip(&col_spans)
                    .enumerate()
                    .map(|(c, (&src, &(x0, x1)))| Cell {
                        row: r,
                        col: c,
                        bbox: BBox::new(x0, y0, x1, y1),
                        text: reading_order_text(tokens, &row[src]),
                        token_count: row[src].len(),
                        amount: None,
                    })
                    .collect()
            })
            .collect();

        let total = cells.len() * used.len();
        let filled = cells.iter().flatten().filter(|c| !c.is_empty()).count();
        let confidence = config.fallback_confidence_cap * filled as f32 / total as f32;

        output.candidates.extend(TableCandidate::new(
            StrategyKind::Fallback,
            cells,
            confidence,
            config.min_rows,
            config.min_cols,
        ));
        Ok(output)
    }
}

/// Sweep tokens top to bottom; a token joins the open row while its
/// vertical range overlaps the row's.
fn overlapping_rows(tokens: &[Token]) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..tokens.len()).collect();
    order.sort_by(|&a, &b| {
        tokens[a]
            .bbox
            .y0
            .total_cmp(&tokens[b].bbox.y0)
            .then(tokens[a].bbox.x0.total_cmp(&tokens[b].bbox.x0))
            .then(a.cmp(&b))
    });

    let mut rows: Vec<Vec<usize>> = Vec::new();
    let mut bottom = f32::NEG_INFINITY;
    for i in order {
        let bbox = &tokens[i].bbox;
        match rows.last_mut() {
            Some(row) if bbox.y0 < bottom => {
                row.push(i);
                bottom = bottom.max(bbox.y1);
            }
            _ => {
                rows.push(vec![i]);
                bottom = bbox.y1;
            }
        }
    }
    rows
}

/// Column index per token from left-edge clusters. A cluster holding a
/// single token is folded into its left neighbour.
fn column_of_tokens(tokens: &[Token], tolerance: f32) -> Vec<usize> {
    let items: Vec<(f32, usize)> = tokens
        .iter()
        .enumerate()
        .map(|(i, t)| (t.bbox.x0, i))
        .collect();

    let mut columns: Vec<Vec<usize>> = Vec::new();
    for band in cluster_1d(&items, tolerance) {
        match columns.last_mut() {
            Some(prev) if band.len() == 1 => prev.extend(band.members),
            _ => columns.push(band.members),
        }
    }

    let mut column_of = vec![0; tokens.len()];
    for (c, members) in columns.iter().enumerate() {
        for &i in members {
            column_of[i] = c;
        }
    }
    column_of
}
