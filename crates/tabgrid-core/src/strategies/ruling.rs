//! Bordered tables: cluster drawn rulings into row and column boundaries
//! and intersect them into a grid of cells.

use super::cluster::{build_grid, cluster_1d, Grid};
use super::{StrategyOutput, TableStrategy};
use crate::config::ExtractionConfig;
use crate::error::StrategyError;
use crate::geometry::{CleanPage, LineSegment, Orientation};
use crate::model::{StrategyKind, TableCandidate};
use std::collections::HashSet;
use tracing::debug;

/// Confidence of a fully empty grid; each filled cell adds towards 1.0.
const EMPTY_GRID_CONFIDENCE: f32 = 0.3;
/// Share of empty interior cells above which the grid is probably a set of
/// decorative rules and its confidence is halved.
const DECORATIVE_EMPTY_RATIO: f32 = 0.5;

#[derive(Debug, Clone, Copy, Default)]
pub struct RulingGridBuilder;

/// A merged ruling: position across the line and extent along it.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Boundary {
    pos: f32,
    lo: f32,
    hi: f32,
}

impl TableStrategy for RulingGridBuilder {
    fn kind(&self) -> StrategyKind {
        StrategyKind::RulingGrid
    }

    fn detect(
        &self,
        page: &CleanPage,
        config: &ExtractionConfig,
    ) -> Result<StrategyOutput, StrategyError> {
        let mut output = StrategyOutput::default();

        let horizontals = merge_rulings(
            &page.segments,
            Orientation::Horizontal,
            config.row_tolerance,
            config,
        );
        let verticals = merge_rulings(
            &page.segments,
            Orientation::Vertical,
            config.column_tolerance,
            config,
        );
        if horizontals.len() < 2 || verticals.len() < 2 {
            return Ok(output);
        }

        let tol = config.row_tolerance.max(config.column_tolerance);
        let all_tokens: Vec<usize> = (0..page.tokens.len()).collect();
        let mut placed: HashSet<usize> = HashSet::new();

        for (h_ids, v_ids) in components(&horizontals, &verticals, tol) {
            let (h_ids, v_ids, pruned) = prune_to_closed_grid(&horizontals, &verticals, h_ids, v_ids, tol);
            output.bands_rejected += pruned;
            if h_ids.len() < 2 || v_ids.len() < 2 {
                output.bands_rejected += h_ids.len() + v_ids.len();
                continue;
            }

            let row_edges = dedup_positions(h_ids.iter().map(|&i| horizontals[i].pos), config.row_tolerance);
            let col_edges = dedup_positions(v_ids.iter().map(|&i| verticals[i].pos), config.column_tolerance);
            if row_edges.len() < 2 || col_edges.len() < 2 {
                continue;
            }

            let grid = build_grid(&row_edges, &col_edges, &page.tokens, &all_tokens)?;
            if grid.filled_cells() == 0 {
                debug!(
                    page = page.page_number,
                    rows = row_edges.len() - 1,
                    cols = col_edges.len() - 1,
                    "ruling grid holds no text, skipped"
                );
                continue;
            }

            let confidence = score(&grid);
            placed.extend(
                all_tokens
                    .iter()
                    .copied()
                    .filter(|i| !grid.dropped.contains(i)),
            );
            if let Some(candidate) = TableCandidate::new(
                StrategyKind::RulingGrid,
                grid.rows,
                confidence,
                config.min_rows,
                config.min_cols,
            ) {
                output.candidates.push(candidate);
            }
        }

        if !output.candidates.is_empty() {
            output.tokens_dropped = page.tokens.len() - placed.len();
        }
        Ok(output)
    }
}

/// Rewards populated cells; halves the score when most interior cells are
/// empty.
fn score(grid: &Grid) -> f32 {
    let cells = grid.cell_count().max(1) as f32;
    let fill = grid.filled_cells() as f32 / cells;
    let mut confidence = EMPTY_GRID_CONFIDENCE + (1.0 - EMPTY_GRID_CONFIDENCE) * fill;

    let n_rows = grid.rows.len();
    let n_cols = grid.rows.first().map(|r| r.len()).unwrap_or(0);
    let interior = n_rows.saturating_sub(2) * n_cols.saturating_sub(2);
    if interior > 0 {
        let empty_ratio = grid.empty_interior_cells() as f32 / interior as f32;
        if empty_ratio > DECORATIVE_EMPTY_RATIO {
            confidence *= 0.5;
        }
    }
    confidence
}

/// Cluster segments of one orientation by position, then split each
/// cluster into boundaries wherever the segments leave a gap along the line.
fn merge_rulings(
    segments: &[LineSegment],
    orientation: Orientation,
    tolerance: f32,
    config: &ExtractionConfig,
) -> Vec<Boundary> {
    let items: Vec<(f32, usize)> = segments
        .iter()
        .enumerate()
        .filter(|(_, s)| {
            s.length() >= config.min_segment_length
                && s.orientation(config.orientation_tolerance) == Some(orientation)
        })
        .map(|(i, s)| (s.position(orientation), i))
        .collect();

    let mut boundaries = Vec::new();
    for band in cluster_1d(&items, tolerance) {
        let pos = band
            .members
            .iter()
            .map(|&i| segments[i].position(orientation))
            .sum::<f32>()
            / band.len() as f32;

        let mut spans: Vec<(f32, f32)> = band
            .members
            .iter()
            .map(|&i| segments[i].span(orientation))
            .collect();
        spans.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));

        let mut current: Option<(f32, f32)> = None;
        for (lo, hi) in spans {
            current = match current {
                Some((clo, chi)) if lo <= chi + tolerance => Some((clo, chi.max(hi))),
                Some((clo, chi)) => {
                    boundaries.push(Boundary { pos, lo: clo, hi: chi });
                    Some((lo, hi))
                }
                None => Some((lo, hi)),
            };
        }
        if let Some((lo, hi)) = current {
            boundaries.push(Boundary { pos, lo, hi });
        }
    }
    boundaries
}

fn crosses(h: &Boundary, v: &Boundary, tol: f32) -> bool {
    v.pos >= h.lo - tol && v.pos <= h.hi + tol && h.pos >= v.lo - tol && h.pos <= v.hi + tol
}

/// Connected groups of horizontal/vertical boundaries linked by crossings.
fn components(
    horizontals: &[Boundary],
    verticals: &[Boundary],
    tol: f32,
) -> Vec<(Vec<usize>, Vec<usize>)> {
    let n_h = horizontals.len();
    let mut parent: Vec<usize> = (0..n_h + verticals.len()).collect();

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for (hi, h) in horizontals.iter().enumerate() {
        for (vi, v) in verticals.iter().enumerate() {
            if crosses(h, v, tol) {
                let a = find(&mut parent, hi);
                let b = find(&mut parent, n_h + vi);
                if a != b {
                    parent[a.max(b)] = a.min(b);
                }
            }
        }
    }

    let mut groups: Vec<(usize, Vec<usize>, Vec<usize>)> = Vec::new();
    for node in 0..parent.len() {
        let root = find(&mut parent, node);
        let pos = match groups.iter().position(|g| g.0 == root) {
            Some(p) => p,
            None => {
                groups.push((root, Vec::new(), Vec::new()));
                groups.len() - 1
            }
        };
        if node < n_h {
            groups[pos].1.push(node);
        } else {
            groups[pos].2.push(node - n_h);
        }
    }

    groups
        .into_iter()
        .filter(|(_, h, v)| !h.is_empty() && !v.is_empty())
        .map(|(_, h, v)| (h, v))
        .collect()
}

/// Repeatedly drop boundaries crossing fewer than two boundaries of the
/// other orientation, leaving only rulings that close cells.
fn prune_to_closed_grid(
    horizontals: &[Boundary],
    verticals: &[Boundary],
    mut h_ids: Vec<usize>,
    mut v_ids: Vec<usize>,
    tol: f32,
) -> (Vec<usize>, Vec<usize>, usize) {
    let mut pruned = 0;
    loop {
        let before = h_ids.len() + v_ids.len();
        let keep_h: Vec<usize> = h_ids
            .iter()
            .copied()
            .filter(|&h| {
                v_ids
                    .iter()
                    .filter(|&&v| crosses(&horizontals[h], &verticals[v], tol))
                    .count()
                    >= 2
            })
            .collect();
        let keep_v: Vec<usize> = v_ids
            .iter()
            .copied()
            .filter(|&v| {
                keep_h
                    .iter()
                    .filter(|&&h| crosses(&horizontals[h], &verticals[v], tol))
                    .count()
                    >= 2
            })
            .collect();
        h_ids = keep_h;
        v_ids = keep_v;
        let after = h_ids.len() + v_ids.len();
        pruned += before - after;
        if after == before {
            return (h_ids, v_ids, pruned);
        }
    }
}

/// Sorted positions with near-duplicates (boundaries split along the line)
/// folded together.
fn dedup_positions(positions: impl Iterator<Item = f32>, tolerance: f32) -> Vec<f32> {
    let items: Vec<(f32, usize)> = positions.enumerate().map(|(i, p)| (p, i)).collect();
    let values: Vec<f32> = items.iter().map(|(p, _)| *p).collect();
    cluster_1d(&items, tolerance)
        .iter()
        .map(|band| band.members.iter().map(|&i| values[i]).sum::<f32>() / band.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BBox, PageInput, Token};

    fn page(tokens: Vec<Token>, segments: Vec<LineSegment>) -> CleanPage {
        CleanPage::from_input(&PageInput {
            page_number: 1,
            width: 600.0,
            height: 800.0,
            tokens,
            segments,
        })
    }

    /// Rulings of a `rows` x `cols` grid with 20pt rows and 50pt columns.
    fn grid_rulings(rows: usize, cols: usize) -> Vec<LineSegment> {
        let (x0, y0) = (100.0, 100.0);
        let x1 = x0 + 50.0 * cols as f32;
        let y1 = y0 + 20.0 * rows as f32;
        let mut segs = Vec::new();
        for r in 0..=rows {
            let y = y0 + 20.0 * r as f32;
            segs.push(LineSegment::new(x0, y, x1, y));
        }
        for c in 0..=cols {
            let x = x0 + 50.0 * c as f32;
            segs.push(LineSegment::new(x, y0, x, y1));
        }
        segs
    }

    fn cell_token(text: &str, row: usize, col: usize) -> Token {
        let x = 100.0 + 50.0 * col as f32 + 5.0;
        let y = 100.0 + 20.0 * row as f32 + 5.0;
        Token::new(text, BBox::new(x, y, x + 30.0, y + 10.0))
    }

    #[test]
    fn test_closed_grid_two_by_three() {
        let tokens = vec![
            cell_token("a", 0, 0),
            cell_token("b", 0, 1),
            cell_token("c", 0, 2),
            cell_token("d", 1, 0),
            cell_token("e", 1, 1),
            cell_token("f", 1, 2),
        ];
        let out = RulingGridBuilder
            .detect(&page(tokens, grid_rulings(2, 3)), &ExtractionConfig::default())
            .unwrap();
        assert_eq!(out.candidates.len(), 1);
        let t = &out.candidates[0];
        assert_eq!(t.row_count(), 2);
        assert_eq!(t.col_count(), 3);
        assert_eq!(t.cell(1, 2).unwrap().text, "f");
        assert!(t.confidence() > 0.9);
        assert_eq!(out.tokens_dropped, 0);
    }

    #[test]
    fn test_stray_rules_emit_nothing() {
        // Two horizontal rules and one vertical: no closed grid.
        let segs = vec![
            LineSegment::new(50.0, 100.0, 500.0, 100.0),
            LineSegment::new(50.0, 300.0, 500.0, 300.0),
            LineSegment::new(200.0, 100.0, 200.0, 300.0),
        ];
        let out = RulingGridBuilder
            .detect(&page(vec![], segs), &ExtractionConfig::default())
            .unwrap();
        assert!(out.candidates.is_empty());
    }

    #[test]
    fn test_tokens_outside_grid_are_counted() {
        let mut tokens = vec![
            cell_token("a", 0, 0),
            cell_token("b", 0, 1),
            cell_token("c", 1, 0),
            cell_token("d", 1, 1),
        ];
        tokens.push(Token::new("Title", BBox::new(100.0, 40.0, 160.0, 52.0)));
        let out = RulingGridBuilder
            .detect(&page(tokens, grid_rulings(2, 2)), &ExtractionConfig::default())
            .unwrap();
        assert_eq!(out.candidates.len(), 1);
        assert_eq!(out.tokens_dropped, 1);
    }

    #[test]
    fn test_mostly_empty_grid_is_penalised() {
        // 4x4 grid, only the corner cell has text.
        let tokens = vec![cell_token("x", 0, 0)];
        let out = RulingGridBuilder
            .detect(&page(tokens, grid_rulings(4, 4)), &ExtractionConfig::default())
            .unwrap();
        assert_eq!(out.candidates.len(), 1);
        assert!(out.candidates[0].confidence() < 0.35);
    }

    #[test]
    fn test_jittered_rulings_merge() {
        let mut segs = grid_rulings(2, 2);
        // Duplicate stroke 1pt below the top rule, as double-drawn borders do.
        segs.push(LineSegment::new(100.0, 101.0, 200.0, 101.0));
        let tokens = vec![
            cell_token("a", 0, 0),
            cell_token("b", 0, 1),
            cell_token("c", 1, 0),
            cell_token("d", 1, 1),
        ];
        let out = RulingGridBuilder
            .detect(&page(tokens, segs), &ExtractionConfig::default())
            .unwrap();
        assert_eq!(out.candidates[0].row_count(), 2);
    }

    #[test]
    fn test_two_separate_tables() {
        let mut segs = grid_rulings(2, 2);
        for s in grid_rulings(2, 2) {
            segs.push(LineSegment::new(
                s.start.x,
                s.start.y + 200.0,
                s.end.x,
                s.end.y + 200.0,
            ));
        }
        let mut tokens = Vec::new();
        for (r, c) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            tokens.push(cell_token("top", r, c));
            let mut t = cell_token("bottom", r, c);
            t.bbox.y0 += 200.0;
            t.bbox.y1 += 200.0;
            tokens.push(t);
        }
        let out = RulingGridBuilder
            .detect(&page(tokens, segs), &ExtractionConfig::default())
            .unwrap();
        assert_eq!(out.candidates.len(), 2);
    }
}
