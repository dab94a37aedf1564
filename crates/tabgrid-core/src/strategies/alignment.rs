//! Borderless tables inferred from whitespace alignment.
//!
//! Rows come from clustering token centers. Columns are seeded from left
//! edges that recur on several rows, then from right edges (right-aligned
//! numbers) among the tokens left over. Lines that touch too few columns
//! are continuation lines of the row above when they sit closer than the
//! row pitch, and sparse rows with empty cells when they sit at it.

use super::cluster::{
    bands_to_edges, build_grid, cluster_1d, group_lines, median, median_height,
    spacing_irregularity, Band,
};
use super::{StrategyOutput, TableStrategy};
use crate::config::ExtractionConfig;
use crate::error::StrategyError;
use crate::geometry::{CleanPage, Token};
use crate::model::{StrategyKind, TableCandidate};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Vertical gap, in median token heights, that separates two tables.
const BLOCK_GAP_FACTOR: f32 = 2.5;
/// An unanchored line nearer than this share of the row pitch wraps the
/// row above.
const CONTINUATION_PITCH_FACTOR: f32 = 0.75;
/// Lines after the last anchored row must follow within this much pitch.
const TRAILING_PITCH_FACTOR: f32 = 1.25;
/// Alignment never claims full certainty.
const MAX_CONFIDENCE: f32 = 0.9;

#[derive(Debug, Clone, Copy, Default)]
pub struct AlignmentClusterer;

impl TableStrategy for AlignmentClusterer {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Alignment
    }

    fn detect(
        &self,
        page: &CleanPage,
        config: &ExtractionConfig,
    ) -> Result<StrategyOutput, StrategyError> {
        let mut output = StrategyOutput::default();
        let all: Vec<usize> = (0..page.tokens.len()).collect();
        let Some(height) = median_height(&page.tokens, &all) else {
            return Ok(output);
        };
        if height <= 0.0 {
            return Err(StrategyError::DegenerateBands(format!(
                "median token height is {height}"
            )));
        }

        let lines = group_lines(&page.tokens, &all, config.row_height_factor * height);
        for block in split_blocks(&page.tokens, lines, BLOCK_GAP_FACTOR * height) {
            if block.len() < config.min_rows {
                output.bands_rejected += block.len();
                continue;
            }
            if let Some(candidate) = detect_block(&page.tokens, &block, config, &mut output) {
                output.candidates.push(candidate);
            }
        }
        Ok(output)
    }
}

fn line_extent(tokens: &[Token], line: &[usize]) -> (f32, f32) {
    line.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &i| {
        (lo.min(tokens[i].bbox.y0), hi.max(tokens[i].bbox.y1))
    })
}

fn line_center(tokens: &[Token], line: &[usize]) -> f32 {
    let (top, bottom) = line_extent(tokens, line);
    (top + bottom) / 2.0
}

/// Median center distance between anchored rows. Pairs of anchored rows on
/// adjacent lines are preferred; they carry no sparse row in between.
fn row_pitch(tokens: &[Token], block: &[Vec<usize>], rows: &[usize]) -> f32 {
    let gap = |a: usize, b: usize| line_center(tokens, &block[b]) - line_center(tokens, &block[a]);
    let adjacent: Vec<f32> = rows
        .windows(2)
        .filter(|w| w[1] == w[0] + 1)
        .map(|w| gap(w[0], w[1]))
        .collect();
    let gaps = if adjacent.is_empty() {
        rows.windows(2).map(|w| gap(w[0], w[1])).collect()
    } else {
        adjacent
    };
    median(&gaps).unwrap_or(0.0)
}

/// Every token of the line has its center inside some column band.
fn inside_columns(tokens: &[Token], line: &[usize], columns: &[Band], tolerance: f32) -> bool {
    line.iter().all(|&i| {
        let x = tokens[i].bbox.center_x();
        columns
            .iter()
            .any(|c| x >= c.start - tolerance && x <= c.end + tolerance)
    })
}

/// Split top-to-bottom lines wherever the vertical gap exceeds `gap`.
fn split_blocks(tokens: &[Token], lines: Vec<Vec<usize>>, gap: f32) -> Vec<Vec<Vec<usize>>> {
    let mut blocks: Vec<Vec<Vec<usize>>> = Vec::new();
    let mut prev_bottom = f32::NEG_INFINITY;
    for line in lines {
        let (top, bottom) = line_extent(tokens, &line);
        match blocks.last_mut() {
            Some(block) if top - prev_bottom <= gap => block.push(line),
            _ => blocks.push(vec![line]),
        }
        prev_bottom = prev_bottom.max(bottom);
    }
    blocks
}

fn detect_block(
    tokens: &[Token],
    block: &[Vec<usize>],
    config: &ExtractionConfig,
    output: &mut StrategyOutput,
) -> Option<TableCandidate> {
    let line_of: HashMap<usize, usize> = block
        .iter()
        .enumerate()
        .flat_map(|(l, line)| line.iter().map(move |&i| (i, l)))
        .collect();

    let seeds = merge_overlapping(seed_columns(tokens, block, &line_of, config));
    let seeded = seeds.len();
    let (rows, columns) = filter_bands(seeds, block.len(), &line_of, config);
    output.bands_rejected += (block.len() - rows.len()) + (seeded - columns.len());

    if rows.len() < config.min_rows || columns.len() < config.min_cols {
        return None;
    }
    let (first, last) = (rows[0], rows[rows.len() - 1]);
    let pitch = row_pitch(tokens, block, &rows);

    // Unanchored lines closer than the row pitch wrap the row above; at
    // the pitch they are rows with empty cells. Past the last anchored row
    // a line only extends the table at its pitch and inside its columns.
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut continuation = 0;
    let mut prev_center = line_center(tokens, &block[first]);
    for (l, line) in block.iter().enumerate().skip(first) {
        let center = line_center(tokens, line);
        let gap = center - prev_center;
        prev_center = center;
        if rows.contains(&l) {
            groups.push(line.clone());
            continue;
        }
        if l > last
            && (gap > TRAILING_PITCH_FACTOR * pitch
                || !inside_columns(tokens, line, &columns, config.column_tolerance))
        {
            break;
        }
        if gap < CONTINUATION_PITCH_FACTOR * pitch {
            continuation += 1;
            if let Some(group) = groups.last_mut() {
                group.extend(line.iter().copied());
            }
        } else {
            groups.push(line.clone());
        }
    }
    if continuation > rows.len() {
        debug!(rows = rows.len(), continuation, "alignment block is mostly prose");
        return None;
    }
    let region: Vec<usize> = groups.iter().flatten().copied().collect();

    let column_bands = column_extents(tokens, &region, &columns)?;
    if column_bands.windows(2).any(|w| w[1].start < w[0].end) {
        debug!(columns = column_bands.len(), "alignment column bands overlap");
        output.bands_rejected += column_bands.len();
        return None;
    }

    let row_bands: Vec<Band> = groups
        .iter()
        .map(|g| {
            let (start, end) = line_extent(tokens, g);
            Band {
                start,
                end,
                members: g.clone(),
            }
        })
        .collect();

    let grid = match build_grid(
        &bands_to_edges(&row_bands),
        &bands_to_edges(&column_bands),
        tokens,
        &region,
    ) {
        Ok(grid) => grid,
        Err(e) => {
            debug!(error = %e, "alignment bands do not form a grid");
            output.bands_rejected += row_bands.len() + column_bands.len();
            return None;
        }
    };
    output.tokens_dropped += grid.dropped.len();

    let centers: Vec<f32> = row_bands.iter().map(|b| (b.start + b.end) / 2.0).collect();
    let regularity = 1.0 - spacing_irregularity(&centers).min(1.0);
    let fill = grid.filled_cells() as f32 / grid.cell_count().max(1) as f32;
    let depth = ((row_bands.len() - 1) as f32 / 5.0).min(1.0);
    let confidence = MAX_CONFIDENCE * (0.4 * regularity + 0.4 * fill + 0.2 * depth);

    TableCandidate::new(
        StrategyKind::Alignment,
        grid.rows,
        confidence,
        config.min_rows,
        config.min_cols,
    )
}

/// Number of distinct lines among `members`.
fn line_support(members: &[usize], line_of: &HashMap<usize, usize>) -> usize {
    members
        .iter()
        .filter_map(|i| line_of.get(i))
        .collect::<HashSet<_>>()
        .len()
}

/// Column seeds: recurring left edges first, then recurring right edges of
/// the tokens no left seed claimed. Bands span their members' extents.
fn seed_columns(
    tokens: &[Token],
    block: &[Vec<usize>],
    line_of: &HashMap<usize, usize>,
    config: &ExtractionConfig,
) -> Vec<Band> {
    let left: Vec<(f32, usize)> = block
        .iter()
        .flatten()
        .map(|&i| (tokens[i].bbox.x0, i))
        .collect();

    let mut bands = Vec::new();
    let mut claimed: HashSet<usize> = HashSet::new();
    for band in cluster_1d(&left, config.column_tolerance) {
        if line_support(&band.members, line_of) >= config.min_rows {
            claimed.extend(band.members.iter().copied());
            bands.push(band);
        }
    }

    let right: Vec<(f32, usize)> = block
        .iter()
        .flatten()
        .filter(|i| !claimed.contains(i))
        .map(|&i| (tokens[i].bbox.x1, i))
        .collect();
    bands.extend(
        cluster_1d(&right, config.column_tolerance)
            .into_iter()
            .filter(|band| line_support(&band.members, line_of) >= config.min_rows),
    );

    for band in &mut bands {
        band.start = band
            .members
            .iter()
            .map(|&i| tokens[i].bbox.x0)
            .fold(f32::INFINITY, f32::min);
        band.end = band
            .members
            .iter()
            .map(|&i| tokens[i].bbox.x1)
            .fold(f32::NEG_INFINITY, f32::max);
    }
    bands.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.end.total_cmp(&b.end)));
    bands
}

/// Merge bands overlapping by more than half of the narrower one; those
/// are the same column seen from both edges.
fn merge_overlapping(bands: Vec<Band>) -> Vec<Band> {
    let mut merged: Vec<Band> = Vec::with_capacity(bands.len());
    for band in bands {
        match merged.last_mut() {
            Some(prev) => {
                let narrower = (prev.end - prev.start).min(band.end - band.start);
                if narrower > 0.0 && prev.overlap(&band) > 0.5 * narrower {
                    prev.start = prev.start.min(band.start);
                    prev.end = prev.end.max(band.end);
                    prev.members.extend(band.members);
                } else {
                    merged.push(band);
                }
            }
            None => merged.push(band),
        }
    }
    merged
}

/// Drop lines touching fewer than `min_cols` columns and columns supported
/// by fewer than `min_rows` remaining lines, until neither changes.
fn filter_bands(
    mut columns: Vec<Band>,
    line_count: usize,
    line_of: &HashMap<usize, usize>,
    config: &ExtractionConfig,
) -> (Vec<usize>, Vec<Band>) {
    let mut rows: Vec<usize> = (0..line_count).collect();
    loop {
        let column_lines: Vec<HashSet<usize>> = columns
            .iter()
            .map(|b| b.members.iter().filter_map(|i| line_of.get(i).copied()).collect())
            .collect();

        let next_rows: Vec<usize> = rows
            .iter()
            .copied()
            .filter(|l| column_lines.iter().filter(|s| s.contains(l)).count() >= config.min_cols)
            .collect();
        let keep: Vec<bool> = column_lines
            .iter()
            .map(|s| s.iter().filter(|l| next_rows.contains(l)).count() >= config.min_rows)
            .collect();

        let stable = next_rows.len() == rows.len() && keep.iter().all(|k| *k);
        columns = columns
            .into_iter()
            .zip(keep)
            .filter_map(|(band, k)| k.then_some(band))
            .collect();
        rows = next_rows;
        if stable {
            return (rows, columns);
        }
    }
}

/// Give every region token to the last column starting at or before its
/// center and widen the columns to what they received.
fn column_extents(tokens: &[Token], region: &[usize], columns: &[Band]) -> Option<Vec<Band>> {
    let starts: Vec<f32> = columns.iter().map(|b| b.start).collect();
    let mut extents: Vec<Option<(f32, f32)>> = vec![None; columns.len()];
    for &i in region {
        let bbox = &tokens[i].bbox;
        let k = starts.partition_point(|&s| s <= bbox.center_x());
        if k == 0 {
            continue;
        }
        let slot = &mut extents[k - 1];
        *slot = Some(match *slot {
            Some((lo, hi)) => (lo.min(bbox.x0), hi.max(bbox.x1)),
            None => (bbox.x0, bbox.x1),
        });
    }

    let bands: Vec<Band> = columns
        .iter()
        .zip(extents)
        .map(|(col, ext)| {
            let (start, end) = ext.unwrap_or((col.start, col.end));
            Band {
                start,
                end,
                members: Vec::new(),
            }
        })
        .collect();
    (!bands.is_empty()).then_some(bands)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BBox, PageInput};

    fn tok(text: &str, x0: f32, y0: f32) -> Token {
        let width = 6.0 * text.len() as f32;
        Token::new(text, BBox::new(x0, y0, x0 + width, y0 + 10.0))
    }

    fn page(tokens: Vec<Token>) -> CleanPage {
        CleanPage::from_input(&PageInput {
            page_number: 1,
            width: 600.0,
            height: 800.0,
            tokens,
            segments: Vec::new(),
        })
    }

    fn detect(tokens: Vec<Token>) -> StrategyOutput {
        AlignmentClusterer
            .detect(&page(tokens), &ExtractionConfig::default())
            .unwrap()
    }

    #[test]
    fn test_three_by_two_with_jitter() {
        let out = detect(vec![
            tok("Name", 100.0, 100.0),
            tok("Qty", 300.0, 100.5),
            tok("Alice", 100.8, 120.0),
            tok("12", 299.2, 119.4),
            tok("Bob", 99.5, 140.0),
            tok("7", 300.6, 140.9),
        ]);
        assert_eq!(out.candidates.len(), 1);
        let t = &out.candidates[0];
        assert_eq!(t.row_count(), 3);
        assert_eq!(t.col_count(), 2);
        assert_eq!(
            t.text_grid(),
            vec![vec!["Name", "Qty"], vec!["Alice", "12"], vec!["Bob", "7"]]
        );
        assert!(t.confidence() > 0.35);
    }

    #[test]
    fn test_multi_word_cell_keeps_reading_order() {
        let out = detect(vec![
            tok("Grocery", 100.0, 100.0),
            tok("store", 150.0, 100.0),
            tok("1,200.00", 300.0, 100.0),
            tok("Rent", 100.0, 120.0),
            tok("900.00", 312.0, 120.0),
            tok("Fuel", 100.0, 140.0),
            tok("45.50", 318.0, 140.0),
        ]);
        assert_eq!(out.candidates.len(), 1);
        let t = &out.candidates[0];
        assert_eq!(t.col_count(), 2);
        assert_eq!(t.cell(0, 0).unwrap().text, "Grocery store");
        assert_eq!(t.cell(2, 1).unwrap().text, "45.50");
    }

    #[test]
    fn test_single_column_list_is_not_a_table() {
        let out = detect(vec![
            tok("alpha", 100.0, 100.0),
            tok("beta", 100.0, 120.0),
            tok("gamma", 100.0, 140.0),
        ]);
        assert!(out.candidates.is_empty());
    }

    #[test]
    fn test_prose_paragraph_is_not_a_table() {
        let rows: [[f32; 4]; 4] = [
            [50.0, 90.0, 150.0, 230.0],
            [50.0, 110.0, 175.0, 260.0],
            [50.0, 80.0, 140.0, 210.0],
            [50.0, 120.0, 190.0, 250.0],
        ];
        let mut tokens = Vec::new();
        for (r, xs) in rows.iter().enumerate() {
            for &x in xs {
                let y = 100.0 + 12.0 * r as f32;
                tokens.push(Token::new("word", BBox::new(x, y, x + 25.0, y + 10.0)));
            }
        }
        assert!(detect(tokens).candidates.is_empty());
    }

    #[test]
    fn test_gap_separates_tables() {
        let mut tokens = Vec::new();
        for base in [100.0, 400.0] {
            for r in 0..3 {
                let y = base + 20.0 * r as f32;
                tokens.push(tok("key", 100.0, y));
                tokens.push(tok("value", 300.0, y));
            }
        }
        let out = detect(tokens);
        assert_eq!(out.candidates.len(), 2);
        assert!(out.candidates.iter().all(|t| t.row_count() == 3));
    }

    #[test]
    fn test_continuation_line_joins_row_above() {
        let out = detect(vec![
            tok("Item", 100.0, 100.0),
            tok("Price", 300.0, 100.0),
            tok("Blue", 100.0, 120.0),
            tok("9.99", 300.0, 120.0),
            tok("widget", 100.0, 132.0),
            tok("Red", 100.0, 152.0),
            tok("4.50", 300.0, 152.0),
        ]);
        assert_eq!(out.candidates.len(), 1);
        let t = &out.candidates[0];
        assert_eq!(t.row_count(), 3);
        assert_eq!(t.cell(1, 0).unwrap().text, "Blue widget");
    }

    #[test]
    fn test_sparse_row_at_pitch_keeps_empty_cells() {
        let out = detect(vec![
            tok("Name", 100.0, 100.0),
            tok("Qty", 250.0, 100.0),
            tok("Price", 400.0, 100.0),
            tok("Apple", 100.0, 120.0),
            tok("3", 250.0, 120.0),
            tok("1.00", 400.0, 120.0),
            tok("Kiwi", 100.0, 140.0),
            tok("Pear", 100.0, 160.0),
            tok("5", 250.0, 160.0),
            tok("2.00", 400.0, 160.0),
            tok("Plum", 100.0, 180.0),
            tok("7", 250.0, 180.0),
            tok("3.00", 400.0, 180.0),
        ]);
        assert_eq!(out.candidates.len(), 1);
        let t = &out.candidates[0];
        assert_eq!(t.row_count(), 5);
        assert_eq!(t.col_count(), 3);
        assert_eq!(t.text_grid()[1], vec!["Apple", "3", "1.00"]);
        assert_eq!(t.text_grid()[2], vec!["Kiwi", "", ""]);
        assert_eq!(t.text_grid()[3], vec!["Pear", "5", "2.00"]);
    }

    #[test]
    fn test_trailing_sparse_row_is_kept() {
        let out = detect(vec![
            tok("Name", 100.0, 100.0),
            tok("Qty", 250.0, 100.0),
            tok("Price", 400.0, 100.0),
            tok("Apple", 100.0, 120.0),
            tok("3", 250.0, 120.0),
            tok("1.00", 400.0, 120.0),
            tok("Pear", 100.0, 140.0),
            tok("5", 250.0, 140.0),
            tok("2.00", 400.0, 140.0),
            tok("Kiwi", 100.0, 160.0),
        ]);
        assert_eq!(out.candidates.len(), 1);
        let t = &out.candidates[0];
        assert_eq!(t.row_count(), 4);
        assert_eq!(t.text_grid()[3], vec!["Kiwi", "", ""]);
        assert_eq!(out.tokens_dropped, 0);
    }

    #[test]
    fn test_zero_height_tokens_are_degenerate() {
        let tokens = vec![
            Token::new("a", BBox::new(0.0, 10.0, 5.0, 10.0)),
            Token::new("b", BBox::new(20.0, 10.0, 25.0, 10.0)),
        ];
        let err = AlignmentClusterer
            .detect(&page(tokens), &ExtractionConfig::default())
            .unwrap_err();
        assert!(matches!(err, StrategyError::DegenerateBands(_)));
    }
}
