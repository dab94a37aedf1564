//! 1-D clustering and grid assembly shared by the detection strategies.
//!
//! Clustering is an explicit sort-and-sweep: values are sorted (ties broken
//! by index) and a value joins the open cluster when it lies within the
//! threshold of the previous value. The result depends only on the input.

use crate::error::StrategyError;
use crate::geometry::{BBox, Token};
use crate::model::Cell;

/// An inferred interval along one axis and the indices of its members.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub start: f32,
    pub end: f32,
    pub members: Vec<usize>,
}

impl Band {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn overlap(&self, other: &Band) -> f32 {
        (self.end.min(other.end) - self.start.max(other.start)).max(0.0)
    }
}

/// Single-linkage clustering of `(value, id)` pairs.
///
/// Band bounds are the min/max member values; callers that need token
/// extents recompute them from the members.
pub fn cluster_1d(items: &[(f32, usize)], threshold: f32) -> Vec<Band> {
    let mut sorted: Vec<(f32, usize)> = items.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut bands: Vec<Band> = Vec::new();
    let mut last = f32::NEG_INFINITY;
    for (value, id) in sorted {
        match bands.last_mut() {
            Some(band) if value - last <= threshold => {
                band.end = value;
                band.members.push(id);
            }
            _ => bands.push(Band {
                start: value,
                end: value,
                members: vec![id],
            }),
        }
        last = value;
    }
    bands
}

pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Median token height of the given tokens.
pub fn median_height(tokens: &[Token], indices: &[usize]) -> Option<f32> {
    let heights: Vec<f32> = indices.iter().map(|&i| tokens[i].bbox.height()).collect();
    median(&heights)
}

/// Group tokens into text lines by vertical center, top to bottom, each
/// line ordered left to right.
pub fn group_lines(tokens: &[Token], indices: &[usize], threshold: f32) -> Vec<Vec<usize>> {
    let centers: Vec<(f32, usize)> = indices
        .iter()
        .map(|&i| (tokens[i].bbox.center_y(), i))
        .collect();
    cluster_1d(&centers, threshold)
        .into_iter()
        .map(|band| {
            let mut line = band.members;
            sort_left_to_right(tokens, &mut line);
            line
        })
        .collect()
}

/// Left edge first; at the same left edge the larger font reads first, so
/// a marker set in a small font follows the text it annotates.
fn sort_left_to_right(tokens: &[Token], line: &mut [usize]) {
    line.sort_by(|&a, &b| {
        tokens[a]
            .bbox
            .x0
            .total_cmp(&tokens[b].bbox.x0)
            .then(tokens[b].font_size.total_cmp(&tokens[a].font_size))
            .then(a.cmp(&b))
    });
}

/// Reading-order text of a set of tokens: lines top to bottom, tokens left
/// to right within a line.
pub fn reading_order_text(tokens: &[Token], indices: &[usize]) -> String {
    if indices.is_empty() {
        return String::new();
    }
    let threshold = median_height(tokens, indices).unwrap_or(0.0) * 0.5;
    group_lines(tokens, indices, threshold)
        .iter()
        .flat_map(|line| line.iter().map(|&i| tokens[i].text.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Index of the interval of `edges` holding `v`. Edges are sorted; the last
/// edge belongs to the last interval.
pub fn locate(edges: &[f32], v: f32) -> Option<usize> {
    let first = *edges.first()?;
    let last = *edges.last()?;
    if edges.len() < 2 || v < first || v > last {
        return None;
    }
    let idx = edges.partition_point(|&e| e <= v);
    Some(idx.saturating_sub(1).min(edges.len() - 2))
}

/// A dense grid with tokens assigned to cells.
#[derive(Debug, Clone)]
pub struct Grid {
    pub rows: Vec<Vec<Cell>>,
    /// Tokens whose center fell outside every cell.
    pub dropped: Vec<usize>,
}

impl Grid {
    pub fn filled_cells(&self) -> usize {
        self.rows.iter().flatten().filter(|c| !c.is_empty()).count()
    }

    pub fn cell_count(&self) -> usize {
        self.rows.iter().map(|r| r.len()).sum()
    }

    /// Empty cells not on the outer border of the grid.
    pub fn empty_interior_cells(&self) -> usize {
        let n_rows = self.rows.len();
        self.rows
            .iter()
            .enumerate()
            .filter(|(r, _)| *r > 0 && *r + 1 < n_rows)
            .flat_map(|(_, row)| {
                let n_cols = row.len();
                row.iter()
                    .enumerate()
                    .filter(move |(c, cell)| *c > 0 && *c + 1 < n_cols && cell.is_empty())
            })
            .count()
    }
}

/// Intersect row and column edges into cells and place every token whose
/// center lies inside the grid.
pub fn build_grid(
    row_edges: &[f32],
    col_edges: &[f32],
    tokens: &[Token],
    indices: &[usize],
) -> Result<Grid, StrategyError> {
    check_edges(row_edges, "row")?;
    check_edges(col_edges, "column")?;

    let n_rows = row_edges.len() - 1;
    let n_cols = col_edges.len() - 1;
    let mut slots: Vec<Vec<usize>> = vec![Vec::new(); n_rows * n_cols];
    let mut dropped = Vec::new();

    for &i in indices {
        let bbox = &tokens[i].bbox;
        match (
            locate(row_edges, bbox.center_y()),
            locate(col_edges, bbox.center_x()),
        ) {
            (Some(r), Some(c)) => slots[r * n_cols + c].push(i),
            _ => dropped.push(i),
        }
    }

    let rows = (0..n_rows)
        .map(|r| {
            (0..n_cols)
                .map(|c| {
                    let members = &slots[r * n_cols + c];
                    Cell {
                        row: r,
                        col: c,
                        bbox: BBox::new(col_edges[c], row_edges[r], col_edges[c + 1], row_edges[r + 1]),
                        text: reading_order_text(tokens, members),
                        token_count: members.len(),
                        amount: None,
                    }
                })
                .collect()
        })
        .collect();

    Ok(Grid { rows, dropped })
}

fn check_edges(edges: &[f32], axis: &str) -> Result<(), StrategyError> {
    if edges.len() < 2 {
        return Err(StrategyError::DegenerateBands(format!(
            "{axis} edges need at least 2 boundaries, got {}",
            edges.len()
        )));
    }
    if edges.iter().any(|e| !e.is_finite()) {
        return Err(StrategyError::NonFiniteGeometry(format!("{axis} edge")));
    }
    if edges.windows(2).any(|w| w[1] <= w[0]) {
        return Err(StrategyError::DegenerateBands(format!(
            "{axis} edges are not strictly increasing"
        )));
    }
    Ok(())
}

/// Turn ordered, non-overlapping bands into grid edges: outer edges at the
/// band extremes, inner edges midway between neighbours.
pub fn bands_to_edges(bands: &[Band]) -> Vec<f32> {
    let (Some(first), Some(last)) = (bands.first(), bands.last()) else {
        return Vec::new();
    };
    let mut edges = Vec::with_capacity(bands.len() + 1);
    edges.push(first.start);
    for pair in bands.windows(2) {
        edges.push((pair[0].end + pair[1].start) / 2.0);
    }
    edges.push(last.end);
    edges
}

/// Coefficient of variation of consecutive gaps; 0 for perfectly regular
/// spacing or fewer than two gaps.
pub fn spacing_irregularity(positions: &[f32]) -> f32 {
    let gaps: Vec<f32> = positions.windows(2).map(|w| w[1] - w[0]).collect();
    if gaps.len() < 2 {
        return 0.0;
    }
    let mean = gaps.iter().sum::<f32>() / gaps.len() as f32;
    if mean <= 0.0 {
        return 1.0;
    }
    let var = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f32>() / gaps.len() as f32;
    var.sqrt() / mean
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(text: &str, x0: f32, y0: f32, x1: f32, y1: f32) -> Token {
        Token::new(text, BBox::new(x0, y0, x1, y1))
    }

    #[test]
    fn test_cluster_1d_sweep() {
        let items = vec![(10.0, 0), (11.0, 1), (30.0, 2), (12.5, 3), (31.0, 4)];
        let bands = cluster_1d(&items, 2.0);
        assert_eq!(bands.len(), 2);
        assert_eq!(bands[0].members, vec![0, 1, 3]);
        assert_eq!(bands[0].start, 10.0);
        assert_eq!(bands[0].end, 12.5);
        assert_eq!(bands[1].members, vec![2, 4]);
    }

    #[test]
    fn test_cluster_1d_ties_by_index() {
        let items = vec![(5.0, 3), (5.0, 1), (5.0, 2)];
        let bands = cluster_1d(&items, 0.0);
        assert_eq!(bands.len(), 1);
        assert_eq!(bands[0].members, vec![1, 2, 3]);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_locate() {
        let edges = [0.0, 10.0, 20.0];
        assert_eq!(locate(&edges, 5.0), Some(0));
        assert_eq!(locate(&edges, 10.0), Some(1));
        assert_eq!(locate(&edges, 20.0), Some(1));
        assert_eq!(locate(&edges, 25.0), None);
        assert_eq!(locate(&edges, -1.0), None);
    }

    #[test]
    fn test_reading_order_text() {
        let tokens = vec![
            tok("world", 40.0, 0.0, 70.0, 10.0),
            tok("again", 0.0, 12.0, 30.0, 22.0),
            tok("hello", 0.0, 0.5, 30.0, 10.5),
        ];
        assert_eq!(reading_order_text(&tokens, &[0, 1, 2]), "hello world again");
    }

    #[test]
    fn test_same_left_edge_orders_by_font_size() {
        let mut marker = tok("*", 10.0, 2.0, 14.0, 8.0);
        marker.font_size = 6.0;
        let mut word = tok("Total", 10.0, 0.0, 40.0, 10.0);
        word.font_size = 10.0;
        let tokens = vec![marker, word];
        let lines = group_lines(&tokens, &[0, 1], 5.0);
        assert_eq!(lines, vec![vec![1, 0]]);
    }

    #[test]
    fn test_build_grid_assigns_by_center() {
        let tokens = vec![
            tok("a", 1.0, 1.0, 5.0, 5.0),
            tok("b", 12.0, 1.0, 18.0, 5.0),
            tok("c", 12.0, 12.0, 18.0, 18.0),
            tok("outside", 50.0, 50.0, 60.0, 60.0),
        ];
        let grid = build_grid(&[0.0, 10.0, 20.0], &[0.0, 10.0, 20.0], &tokens, &[0, 1, 2, 3]).unwrap();
        assert_eq!(grid.rows.len(), 2);
        assert_eq!(grid.rows[0][1].text, "b");
        assert!(grid.rows[1][0].is_empty());
        assert_eq!(grid.dropped, vec![3]);
        assert_eq!(grid.filled_cells(), 3);
    }

    #[test]
    fn test_build_grid_rejects_unsorted_edges() {
        let err = build_grid(&[0.0, 10.0, 5.0], &[0.0, 10.0], &[], &[]).unwrap_err();
        assert!(matches!(err, StrategyError::DegenerateBands(_)));
    }

    #[test]
    fn test_bands_to_edges() {
        let bands = vec![
            Band { start: 0.0, end: 10.0, members: vec![0] },
            Band { start: 20.0, end: 30.0, members: vec![1] },
        ];
        assert_eq!(bands_to_edges(&bands), vec![0.0, 15.0, 30.0]);
    }

    #[test]
    fn test_spacing_irregularity() {
        assert_eq!(spacing_irregularity(&[0.0, 10.0, 20.0, 30.0]), 0.0);
        assert!(spacing_irregularity(&[0.0, 2.0, 30.0, 31.0]) > 0.5);
    }
}
