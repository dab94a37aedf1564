//! Financial statement layout: a date column anchoring one row per
//! transaction, a free-text description, and one or more amount columns.

use super::cluster::{cluster_1d, group_lines, median_height, reading_order_text, Band};
use super::{StrategyOutput, TableStrategy};
use crate::config::ExtractionConfig;
use crate::error::StrategyError;
use crate::geometry::{BBox, CleanPage, Token};
use crate::model::{Cell, StrategyKind, TableCandidate};
use crate::statement::{
    heading_hits, is_amount, is_date, is_page_furniture, looks_like_statement, parse_amount,
};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Added when the page text reads like a statement.
const KEYWORD_BONUS: f32 = 0.05;
/// Longest date written as separate tokens ("01 Jan 2024").
const MAX_DATE_TOKENS: usize = 3;
/// Dates may be preceded by a serial-number column.
const DATE_SEARCH_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct BankStatementRecognizer;

/// An amount column found by right-edge alignment.
#[derive(Debug, Clone, Copy, PartialEq)]
struct AmountColumn {
    x1_lo: f32,
    x1_hi: f32,
    start: f32,
    end: f32,
}

impl AmountColumn {
    fn accepts(&self, token: &Token, tolerance: f32) -> bool {
        let x1 = token.bbox.x1;
        x1 >= self.x1_lo - tolerance && x1 <= self.x1_hi + tolerance && is_amount(&token.text)
    }
}

/// Where the transaction list sits on the page.
#[derive(Debug, Clone)]
struct StatementLayout {
    /// Line indices of the transaction region, furniture removed.
    region: Vec<usize>,
    /// Date tokens of every anchored line.
    dates: HashMap<usize, Vec<usize>>,
    header_line: Option<usize>,
    date_x0: f32,
    date_x1: f32,
    amounts: Vec<AmountColumn>,
    match_rate: f32,
}

impl TableStrategy for BankStatementRecognizer {
    fn kind(&self) -> StrategyKind {
        StrategyKind::BankStatement
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

        let Some(layout) = analyse(&page.tokens, &lines, config) else {
            return Ok(output);
        };

        let page_text = lines
            .iter()
            .map(|line| line_text(&page.tokens, line))
            .collect::<Vec<_>>()
            .join("\n");
        let (candidate, dropped) = assemble(&page.tokens, &lines, &layout, &page_text, config);
        output.tokens_dropped = dropped;
        output.candidates.extend(candidate);
        Ok(output)
    }
}

fn line_text(tokens: &[Token], line: &[usize]) -> String {
    line.iter()
        .map(|&i| tokens[i].text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Date tokens at the start of a line, joining up to three tokens.
fn find_date(tokens: &[Token], line: &[usize]) -> Option<Vec<usize>> {
    for start in 0..line.len().min(DATE_SEARCH_DEPTH) {
        for n in 1..=MAX_DATE_TOKENS {
            let Some(span) = line.get(start..start + n) else {
                break;
            };
            if is_date(&line_text(tokens, span)) {
                return Some(span.to_vec());
            }
        }
    }
    None
}

fn analyse(
    tokens: &[Token],
    lines: &[Vec<usize>],
    config: &ExtractionConfig,
) -> Option<StatementLayout> {
    let found: HashMap<usize, Vec<usize>> = lines
        .iter()
        .enumerate()
        .filter_map(|(l, line)| find_date(tokens, line).map(|d| (l, d)))
        .collect();

    // The date column is the largest group of dates sharing a left edge.
    let starts: Vec<(f32, usize)> = found
        .iter()
        .map(|(&l, date)| (tokens[date[0]].bbox.x0, l))
        .collect();
    let column = cluster_1d(&starts, config.column_tolerance)
        .into_iter()
        .fold(None, |best: Option<Band>, band| match best {
            Some(b) if b.len() >= band.len() => Some(b),
            _ => Some(band),
        })?;
    if column.len() < config.min_rows {
        return None;
    }

    let dates: HashMap<usize, Vec<usize>> = column
        .members
        .iter()
        .filter_map(|l| found.get(l).map(|d| (*l, d.clone())))
        .collect();
    let first = *column.members.iter().min()?;
    let last = *column.members.iter().max()?;
    let region: Vec<usize> = (first..=last)
        .filter(|&l| dates.contains_key(&l) || !is_page_furniture(&line_text(tokens, &lines[l])))
        .collect();

    let date_tokens = dates.values().flatten();
    let date_x0 = date_tokens
        .clone()
        .map(|&i| tokens[i].bbox.x0)
        .fold(f32::INFINITY, f32::min);
    let date_x1 = date_tokens
        .map(|&i| tokens[i].bbox.x1)
        .fold(f32::NEG_INFINITY, f32::max);

    let amounts = amount_columns(tokens, lines, &region, &dates, date_x1, config);
    if amounts.is_empty() {
        debug!(dated = dates.len(), "dated rows but no amount column");
        return None;
    }

    let undated_with_amount = region
        .iter()
        .filter(|&&l| !dates.contains_key(&l))
        .filter(|&&l| {
            lines[l]
                .iter()
                .any(|&i| amounts.iter().any(|a| a.accepts(&tokens[i], config.column_tolerance)))
        })
        .count();
    let match_rate = dates.len() as f32 / (dates.len() + undated_with_amount) as f32;
    if match_rate < config.date_match_rate {
        debug!(match_rate, "date match rate below threshold");
        return None;
    }

    let header_line = first
        .checked_sub(1)
        .filter(|&l| {
            let text = line_text(tokens, &lines[l]);
            heading_hits(&text) >= 2 && !is_page_furniture(&text)
        });

    Some(StatementLayout {
        region,
        dates,
        header_line,
        date_x0,
        date_x1,
        amounts,
        match_rate,
    })
}

/// Amount-like tokens right of the date column, clustered by right edge.
fn amount_columns(
    tokens: &[Token],
    lines: &[Vec<usize>],
    region: &[usize],
    dates: &HashMap<usize, Vec<usize>>,
    date_x1: f32,
    config: &ExtractionConfig,
) -> Vec<AmountColumn> {
    let mut line_of: HashMap<usize, usize> = HashMap::new();
    let mut items: Vec<(f32, usize)> = Vec::new();
    for &l in region {
        let date = dates.get(&l);
        for &i in &lines[l] {
            let t = &tokens[i];
            if date.is_some_and(|d| d.contains(&i)) || t.bbox.x0 < date_x1 || !is_amount(&t.text) {
                continue;
            }
            line_of.insert(i, l);
            items.push((t.bbox.x1, i));
        }
    }

    let mut columns: Vec<AmountColumn> = cluster_1d(&items, config.column_tolerance)
        .into_iter()
        .filter(|band| {
            band.members
                .iter()
                .filter_map(|i| line_of.get(i))
                .collect::<HashSet<_>>()
                .len()
                >= config.min_rows
        })
        .map(|band| AmountColumn {
            x1_lo: band.start,
            x1_hi: band.end,
            start: band
                .members
                .iter()
                .map(|&i| tokens[i].bbox.x0)
                .fold(f32::INFINITY, f32::min),
            end: band.end,
        })
        .collect();
    columns.sort_by(|a, b| a.end.total_cmp(&b.end));
    columns
}

/// Column of a transaction-line token, `None` for tokens left of the date
/// column (serial numbers and the like).
fn column_of(token: &Token, layout: &StatementLayout, tolerance: f32) -> Option<usize> {
    if let Some(k) = layout.amounts.iter().position(|a| a.accepts(token, tolerance)) {
        return Some(2 + k);
    }
    let cx = token.bbox.center_x();
    if cx < layout.date_x0 - tolerance {
        return None;
    }
    let first_amount = layout.amounts.first().map(|a| a.start).unwrap_or(f32::INFINITY);
    if cx < first_amount {
        return Some(1);
    }
    nearest_amount(layout, cx).map(|k| 2 + k)
}

fn interval_distance(lo: f32, hi: f32, x: f32) -> f32 {
    if x < lo {
        lo - x
    } else if x > hi {
        x - hi
    } else {
        0.0
    }
}

fn nearest_amount(layout: &StatementLayout, x: f32) -> Option<usize> {
    layout
        .amounts
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            interval_distance(a.start, a.end, x).total_cmp(&interval_distance(b.start, b.end, x))
        })
        .map(|(k, _)| k)
}

/// Horizontal extent of each output column.
fn column_spans(layout: &StatementLayout) -> Vec<(f32, f32)> {
    let desc_end = layout
        .amounts
        .first()
        .map(|a| a.start)
        .unwrap_or(layout.date_x1)
        .max(layout.date_x1);
    let mut spans = vec![(layout.date_x0, layout.date_x1), (layout.date_x1, desc_end)];
    spans.extend(layout.amounts.iter().map(|a| (a.start, a.end)));
    spans
}

/// Header tokens go to the column whose span is nearest their center.
fn header_slots(tokens: &[Token], line: &[usize], spans: &[(f32, f32)]) -> Vec<Vec<usize>> {
    let mut slots = vec![Vec::new(); spans.len()];
    for &i in line {
        let cx = tokens[i].bbox.center_x();
        let nearest = spans
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| {
                interval_distance(a.0, a.1, cx).total_cmp(&interval_distance(b.0, b.1, cx))
            })
            .map(|(k, _)| k);
        if let Some(k) = nearest {
            slots[k].push(i);
        }
    }
    slots
}

fn assemble(
    tokens: &[Token],
    lines: &[Vec<usize>],
    layout: &StatementLayout,
    page_text: &str,
    config: &ExtractionConfig,
) -> (Option<TableCandidate>, usize) {
    let spans = column_spans(layout);
    let n_cols = spans.len();
    let mut dropped = 0;

    let mut rows: Vec<Vec<Vec<usize>>> = Vec::new();
    for &l in &layout.region {
        let date = layout.dates.get(&l);
        if let Some(date) = date {
            let mut row = vec![Vec::new(); n_cols];
            row[0] = date.clone();
            rows.push(row);
        }
        // Undated lines continue the transaction above.
        let Some(row) = rows.last_mut() else {
            continue;
        };
        for &i in &lines[l] {
            if date.is_some_and(|d| d.contains(&i)) {
                continue;
            }
            match column_of(&tokens[i], layout, config.column_tolerance) {
                Some(c) => row[c].push(i),
                None => dropped += 1,
            }
        }
    }

    let with_amount = rows
        .iter()
        .filter(|row| row[2..].iter().any(|slot| !slot.is_empty()))
        .count();
    let coverage = with_amount as f32 / rows.len().max(1) as f32;

    let header = layout
        .header_line
        .map(|l| header_slots(tokens, &lines[l], &spans))
        .filter(|slots| slots.iter().filter(|s| !s.is_empty()).count() >= 2);
    let has_header = header.is_some();
    if let Some(slots) = header {
        rows.insert(0, slots);
    }

    let grid: Vec<Vec<Cell>> = rows
        .iter()
        .enumerate()
        .map(|(r, row)| {
            let (y0, y1) = row.iter().flatten().fold(
                (f32::INFINITY, f32::NEG_INFINITY),
                |(lo, hi), &i| (lo.min(tokens[i].bbox.y0), hi.max(tokens[i].bbox.y1)),
            );
            row.iter()
                .zip(&spans)
                .enumerate()
                .map(|(c, (slot, &(x0, x1)))| {
                    let text = reading_order_text(tokens, slot);
                    // Columns after date and description hold amounts.
                    let amount = if c >= 2 { parse_amount(&text) } else { None };
                    Cell {
                        row: r,
                        col: c,
                        bbox: BBox::new(x0, y0, x1, y1),
                        text,
                        token_count: slot.len(),
                        amount,
                    }
                })
                .collect()
        })
        .collect();

    let base = config.bank_base_confidence;
    let mut confidence = base + (1.0 - base) * (0.5 * layout.match_rate + 0.5 * coverage);
    if looks_like_statement(page_text) {
        confidence += KEYWORD_BONUS;
    }
    debug!(
        rows = grid.len(),
        amount_columns = layout.amounts.len(),
        match_rate = layout.match_rate,
        confidence,
        "bank statement layout matched"
    );

    let candidate = TableCandidate::new(
        StrategyKind::BankStatement,
        grid,
        confidence,
        config.min_rows,
        config.min_cols,
    )
    .map(|t| if has_header { t.with_header() } else { t });
    (candidate, dropped)
}
