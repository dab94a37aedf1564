use std::fmt::Write;
use tabgrid_core::model::{Diagnostics, ExtractionResult};
use tabgrid_core::TableCandidate;

use crate::commands::ExtractedDocument;

/// Human-readable rendering of every page and table.
pub fn format_document(doc: &ExtractedDocument) -> String {
    let mut out = String::new();

    if !doc.header.is_empty() {
        let _ = writeln!(out, "=== Account information ===\n");
        let width = doc
            .header
            .fields()
            .iter()
            .map(|(k, _)| k.len())
            .max()
            .unwrap_or(0);
        for (key, value) in doc.header.fields() {
            let _ = writeln!(out, "  {key:<width$}  {value}");
        }
        let _ = writeln!(out);
    }

    for page in &doc.result.pages {
        format_page(&mut out, page);
    }

    if !doc.result.cancelled_pages.is_empty() {
        let pages: Vec<String> = doc
            .result
            .cancelled_pages
            .iter()
            .map(|p| p.to_string())
            .collect();
        let _ = writeln!(out, "Cancelled pages: {}", pages.join(", "));
    }

    out.trim_end().to_string()
}

fn format_page(out: &mut String, page: &ExtractionResult) {
    let _ = writeln!(out, "=== Page {} ===\n", page.page_number);
    if page.candidates.is_empty() {
        let _ = writeln!(out, "  (no tables)\n");
    }
    for (i, table) in page.candidates.iter().enumerate() {
        let _ = writeln!(
            out,
            "  Table {} [{}] confidence {:.2}, {}x{}",
            i + 1,
            table.strategy(),
            table.confidence(),
            table.row_count(),
            table.col_count()
        );
        let _ = writeln!(out);
        format_grid(out, table);
        let _ = writeln!(out);
    }
    if let Some(diagnostics) = &page.diagnostics {
        format_diagnostics(out, diagnostics);
    }
}

fn format_grid(out: &mut String, table: &TableCandidate) {
    let grid = table.text_grid();
    let mut widths = vec![0usize; table.col_count()];
    for row in &grid {
        for (c, text) in row.iter().enumerate() {
            widths[c] = widths[c].max(text.chars().count());
        }
    }

    for (r, row) in grid.iter().enumerate() {
        let cells: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(text, &w)| format!("{text:<w$}"))
            .collect();
        let _ = writeln!(out, "    | {} |", cells.join(" | "));
        if r == 0 && table.has_header() {
            let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
            let _ = writeln!(out, "    |-{}-|", rule.join("-|-"));
        }
    }
}

fn format_diagnostics(out: &mut String, d: &Diagnostics) {
    let _ = writeln!(out, "  Diagnostics:");
    let _ = writeln!(
        out,
        "    malformed tokens {}, malformed segments {}, tokens dropped {}",
        d.malformed_tokens, d.malformed_segments, d.tokens_dropped
    );
    let _ = writeln!(
        out,
        "    bands rejected {}, candidates discarded {}",
        d.bands_rejected, d.candidates_discarded
    );
    for t in &d.timings {
        let _ = writeln!(
            out,
            "    {}: {} candidate(s) in {}us",
            t.strategy, t.candidates, t.micros
        );
    }
    for f in &d.strategy_failures {
        let _ = writeln!(out, "    {} failed: {}", f.strategy, f.message);
    }
    let _ = writeln!(out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabgrid_core::statement::StatementHeader;
    use tabgrid_core::{extract_page, BBox, DocumentResult, ExtractionConfig, PageInput, Token};

    fn tok(text: &str, x: f32, y: f32) -> Token {
        Token::new(text, BBox::new(x, y, x + 40.0, y + 10.0))
    }

    fn borderless_doc() -> ExtractedDocument {
        let mut tokens = Vec::new();
        for (r, row) in [["Name", "Qty"], ["apple", "3"], ["pear", "12"], ["plum", "7"]]
            .iter()
            .enumerate()
        {
            let y = 100.0 + 20.0 * r as f32;
            tokens.push(tok(row[0], 50.0, y));
            tokens.push(tok(row[1], 250.0, y));
        }
        let page = PageInput {
            page_number: 1,
            width: 612.0,
            height: 792.0,
            tokens,
            segments: Vec::new(),
        };
        ExtractedDocument {
            result: DocumentResult {
                pages: vec![extract_page(&page, &ExtractionConfig::default())],
                cancelled_pages: Vec::new(),
            },
            header: StatementHeader::default(),
        }
    }

    #[test]
    fn test_format_lists_pages_and_cells() {
        let text = format_document(&borderless_doc());
        assert!(text.starts_with("=== Page 1 ==="));
        assert!(text.contains("apple"));
        assert!(text.contains("| pear "));
        assert!(!text.contains("Account information"));
    }

    #[test]
    fn test_format_empty_page() {
        let doc = ExtractedDocument {
            result: DocumentResult {
                pages: vec![ExtractionResult::empty(3)],
                cancelled_pages: vec![4],
            },
            header: StatementHeader {
                bank_name: Some("Example Bank".into()),
                ..Default::default()
            },
        };
        let text = format_document(&doc);
        assert!(text.contains("Account information"));
        assert!(text.contains("Example Bank"));
        assert!(text.contains("(no tables)"));
        assert!(text.contains("Cancelled pages: 4"));
    }
}
