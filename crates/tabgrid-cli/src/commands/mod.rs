pub mod batch;
pub mod config;
pub mod extract;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tabgrid_core::config::load_config;
use tabgrid_core::error::TabgridError;
use tabgrid_core::extraction::{JsonSource, PageSource, PdftotextSource};
use tabgrid_core::statement::{statement_page_header, StatementHeader};
use tabgrid_core::{extract_pages, CancelToken, DocumentResult, ExtractionConfig};

/// Tables of one input file plus any account information found on it.
pub struct ExtractedDocument {
    pub result: DocumentResult,
    pub header: StatementHeader,
}

/// Defaults, overlaid with the config file when given. `--debug` always
/// turns diagnostics on.
pub fn effective_config(
    file: Option<&Path>,
    debug: bool,
) -> Result<ExtractionConfig, TabgridError> {
    let mut config = match file {
        Some(path) => load_config(path)?,
        None => ExtractionConfig::default(),
    };
    config.debug |= debug;
    Ok(config)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn is_json(path: &Path) -> bool {
    has_extension(path, "json")
}

pub fn is_supported(path: &Path) -> bool {
    is_json(path) || has_extension(path, "pdf")
}

/// True when any input goes through pdftotext.
pub fn needs_pdftotext(inputs: &[PathBuf]) -> bool {
    inputs.iter().any(|p| !is_json(p))
}

/// Fail early, before any work starts, when PDF input meets a system
/// without poppler.
pub fn require_pdftotext(inputs: &[PathBuf]) -> Result<(), TabgridError> {
    if needs_pdftotext(inputs) && !PdftotextSource::is_available() {
        return Err(TabgridError::PdftotextNotFound);
    }
    Ok(())
}

/// File name without extension, for naming output files.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "document".into())
}

fn flatten(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("_")
}

/// Output names for a batch over `root`, one per input, distinct from each
/// other.
///
/// A name is the input's path relative to `root` with separators turned
/// into `_` and the extension dropped. The extension stays (`x_pdf`,
/// `x_json`) when two inputs would otherwise share a name, and any name
/// still shared gets a `_2`, `_3`, ... suffix in input order.
pub fn batch_stems(root: &Path, inputs: &[PathBuf]) -> Vec<String> {
    let relative: Vec<&Path> = inputs
        .iter()
        .map(|p| p.strip_prefix(root).unwrap_or(p))
        .collect();
    let bare: Vec<String> = relative
        .iter()
        .map(|rel| flatten(&rel.with_extension("")))
        .collect();

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in &bare {
        *counts.entry(name.as_str()).or_default() += 1;
    }
    let named: Vec<String> = relative
        .iter()
        .zip(&bare)
        .map(|(rel, name)| {
            if counts[name.as_str()] > 1 {
                flatten(rel).replace('.', "_")
            } else {
                name.clone()
            }
        })
        .collect();

    let mut seen: HashMap<String, usize> = HashMap::new();
    named
        .into_iter()
        .map(|name| {
            let n = seen.entry(name.clone()).or_default();
            *n += 1;
            if *n == 1 {
                name
            } else {
                format!("{name}_{n}")
            }
        })
        .collect()
}

pub fn extract_file(
    path: &Path,
    config: &ExtractionConfig,
) -> Result<ExtractedDocument, TabgridError> {
    let bytes = std::fs::read(path)?;
    let source: Box<dyn PageSource> = if is_json(path) {
        Box::new(JsonSource)
    } else {
        Box::new(PdftotextSource::new())
    };
    tracing::info!(file = %path.display(), backend = source.backend_name(), "reading document");

    let pages = source.extract_pages(&bytes)?;
    let result = extract_pages(&pages, config, &CancelToken::new());
    let header = pages
        .iter()
        .filter_map(|page| {
            let page_result = result
                .pages
                .iter()
                .find(|r| r.page_number == page.page_number)?;
            Some(statement_page_header(page, page_result))
        })
        .find(|h| !h.is_empty())
        .unwrap_or_default();

    Ok(ExtractedDocument { result, header })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_stems_keep_nested_inputs_apart() {
        let root = Path::new("/in");
        let inputs = vec![
            PathBuf::from("/in/a/report.json"),
            PathBuf::from("/in/b/report.json"),
            PathBuf::from("/in/summary.pdf"),
        ];
        assert_eq!(
            batch_stems(root, &inputs),
            vec!["a_report", "b_report", "summary"]
        );
    }

    #[test]
    fn test_batch_stems_keep_extension_on_clash() {
        let root = Path::new("/in");
        let inputs = vec![
            PathBuf::from("/in/x.json"),
            PathBuf::from("/in/x.pdf"),
            PathBuf::from("/in/a/b_c.pdf"),
            PathBuf::from("/in/a_b/c.pdf"),
        ];
        assert_eq!(
            batch_stems(root, &inputs),
            vec!["x_json", "x_pdf", "a_b_c_pdf", "a_b_c_pdf_2"]
        );
    }

    #[test]
    fn test_needs_pdftotext_only_for_pdf_input() {
        assert!(!needs_pdftotext(&[PathBuf::from("a.json"), PathBuf::from("b.JSON")]));
        assert!(needs_pdftotext(&[PathBuf::from("a.json"), PathBuf::from("c.pdf")]));
        assert!(require_pdftotext(&[PathBuf::from("a.json")]).is_ok());
    }
}
