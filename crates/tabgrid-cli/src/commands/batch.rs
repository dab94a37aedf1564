use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tabgrid_core::error::TabgridError;
use walkdir::WalkDir;

use super::{batch_stems, effective_config, extract_file, is_supported, require_pdftotext};
use crate::output;

struct FileOutcome {
    path: PathBuf,
    tables: usize,
    files_written: usize,
}

fn collect_inputs(dir: &Path, recursive: bool) -> Vec<PathBuf> {
    let walker = WalkDir::new(dir).max_depth(if recursive { usize::MAX } else { 1 });
    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(e) => Some(e),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|e| e.file_type().is_file() && is_supported(e.path()))
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}

pub fn run(
    dir: PathBuf,
    recursive: bool,
    out_dir: Option<PathBuf>,
    config_file: Option<PathBuf>,
    debug: bool,
) -> Result<(), TabgridError> {
    if !dir.is_dir() {
        return Err(TabgridError::InvalidInput(format!(
            "{} is not a directory",
            dir.display()
        )));
    }
    let config = effective_config(config_file.as_deref(), debug)?;
    let out_dir = out_dir.unwrap_or_else(|| dir.join("tables"));
    let inputs = collect_inputs(&dir, recursive);
    require_pdftotext(&inputs)?;
    let stems = batch_stems(&dir, &inputs);
    tracing::info!(files = inputs.len(), dir = %dir.display(), "batch start");

    // One failing file never stops the rest.
    let outcomes: Vec<Result<FileOutcome, (PathBuf, TabgridError)>> = inputs
        .par_iter()
        .zip(&stems)
        .map(|(path, stem)| -> Result<FileOutcome, (PathBuf, TabgridError)> {
            let doc = extract_file(path, &config).map_err(|e| (path.clone(), e))?;
            let written = output::csv::write_document(&doc, &out_dir, stem)
                .map_err(|e| (path.clone(), e))?;
            Ok(FileOutcome {
                path: path.clone(),
                tables: doc.result.table_count(),
                files_written: written.len(),
            })
        })
        .collect();

    let mut tables = 0;
    let mut failed = 0;
    for outcome in &outcomes {
        match outcome {
            Ok(o) => {
                tables += o.tables;
                eprintln!(
                    "  {}: {} table(s), {} file(s)",
                    o.path.display(),
                    o.tables,
                    o.files_written
                );
            }
            Err((path, e)) => {
                failed += 1;
                tracing::warn!(file = %path.display(), error = %e, "extraction failed");
                eprintln!("  {}: failed: {e}", path.display());
            }
        }
    }

    eprintln!(
        "Processed {} file(s): {} table(s), {} failed. Output in {}",
        outcomes.len(),
        tables,
        failed,
        out_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabgrid_core::{BBox, PageInput, Token};

    fn table_json(label: &str) -> String {
        let mut tokens = Vec::new();
        for r in 0..3 {
            let y = 100.0 + 20.0 * r as f32;
            tokens.push(Token::new(
                format!("{label}{r}"),
                BBox::new(50.0, y, 90.0, y + 10.0),
            ));
            tokens.push(Token::new(
                format!("v{r}"),
                BBox::new(250.0, y, 262.0, y + 10.0),
            ));
        }
        let page = PageInput {
            page_number: 1,
            width: 612.0,
            height: 792.0,
            tokens,
            segments: Vec::new(),
        };
        serde_json::to_string(&vec![page]).unwrap()
    }

    #[test]
    fn test_recursive_batch_keeps_same_named_files_apart() {
        let root = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        for (sub, label) in [("a", "alpha"), ("b", "beta")] {
            std::fs::create_dir(root.path().join(sub)).unwrap();
            std::fs::write(root.path().join(sub).join("report.json"), table_json(label)).unwrap();
        }

        run(
            root.path().to_path_buf(),
            true,
            Some(out.path().to_path_buf()),
            None,
            false,
        )
        .unwrap();

        let mut names: Vec<String> = std::fs::read_dir(out.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names[0].starts_with("a_report_page1_table1_"));
        assert!(names[1].starts_with("b_report_page1_table1_"));

        let alpha = std::fs::read_to_string(out.path().join(&names[0])).unwrap();
        let beta = std::fs::read_to_string(out.path().join(&names[1])).unwrap();
        assert!(alpha.contains("alpha0"));
        assert!(beta.contains("beta0"));
    }
}
