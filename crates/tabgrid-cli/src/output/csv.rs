use std::io;
use std::path::{Path, PathBuf};
use tabgrid_core::error::TabgridError;
use tabgrid_core::TableCandidate;

use crate::commands::ExtractedDocument;

/// `<stem>_page<N>_table<K>_<strategy>.csv`, K counted from 1 per page.
pub fn table_file_name(stem: &str, page: usize, index: usize, table: &TableCandidate) -> String {
    format!("{stem}_page{page}_table{index}_{}.csv", table.strategy())
}

fn write_table<W: io::Write>(writer: W, table: &TableCandidate) -> Result<(), TabgridError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in table.text_grid() {
        wtr.write_record(&row).map_err(io::Error::from)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write every table, plus the account information when found, as CSV
/// files into `dir`. Returns the paths written.
pub fn write_document(
    doc: &ExtractedDocument,
    dir: &Path,
    stem: &str,
) -> Result<Vec<PathBuf>, TabgridError> {
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    for page in &doc.result.pages {
        for (i, table) in page.candidates.iter().enumerate() {
            let path = dir.join(table_file_name(stem, page.page_number, i + 1, table));
            write_table(std::fs::File::create(&path)?, table)?;
            written.push(path);
        }
    }

    if !doc.header.is_empty() {
        let path = dir.join(format!("{stem}_account_information.csv"));
        let mut wtr = csv::Writer::from_path(&path).map_err(io::Error::from)?;
        wtr.write_record(["field", "value"]).map_err(io::Error::from)?;
        for (key, value) in doc.header.fields() {
            wtr.write_record([key, value]).map_err(io::Error::from)?;
        }
        wtr.flush()?;
        written.push(path);
    }

    tracing::debug!(dir = %dir.display(), files = written.len(), "csv written");
    Ok(written)
}

/// Print all tables as CSV to stdout, separated by a comment line.
pub fn print(doc: &ExtractedDocument) -> Result<(), TabgridError> {
    let stdout = io::stdout();
    for page in &doc.result.pages {
        for (i, table) in page.candidates.iter().enumerate() {
            println!(
                "# page {} table {} ({})",
                page.page_number,
                i + 1,
                table.strategy()
            );
            write_table(stdout.lock(), table)?;
        }
    }
    Ok(())
}
