use std::path::PathBuf;
use tabgrid_core::error::TabgridError;

use super::{effective_config, extract_file, file_stem, require_pdftotext};
use crate::output;

pub fn run(
    input_file: PathBuf,
    config_file: Option<PathBuf>,
    output_format: &str,
    out_dir: Option<PathBuf>,
    debug: bool,
) -> Result<(), TabgridError> {
    let config = effective_config(config_file.as_deref(), debug)?;
    require_pdftotext(std::slice::from_ref(&input_file))?;
    let doc = extract_file(&input_file, &config)?;

    match out_dir {
        Some(dir) => {
            let written = output::csv::write_document(&doc, &dir, &file_stem(&input_file))?;
            eprintln!(
                "Found {} table(s) on {} page(s), wrote {} file(s) to {}",
                doc.result.table_count(),
                doc.result.pages.len(),
                written.len(),
                dir.display()
            );
        }
        None => match output_format {
            "json" => output::json::print(&doc)?,
            "csv" => output::csv::print(&doc)?,
            _ => println!("{}", output::table::format_document(&doc)),
        },
    }

    if !doc.result.cancelled_pages.is_empty() {
        eprintln!(
            "  warning: {} page(s) not processed",
            doc.result.cancelled_pages.len()
        );
    }

    Ok(())
}
