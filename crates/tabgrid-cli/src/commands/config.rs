use std::path::{Path, PathBuf};
use tabgrid_core::config::load_config;
use tabgrid_core::error::TabgridError;

use super::effective_config;

pub fn show(config_file: Option<PathBuf>) -> Result<(), TabgridError> {
    let config = effective_config(config_file.as_deref(), false)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub fn validate(file: &Path) -> Result<(), TabgridError> {
    let config = load_config(file)?;
    println!("Config OK: {}", file.display());
    println!(
        "  min_confidence {}, overlap_ratio {}, min table {}x{}",
        config.min_confidence, config.overlap_ratio, config.min_rows, config.min_cols
    );
    Ok(())
}
