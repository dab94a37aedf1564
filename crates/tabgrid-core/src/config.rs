use crate::error::TabgridError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tuning constants for one extraction run.
///
/// Built once (defaults or a JSON file) and passed by reference into every
/// strategy call. Nothing in the engine mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Max y-distance (pt) between horizontal rulings merged into one row
    /// boundary.
    pub row_tolerance: f32,
    /// Max x-distance (pt) between vertical rulings or token left edges
    /// merged into one column boundary.
    pub column_tolerance: f32,
    /// Acceptance floor for candidates from the primary strategies.
    pub min_confidence: f32,
    /// Bounding-box overlap (intersection over smaller area) above which two
    /// candidates are considered the same table.
    pub overlap_ratio: f32,
    pub min_rows: usize,
    pub min_cols: usize,
    /// Attach diagnostic counters to every result.
    pub debug: bool,
    /// Alignment row threshold as a fraction of the median token height.
    pub row_height_factor: f32,
    /// Segments shorter than this (pt) are ignored.
    pub min_segment_length: f32,
    /// Max minor-axis delta (pt) for a segment to count as horizontal or
    /// vertical.
    pub orientation_tolerance: f32,
    /// Share of candidate rows that must carry a date for the bank-statement
    /// recognizer to emit anything.
    pub date_match_rate: f32,
    pub bank_base_confidence: f32,
    /// Upper bound for fallback confidence. Must stay below `min_confidence`.
    pub fallback_confidence_cap: f32,
    /// Run the strategies of one page on the rayon pool.
    pub parallel: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            row_tolerance: 3.0,
            column_tolerance: 5.0,
            min_confidence: 0.35,
            overlap_ratio: 0.5,
            min_rows: 2,
            min_cols: 2,
            debug: false,
            row_height_factor: 0.5,
            min_segment_length: 2.0,
            orientation_tolerance: 1.0,
            date_match_rate: 0.8,
            bank_base_confidence: 0.8,
            fallback_confidence_cap: 0.3,
            parallel: true,
        }
    }
}

/// Load a config from a JSON file. Missing fields take their defaults.
pub fn load_config(path: &Path) -> Result<ExtractionConfig, TabgridError> {
    let content = std::fs::read_to_string(path).map_err(|e| TabgridError::ConfigLoad {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let config: ExtractionConfig =
        serde_json::from_str(&content).map_err(|e| TabgridError::ConfigLoad {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    validate_config(&config)?;
    Ok(config)
}

/// Parse a config from a JSON string (no file path context).
pub fn parse_config_str(json: &str) -> Result<ExtractionConfig, TabgridError> {
    let config: ExtractionConfig = serde_json::from_str(json).map_err(TabgridError::Json)?;
    validate_config(&config)?;
    Ok(config)
}

/// Validate that a config is usable.
pub fn validate_config(config: &ExtractionConfig) -> Result<(), TabgridError> {
    let tolerances = [
        ("row_tolerance", config.row_tolerance),
        ("column_tolerance", config.column_tolerance),
        ("row_height_factor", config.row_height_factor),
        ("min_segment_length", config.min_segment_length),
        ("orientation_tolerance", config.orientation_tolerance),
    ];
    for (name, value) in tolerances {
        if !value.is_finite() || value <= 0.0 {
            return Err(TabgridError::ConfigInvalid(format!(
                "{name} must be a positive number, got {value}"
            )));
        }
    }

    let ratios = [
        ("min_confidence", config.min_confidence),
        ("overlap_ratio", config.overlap_ratio),
        ("date_match_rate", config.date_match_rate),
        ("bank_base_confidence", config.bank_base_confidence),
        ("fallback_confidence_cap", config.fallback_confidence_cap),
    ];
    for (name, value) in ratios {
        if !value.is_finite() || value <= 0.0 || value > 1.0 {
            return Err(TabgridError::ConfigInvalid(format!(
                "{name} must be in (0, 1], got {value}"
            )));
        }
    }

    if config.min_rows < 2 || config.min_cols < 2 {
        return Err(TabgridError::ConfigInvalid(format!(
            "min_rows and min_cols must be at least 2, got {}x{}",
            config.min_rows, config.min_cols
        )));
    }

    if config.fallback_confidence_cap >= config.min_confidence {
        return Err(TabgridError::ConfigInvalid(format!(
            "fallback_confidence_cap ({}) must be below min_confidence ({})",
            config.fallback_confidence_cap, config.min_confidence
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ExtractionConfig::default()).is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg = parse_config_str(r#"{ "row_tolerance": 4.5, "debug": true }"#).unwrap();
        assert_eq!(cfg.row_tolerance, 4.5);
        assert!(cfg.debug);
        assert_eq!(cfg.min_rows, 2);
        assert_eq!(cfg.overlap_ratio, 0.5);
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let err = parse_config_str(r#"{ "column_tolerance": -1.0 }"#).unwrap_err();
        assert!(matches!(err, TabgridError::ConfigInvalid(_)));
    }

    #[test]
    fn test_min_rows_below_two_rejected() {
        assert!(parse_config_str(r#"{ "min_rows": 1 }"#).is_err());
    }

    #[test]
    fn test_fallback_cap_must_stay_below_floor() {
        assert!(parse_config_str(r#"{ "min_confidence": 0.2, "fallback_confidence_cap": 0.3 }"#)
            .is_err());
    }

    #[test]
    fn test_overlap_ratio_out_of_range_rejected() {
        assert!(parse_config_str(r#"{ "overlap_ratio": 1.5 }"#).is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config(Path::new("/nonexistent/tabgrid.json")).unwrap_err();
        assert!(matches!(err, TabgridError::ConfigLoad { .. }));
    }
}
