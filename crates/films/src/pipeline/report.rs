use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    io::ExportFailure,
    types::{CoverageStats, FilmWarning, PaletteEntry, StrokeReport},
};

/// Share of the separated area held by one ink.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ColorInfo {
    pub index: usize,
    pub name: String,
    pub rgb: [u8; 3],
    pub hex: String,
    pub pixel_count: u64,
    /// Percentage of non-background pixels, one decimal
    pub percentage: f64,
}

/// Diagnostics of one film.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct FilmSummary {
    pub index: usize,
    pub name: String,
    pub hex: String,
    pub rgb: [u8; 3],
    /// Straight out of the mask builder, relative to the separated area
    pub coverage: CoverageStats,
    /// After every stage, relative to the whole image
    pub final_coverage: CoverageStats,
    pub stroke: Option<StrokeReport>,
    pub warnings: Vec<FilmWarning>,
}

/// Everything a job produced besides the films themselves.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct FilmReport {
    pub width: u32,
    pub height: u32,
    pub dpi: f32,
    pub palette: Vec<PaletteEntry>,
    pub colors: Vec<ColorInfo>,
    pub films: Vec<FilmSummary>,
    pub advisories: Vec<String>,
    #[serde(default)]
    pub export_failures: Vec<ExportFailure>,
}

impl FilmReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn has_warnings(&self) -> bool {
        self.films.iter().any(|f| !f.warnings.is_empty())
    }
}
