//! Output formats.
//!
//! Each format is a [`FilmEncoder`] strategy; the [`Exporter`] runs every
//! configured strategy over every film and keeps going when one of them
//! fails. Writing the bytes to disk is left to the caller.

pub mod pdf;
pub mod png;
pub mod preview;
pub mod svg;

pub use pdf::{PdfEncoder, VectorSerializer};
pub use png::PngEncoder;
pub use preview::{composite_preview, film_image, FilmImageOptions};
pub use svg::SvgEncoder;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::{info, warn};

use crate::{config::VectorConfig, traits::FilmEncoder, types::Film};

#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq, Hash,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExportFormat {
    /// Minimal vector document, always available
    #[default]
    Pdf,
    Svg,
    Png,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        self.into()
    }

    pub fn encoder(self, vector: &VectorConfig) -> Box<dyn FilmEncoder> {
        match self {
            ExportFormat::Pdf => Box::new(PdfEncoder {
                approximation_factor: vector.approximation_factor,
            }),
            ExportFormat::Svg => Box::new(SvgEncoder {
                approximation_factor: vector.approximation_factor,
            }),
            ExportFormat::Png => Box::new(PngEncoder::default()),
        }
    }
}

/// Encoded bytes of one film in one format.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub film_index: usize,
    pub format: ExportFormat,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ExportFailure {
    pub film_index: usize,
    pub format: ExportFormat,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExportBatch {
    pub artifacts: Vec<Artifact>,
    pub failures: Vec<ExportFailure>,
}

/// Runs a set of encoders over films.
pub struct Exporter {
    encoders: Vec<Box<dyn FilmEncoder>>,
}

impl Default for Exporter {
    /// Only the built-in vector writer
    fn default() -> Self {
        Self::new().with_encoder(PdfEncoder::default())
    }
}

impl Exporter {
    pub fn new() -> Self {
        Self {
            encoders: Vec::new(),
        }
    }

    pub fn with_encoder<E>(mut self, encoder: E) -> Self
    where
        E: FilmEncoder + 'static,
    {
        self.encoders.push(Box::new(encoder));
        self
    }

    /// Exporter for the given formats; falls back to PDF when the list is
    /// empty.
    pub fn for_formats(formats: &[ExportFormat], vector: &VectorConfig) -> Self {
        let mut unique: Vec<ExportFormat> = Vec::new();
        for &format in formats {
            if !unique.contains(&format) {
                unique.push(format);
            }
        }
        if unique.is_empty() {
            unique.push(ExportFormat::Pdf);
        }
        Self {
            encoders: unique.into_iter().map(|f| f.encoder(vector)).collect(),
        }
    }

    pub fn formats(&self) -> Vec<ExportFormat> {
        self.encoders.iter().map(|e| e.format()).collect()
    }

    pub fn encode(&self, films: &[Film]) -> ExportBatch {
        let mut batch = ExportBatch::default();
        for film in films {
            for encoder in &self.encoders {
                let format = encoder.format();
                match encoder.encode(film) {
                    Ok(bytes) => batch.artifacts.push(Artifact {
                        film_index: film.index,
                        format,
                        file_name: format!("{}.{}", film.file_stem(), format.extension()),
                        bytes,
                    }),
                    Err(e) => {
                        warn!("Export of {} as {} failed: {}", film.name, format, e);
                        batch.failures.push(ExportFailure {
                            film_index: film.index,
                            format,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }
        info!(
            "Encoded {} files ({} failed)",
            batch.artifacts.len(),
            batch.failures.len()
        );
        batch
    }
}
