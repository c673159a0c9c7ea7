pub mod builder;
pub mod report;
pub mod stages;

use image::RgbImage;
use rayon::prelude::*;
use tracing::{info, warn};

use crate::{
    algorithms::{ColorQuantizer, MaskBuilder},
    config::FilmConfig,
    error::Result,
    io::composite_preview,
    traits::{FilmStage, StageContext},
    types::{ColorPalette, CoverageStats, Film, FilmWarning, SourceImage},
};

pub use builder::FilmPipelineBuilder;
pub use report::{ColorInfo, FilmReport, FilmSummary};
pub use stages::{CleanupStage, HalftoneStage, StrokeStage, TrapStage};

/// Separation of one image into printable films.
#[derive(Debug, Clone)]
pub struct FilmSet {
    pub palette: ColorPalette,
    /// Darkest ink first
    pub films: Vec<Film>,
    pub width: u32,
    pub height: u32,
    pub dpi: f32,
    /// Pixels that received a label other than background
    pub foreground_pixels: u64,
    pub advisories: Vec<String>,
}

impl FilmSet {
    /// Per-ink area before cleanup, largest first
    pub fn color_info(&self) -> Vec<ColorInfo> {
        let mut info: Vec<ColorInfo> = self
            .films
            .iter()
            .map(|film| ColorInfo {
                index: film.index,
                name: film.name.clone(),
                rgb: film.color,
                hex: film.hex(),
                pixel_count: film.coverage.filled_pixels,
                percentage: (film.coverage.coverage_percent * 10.0).round() / 10.0,
            })
            .collect();
        info.sort_by(|a, b| b.pixel_count.cmp(&a.pixel_count));
        info
    }

    /// All films composited over white paper
    pub fn preview(&self) -> RgbImage {
        composite_preview(&self.films, self.width, self.height, [255, 255, 255])
    }

    pub fn report(&self) -> FilmReport {
        let total = self.width as u64 * self.height as u64;
        FilmReport {
            width: self.width,
            height: self.height,
            dpi: self.dpi,
            palette: self.palette.entries().to_vec(),
            colors: self.color_info(),
            films: self
                .films
                .iter()
                .map(|film| FilmSummary {
                    index: film.index,
                    name: film.name.clone(),
                    hex: film.hex(),
                    rgb: film.color,
                    coverage: film.coverage.clone(),
                    final_coverage: CoverageStats::measure(film.index, &film.mask, total),
                    stroke: film.stroke.clone(),
                    warnings: film.warnings.clone(),
                })
                .collect(),
            advisories: self.advisories.clone(),
            export_failures: Vec::new(),
        }
    }
}

/// Quantize, split into masks, then run every film through the stages.
pub struct FilmPipeline {
    config: FilmConfig,
    quantizer: ColorQuantizer,
    stages: Vec<Box<dyn FilmStage>>,
    advisories: Vec<String>,
}

impl FilmPipeline {
    pub fn builder() -> FilmPipelineBuilder {
        FilmPipelineBuilder::new()
    }

    /// Pipeline with the stages the configuration asks for
    pub fn from_config(config: FilmConfig) -> Result<Self> {
        FilmPipelineBuilder::new().with_config(config).build()
    }

    pub(crate) fn new(
        config: FilmConfig,
        stages: Vec<Box<dyn FilmStage>>,
        advisories: Vec<String>,
    ) -> Self {
        Self {
            quantizer: ColorQuantizer::new(config.quantization.clone()),
            config,
            stages,
            advisories,
        }
    }

    pub fn config(&self) -> &FilmConfig {
        &self.config
    }

    pub fn process(&self, source: &SourceImage) -> Result<FilmSet> {
        for advisory in &self.advisories {
            warn!("{}", advisory);
        }
        let dpi = self.config.dpi;
        if (source.dpi - dpi).abs() > f32::EPSILON {
            info!(
                "Source is {} dpi, measuring at the configured {} dpi",
                source.dpi, dpi
            );
        }

        let separation = self.quantizer.separate(&source.pixels)?;
        let mask_set = MaskBuilder.build_masks(&separation.label_map, separation.palette.len())?;

        let mut films: Vec<Film> = separation
            .palette
            .entries()
            .iter()
            .zip(mask_set.masks)
            .zip(mask_set.stats)
            .enumerate()
            .map(|(i, ((entry, mask), coverage))| Film::new(i, entry, mask, coverage))
            .collect();

        let tone = source.luma();
        let ctx = StageContext { dpi, tone: &tone };

        info!("Running {} stages on {} films", self.stages.len(), films.len());
        films.par_iter_mut().try_for_each(|film| -> Result<()> {
            for stage in &self.stages {
                stage.process(film, &ctx)?;
            }
            if film.ink_pixels() == 0 {
                film.warn(FilmWarning::EmptyMask);
            }
            Ok(())
        })?;

        for film in &films {
            info!(
                "{} {}: {} ink pixels, {} warnings",
                film.name,
                film.hex(),
                film.ink_pixels(),
                film.warnings.len()
            );
        }

        Ok(FilmSet {
            palette: separation.palette,
            films,
            width: source.width(),
            height: source.height(),
            dpi,
            foreground_pixels: separation.label_map.foreground_count() as u64,
            advisories: self.advisories.clone(),
        })
    }

    /// Get information about the pipeline configuration
    pub fn info(&self) -> String {
        let names: Vec<&str> = self.stages.iter().map(|s| s.name()).collect();
        format!(
            "FilmPipeline: {} colors, {} dpi, stages [{}]",
            self.config.quantization.colors,
            self.config.dpi,
            names.join(", ")
        )
    }
}
