use films::{
    io::ExportBatch,
    types::{INK, NO_INK},
    ExportFormat, FilmConfig, FilmError, FilmReport, FilmSet, SourceImage,
};
use image::{GrayImage, Luma};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum FilmCliError {
    #[error(transparent)]
    SerdeError(#[from] serde_json::Error),
    #[error(transparent)]
    TomlDeError(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSerError(#[from] toml::ser::Error),
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    ImageError(#[from] image::ImageError),
    #[error(transparent)]
    FilmError(#[from] FilmError),
    #[error("Missing 'input_path' field")]
    MissingInput,
    #[error("Missing 'output_dir' field")]
    MissingOutputDir,
    #[error("Unsupported file format. Please use .toml or .json files")]
    UnsupportedFileFormat,
}

fn default_formats() -> Vec<ExportFormat> {
    vec![ExportFormat::Pdf]
}

fn default_true() -> bool {
    true
}

/// One separation job: where the artwork is, where films go, how to make them
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct SeparationJob {
    pub input_path: String,
    pub output_dir: String,
    #[serde(default = "default_formats")]
    pub formats: Vec<ExportFormat>,
    /// Write a composite preview.png next to the films
    #[serde(default = "default_true")]
    pub preview: bool,
    #[serde(default)]
    pub films: FilmConfig,
}

impl SeparationJob {
    pub fn new(input_path: impl Into<String>, output_dir: impl Into<String>) -> Self {
        Self {
            input_path: input_path.into(),
            output_dir: output_dir.into(),
            formats: default_formats(),
            preview: true,
            films: FilmConfig::default(),
        }
    }

    /// Load a job from a TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, FilmCliError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, FilmCliError> {
        let job: SeparationJob = toml::from_str(content)?;
        job.check_paths()?;
        Ok(job)
    }

    /// Load a job from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, FilmCliError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, FilmCliError> {
        let job: SeparationJob = serde_json::from_str(content)?;
        job.check_paths()?;
        Ok(job)
    }

    /// Auto-detect file format and load the job
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FilmCliError> {
        let path_ref = path.as_ref();
        match path_ref.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_file(path),
            Some("json") => Self::from_json_file(path),
            _ => Err(FilmCliError::UnsupportedFileFormat),
        }
    }

    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), FilmCliError> {
        fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, FilmCliError> {
        Ok(toml::to_string_pretty(&self)?)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> Result<(), FilmCliError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, FilmCliError> {
        Ok(serde_json::to_string_pretty(&self)?)
    }

    fn check_paths(&self) -> Result<(), FilmCliError> {
        if self.input_path.trim().is_empty() {
            return Err(FilmCliError::MissingInput);
        }
        if self.output_dir.trim().is_empty() {
            return Err(FilmCliError::MissingOutputDir);
        }
        Ok(())
    }

    /// Decode the artwork, tagged with the job's resolution
    pub fn load_source(&self) -> Result<SourceImage, FilmCliError> {
        load_source(&self.input_path, self.films.dpi)
    }
}

pub fn load_source<P: AsRef<Path>>(path: P, dpi: f32) -> Result<SourceImage, FilmCliError> {
    let pixels = image::open(path.as_ref())?.to_rgb8();
    info!(
        "Loaded {} ({}x{})",
        path.as_ref().display(),
        pixels.width(),
        pixels.height()
    );
    Ok(SourceImage::new(pixels, dpi))
}

/// Read a film back as a binary mask.
///
/// Films are black ink on white paper; `white_ink` flips that for masks
/// stored the other way round.
pub fn load_mask<P: AsRef<Path>>(path: P, white_ink: bool) -> Result<GrayImage, FilmCliError> {
    let gray = image::open(path.as_ref())?.to_luma8();
    Ok(GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        let dark = gray.get_pixel(x, y)[0] <= 127;
        if dark != white_ink {
            Luma([INK])
        } else {
            Luma([NO_INK])
        }
    }))
}

/// Write every artifact, the metadata report and optionally the preview.
///
/// Encoding failures already live in the batch; they end up in the report
/// rather than aborting the job.
pub fn write_outputs<P: AsRef<Path>>(
    output_dir: P,
    set: &FilmSet,
    batch: &ExportBatch,
    preview: bool,
) -> Result<(Vec<PathBuf>, FilmReport), FilmCliError> {
    let dir = output_dir.as_ref();
    fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(batch.artifacts.len() + 2);
    for artifact in &batch.artifacts {
        let path = dir.join(&artifact.file_name);
        fs::write(&path, &artifact.bytes)?;
        written.push(path);
    }
    for failure in &batch.failures {
        warn!(
            "Film {} could not be exported as {}: {}",
            failure.film_index, failure.format, failure.error
        );
    }

    if preview {
        let path = dir.join("preview.png");
        set.preview().save(&path)?;
        written.push(path);
    }

    let mut report = set.report();
    report.export_failures = batch.failures.clone();
    let path = dir.join("metadata.json");
    fs::write(&path, report.to_json()?)?;
    written.push(path);

    Ok((written, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use films::{Exporter, FilmPipeline};
    use image::{Rgb, RgbImage};

    #[test]
    fn test_job_from_toml_with_defaults() {
        let job = SeparationJob::from_toml(
            r#"
            input_path = "art/poster.png"
            output_dir = "out"

            [films]
            dpi = 600.0

            [films.quantization]
            colors = 3
            "#,
        )
        .unwrap();

        assert_eq!(job.formats, vec![ExportFormat::Pdf]);
        assert!(job.preview);
        assert_eq!(job.films.dpi, 600.0);
        assert_eq!(job.films.quantization.colors, 3);
        assert_eq!(job.films.cleanup, FilmConfig::default().cleanup);
    }

    #[test]
    fn test_job_from_json() {
        let job = SeparationJob::from_json(
            r#"{"input_path": "a.png", "output_dir": "out", "formats": ["svg", "png"], "preview": false}"#,
        )
        .unwrap();
        assert_eq!(job.formats, vec![ExportFormat::Svg, ExportFormat::Png]);
        assert!(!job.preview);
        assert_eq!(job.films, FilmConfig::default());
    }

    #[test]
    fn test_job_toml_round_trip() {
        let mut job = SeparationJob::new("in.png", "films");
        job.films.halftone.enabled = true;
        let text = job.to_toml().unwrap();
        assert_eq!(SeparationJob::from_toml(&text).unwrap(), job);
    }

    #[test]
    fn test_missing_paths_rejected() {
        let result = SeparationJob::from_json(r#"{"input_path": "", "output_dir": "out"}"#);
        assert!(matches!(result, Err(FilmCliError::MissingInput)));
        let result = SeparationJob::from_json(r#"{"input_path": "a.png", "output_dir": " "}"#);
        assert!(matches!(result, Err(FilmCliError::MissingOutputDir)));
    }

    #[test]
    fn test_unsupported_extension() {
        let result = SeparationJob::from_file("job.yaml");
        assert!(matches!(result, Err(FilmCliError::UnsupportedFileFormat)));
    }

    #[test]
    fn test_write_outputs() {
        let pixels = RgbImage::from_fn(40, 30, |x, _| {
            if x < 20 {
                Rgb([20, 20, 20])
            } else {
                Rgb([220, 30, 30])
            }
        });
        let set = FilmPipeline::builder()
            .colors(2)
            .without_default_stages()
            .build()
            .unwrap()
            .process(&SourceImage::new(pixels, 300.0))
            .unwrap();
        let batch = Exporter::default().encode(&set.films);

        let dir = std::env::temp_dir().join(format!("film_cli_outputs_{}", std::process::id()));
        let (written, report) = write_outputs(&dir, &set, &batch, true).unwrap();

        assert_eq!(written.len(), 4);
        assert!(dir.join("film_01_color_01.pdf").exists());
        assert!(dir.join("preview.png").exists());
        let metadata = fs::read_to_string(dir.join("metadata.json")).unwrap();
        let parsed: FilmReport = serde_json::from_str(&metadata).unwrap();
        assert_eq!(parsed.films.len(), report.films.len());
        assert_eq!(parsed.colors[0].pixel_count, 600);
        assert!(parsed.export_failures.is_empty());

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_mask_reads_dark_as_ink() {
        let film = GrayImage::from_fn(10, 10, |x, _| if x < 4 { Luma([0]) } else { Luma([255]) });
        let path = std::env::temp_dir().join(format!("film_cli_mask_{}.png", std::process::id()));
        film.save(&path).unwrap();

        let mask = load_mask(&path, false).unwrap();
        assert_eq!(mask.get_pixel(0, 0)[0], INK);
        assert_eq!(mask.get_pixel(9, 0)[0], NO_INK);

        let flipped = load_mask(&path, true).unwrap();
        assert_eq!(flipped.get_pixel(0, 0)[0], NO_INK);

        fs::remove_file(&path).unwrap();
    }
}
