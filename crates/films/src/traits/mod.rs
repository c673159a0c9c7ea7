use image::GrayImage;

use crate::{error::Result, io::ExportFormat, types::Film};

/// Read-only inputs shared by every per-film stage.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    /// Physical resolution of the job
    pub dpi: f32,
    /// Luminance of the source image, used as halftone tone
    pub tone: &'a GrayImage,
}

/// One processing step applied to a film after mask construction
pub trait FilmStage: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Update the film in place
    fn process(&self, film: &mut Film, ctx: &StageContext<'_>) -> Result<()>;
}

/// Output format strategy: turns one film into file bytes
pub trait FilmEncoder: Send + Sync {
    fn format(&self) -> ExportFormat;

    fn encode(&self, film: &Film) -> Result<Vec<u8>>;
}
