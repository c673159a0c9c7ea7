use std::io::Cursor;

use image::{DynamicImage, ImageFormat};

use super::preview::{film_image, FilmImageOptions};
use crate::{error::Result, io::ExportFormat, traits::FilmEncoder, types::Film};

/// Raster film positive.
#[derive(Debug, Clone, Default)]
pub struct PngEncoder {
    pub options: FilmImageOptions,
}

impl FilmEncoder for PngEncoder {
    fn format(&self) -> ExportFormat {
        ExportFormat::Png
    }

    fn encode(&self, film: &Film) -> Result<Vec<u8>> {
        let image = DynamicImage::ImageLuma8(film_image(&film.mask, self.options));
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }
}
