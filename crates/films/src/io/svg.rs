use std::fmt::Write as _;

use crate::{
    algorithms::contours::simplified_contours,
    error::Result,
    io::ExportFormat,
    traits::FilmEncoder,
    types::Film,
};

/// Simplified outer contours as one SVG path per region.
#[derive(Debug, Clone)]
pub struct SvgEncoder {
    pub approximation_factor: f64,
}

impl Default for SvgEncoder {
    fn default() -> Self {
        Self {
            approximation_factor: 0.002,
        }
    }
}

impl FilmEncoder for SvgEncoder {
    fn format(&self) -> ExportFormat {
        ExportFormat::Svg
    }

    fn encode(&self, film: &Film) -> Result<Vec<u8>> {
        let (width, height) = (film.width(), film.height());
        let mut svg = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{width}\" height=\"{height}\" \
             viewBox=\"0 0 {width} {height}\">\n"
        );
        for contour in simplified_contours(&film.mask, self.approximation_factor) {
            let mut d = String::new();
            for (i, [x, y]) in contour.points.iter().enumerate() {
                let op = if i == 0 { 'M' } else { 'L' };
                let _ = write!(d, "{op} {x},{y} ");
            }
            d.push('Z');
            let _ = writeln!(svg, "  <path fill=\"{}\" d=\"{d}\"/>", film.hex());
        }
        svg.push_str("</svg>\n");
        Ok(svg.into_bytes())
    }
}
