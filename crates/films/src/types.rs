use image::{GrayImage, RgbImage};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Mask value of a pixel that receives ink
pub const INK: u8 = 255;
/// Mask value of bare film
pub const NO_INK: u8 = 0;

/// Label of pixels that belong to no ink
pub const BACKGROUND_LABEL: i32 = -1;

/// Raster input as handed over by the image loader.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub pixels: RgbImage,
    /// Physical resolution in dots per inch
    pub dpi: f32,
}

impl SourceImage {
    pub fn new(pixels: RgbImage, dpi: f32) -> Self {
        Self { pixels, dpi }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Rec. 601 luma of every pixel
    pub fn luma(&self) -> GrayImage {
        GrayImage::from_fn(self.width(), self.height(), |x, y| {
            image::Luma([luma(self.pixels.get_pixel(x, y).0).round() as u8])
        })
    }
}

/// Rec. 601 luma of an 8-bit RGB triple, in 0..=255
pub fn luma([r, g, b]: [u8; 3]) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

/// Uppercase `#RRGGBB` notation
pub fn to_hex([r, g, b]: [u8; 3]) -> String {
    format!("#{r:02X}{g:02X}{b:02X}")
}

/// One ink of the separation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PaletteEntry {
    pub name: String,
    pub rgb: [u8; 3],
    pub luminance: f32,
}

impl PaletteEntry {
    pub fn hex(&self) -> String {
        to_hex(self.rgb)
    }
}

/// Inks ordered from darkest to lightest.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ColorPalette {
    entries: Vec<PaletteEntry>,
}

impl ColorPalette {
    /// Sorts the colours by ascending luminance and names them
    /// `color_01`, `color_02`, ... in that order.
    pub fn from_colors(colors: &[[u8; 3]]) -> Self {
        let mut sorted: Vec<[u8; 3]> = colors.to_vec();
        sorted.sort_by(|a, b| luma(*a).total_cmp(&luma(*b)));
        let entries = sorted
            .into_iter()
            .enumerate()
            .map(|(i, rgb)| PaletteEntry {
                name: format!("color_{:02}", i + 1),
                rgb,
                luminance: luma(rgb),
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[PaletteEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&PaletteEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-pixel ink assignment, row-major, [`BACKGROUND_LABEL`] for paper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    width: u32,
    height: u32,
    labels: Vec<i32>,
}

impl LabelMap {
    pub fn new(width: u32, height: u32, labels: Vec<i32>) -> crate::Result<Self> {
        let expected = width as usize * height as usize;
        if labels.len() != expected {
            return Err(crate::FilmError::LabelMapCorruption(format!(
                "{} labels for a {width}x{height} map",
                labels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            labels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    pub fn get(&self, x: u32, y: u32) -> i32 {
        self.labels[y as usize * self.width as usize + x as usize]
    }

    pub fn background_count(&self) -> usize {
        self.labels.iter().filter(|&&l| l == BACKGROUND_LABEL).count()
    }

    pub fn foreground_count(&self) -> usize {
        self.labels.len() - self.background_count()
    }
}

/// Filled area of one mask.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct CoverageStats {
    pub index: usize,
    pub filled_pixels: u64,
    /// Percentage of the reference pixel count (0 when the reference is empty)
    pub coverage_percent: f64,
    pub is_empty: bool,
}

impl CoverageStats {
    pub fn measure(index: usize, mask: &GrayImage, reference_pixels: u64) -> Self {
        let filled = ink_count(mask);
        Self::from_counts(index, filled, reference_pixels)
    }

    pub fn from_counts(index: usize, filled_pixels: u64, reference_pixels: u64) -> Self {
        let coverage_percent = if reference_pixels > 0 {
            filled_pixels as f64 / reference_pixels as f64 * 100.0
        } else {
            0.0
        };
        Self {
            index,
            filled_pixels,
            coverage_percent,
            is_empty: filled_pixels == 0,
        }
    }
}

/// Number of ink pixels in a mask
pub fn ink_count(mask: &GrayImage) -> u64 {
    mask.as_raw().iter().filter(|&&v| v == INK).count() as u64
}

/// Non-fatal findings attached to a film.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilmWarning {
    /// The mask has no ink at all
    EmptyMask,
    /// Narrowest stroke is below the printable minimum
    StrokeViolation { measured_mm: f32, required_mm: f32 },
    /// Too much of the ink sits close to an edge
    ThinStrokes { percent: f32 },
    /// Strokes were dilated to reach the minimum width
    Thickened { radius_px: u32 },
}

/// Stroke width measurements of one mask.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct StrokeStats {
    pub min_width_px: f32,
    pub max_width_px: f32,
    pub avg_width_px: f32,
    pub min_width_mm: f32,
    pub max_width_mm: f32,
    pub avg_width_mm: f32,
    pub thin_area_percentage: f32,
    pub total_objects: usize,
}

/// Outcome of a stroke width validation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct StrokeReport {
    pub valid: bool,
    pub min_width_px: f32,
    pub min_width_mm: f32,
    pub required_width_mm: f32,
    pub violations: usize,
    pub warnings: Vec<String>,
    pub stats: StrokeStats,
}

/// One colour's printable layer.
#[derive(Debug, Clone)]
pub struct Film {
    pub index: usize,
    pub name: String,
    pub color: [u8; 3],
    pub mask: GrayImage,
    /// Coverage straight out of the mask builder
    pub coverage: CoverageStats,
    pub stroke: Option<StrokeReport>,
    pub warnings: Vec<FilmWarning>,
}

impl Film {
    pub fn new(index: usize, entry: &PaletteEntry, mask: GrayImage, coverage: CoverageStats) -> Self {
        Self {
            index,
            name: entry.name.clone(),
            color: entry.rgb,
            mask,
            coverage,
            stroke: None,
            warnings: Vec::new(),
        }
    }

    pub fn hex(&self) -> String {
        to_hex(self.color)
    }

    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    pub fn ink_pixels(&self) -> u64 {
        ink_count(&self.mask)
    }

    /// `film_01_color_01` style stem used for exported files
    pub fn file_stem(&self) -> String {
        format!("film_{:02}_{}", self.index + 1, self.name)
    }

    pub fn warn(&mut self, warning: FilmWarning) {
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_formatting() {
        assert_eq!(to_hex([0, 0, 0]), "#000000");
        assert_eq!(to_hex([255, 255, 255]), "#FFFFFF");
        assert_eq!(to_hex([16, 32, 48]), "#102030");
        assert_eq!(to_hex([10, 171, 205]), "#0AABCD");
    }

    #[test]
    fn test_palette_sorted_dark_to_light() {
        let palette = ColorPalette::from_colors(&[[250, 250, 0], [0, 0, 0], [200, 0, 0]]);
        let rgbs: Vec<[u8; 3]> = palette.entries().iter().map(|e| e.rgb).collect();
        assert_eq!(rgbs, vec![[0, 0, 0], [200, 0, 0], [250, 250, 0]]);
        assert_eq!(palette.get(0).unwrap().name, "color_01");
        assert_eq!(palette.get(2).unwrap().name, "color_03");
    }

    #[test]
    fn test_coverage_guards_empty_reference() {
        let stats = CoverageStats::from_counts(0, 0, 0);
        assert_eq!(stats.coverage_percent, 0.0);
        assert!(stats.is_empty);
    }

    #[test]
    fn test_label_map_rejects_wrong_length() {
        assert!(LabelMap::new(2, 2, vec![0, 1, 2]).is_err());
        let map = LabelMap::new(2, 2, vec![0, -1, 1, -1]).unwrap();
        assert_eq!(map.background_count(), 2);
        assert_eq!(map.foreground_count(), 2);
        assert_eq!(map.get(0, 1), 1);
    }
}
