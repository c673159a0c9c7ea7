//! Processing configuration.
//!
//! Every knob of the film pipeline lives in [`FilmConfig`]. The struct is
//! plain data: it is deserialized once (TOML or JSON on the CLI side),
//! validated with [`FilmConfig::validate`] and then only read.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};

use crate::error::{FilmError, Result};

/// Upper bound on the number of inks a job may request.
pub const MAX_COLORS: usize = 16;

/// Working colour space used while clustering.
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ColorSpace {
    /// Plain sRGB components in 0..=255
    Rgb,
    /// CIELAB (D65)
    #[default]
    Lab,
    /// OKLab, scaled by 100 so distances are comparable to CIELAB
    Oklab,
}

/// Shape of a single halftone dot.
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DotShape {
    #[default]
    Round,
    Square,
    /// Ellipse with a 0.7 minor/major ratio, rotated by the screen angle
    Ellipse,
}

/// How continuous tone is turned into a binary pattern.
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq, Eq,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum HalftoneMode {
    /// One dot per screen cell
    #[default]
    Grid,
    /// Floyd-Steinberg error diffusion
    Dither,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct QuantizationConfig {
    /// Number of inks (1-16)
    #[schemars(range(min = 1, max = 16))]
    pub colors: usize,
    /// Independent k-means restarts; the most compact one wins
    pub attempts: usize,
    pub max_iterations: usize,
    /// Stop a restart once no centre moves further than this
    pub epsilon: f32,
    pub exclude_background: bool,
    /// Pixels brighter than this in every channel count as paper
    pub background_threshold: u8,
    pub color_space: ColorSpace,
    /// Seed for k-means++ initialisation
    pub seed: u64,
}

impl Default for QuantizationConfig {
    fn default() -> Self {
        Self {
            colors: 4,
            attempts: 10,
            max_iterations: 100,
            epsilon: 0.2,
            exclude_background: true,
            background_threshold: 240,
            color_space: ColorSpace::default(),
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct CleanupConfig {
    pub enabled: bool,
    /// Diameter of the elliptical structuring element (odd)
    pub kernel_size: u32,
    pub iterations: u32,
    /// Connected components smaller than this many pixels are dropped
    pub min_area: u32,
    pub smooth: bool,
    pub smooth_sigma: f32,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kernel_size: 3,
            iterations: 1,
            min_area: 50,
            smooth: true,
            smooth_sigma: 0.8,
        }
    }
}

/// Trap (expand) and choke (shrink) margins applied after cleanup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct TrapConfig {
    pub expand_px: u32,
    pub shrink_px: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct StrokeConfig {
    pub validate: bool,
    #[schemars(range(min = 0.1, max = 10.0))]
    pub min_width_mm: f32,
    pub auto_thicken: bool,
}

impl Default for StrokeConfig {
    fn default() -> Self {
        Self {
            validate: true,
            min_width_mm: 0.5,
            auto_thicken: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct HalftoneConfig {
    pub enabled: bool,
    pub mode: HalftoneMode,
    #[schemars(range(min = 20, max = 100))]
    pub lpi: u32,
    /// Screen angle in degrees; only affects elliptical dots
    pub angle: f32,
    pub dot_shape: DotShape,
}

impl Default for HalftoneConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: HalftoneMode::default(),
            lpi: 55,
            angle: 45.0,
            dot_shape: DotShape::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct VectorConfig {
    /// Douglas-Peucker tolerance as a fraction of each contour's perimeter
    pub approximation_factor: f64,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            approximation_factor: 0.002,
        }
    }
}

/// Complete configuration of one separation job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default)]
pub struct FilmConfig {
    /// Target resolution in dots per inch
    #[schemars(range(min = 72, max = 1200))]
    pub dpi: f32,
    pub quantization: QuantizationConfig,
    pub cleanup: CleanupConfig,
    pub trap: TrapConfig,
    pub stroke: StrokeConfig,
    pub halftone: HalftoneConfig,
    pub vector: VectorConfig,
}

impl Default for FilmConfig {
    fn default() -> Self {
        Self {
            dpi: 300.0,
            quantization: QuantizationConfig::default(),
            cleanup: CleanupConfig::default(),
            trap: TrapConfig::default(),
            stroke: StrokeConfig::default(),
            halftone: HalftoneConfig::default(),
            vector: VectorConfig::default(),
        }
    }
}

impl FilmConfig {
    /// JSON schema of the configuration file format
    pub fn schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(FilmConfig)
    }

    /// Check every bound before any pixel is touched.
    ///
    /// Returns advisory messages for values that are legal but likely to
    /// print badly.
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut advisories = Vec::new();
        let q = &self.quantization;

        if q.colors < 1 || q.colors > MAX_COLORS {
            return Err(FilmError::Configuration(format!(
                "color count must be between 1 and {MAX_COLORS}, got {}",
                q.colors
            )));
        }
        if q.attempts == 0 || q.max_iterations == 0 {
            return Err(FilmError::Configuration(
                "clustering needs at least one attempt and one iteration".to_string(),
            ));
        }
        if !(q.epsilon > 0.0) {
            return Err(FilmError::Configuration(format!(
                "clustering epsilon must be positive, got {}",
                q.epsilon
            )));
        }

        if !(72.0..=1200.0).contains(&self.dpi) {
            return Err(FilmError::Configuration(format!(
                "dpi must be between 72 and 1200, got {}",
                self.dpi
            )));
        }
        if self.dpi < 300.0 {
            advisories.push(format!(
                "dpi {} is below 300 and may print poorly",
                self.dpi
            ));
        }

        let c = &self.cleanup;
        if c.kernel_size == 0 || c.kernel_size % 2 == 0 {
            return Err(FilmError::Configuration(format!(
                "morphology kernel size must be odd and positive, got {}",
                c.kernel_size
            )));
        }
        if c.smooth && !(c.smooth_sigma > 0.0) {
            return Err(FilmError::Configuration(format!(
                "smoothing sigma must be positive, got {}",
                c.smooth_sigma
            )));
        }

        if self.stroke.validate || self.stroke.auto_thicken {
            let mm = self.stroke.min_width_mm;
            if !(0.1..=10.0).contains(&mm) {
                return Err(FilmError::Configuration(format!(
                    "minimum stroke width must be between 0.1mm and 10mm, got {mm}"
                )));
            }
            if mm < 0.5 {
                advisories.push(format!("strokes below 0.5mm ({mm}mm) may not print clearly"));
            }
        }

        if self.halftone.enabled {
            let lpi = self.halftone.lpi;
            if !(20..=100).contains(&lpi) {
                return Err(FilmError::Configuration(format!(
                    "lpi must be between 20 and 100, got {lpi}"
                )));
            }
            if lpi < 45 {
                advisories.push(format!("lpi {lpi} is below 45, dots may be visible"));
            } else if lpi > 85 {
                advisories.push(format!("lpi {lpi} is above 85, screens may clog"));
            }
        }

        if !(self.vector.approximation_factor >= 0.0) {
            return Err(FilmError::Configuration(format!(
                "approximation factor must not be negative, got {}",
                self.vector.approximation_factor
            )));
        }

        Ok(advisories)
    }
}
