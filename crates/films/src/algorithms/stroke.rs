//! Stroke width measurement and repair.
//!
//! Widths are read off the distance field's ridge (the medial axis of each
//! stroke), where the distance to paper equals half the local width. Edge
//! pixels always sit at distance 1 and say nothing about the stroke.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::region_labelling::{connected_components, Connectivity};
use tracing::{debug, info, warn};

use super::distance::{dilate_disk, DistanceField};
use crate::types::{ink_count, StrokeReport, StrokeStats, INK, NO_INK};

const MM_PER_INCH: f32 = 25.4;

/// Share of ink pixels that may sit closer to paper than half the required
/// width before the design is flagged as having thin strokes.
pub const THIN_AREA_LIMIT_PERCENT: f32 = 5.0;

pub const NO_OBJECTS_WARNING: &str = "No objects found in mask";

pub fn mm_to_px(mm: f32, dpi: f32) -> f32 {
    mm / MM_PER_INCH * dpi
}

pub fn px_to_mm(px: f32, dpi: f32) -> f32 {
    px / dpi * MM_PER_INCH
}

#[derive(Debug, Clone, Copy)]
struct Widths {
    min: f32,
    max: f32,
    avg: f32,
    /// Ridge pixels narrower than the required width
    violations: usize,
}

/// Widths along the ridge, in one pass over it.
fn measure(field: &DistanceField, required_px: f32) -> Option<Widths> {
    let ridge = field.ridge_values();
    if ridge.is_empty() {
        return None;
    }
    let mut widths = Widths {
        min: f32::INFINITY,
        max: 0.0,
        avg: 0.0,
        violations: 0,
    };
    let count = ridge.len() as f32;
    let mut sum = 0.0;
    for width in ridge.into_iter().map(|d| 2.0 * d) {
        widths.min = widths.min.min(width);
        widths.max = widths.max.max(width);
        sum += width;
        if width < required_px {
            widths.violations += 1;
        }
    }
    widths.avg = sum / count;
    Some(widths)
}

fn count_objects(mask: &GrayImage) -> usize {
    let labels = connected_components(mask, Connectivity::Eight, image::Luma([NO_INK]));
    labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize
}

/// Measures line widths of a mask at a given physical resolution.
#[derive(Debug, Clone)]
pub struct StrokeWidthAnalyzer {
    pub dpi: f32,
}

impl StrokeWidthAnalyzer {
    pub fn new(dpi: f32) -> Self {
        Self { dpi }
    }

    /// Smallest printable width in whole pixels
    pub fn required_px(&self, min_width_mm: f32) -> f32 {
        mm_to_px(min_width_mm, self.dpi).round()
    }

    pub fn validate(&self, mask: &GrayImage, min_width_mm: f32) -> StrokeReport {
        let required_px = self.required_px(min_width_mm);
        let ink = ink_count(mask);

        if ink == 0 {
            return StrokeReport {
                valid: false,
                min_width_px: 0.0,
                min_width_mm: 0.0,
                required_width_mm: min_width_mm,
                violations: 0,
                warnings: vec![NO_OBJECTS_WARNING.to_string()],
                stats: StrokeStats::default(),
            };
        }

        let field = DistanceField::compute(mask);
        let Some(widths) = measure(&field, required_px) else {
            // A non-empty field always has a global maximum on its ridge
            return StrokeReport {
                valid: false,
                min_width_px: 0.0,
                min_width_mm: 0.0,
                required_width_mm: min_width_mm,
                violations: 0,
                warnings: vec![NO_OBJECTS_WARNING.to_string()],
                stats: StrokeStats::default(),
            };
        };

        let violations = widths.violations;

        let thin_pixels = field
            .values()
            .iter()
            .filter(|&&d| d > 0.0 && d < required_px / 2.0)
            .count();
        let thin_area_percentage = thin_pixels as f32 / ink as f32 * 100.0;

        let stats = StrokeStats {
            min_width_px: widths.min,
            max_width_px: widths.max,
            avg_width_px: widths.avg,
            min_width_mm: px_to_mm(widths.min, self.dpi),
            max_width_mm: px_to_mm(widths.max, self.dpi),
            avg_width_mm: px_to_mm(widths.avg, self.dpi),
            thin_area_percentage,
            total_objects: count_objects(mask),
        };

        let valid = widths.min >= required_px;
        let mut warnings = Vec::new();
        if !valid {
            warnings.push(format!(
                "Minimum stroke width ({:.2}mm) is below recommended ({:.2}mm)",
                stats.min_width_mm, min_width_mm
            ));
        }
        if thin_area_percentage > THIN_AREA_LIMIT_PERCENT {
            warnings.push(format!(
                "{:.1}% of the design has thin strokes",
                thin_area_percentage
            ));
        }

        if valid {
            debug!(
                "Stroke widths OK (min {:.2}mm, avg {:.2}mm)",
                stats.min_width_mm, stats.avg_width_mm
            );
        } else {
            warn!(
                "Stroke width {:.2}mm below {:.2}mm ({} ridge pixels)",
                stats.min_width_mm, min_width_mm, violations
            );
        }

        StrokeReport {
            valid,
            min_width_px: widths.min,
            min_width_mm: stats.min_width_mm,
            required_width_mm: min_width_mm,
            violations,
            warnings,
            stats,
        }
    }

    /// Dilation radius needed to bring the narrowest stroke up to
    /// `target_mm`; 0 when the mask already complies or is empty.
    pub fn thicken_radius(&self, mask: &GrayImage, target_mm: f32) -> u32 {
        if ink_count(mask) == 0 {
            return 0;
        }
        let target_px = self.required_px(target_mm);
        let Some(widths) = measure(&DistanceField::compute(mask), target_px) else {
            return 0;
        };
        let gap = target_px - widths.min;
        if gap <= 0.0 {
            0
        } else {
            (gap / 2.0).ceil() as u32
        }
    }

    pub fn thicken(&self, mask: &GrayImage, target_mm: f32) -> GrayImage {
        let radius = self.thicken_radius(mask, target_mm);
        if radius == 0 {
            return mask.clone();
        }
        info!("Thickening strokes by {}px", radius);
        dilate_disk(mask, radius as f64)
    }

    /// False-colour rendering of the distance field, black outside the ink.
    pub fn heatmap(&self, mask: &GrayImage) -> RgbImage {
        let field = DistanceField::compute(mask);
        let max = field.values().iter().copied().fold(0.0, f32::max);

        RgbImage::from_fn(mask.width(), mask.height(), |x, y| {
            if mask.get_pixel(x, y)[0] != INK || max <= 0.0 {
                return Rgb([0, 0, 0]);
            }
            let level = (field.get(x, y) / max * 255.0).round() / 255.0;
            jet(level)
        })
    }
}

/// Blue to red colour ramp for `v` in 0..=1.
fn jet(v: f32) -> Rgb<u8> {
    let channel = |offset: f32| {
        let c = (1.5 - (4.0 * v - offset).abs()).clamp(0.0, 1.0);
        (c * 255.0).round() as u8
    };
    Rgb([channel(3.0), channel(2.0), channel(1.0)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Square outline of the given stroke thickness
    fn outline(size: u32, margin: u32, thickness: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let inside = |v: u32| v >= margin && v < size - margin;
            let in_outer = inside(x) && inside(y);
            let inner = |v: u32| v >= margin + thickness && v < size - margin - thickness;
            let in_hole = inner(x) && inner(y);
            Luma([if in_outer && !in_hole { INK } else { NO_INK }])
        })
    }

    #[test]
    fn test_unit_conversion() {
        assert!((mm_to_px(25.4, 300.0) - 300.0).abs() < 1e-4);
        assert!((px_to_mm(300.0, 300.0) - 25.4).abs() < 1e-4);
        let analyzer = StrokeWidthAnalyzer::new(300.0);
        assert_eq!(analyzer.required_px(0.5), 6.0);
    }

    #[test]
    fn test_outline_thickness_measured() {
        let analyzer = StrokeWidthAnalyzer::new(300.0);
        for thickness in [2u32, 3, 4, 6, 9] {
            let report = analyzer.validate(&outline(80, 10, thickness), 0.1);
            let measured = report.min_width_px;
            assert!(
                (measured - thickness as f32).abs() <= 1.0,
                "thickness {thickness} measured as {measured}"
            );
            assert_eq!(report.stats.total_objects, 1);
        }
    }

    #[test]
    fn test_thin_outline_fails_validation() {
        let analyzer = StrokeWidthAnalyzer::new(300.0);
        let report = analyzer.validate(&outline(80, 10, 2), 0.5);
        assert!(!report.valid);
        assert!(report.violations > 0);
        assert!(report.stats.thin_area_percentage > 5.0);
        assert_eq!(report.warnings.len(), 2);

        let report = analyzer.validate(&outline(80, 10, 9), 0.5);
        assert!(report.valid);
        assert_eq!(report.violations, 0);
        assert!(!report.warnings.iter().any(|w| w.starts_with("Minimum")));
    }

    #[test]
    fn test_violations_count_only_narrow_ridge() {
        // 3 px hairline above a 20 px bar
        let mask = GrayImage::from_fn(80, 60, |x, y| {
            let hairline = (10..70).contains(&x) && (10..13).contains(&y);
            let bar = (10..70).contains(&x) && (25..45).contains(&y);
            Luma([if hairline || bar { INK } else { NO_INK }])
        });
        let analyzer = StrokeWidthAnalyzer::new(300.0);
        let report = analyzer.validate(&mask, 0.5);

        let ridge = DistanceField::compute(&mask).ridge_values();
        let narrow = ridge.iter().filter(|&&d| 2.0 * d < 6.0).count();
        assert_eq!(report.violations, narrow);
        assert!(report.violations > 0 && report.violations < ridge.len());

        let stats = &report.stats;
        assert!(stats.min_width_px <= stats.avg_width_px);
        assert!(stats.avg_width_px <= stats.max_width_px);
        assert!(stats.max_width_px >= 18.0);
    }

    #[test]
    fn test_empty_mask_reports_no_objects() {
        let analyzer = StrokeWidthAnalyzer::new(300.0);
        let report = analyzer.validate(&GrayImage::new(20, 20), 0.5);
        assert!(!report.valid);
        assert_eq!(report.warnings, vec![NO_OBJECTS_WARNING.to_string()]);
        assert_eq!(report.stats, StrokeStats::default());
    }

    #[test]
    fn test_thicken_is_monotonic_and_reaches_target() {
        let analyzer = StrokeWidthAnalyzer::new(300.0);
        let mask = outline(100, 20, 3);
        let thick = analyzer.thicken(&mask, 0.5);

        assert!(ink_count(&thick) >= ink_count(&mask));
        for y in 0..100 {
            for x in 0..100 {
                if mask.get_pixel(x, y)[0] == INK {
                    assert_eq!(thick.get_pixel(x, y)[0], INK);
                }
            }
        }

        let report = analyzer.validate(&thick, 0.5);
        assert!(report.min_width_px >= analyzer.required_px(0.5) - 1.0);
    }

    #[test]
    fn test_thicken_leaves_compliant_mask_alone() {
        let analyzer = StrokeWidthAnalyzer::new(300.0);
        let mask = outline(80, 10, 10);
        assert_eq!(analyzer.thicken_radius(&mask, 0.5), 0);
        assert_eq!(analyzer.thicken(&mask, 0.5), mask);
        assert_eq!(analyzer.thicken(&GrayImage::new(8, 8), 0.5), GrayImage::new(8, 8));
    }

    #[test]
    fn test_heatmap_blacks_out_paper() {
        let analyzer = StrokeWidthAnalyzer::new(300.0);
        let mask = outline(40, 5, 6);
        let heat = analyzer.heatmap(&mask);
        assert_eq!(heat.dimensions(), (40, 40));
        assert_eq!(heat.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(heat.get_pixel(20, 20), &Rgb([0, 0, 0]));
        assert_ne!(heat.get_pixel(7, 20), &Rgb([0, 0, 0]));
    }
}
