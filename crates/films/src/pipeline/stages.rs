use tracing::debug;

use crate::{
    algorithms::{
        stroke::THIN_AREA_LIMIT_PERCENT, HalftoneRasterizer, MorphologicalCleaner,
        StrokeWidthAnalyzer,
    },
    config::{CleanupConfig, HalftoneConfig, StrokeConfig, TrapConfig},
    error::Result,
    traits::{FilmStage, StageContext},
    types::{Film, FilmWarning},
};

/// Noise removal, gap filling and edge smoothing.
#[derive(Debug, Clone)]
pub struct CleanupStage {
    cleaner: MorphologicalCleaner,
}

impl CleanupStage {
    pub fn new(config: CleanupConfig) -> Self {
        Self {
            cleaner: MorphologicalCleaner::new(config),
        }
    }
}

impl FilmStage for CleanupStage {
    fn name(&self) -> &'static str {
        "cleanup"
    }

    fn process(&self, film: &mut Film, _ctx: &StageContext<'_>) -> Result<()> {
        film.mask = self.cleaner.clean(&film.mask);
        Ok(())
    }
}

/// Trap (expand) then choke (shrink) margins.
#[derive(Debug, Clone)]
pub struct TrapStage {
    cleaner: MorphologicalCleaner,
    config: TrapConfig,
}

impl TrapStage {
    pub fn new(config: TrapConfig) -> Self {
        Self {
            cleaner: MorphologicalCleaner::default(),
            config,
        }
    }
}

impl FilmStage for TrapStage {
    fn name(&self) -> &'static str {
        "trap"
    }

    fn process(&self, film: &mut Film, _ctx: &StageContext<'_>) -> Result<()> {
        if self.config.expand_px > 0 {
            film.mask = self.cleaner.expand(&film.mask, self.config.expand_px);
        }
        if self.config.shrink_px > 0 {
            film.mask = self.cleaner.shrink(&film.mask, self.config.shrink_px);
        }
        Ok(())
    }
}

/// Optional thickening followed by stroke width validation.
#[derive(Debug, Clone)]
pub struct StrokeStage {
    config: StrokeConfig,
}

impl StrokeStage {
    pub fn new(config: StrokeConfig) -> Self {
        Self { config }
    }
}

impl FilmStage for StrokeStage {
    fn name(&self) -> &'static str {
        "stroke"
    }

    fn process(&self, film: &mut Film, ctx: &StageContext<'_>) -> Result<()> {
        let analyzer = StrokeWidthAnalyzer::new(ctx.dpi);
        let required_mm = self.config.min_width_mm;

        if film.ink_pixels() == 0 {
            film.warn(FilmWarning::EmptyMask);
            if self.config.validate {
                film.stroke = Some(analyzer.validate(&film.mask, required_mm));
            }
            return Ok(());
        }

        if self.config.auto_thicken {
            let radius = analyzer.thicken_radius(&film.mask, required_mm);
            if radius > 0 {
                film.mask = analyzer.thicken(&film.mask, required_mm);
                film.warn(FilmWarning::Thickened { radius_px: radius });
            }
        }

        if self.config.validate {
            let report = analyzer.validate(&film.mask, required_mm);
            if !report.valid {
                film.warn(FilmWarning::StrokeViolation {
                    measured_mm: report.min_width_mm,
                    required_mm,
                });
            }
            if report.stats.thin_area_percentage > THIN_AREA_LIMIT_PERCENT {
                film.warn(FilmWarning::ThinStrokes {
                    percent: report.stats.thin_area_percentage,
                });
            }
            debug!(
                "{}: min stroke {:.2}mm ({})",
                film.name,
                report.min_width_mm,
                if report.valid { "ok" } else { "too thin" }
            );
            film.stroke = Some(report);
        }
        Ok(())
    }
}

/// Replaces solid ink with a dot or dither pattern of the source tone.
#[derive(Debug, Clone)]
pub struct HalftoneStage {
    config: HalftoneConfig,
}

impl HalftoneStage {
    pub fn new(config: HalftoneConfig) -> Self {
        Self { config }
    }
}

impl FilmStage for HalftoneStage {
    fn name(&self) -> &'static str {
        "halftone"
    }

    fn process(&self, film: &mut Film, ctx: &StageContext<'_>) -> Result<()> {
        let rasterizer = HalftoneRasterizer::new(self.config.clone(), ctx.dpi);
        film.mask = rasterizer.apply(&film.mask, ctx.tone)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoverageStats, PaletteEntry, INK};
    use image::{GrayImage, Luma};

    fn film(mask: GrayImage) -> Film {
        let entry = PaletteEntry {
            name: "color_01".into(),
            rgb: [0, 0, 0],
            luminance: 0.0,
        };
        Film::new(0, &entry, mask, CoverageStats::from_counts(0, 0, 0))
    }

    fn bar(thickness: u32) -> GrayImage {
        GrayImage::from_fn(100, 60, |x, y| {
            let inside = (10..90).contains(&x) && y >= 20 && y < 20 + thickness;
            Luma([if inside { INK } else { 0 }])
        })
    }

    #[test]
    fn test_stroke_stage_flags_thin_lines() {
        let tone = GrayImage::new(100, 60);
        let ctx = StageContext { dpi: 300.0, tone: &tone };
        let mut f = film(bar(2));

        StrokeStage::new(StrokeConfig::default()).process(&mut f, &ctx).unwrap();
        assert!(f.stroke.as_ref().is_some_and(|r| !r.valid));
        assert!(f.warnings.iter().any(|w| matches!(w, FilmWarning::StrokeViolation { .. })));
    }

    #[test]
    fn test_stroke_stage_thickens_when_asked() {
        let tone = GrayImage::new(100, 60);
        let ctx = StageContext { dpi: 300.0, tone: &tone };
        let mut f = film(bar(2));
        let before = f.ink_pixels();

        let config = StrokeConfig {
            validate: true,
            min_width_mm: 0.5,
            auto_thicken: true,
        };
        StrokeStage::new(config).process(&mut f, &ctx).unwrap();
        assert!(f.ink_pixels() > before);
        assert!(f.warnings.iter().any(|w| matches!(w, FilmWarning::Thickened { .. })));
        assert!(f.stroke.as_ref().is_some_and(|r| r.valid));
    }

    #[test]
    fn test_stroke_stage_on_empty_mask() {
        let tone = GrayImage::new(10, 10);
        let ctx = StageContext { dpi: 300.0, tone: &tone };
        let mut f = film(GrayImage::new(10, 10));
        StrokeStage::new(StrokeConfig::default()).process(&mut f, &ctx).unwrap();
        assert_eq!(f.warnings, vec![FilmWarning::EmptyMask]);
        let report = f.stroke.expect("empty masks still get a report");
        assert!(!report.valid);
        assert_eq!(report.stats.total_objects, 0);
    }

    #[test]
    fn test_trap_stage_grows_then_shrinks() {
        let tone = GrayImage::new(100, 60);
        let ctx = StageContext { dpi: 300.0, tone: &tone };
        let mut f = film(bar(10));
        let before = f.ink_pixels();

        TrapStage::new(TrapConfig { expand_px: 2, shrink_px: 0 })
            .process(&mut f, &ctx)
            .unwrap();
        assert_eq!(f.ink_pixels(), 84 * 14);
        TrapStage::new(TrapConfig { expand_px: 0, shrink_px: 2 })
            .process(&mut f, &ctx)
            .unwrap();
        assert_eq!(f.ink_pixels(), before);
    }
}
