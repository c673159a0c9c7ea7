use image::{GrayImage, Luma};
use imageproc::{
    distance_transform::Norm,
    region_labelling::{connected_components, Connectivity},
};
use tracing::{debug, warn};

use super::distance::{dilate_disk, erode_disk};
use crate::{
    config::CleanupConfig,
    types::{ink_count, INK, NO_INK},
};

/// Upper bound on repeated cleanup passes before giving up on convergence
const MAX_CLEAN_PASSES: usize = 32;

/// Geometry repair for binary masks.
#[derive(Debug, Clone, Default)]
pub struct MorphologicalCleaner {
    pub config: CleanupConfig,
}

impl MorphologicalCleaner {
    pub fn new(config: CleanupConfig) -> Self {
        Self { config }
    }

    /// Radius of the elliptical structuring element; a 3 px kernel is the
    /// 4-connected cross.
    fn radius(&self) -> f64 {
        (self.config.kernel_size / 2) as f64
    }

    /// Erosion followed by dilation: drops specks smaller than the kernel.
    pub fn open(&self, mask: &GrayImage) -> GrayImage {
        let r = self.radius();
        dilate_disk(&erode_disk(mask, r), r)
    }

    /// Dilation followed by erosion: fills pinholes smaller than the kernel.
    pub fn close(&self, mask: &GrayImage) -> GrayImage {
        let r = self.radius();
        erode_disk(&dilate_disk(mask, r), r)
    }

    /// Opening and closing for the configured number of iterations, then
    /// small component removal and optional edge smoothing.
    ///
    /// Smoothing keeps rounding sharp tips on every pass, so the whole
    /// sequence is repeated until the mask stops changing. The result is a
    /// fixed point: cleaning it again returns it unchanged.
    pub fn clean(&self, mask: &GrayImage) -> GrayImage {
        let before = ink_count(mask);
        let mut cleaned = self.clean_pass(mask);

        let mut passes = 1;
        let mut converged = false;
        while passes < MAX_CLEAN_PASSES {
            let next = self.clean_pass(&cleaned);
            passes += 1;
            if next == cleaned {
                converged = true;
                break;
            }
            cleaned = next;
        }
        if !converged {
            warn!("Mask cleanup still changing after {} passes", passes);
        }

        debug!(
            "Cleaned mask in {} passes: {} -> {} ink pixels",
            passes,
            before,
            ink_count(&cleaned)
        );
        cleaned
    }

    fn clean_pass(&self, mask: &GrayImage) -> GrayImage {
        let mut cleaned = mask.clone();
        if self.config.kernel_size > 1 {
            for _ in 0..self.config.iterations {
                cleaned = self.close(&self.open(&cleaned));
            }
        }

        cleaned = remove_small_components(&cleaned, self.config.min_area);

        if self.config.smooth && self.config.smooth_sigma > 0.0 {
            cleaned = smooth(&cleaned, self.config.smooth_sigma);
        }
        cleaned
    }

    /// Grow ink by `px` pixels in every direction (trap).
    pub fn expand(&self, mask: &GrayImage, px: u32) -> GrayImage {
        if px == 0 {
            return mask.clone();
        }
        imageproc::morphology::dilate(mask, Norm::LInf, clamp_radius(px))
    }

    /// Pull ink back by `px` pixels in every direction (choke).
    pub fn shrink(&self, mask: &GrayImage, px: u32) -> GrayImage {
        if px == 0 {
            return mask.clone();
        }
        imageproc::morphology::erode(mask, Norm::LInf, clamp_radius(px))
    }
}

fn clamp_radius(px: u32) -> u8 {
    u8::try_from(px).unwrap_or_else(|_| {
        warn!("Trap margin of {}px clamped to {}px", px, u8::MAX);
        u8::MAX
    })
}

/// Drop 8-connected ink components with fewer than `min_area` pixels.
pub fn remove_small_components(mask: &GrayImage, min_area: u32) -> GrayImage {
    if min_area <= 1 {
        return mask.clone();
    }

    let labels = connected_components(mask, Connectivity::Eight, Luma([NO_INK]));
    let component_count = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;
    if component_count == 0 {
        return mask.clone();
    }

    let mut areas = vec![0u32; component_count + 1];
    for p in labels.pixels() {
        areas[p[0] as usize] += 1;
    }

    let removed = areas
        .iter()
        .skip(1)
        .filter(|&&area| area < min_area)
        .count();
    if removed > 0 {
        debug!("Removing {} components below {} px", removed, min_area);
    }

    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        let label = labels.get_pixel(x, y)[0] as usize;
        if label != 0 && areas[label] >= min_area {
            Luma([INK])
        } else {
            Luma([NO_INK])
        }
    })
}

/// Gaussian blur re-thresholded at the midpoint.
pub fn smooth(mask: &GrayImage, sigma: f32) -> GrayImage {
    let blurred = imageproc::filter::gaussian_blur_f32(mask, sigma);
    imageproc::contrast::threshold(&blurred, 127)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(width: u32, height: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if x >= x0 && x < x1 && y >= y0 && y < y1 {
                Luma([INK])
            } else {
                Luma([NO_INK])
            }
        })
    }

    fn cleaner(min_area: u32, smooth: bool) -> MorphologicalCleaner {
        MorphologicalCleaner::new(CleanupConfig {
            enabled: true,
            kernel_size: 3,
            iterations: 1,
            min_area,
            smooth,
            smooth_sigma: 0.8,
        })
    }

    #[test]
    fn test_opening_removes_specks() {
        let mut mask = rect(40, 40, 10, 10, 30, 30);
        mask.put_pixel(2, 2, Luma([INK]));
        mask.put_pixel(36, 5, Luma([INK]));

        let cleaned = cleaner(0, false).clean(&mask);
        assert_eq!(cleaned.get_pixel(2, 2)[0], NO_INK);
        assert_eq!(cleaned.get_pixel(36, 5)[0], NO_INK);
        assert_eq!(cleaned.get_pixel(20, 20)[0], INK);
    }

    #[test]
    fn test_closing_fills_pinholes() {
        let mut mask = rect(40, 40, 10, 10, 30, 30);
        mask.put_pixel(20, 20, Luma([NO_INK]));

        let cleaned = cleaner(0, false).clean(&mask);
        assert_eq!(cleaned.get_pixel(20, 20)[0], INK);
    }

    #[test]
    fn test_clean_is_idempotent() {
        let mut mask = rect(50, 50, 8, 8, 40, 30);
        mask.put_pixel(45, 45, Luma([INK]));
        mask.put_pixel(20, 15, Luma([NO_INK]));

        let c = cleaner(10, false);
        let once = c.clean(&mask);
        let twice = c.clean(&once);
        assert_eq!(once, twice);
    }

    /// Two triangles meeting at a narrow neck; smoothing rounds the tips
    fn bow_tie() -> GrayImage {
        GrayImage::from_fn(200, 100, |x, y| {
            let half_height = ((x as f32 - 100.0).abs() * 0.45).max(2.0);
            let ink = (10..190).contains(&x) && (y as f32 - 50.0).abs() <= half_height;
            Luma([if ink { INK } else { NO_INK }])
        })
    }

    fn ellipse() -> GrayImage {
        GrayImage::from_fn(120, 80, |x, y| {
            let dx = (x as f32 - 60.0) / 45.0;
            let dy = (y as f32 - 40.0) / 25.0;
            Luma([if dx * dx + dy * dy <= 1.0 { INK } else { NO_INK }])
        })
    }

    #[test]
    fn test_default_clean_is_idempotent() {
        let c = MorphologicalCleaner::new(CleanupConfig::default());
        assert!(c.config.smooth);

        for mask in [bow_tie(), ellipse(), rect(80, 80, 10, 10, 70, 70)] {
            let once = c.clean(&mask);
            let twice = c.clean(&once);
            assert!(ink_count(&once) > 0);
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_clean_is_deterministic_with_smoothing() {
        let mask = rect(30, 30, 5, 5, 25, 20);
        let c = cleaner(10, true);
        assert_eq!(c.clean(&mask), c.clean(&mask));
    }

    #[test]
    fn test_small_components_removed_regardless_of_shape() {
        // 1x12 line survives the kernel test but not the area test
        let mut mask = rect(40, 40, 5, 5, 25, 25);
        for x in 28..40 {
            mask.put_pixel(x, 35, Luma([INK]));
        }
        let filtered = remove_small_components(&mask, 50);
        assert_eq!(filtered.get_pixel(30, 35)[0], NO_INK);
        assert_eq!(ink_count(&filtered), 400);
    }

    #[test]
    fn test_expand_and_shrink() {
        let mask = rect(30, 30, 10, 10, 20, 20);
        let c = cleaner(0, false);

        let expanded = c.expand(&mask, 2);
        assert_eq!(ink_count(&expanded), 14 * 14);
        assert_eq!(expanded.get_pixel(8, 8)[0], INK);

        let shrunk = c.shrink(&mask, 2);
        assert_eq!(ink_count(&shrunk), 6 * 6);
        assert_eq!(shrunk.get_pixel(11, 11)[0], NO_INK);

        assert_eq!(c.expand(&mask, 0), mask);
    }
}
