//! Colour quantization: k-means over the image's pixels in a configurable
//! working colour space.
//!
//! Every pixel is converted once into a flat `Vec<[f32; 3]>` (one full
//! resolution float buffer, 12 bytes per pixel) and clustering restarts run
//! over that buffer. Nearest-centre assignment is done in parallel; centre
//! accumulation is sequential so results do not depend on the thread count.

use std::collections::HashSet;

use image::{GrayImage, Luma, RgbImage};
use palette::{IntoColor, Lab, LinSrgb, Oklab, Srgb};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    config::{ColorSpace, QuantizationConfig, MAX_COLORS},
    error::{FilmError, Result},
    types::{luma, ColorPalette, LabelMap, BACKGROUND_LABEL},
};

const OKLAB_SCALE: f32 = 100.0;

/// Minimum number of foreground samples per requested cluster before the
/// background is pulled back into the clustering input.
const MIN_SAMPLES_PER_CLUSTER: usize = 10;

impl ColorSpace {
    /// Convert an 8-bit sRGB triple into working-space coordinates
    pub fn to_working(self, [r, g, b]: [u8; 3]) -> [f32; 3] {
        match self {
            ColorSpace::Rgb => [r as f32, g as f32, b as f32],
            ColorSpace::Lab => {
                let lab: Lab = linear_from_u8([r, g, b]).into_color();
                [lab.l, lab.a, lab.b]
            }
            ColorSpace::Oklab => {
                let ok: Oklab = linear_from_u8([r, g, b]).into_color();
                [ok.l * OKLAB_SCALE, ok.a * OKLAB_SCALE, ok.b * OKLAB_SCALE]
            }
        }
    }

    /// Convert working-space coordinates back to the nearest 8-bit sRGB triple
    pub fn to_rgb(self, [c0, c1, c2]: [f32; 3]) -> [u8; 3] {
        let linear: LinSrgb = match self {
            ColorSpace::Rgb => return [clamp_u8(c0), clamp_u8(c1), clamp_u8(c2)],
            ColorSpace::Lab => {
                let lab: Lab = Lab::new(c0, c1, c2);
                lab.into_color()
            }
            ColorSpace::Oklab => {
                let ok: Oklab = Oklab::new(c0 / OKLAB_SCALE, c1 / OKLAB_SCALE, c2 / OKLAB_SCALE);
                ok.into_color()
            }
        };
        let srgb: Srgb = Srgb::from_linear(linear);
        [
            clamp_u8(srgb.red * 255.0),
            clamp_u8(srgb.green * 255.0),
            clamp_u8(srgb.blue * 255.0),
        ]
    }
}

fn linear_from_u8([r, g, b]: [u8; 3]) -> LinSrgb {
    Srgb::<f32>::new(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0).into_linear()
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[inline]
fn distance_squared(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let d0 = a[0] - b[0];
    let d1 = a[1] - b[1];
    let d2 = a[2] - b[2];
    d0 * d0 + d1 * d1 + d2 * d2
}

/// Index of and squared distance to the closest centre. Ties go to the
/// lower index.
#[inline]
fn nearest_center(point: &[f32; 3], centers: &[[f32; 3]]) -> (usize, f32) {
    let mut best = (0, f32::INFINITY);
    for (i, center) in centers.iter().enumerate() {
        let d = distance_squared(point, center);
        if d < best.1 {
            best = (i, d);
        }
    }
    best
}

/// Result of [`ColorQuantizer::separate`].
#[derive(Debug, Clone)]
pub struct Separation {
    pub palette: ColorPalette,
    pub label_map: LabelMap,
    /// 255 where a pixel was classified as paper; `None` when background
    /// exclusion is disabled
    pub background_mask: Option<GrayImage>,
    /// Number of pixels the winning clustering was trained on
    pub clustered_pixels: usize,
    /// Sum of squared distances of the training pixels to their centres
    pub compactness: f64,
}

/// Outcome of one k-means restart
struct Clustering {
    centers: Vec<[f32; 3]>,
    compactness: f64,
    iterations: usize,
}

/// Groups image colours into an ordered palette and a label map.
#[derive(Debug, Clone, Default)]
pub struct ColorQuantizer {
    pub config: QuantizationConfig,
}

impl ColorQuantizer {
    pub fn new(config: QuantizationConfig) -> Self {
        Self { config }
    }

    /// Cluster the image into `config.colors` inks.
    pub fn separate(&self, image: &RgbImage) -> Result<Separation> {
        let k = self.config.colors;
        let space = self.config.color_space;
        let pixel_count = image.width() as usize * image.height() as usize;

        if k == 0 || k > MAX_COLORS {
            return Err(FilmError::Configuration(format!(
                "color count must be between 1 and {MAX_COLORS}, got {k}"
            )));
        }
        if pixel_count == 0 {
            return Err(FilmError::ClusteringFailure {
                k,
                pixel_count,
                reason: "image has no pixels".to_string(),
            });
        }

        info!(
            "Separating {}x{} image into {} colors ({} space)",
            image.width(),
            image.height(),
            k,
            space
        );

        let raw = image.as_raw();
        let rgb: Vec<[u8; 3]> = raw.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect();
        let working: Vec<[f32; 3]> = rgb.par_iter().map(|&p| space.to_working(p)).collect();

        let threshold = self.config.background_threshold;
        let background: Option<Vec<bool>> = self.config.exclude_background.then(|| {
            rgb.par_iter()
                .map(|p| p.iter().all(|&c| c > threshold))
                .collect()
        });

        let (samples, sample_count) = self.training_set(&working, &rgb, background.as_deref())?;

        let mut best: Option<Clustering> = None;
        for attempt in 0..self.config.attempts {
            let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(attempt as u64));
            let clustering = self.run_kmeans(&samples, k, &mut rng);
            debug!(
                "Attempt {}/{}: compactness {:.2} after {} iterations",
                attempt + 1,
                self.config.attempts,
                clustering.compactness,
                clustering.iterations
            );
            if best
                .as_ref()
                .is_none_or(|b| clustering.compactness < b.compactness)
            {
                best = Some(clustering);
            }
        }

        let best = best
            .filter(|c| c.compactness.is_finite())
            .ok_or_else(|| FilmError::ClusteringFailure {
                k,
                pixel_count: sample_count,
                reason: "k-means did not converge to finite centres".to_string(),
            })?;

        // Darkest ink first; the sort is stable so equal luminances keep
        // their cluster order.
        let colors: Vec<[u8; 3]> = best.centers.iter().map(|&c| space.to_rgb(c)).collect();
        let mut order: Vec<usize> = (0..k).collect();
        order.sort_by(|&a, &b| luma(colors[a]).total_cmp(&luma(colors[b])));
        let centers: Vec<[f32; 3]> = order.iter().map(|&i| best.centers[i]).collect();
        let sorted_colors: Vec<[u8; 3]> = order.iter().map(|&i| colors[i]).collect();
        let palette = ColorPalette::from_colors(&sorted_colors);

        let mut labels: Vec<i32> = working
            .par_iter()
            .map(|p| nearest_center(p, &centers).0 as i32)
            .collect();
        if let Some(background) = &background {
            labels
                .par_iter_mut()
                .zip(background.par_iter())
                .filter(|(_, is_bg)| **is_bg)
                .for_each(|(label, _)| *label = BACKGROUND_LABEL);
        }

        let label_map = LabelMap::new(image.width(), image.height(), labels)?;
        let background_mask = background.map(|bg| {
            GrayImage::from_fn(image.width(), image.height(), |x, y| {
                let i = y as usize * image.width() as usize + x as usize;
                Luma([if bg[i] { 255 } else { 0 }])
            })
        });

        info!(
            "Palette: {}",
            palette
                .entries()
                .iter()
                .map(|e| e.hex())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Separation {
            palette,
            label_map,
            background_mask,
            clustered_pixels: sample_count,
            compactness: best.compactness,
        })
    }

    /// Select the clustering input: foreground pixels when background
    /// exclusion is on, all pixels when that leaves too few samples or too
    /// few distinct colours.
    fn training_set(
        &self,
        working: &[[f32; 3]],
        rgb: &[[u8; 3]],
        background: Option<&[bool]>,
    ) -> Result<(Vec<[f32; 3]>, usize)> {
        let k = self.config.colors;

        if let Some(background) = background {
            let foreground: Vec<usize> = (0..working.len()).filter(|&i| !background[i]).collect();
            if foreground.len() < MIN_SAMPLES_PER_CLUSTER * k {
                warn!(
                    "Only {} foreground pixels for {} colors, clustering all pixels",
                    foreground.len(),
                    k
                );
            } else if distinct_colors(foreground.iter().map(|&i| rgb[i]), k) < k {
                warn!("Foreground has fewer than {} distinct colors, clustering all pixels", k);
            } else {
                let samples: Vec<[f32; 3]> = foreground.iter().map(|&i| working[i]).collect();
                let count = samples.len();
                return Ok((samples, count));
            }
        }

        if distinct_colors(rgb.iter().copied(), k) < k {
            return Err(FilmError::ClusteringFailure {
                k,
                pixel_count: working.len(),
                reason: "fewer distinct colors than requested clusters".to_string(),
            });
        }
        Ok((working.to_vec(), working.len()))
    }

    fn run_kmeans(&self, samples: &[[f32; 3]], k: usize, rng: &mut StdRng) -> Clustering {
        let mut centers = seed_centers(samples, k, rng);
        let mut iterations = 0;

        for _ in 0..self.config.max_iterations {
            iterations += 1;
            let assignments: Vec<(usize, f32)> = samples
                .par_iter()
                .map(|s| nearest_center(s, &centers))
                .collect();

            let mut sums = vec![[0f64; 3]; k];
            let mut counts = vec![0usize; k];
            for (sample, &(cluster, _)) in samples.iter().zip(&assignments) {
                counts[cluster] += 1;
                for c in 0..3 {
                    sums[cluster][c] += sample[c] as f64;
                }
            }

            // Empty clusters are re-seeded on the sample that is currently
            // worst served by its centre.
            let mut spread: Vec<f32> = assignments.iter().map(|&(_, d)| d).collect();
            let mut shift = 0f32;
            for cluster in 0..k {
                let updated = if counts[cluster] > 0 {
                    let n = counts[cluster] as f64;
                    [
                        (sums[cluster][0] / n) as f32,
                        (sums[cluster][1] / n) as f32,
                        (sums[cluster][2] / n) as f32,
                    ]
                } else {
                    let (far, _) = spread
                        .iter()
                        .enumerate()
                        .fold((0, f32::NEG_INFINITY), |acc, (i, &d)| if d > acc.1 { (i, d) } else { acc });
                    spread[far] = 0.0;
                    samples[far]
                };
                shift = shift.max(distance_squared(&updated, &centers[cluster]).sqrt());
                centers[cluster] = updated;
            }

            if shift < self.config.epsilon {
                break;
            }
        }

        let distances: Vec<f32> = samples
            .par_iter()
            .map(|s| nearest_center(s, &centers).1)
            .collect();
        let compactness = distances.iter().map(|&d| d as f64).sum();

        Clustering {
            centers,
            compactness,
            iterations,
        }
    }
}

/// Count distinct colours, stopping early once `enough` is reached
fn distinct_colors(colors: impl Iterator<Item = [u8; 3]>, enough: usize) -> usize {
    let mut seen = HashSet::new();
    for color in colors {
        seen.insert(color);
        if seen.len() >= enough {
            break;
        }
    }
    seen.len()
}

/// k-means++ seeding: each further centre is drawn with probability
/// proportional to its squared distance from the closest chosen centre.
fn seed_centers(samples: &[[f32; 3]], k: usize, rng: &mut StdRng) -> Vec<[f32; 3]> {
    let mut centers = Vec::with_capacity(k);
    centers.push(samples[rng.gen_range(0..samples.len())]);
    let mut nearest: Vec<f32> = samples
        .par_iter()
        .map(|s| distance_squared(s, &centers[0]))
        .collect();

    while centers.len() < k {
        let total: f64 = nearest.iter().map(|&d| d as f64).sum();
        let next = if total > 0.0 {
            let mut target = rng.gen_range(0.0..total);
            let mut chosen = None;
            for (i, &d) in nearest.iter().enumerate() {
                target -= d as f64;
                if target < 0.0 {
                    chosen = Some(i);
                    break;
                }
            }
            // Rounding can walk off the end; fall back to the farthest sample.
            let index = chosen.unwrap_or_else(|| {
                nearest
                    .iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |acc, (i, &d)| if d > acc.1 { (i, d) } else { acc })
                    .0
            });
            samples[index]
        } else {
            samples[rng.gen_range(0..samples.len())]
        };

        centers.push(next);
        nearest
            .par_iter_mut()
            .zip(samples.par_iter())
            .for_each(|(n, s)| *n = n.min(distance_squared(s, &next)));
    }

    centers
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const QUADRANT_COLORS: [[u8; 3]; 4] = [[200, 30, 30], [30, 160, 40], [20, 40, 180], [230, 210, 20]];

    /// Image split into `n` vertical bands of distinct solid colours
    fn banded_image(n: usize) -> RgbImage {
        RgbImage::from_fn(80, 60, |x, _| {
            let band = (x as usize * n) / 80;
            Rgb(QUADRANT_COLORS[band])
        })
    }

    fn quantizer(colors: usize, color_space: ColorSpace) -> ColorQuantizer {
        ColorQuantizer::new(QuantizationConfig {
            colors,
            attempts: 3,
            color_space,
            ..QuantizationConfig::default()
        })
    }

    fn close(a: [u8; 3], b: [u8; 3], tolerance: i32) -> bool {
        a.iter().zip(b.iter()).all(|(&x, &y)| (x as i32 - y as i32).abs() <= tolerance)
    }

    #[test]
    fn test_recovers_solid_regions() {
        for space in [ColorSpace::Rgb, ColorSpace::Lab, ColorSpace::Oklab] {
            for k in 1..=4 {
                let image = banded_image(k);
                let separation = quantizer(k, space).separate(&image).expect("separation");

                let used: HashSet<i32> = separation.label_map.labels().iter().copied().collect();
                assert_eq!(used.len(), k, "{space}: expected {k} labels, got {used:?}");

                for expected in &QUADRANT_COLORS[..k] {
                    assert!(
                        separation
                            .palette
                            .entries()
                            .iter()
                            .any(|e| close(e.rgb, *expected, 3)),
                        "{space}: {expected:?} missing from {:?}",
                        separation.palette
                    );
                }
            }
        }
    }

    #[test]
    fn test_labels_within_range_and_background_marked() {
        let image = RgbImage::from_fn(40, 40, |x, y| {
            if x < 10 {
                Rgb([255, 255, 255])
            } else if y < 20 {
                Rgb([10, 10, 10])
            } else {
                Rgb([180, 20, 20])
            }
        });
        let separation = quantizer(2, ColorSpace::Lab).separate(&image).unwrap();
        let labels = separation.label_map.labels();
        assert!(labels.iter().all(|&l| (-1..2).contains(&l)));
        assert_eq!(separation.label_map.background_count(), 10 * 40);
        assert_eq!(separation.label_map.get(0, 0), BACKGROUND_LABEL);

        let background = separation.background_mask.expect("background mask");
        assert_eq!(background.get_pixel(0, 0)[0], 255);
        assert_eq!(background.get_pixel(20, 0)[0], 0);
    }

    #[test]
    fn test_palette_darkest_first() {
        let separation = quantizer(4, ColorSpace::Rgb).separate(&banded_image(4)).unwrap();
        let luminances: Vec<f32> = separation.palette.entries().iter().map(|e| e.luminance).collect();
        assert!(luminances.windows(2).all(|w| w[0] <= w[1]));

        // The darkest ink owns label 0 wherever it is printed.
        let darkest = separation.palette.get(0).unwrap().rgb;
        assert!(close(darkest, [20, 40, 180], 3));
        assert_eq!(separation.label_map.get(45, 10), 0);
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let image = RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 90]));
        let a = quantizer(3, ColorSpace::Lab).separate(&image).unwrap();
        let b = quantizer(3, ColorSpace::Lab).separate(&image).unwrap();
        assert_eq!(a.palette, b.palette);
        assert_eq!(a.label_map, b.label_map);
    }

    #[test]
    fn test_too_few_distinct_colors_fails() {
        let image = RgbImage::from_pixel(20, 20, Rgb([50, 60, 70]));
        let err = quantizer(3, ColorSpace::Rgb).separate(&image).unwrap_err();
        match err {
            FilmError::ClusteringFailure { k, pixel_count, .. } => {
                assert_eq!(k, 3);
                assert_eq!(pixel_count, 400);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_mostly_white_image_falls_back_to_all_pixels() {
        // Two ink pixels are far below 10 samples per cluster.
        let mut image = RgbImage::from_pixel(30, 30, Rgb([255, 255, 255]));
        image.put_pixel(3, 3, Rgb([0, 0, 0]));
        image.put_pixel(4, 3, Rgb([0, 0, 0]));
        let separation = quantizer(2, ColorSpace::Rgb).separate(&image).unwrap();
        assert_eq!(separation.clustered_pixels, 900);
        assert_eq!(separation.label_map.get(3, 3), 0);
        assert_eq!(separation.label_map.get(0, 0), BACKGROUND_LABEL);
    }

    #[test]
    fn test_color_space_round_trip() {
        for space in [ColorSpace::Rgb, ColorSpace::Lab, ColorSpace::Oklab] {
            for rgb in [[0, 0, 0], [255, 255, 255], [16, 32, 48], [230, 210, 20]] {
                let back = space.to_rgb(space.to_working(rgb));
                assert!(close(back, rgb, 1), "{space}: {rgb:?} -> {back:?}");
            }
        }
    }
}
