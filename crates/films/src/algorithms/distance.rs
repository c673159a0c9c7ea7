//! Euclidean distance fields over binary masks.
//!
//! Disk-shaped dilation and erosion are expressed as thresholds on a
//! squared distance transform, which keeps the structuring element round
//! for any radius.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::distance_transform::euclidean_squared_distance_transform;

use crate::types::{INK, NO_INK};

/// Per-pixel distance of every ink pixel to the nearest non-ink pixel.
///
/// Everything outside the mask counts as paper, so strokes touching the
/// image edge are bounded. Non-ink pixels hold 0.
#[derive(Debug, Clone)]
pub struct DistanceField {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl DistanceField {
    pub fn compute(mask: &GrayImage) -> Self {
        let (width, height) = mask.dimensions();

        // One pixel of paper around the mask
        let padded = GrayImage::from_fn(width + 2, height + 2, |x, y| {
            let inside = x >= 1 && y >= 1 && x <= width && y <= height;
            if inside && mask.get_pixel(x - 1, y - 1)[0] == INK {
                Luma([NO_INK])
            } else {
                Luma([INK])
            }
        });
        let squared = euclidean_squared_distance_transform(&padded);

        let mut values = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                values.push(squared.get_pixel(x + 1, y + 1)[0].sqrt() as f32);
            }
        }

        Self {
            width,
            height,
            values,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.values[y as usize * self.width as usize + x as usize]
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Distances of the medial-axis pixels: ink pixels that are not
    /// exceeded by any of their 8 neighbours.
    ///
    /// Twice these values is the local stroke width.
    pub fn ridge_values(&self) -> Vec<f32> {
        let (w, h) = (self.width as i64, self.height as i64);
        let mut ridge = Vec::new();
        for y in 0..h {
            for x in 0..w {
                let d = self.values[(y * w + x) as usize];
                if d <= 0.0 {
                    continue;
                }
                let is_peak = (-1..=1).all(|dy| {
                    (-1..=1).all(|dx| {
                        let (nx, ny) = (x + dx, y + dy);
                        nx < 0
                            || ny < 0
                            || nx >= w
                            || ny >= h
                            || self.values[(ny * w + nx) as usize] <= d
                    })
                });
                if is_peak {
                    ridge.push(d);
                }
            }
        }
        ridge
    }
}

fn squared_distance_to(mask: &GrayImage, target: u8) -> Option<ImageBuffer<Luma<f64>, Vec<f64>>> {
    if !mask.as_raw().contains(&target) {
        return None;
    }
    let seeds = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([if mask.get_pixel(x, y)[0] == target { INK } else { NO_INK }])
    });
    Some(euclidean_squared_distance_transform(&seeds))
}

/// Dilate with a disk of the given radius.
pub fn dilate_disk(mask: &GrayImage, radius: f64) -> GrayImage {
    let Some(distance) = squared_distance_to(mask, INK) else {
        return mask.clone();
    };
    let limit = radius * radius;
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([if distance.get_pixel(x, y)[0] <= limit { INK } else { NO_INK }])
    })
}

/// Erode with a disk of the given radius. Pixels outside the image do not
/// erode the mask.
pub fn erode_disk(mask: &GrayImage, radius: f64) -> GrayImage {
    let Some(distance) = squared_distance_to(mask, NO_INK) else {
        return mask.clone();
    };
    let limit = radius * radius;
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([if distance.get_pixel(x, y)[0] > limit { INK } else { NO_INK }])
    })
}
