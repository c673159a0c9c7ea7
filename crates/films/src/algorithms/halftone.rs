//! Continuous tone to binary patterns.
//!
//! Output images follow the mask convention: [`INK`] where a dot or a
//! dithered pixel prints, [`NO_INK`] on bare film.

use image::GrayImage;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::{
    config::{DotShape, HalftoneConfig, HalftoneMode},
    error::{FilmError, Result},
    types::{INK, NO_INK},
};

const ELLIPSE_RATIO: f32 = 0.7;
const DITHER_THRESHOLD: f32 = 127.0;

/// Dot of one screen cell, in pixels.
#[derive(Debug, Clone, Copy)]
struct Dot {
    cx: i64,
    cy: i64,
    /// Radius for round dots, major semi-axis for ellipses, side for squares
    size: u32,
}

#[derive(Debug, Clone)]
pub struct HalftoneRasterizer {
    pub config: HalftoneConfig,
    pub dpi: f32,
}

impl HalftoneRasterizer {
    pub fn new(config: HalftoneConfig, dpi: f32) -> Self {
        Self { config, dpi }
    }

    /// Side of a screen cell: `dpi / lpi`, at least one pixel.
    pub fn cell_size(&self) -> u32 {
        if self.config.lpi == 0 {
            return 1;
        }
        ((self.dpi / self.config.lpi as f32).floor() as u32).max(1)
    }

    /// Pattern for a grayscale tone image in the configured mode.
    pub fn rasterize(&self, gray: &GrayImage) -> GrayImage {
        match self.config.mode {
            HalftoneMode::Grid => self.generate(gray),
            HalftoneMode::Dither => dither(gray),
        }
    }

    /// Grid screening: one dot per cell, darker cells get larger dots.
    pub fn generate(&self, gray: &GrayImage) -> GrayImage {
        let (width, height) = gray.dimensions();
        let cell = self.cell_size();
        let cols = width.div_ceil(cell);
        let rows = height.div_ceil(cell);
        let shape = self.config.dot_shape;

        debug!(
            "Halftone grid: {}x{} cells of {}px ({} dots)",
            cols, rows, cell, shape
        );

        let dots: Vec<Dot> = (0..rows * cols)
            .into_par_iter()
            .map(|i| {
                let (col, row) = (i % cols, i / cols);
                let (x0, y0) = (col * cell, row * cell);
                let x1 = (x0 + cell).min(width);
                let y1 = (y0 + cell).min(height);

                let mut sum = 0u64;
                for y in y0..y1 {
                    for x in x0..x1 {
                        sum += gray.get_pixel(x, y)[0] as u64;
                    }
                }
                let count = ((x1 - x0) * (y1 - y0)) as f32;
                let darkness = 1.0 - (sum as f32 / count) / 255.0;

                let size = match shape {
                    DotShape::Square => (darkness * cell as f32).floor(),
                    DotShape::Round | DotShape::Ellipse => (darkness * cell as f32 / 2.0).floor(),
                };
                Dot {
                    cx: (x0 + cell / 2) as i64,
                    cy: (y0 + cell / 2) as i64,
                    size: size.max(0.0) as u32,
                }
            })
            .collect();

        let (sin, cos) = self.config.angle.to_radians().sin_cos();
        if width == 0 || height == 0 {
            return GrayImage::new(width, height);
        }
        let mut out = vec![NO_INK; width as usize * height as usize];

        out.par_chunks_mut(width as usize)
            .enumerate()
            .for_each(|(y, row_out)| {
                let y = y as i64;
                let cell_row = y / cell as i64;
                for (x, px) in row_out.iter_mut().enumerate() {
                    let x = x as i64;
                    let cell_col = x / cell as i64;
                    let covered = (cell_row - 1..=cell_row + 1).any(|r| {
                        (cell_col - 1..=cell_col + 1).any(|c| {
                            if r < 0 || c < 0 || r >= rows as i64 || c >= cols as i64 {
                                return false;
                            }
                            let dot = dots[(r * cols as i64 + c) as usize];
                            covers(dot, shape, x - dot.cx, y - dot.cy, sin, cos)
                        })
                    });
                    if covered {
                        *px = INK;
                    }
                }
            });

        GrayImage::from_raw(width, height, out).unwrap_or_else(|| GrayImage::new(width, height))
    }

    /// Screen a film: the tone inside the mask is halftoned, paper white
    /// elsewhere, and the pattern never leaves the mask.
    pub fn apply(&self, mask: &GrayImage, tone: &GrayImage) -> Result<GrayImage> {
        if mask.dimensions() != tone.dimensions() {
            return Err(FilmError::DimensionMismatch {
                expected: mask.dimensions(),
                actual: tone.dimensions(),
            });
        }

        let masked_tone = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
            if mask.get_pixel(x, y)[0] == INK {
                *tone.get_pixel(x, y)
            } else {
                image::Luma([255])
            }
        });

        let mut pattern = self.rasterize(&masked_tone);
        for (p, m) in pattern.pixels_mut().zip(mask.pixels()) {
            if m[0] != INK {
                p[0] = NO_INK;
            }
        }

        info!(
            "Halftoned film ({} mode, {} lpi)",
            self.config.mode, self.config.lpi
        );
        Ok(pattern)
    }
}

fn covers(dot: Dot, shape: DotShape, dx: i64, dy: i64, sin: f32, cos: f32) -> bool {
    if dot.size == 0 {
        return false;
    }
    match shape {
        DotShape::Round => {
            let r = dot.size as i64;
            dx * dx + dy * dy <= r * r
        }
        DotShape::Square => {
            let half = (dot.size / 2) as i64;
            dx.abs() <= half && dy.abs() <= half
        }
        DotShape::Ellipse => {
            let a = dot.size as f32;
            let b = a * ELLIPSE_RATIO;
            let (dx, dy) = (dx as f32, dy as f32);
            let u = dx * cos + dy * sin;
            let v = -dx * sin + dy * cos;
            (u / a).powi(2) + (v / b).powi(2) <= 1.0
        }
    }
}

/// Floyd-Steinberg error diffusion.
///
/// Pixels at or below the midpoint become ink. Runs in strict raster
/// order over a flat buffer: every pixel depends on the error pushed by
/// the ones before it.
pub fn dither(gray: &GrayImage) -> GrayImage {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let mut tone: Vec<f32> = gray.as_raw().iter().map(|&v| v as f32).collect();
    let mut out = vec![NO_INK; w * h];

    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let old = tone[i];
            let new = if old > DITHER_THRESHOLD { 255.0 } else { 0.0 };
            if new == 0.0 {
                out[i] = INK;
            }
            let error = old - new;

            if x + 1 < w {
                tone[i + 1] += error * 7.0 / 16.0;
            }
            if y + 1 < h {
                let below = i + w;
                if x > 0 {
                    tone[below - 1] += error * 3.0 / 16.0;
                }
                tone[below] += error * 5.0 / 16.0;
                if x + 1 < w {
                    tone[below + 1] += error * 1.0 / 16.0;
                }
            }
        }
    }

    GrayImage::from_raw(width, height, out).unwrap_or_else(|| GrayImage::new(width, height))
}
