use image::GrayImage;
use tracing::{debug, info};

use crate::{
    error::{FilmError, Result},
    types::{CoverageStats, LabelMap, BACKGROUND_LABEL, INK, NO_INK},
};

/// Masks of a label map, one per palette entry, with their coverage.
#[derive(Debug, Clone)]
pub struct MaskSet {
    pub masks: Vec<GrayImage>,
    /// Coverage relative to the non-background pixel count
    pub stats: Vec<CoverageStats>,
}

/// Splits a label map into per-ink binary masks.
#[derive(Debug, Clone, Default)]
pub struct MaskBuilder;

impl MaskBuilder {
    /// Build `k` masks and verify that they partition the non-background
    /// pixels: every foreground label must be in `0..k` and the ink counts
    /// must add up to the foreground count.
    pub fn build_masks(&self, label_map: &LabelMap, k: usize) -> Result<MaskSet> {
        let width = label_map.width();
        let height = label_map.height();
        let mut buffers = vec![vec![NO_INK; width as usize * height as usize]; k];
        let mut counts = vec![0u64; k];
        let mut foreground = 0u64;

        for (i, &label) in label_map.labels().iter().enumerate() {
            if label == BACKGROUND_LABEL {
                continue;
            }
            if label < 0 || label as usize >= k {
                return Err(FilmError::LabelMapCorruption(format!(
                    "label {label} at pixel {i} is outside -1..{k}"
                )));
            }
            buffers[label as usize][i] = INK;
            counts[label as usize] += 1;
            foreground += 1;
        }

        let assigned: u64 = counts.iter().sum();
        if assigned != foreground || foreground as usize != label_map.foreground_count() {
            return Err(FilmError::LabelMapCorruption(format!(
                "{assigned} ink pixels for {foreground} foreground pixels"
            )));
        }

        let masks = buffers
            .into_iter()
            .map(|buffer| {
                GrayImage::from_raw(width, height, buffer).ok_or(FilmError::DimensionMismatch {
                    expected: (width, height),
                    actual: (width, height),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let stats: Vec<CoverageStats> = counts
            .iter()
            .enumerate()
            .map(|(i, &filled)| CoverageStats::from_counts(i, filled, foreground))
            .collect();

        for s in &stats {
            debug!(
                "Mask {}/{}: {} pixels ({:.1}%)",
                s.index + 1,
                k,
                s.filled_pixels,
                s.coverage_percent
            );
        }
        info!("Built {} masks over {} foreground pixels", k, foreground);

        Ok(MaskSet { masks, stats })
    }
}
