use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::types::{Film, INK};

const PAPER: u8 = 255;
const OPAQUE: u8 = 0;

/// How a film is rendered for output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilmImageOptions {
    /// White ink on black instead of black on white
    pub invert: bool,
    /// White margin added on every side
    pub border_px: u32,
}

/// Film positive: opaque black wherever the mask prints.
pub fn film_image(mask: &GrayImage, options: FilmImageOptions) -> GrayImage {
    let (ink, paper) = if options.invert {
        (PAPER, OPAQUE)
    } else {
        (OPAQUE, PAPER)
    };
    let b = options.border_px;
    let (width, height) = mask.dimensions();

    GrayImage::from_fn(width + 2 * b, height + 2 * b, |x, y| {
        let inside = x >= b && y >= b && x < width + b && y < height + b;
        if !inside {
            return Luma([PAPER]);
        }
        if mask.get_pixel(x - b, y - b)[0] == INK {
            Luma([ink])
        } else {
            Luma([paper])
        }
    })
}

/// All films painted in their ink colours, later films on top.
pub fn composite_preview(films: &[Film], width: u32, height: u32, paper: [u8; 3]) -> RgbImage {
    let mut preview = RgbImage::from_pixel(width, height, Rgb(paper));
    for film in films {
        if film.mask.dimensions() != (width, height) {
            continue;
        }
        for (x, y, p) in film.mask.enumerate_pixels() {
            if p[0] == INK {
                preview.put_pixel(x, y, Rgb(film.color));
            }
        }
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CoverageStats, PaletteEntry};

    fn dot_mask() -> GrayImage {
        let mut mask = GrayImage::new(4, 4);
        mask.put_pixel(1, 1, Luma([INK]));
        mask
    }

    #[test]
    fn test_film_image_polarity_and_border() {
        let positive = film_image(&dot_mask(), FilmImageOptions::default());
        assert_eq!(positive.get_pixel(1, 1)[0], OPAQUE);
        assert_eq!(positive.get_pixel(0, 0)[0], PAPER);

        let inverted = film_image(
            &dot_mask(),
            FilmImageOptions {
                invert: true,
                border_px: 2,
            },
        );
        assert_eq!(inverted.dimensions(), (8, 8));
        assert_eq!(inverted.get_pixel(0, 0)[0], PAPER);
        assert_eq!(inverted.get_pixel(3, 3)[0], PAPER);
        assert_eq!(inverted.get_pixel(2, 2)[0], OPAQUE);
    }

    #[test]
    fn test_composite_uses_ink_colours() {
        let entry = PaletteEntry {
            name: "color_01".into(),
            rgb: [200, 10, 10],
            luminance: 0.0,
        };
        let film = Film::new(0, &entry, dot_mask(), CoverageStats::from_counts(0, 1, 1));
        let preview = composite_preview(&[film], 4, 4, [255, 255, 255]);
        assert_eq!(preview.get_pixel(1, 1), &Rgb([200, 10, 10]));
        assert_eq!(preview.get_pixel(2, 2), &Rgb([255, 255, 255]));
    }
}
