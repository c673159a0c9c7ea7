use geo::{EuclideanLength, Simplify};
use geo_types::{Coord, LineString};
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};

/// Closed polygon around one ink region, without the repeated first point.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub points: Vec<[i32; 2]>,
}

impl Contour {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn ring(&self) -> LineString<f64> {
        let mut coords: Vec<Coord<f64>> = self
            .points
            .iter()
            .map(|&[x, y]| Coord {
                x: x as f64,
                y: y as f64,
            })
            .collect();
        if let Some(&first) = coords.first() {
            coords.push(first);
        }
        LineString::new(coords)
    }

    /// Length of the closed boundary
    pub fn perimeter(&self) -> f64 {
        self.ring().euclidean_length()
    }

    /// Douglas-Peucker simplification with a tolerance of
    /// `factor * perimeter`. Returns `None` when fewer than three vertices
    /// survive.
    pub fn simplify(&self, factor: f64) -> Option<Contour> {
        let ring = self.ring();
        let epsilon = factor * ring.euclidean_length();
        let simplified = ring.simplify(&epsilon);

        let mut points: Vec<[i32; 2]> = simplified
            .coords()
            .map(|c| [c.x.round() as i32, c.y.round() as i32])
            .collect();
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }

        (points.len() >= 3).then_some(Contour { points })
    }
}

/// Outer boundaries of the top-level ink regions. Holes and anything
/// nested inside them are not reported.
pub fn outer_contours(mask: &GrayImage) -> Vec<Contour> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|c| Contour {
            points: c.points.iter().map(|p| [p.x, p.y]).collect(),
        })
        .collect()
}

/// Outer contours simplified for vector output.
pub fn simplified_contours(mask: &GrayImage, approximation_factor: f64) -> Vec<Contour> {
    outer_contours(mask)
        .iter()
        .filter_map(|c| c.simplify(approximation_factor))
        .collect()
}
