pub mod contours;
pub mod distance;
pub mod halftone;
pub mod masks;
pub mod morphology;
pub mod quantization;
pub mod stroke;

pub use contours::{outer_contours, simplified_contours, Contour};
pub use distance::{dilate_disk, erode_disk, DistanceField};
pub use halftone::{dither, HalftoneRasterizer};
pub use masks::{MaskBuilder, MaskSet};
pub use morphology::{remove_small_components, smooth, MorphologicalCleaner};
pub use quantization::{ColorQuantizer, Separation};
pub use stroke::{mm_to_px, px_to_mm, StrokeWidthAnalyzer};
