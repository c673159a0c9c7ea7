//! # Colour Film Separation Library
//!
//! Turns a raster image into a small set of registered, print-ready binary
//! films for screen printing: one mask per ink, repaired for printability,
//! checked against a minimum stroke width, optionally screened into
//! halftone dots, and serialized as a self-contained vector document.
//!
//! ## Stages
//!
//! - **Quantization**: k-means over RGB, CIELAB or OKLab, darkest ink first
//! - **Masks**: one binary mask per ink, checked to partition the image
//! - **Cleanup**: opening, closing, small component removal, smoothing
//! - **Stroke analysis**: distance-field width measurement and thickening
//! - **Halftone**: grid dots (round, square, ellipse) or Floyd-Steinberg
//! - **Export**: minimal PDF writer, SVG and PNG behind one encoder trait
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use films::{Exporter, FilmConfig, FilmPipeline, SourceImage};
//!
//! let mut config = FilmConfig::default();
//! config.quantization.colors = 3;
//!
//! let pipeline = FilmPipeline::from_config(config)?;
//! let source = SourceImage::new(image::open("design.png")?.to_rgb8(), 300.0);
//! let set = pipeline.process(&source)?;
//!
//! let batch = Exporter::default().encode(&set.films);
//! for artifact in &batch.artifacts {
//!     std::fs::write(&artifact.file_name, &artifact.bytes)?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Memory: clustering and distance fields each hold a full-resolution
//! floating point copy of the image, so peak usage grows with
//! width x height x channels.

pub mod algorithms;
pub mod config;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod traits;
pub mod types;

pub use algorithms::{
    ColorQuantizer, DistanceField, HalftoneRasterizer, MaskBuilder, MaskSet,
    MorphologicalCleaner, Separation, StrokeWidthAnalyzer,
};
pub use config::{
    CleanupConfig, ColorSpace, DotShape, FilmConfig, HalftoneConfig, HalftoneMode,
    QuantizationConfig, StrokeConfig, TrapConfig, VectorConfig, MAX_COLORS,
};
pub use error::{FilmError, Result};
pub use io::{
    ExportBatch, ExportFailure, ExportFormat, Exporter, FilmImageOptions, PdfEncoder,
    PngEncoder, SvgEncoder, VectorSerializer,
};
pub use pipeline::{
    builder::FilmPipelineBuilder, ColorInfo, FilmPipeline, FilmReport, FilmSet,
};
pub use traits::{FilmEncoder, FilmStage, StageContext};
pub use types::{
    ColorPalette, CoverageStats, Film, FilmWarning, LabelMap, PaletteEntry, SourceImage,
    StrokeReport, StrokeStats,
};
