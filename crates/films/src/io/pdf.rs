//! Minimal single-page PDF writer.
//!
//! Produces five objects (catalog, page tree, page, content stream, font)
//! with a byte-exact cross-reference table. One page unit is one mask
//! pixel; the Y axis is flipped once with a page-level `cm` so path
//! coordinates stay in image space.

use std::fmt::Write as _;
use std::io::Write as _;

use flate2::{write::ZlibEncoder, Compression};
use image::GrayImage;
use tracing::debug;

use crate::{
    algorithms::contours::{simplified_contours, Contour},
    error::{FilmError, Result},
    io::ExportFormat,
    traits::FilmEncoder,
    types::Film,
};

const OBJECT_COUNT: usize = 5;
const HEADER: &[u8] = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n";

/// Turns a mask into a flat-colour vector document.
#[derive(Debug, Clone)]
pub struct VectorSerializer {
    pub approximation_factor: f64,
    pub color: [u8; 3],
}

impl Default for VectorSerializer {
    fn default() -> Self {
        Self {
            approximation_factor: 0.002,
            color: [0, 0, 0],
        }
    }
}

impl VectorSerializer {
    pub fn new(approximation_factor: f64, color: [u8; 3]) -> Self {
        Self {
            approximation_factor,
            color,
        }
    }

    pub fn to_vector_document(&self, mask: &GrayImage, width: u32, height: u32) -> Result<Vec<u8>> {
        if mask.dimensions() != (width, height) {
            return Err(FilmError::DimensionMismatch {
                expected: (width, height),
                actual: mask.dimensions(),
            });
        }

        let contours = simplified_contours(mask, self.approximation_factor);
        let content = content_stream(&contours, height, self.color);
        debug!(
            "Vector document: {} paths, {} content bytes",
            contours.len(),
            content.len()
        );

        let document = assemble(width, height, content.as_bytes())?;
        verify(&document)?;
        Ok(document)
    }
}

/// Path operators for the given contours; empty when there is nothing to
/// fill.
pub fn content_stream(contours: &[Contour], height: u32, [r, g, b]: [u8; 3]) -> String {
    if contours.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    let _ = writeln!(out, "q 1 0 0 -1 0 {height} cm");
    let _ = writeln!(
        out,
        "{:.3} {:.3} {:.3} rg",
        r as f32 / 255.0,
        g as f32 / 255.0,
        b as f32 / 255.0
    );
    for contour in contours {
        for (i, [x, y]) in contour.points.iter().enumerate() {
            let op = if i == 0 { "m" } else { "l" };
            let _ = writeln!(out, "{x} {y} {op}");
        }
        out.push_str("h f\n");
    }
    out.push_str("Q\n");
    out
}

fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Lay out the document and its cross-reference table.
pub fn assemble(width: u32, height: u32, content: &[u8]) -> Result<Vec<u8>> {
    let stream = compress(content)?;

    let mut doc: Vec<u8> = HEADER.to_vec();
    let mut offsets = Vec::with_capacity(OBJECT_COUNT);

    let mut object = |doc: &mut Vec<u8>, number: usize, body: &[u8]| {
        offsets.push(doc.len());
        doc.extend_from_slice(format!("{number} 0 obj\n").as_bytes());
        doc.extend_from_slice(body);
        doc.extend_from_slice(b"\nendobj\n");
    };

    object(&mut doc, 1, b"<< /Type /Catalog /Pages 2 0 R >>");
    object(&mut doc, 2, b"<< /Type /Pages /Kids [3 0 R] /Count 1 >>");
    object(
        &mut doc,
        3,
        format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {width} {height}] \
             /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>"
        )
        .as_bytes(),
    );

    let mut content_object = format!("<< /Length {} /Filter /FlateDecode >>\nstream\n", stream.len())
        .into_bytes();
    content_object.extend_from_slice(&stream);
    content_object.extend_from_slice(b"\nendstream");
    object(&mut doc, 4, &content_object);

    object(
        &mut doc,
        5,
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>",
    );

    let xref_offset = doc.len();
    let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", OBJECT_COUNT + 1);
    for offset in &offsets {
        let _ = write!(xref, "{offset:010} 00000 n \n");
    }
    let _ = write!(
        xref,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        OBJECT_COUNT + 1
    );
    doc.extend_from_slice(xref.as_bytes());

    Ok(doc)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

fn parse_number(bytes: &[u8], at: usize) -> Option<usize> {
    let digits: Vec<u8> = bytes[at..]
        .iter()
        .copied()
        .take_while(u8::is_ascii_digit)
        .collect();
    std::str::from_utf8(&digits).ok()?.parse().ok()
}

fn corrupt(message: impl Into<String>) -> FilmError {
    FilmError::Serialization(message.into())
}

/// Check that every xref offset lands on its object header and that the
/// declared stream length matches the stored payload.
pub fn verify(doc: &[u8]) -> Result<()> {
    let startxref = rfind(doc, b"startxref\n").ok_or_else(|| corrupt("missing startxref"))?;
    let xref_offset = parse_number(doc, startxref + b"startxref\n".len())
        .ok_or_else(|| corrupt("unreadable startxref offset"))?;
    if !doc.get(xref_offset..).is_some_and(|rest| rest.starts_with(b"xref\n")) {
        return Err(corrupt(format!("startxref {xref_offset} does not point at xref")));
    }

    let header = format!("xref\n0 {}\n", OBJECT_COUNT + 1);
    // Free entry first, then one 20-byte entry per object
    let entries = xref_offset + header.len() + 20;
    for number in 1..=OBJECT_COUNT {
        let entry = entries + (number - 1) * 20;
        let offset = doc
            .get(entry..entry + 10)
            .and_then(|_| parse_number(doc, entry))
            .ok_or_else(|| corrupt(format!("xref entry {number} missing")))?;
        let expected = format!("{number} 0 obj\n");
        if !doc
            .get(offset..)
            .is_some_and(|rest| rest.starts_with(expected.as_bytes()))
        {
            return Err(corrupt(format!(
                "xref offset {offset} does not start object {number}"
            )));
        }
    }

    let stream_object = find(doc, b"4 0 obj\n", 0).ok_or_else(|| corrupt("missing content object"))?;
    let length_at = find(doc, b"/Length ", stream_object).ok_or_else(|| corrupt("missing /Length"))?;
    let declared = parse_number(doc, length_at + b"/Length ".len())
        .ok_or_else(|| corrupt("unreadable /Length"))?;
    let start = find(doc, b"stream\n", length_at).ok_or_else(|| corrupt("missing stream"))?
        + b"stream\n".len();
    let end = find(doc, b"\nendstream", start).ok_or_else(|| corrupt("missing endstream"))?;

    // The compressed payload may itself contain "\nendstream"; trust the
    // declared length only if the bytes after it close the stream.
    let actual = if doc.get(start + declared..).is_some_and(|rest| rest.starts_with(b"\nendstream")) {
        declared
    } else {
        end - start
    };
    if actual != declared {
        return Err(corrupt(format!(
            "declared stream length {declared} but payload is {actual} bytes"
        )));
    }

    Ok(())
}

/// Mandatory baseline encoder.
#[derive(Debug, Clone)]
pub struct PdfEncoder {
    pub approximation_factor: f64,
}

impl Default for PdfEncoder {
    fn default() -> Self {
        Self {
            approximation_factor: 0.002,
        }
    }
}

impl FilmEncoder for PdfEncoder {
    fn format(&self) -> ExportFormat {
        ExportFormat::Pdf
    }

    fn encode(&self, film: &Film) -> Result<Vec<u8>> {
        VectorSerializer::new(self.approximation_factor, film.color).to_vector_document(
            &film.mask,
            film.width(),
            film.height(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::INK;
    use flate2::read::ZlibDecoder;
    use image::Luma;
    use std::io::Read;

    fn decoded_content(doc: &[u8]) -> String {
        let length_at = find(doc, b"/Length ", 0).unwrap();
        let declared = parse_number(doc, length_at + 8).unwrap();
        let start = find(doc, b"stream\n", length_at).unwrap() + 7;
        let mut decoder = ZlibDecoder::new(&doc[start..start + declared]);
        let mut text = String::new();
        decoder.read_to_string(&mut text).unwrap();
        text
    }

    fn contains(doc: &[u8], needle: &str) -> bool {
        find(doc, needle.as_bytes(), 0).is_some()
    }

    #[test]
    fn test_empty_mask_gives_valid_document() {
        let mask = GrayImage::new(64, 48);
        let doc = VectorSerializer::default().to_vector_document(&mask, 64, 48).unwrap();

        assert!(doc.starts_with(b"%PDF-1.4"));
        assert!(doc.ends_with(b"%%EOF\n"));
        assert!(contains(&doc, "/MediaBox [0 0 64 48]"));
        assert!(verify(&doc).is_ok());
        assert_eq!(decoded_content(&doc), "");
    }

    #[test]
    fn test_square_traces_corners() {
        let mask = GrayImage::from_fn(50, 40, |x, y| {
            Luma([if (10..30).contains(&x) && (5..25).contains(&y) { INK } else { 0 }])
        });
        let doc = VectorSerializer::new(0.002, [255, 0, 0])
            .to_vector_document(&mask, 50, 40)
            .unwrap();
        let content = decoded_content(&doc);

        assert!(content.starts_with("q 1 0 0 -1 0 40 cm\n1.000 0.000 0.000 rg\n"));
        for corner in ["10 5", "29 5", "29 24", "10 24"] {
            assert!(content.contains(corner), "missing corner {corner} in {content}");
        }
        assert_eq!(content.matches(" m\n").count(), 1);
        assert_eq!(content.matches(" l\n").count(), 3);
        assert!(content.ends_with("h f\nQ\n"));
    }

    #[test]
    fn test_xref_offsets_point_at_objects() {
        let doc = assemble(10, 10, b"0 0 m 1 1 l h f").unwrap();
        let xref = find(&doc, b"xref\n", 0).unwrap();
        let entries = xref + "xref\n0 6\n".len() + 20;
        for number in 1..=5 {
            let at = entries + (number - 1) * 20;
            let offset = parse_number(&doc, at).unwrap();
            let expected = format!("{number} 0 obj");
            assert!(doc[offset..].starts_with(expected.as_bytes()));
            assert_eq!(&doc[at + 10..at + 20], b" 00000 n \n");
        }
    }

    #[test]
    fn test_verify_rejects_bad_length() {
        let doc = assemble(10, 10, b"0 0 m 5 0 l 5 5 l h f").unwrap();
        let length_at = find(&doc, b"/Length ", 0).unwrap() + 8;
        let declared = parse_number(&doc, length_at).unwrap();

        // Change the last digit so every offset stays put
        let mut tampered = doc.clone();
        let last = length_at + declared.to_string().len() - 1;
        tampered[last] = if tampered[last] == b'9' { b'8' } else { tampered[last] + 1 };

        assert!(verify(&doc).is_ok());
        assert!(matches!(verify(&tampered), Err(FilmError::Serialization(_))));
    }

    #[test]
    fn test_verify_rejects_shifted_offsets() {
        let mut doc = HEADER.to_vec();
        doc.extend_from_slice(b"% padding\n");
        let body = assemble(10, 10, b"").unwrap();
        doc.extend_from_slice(&body[HEADER.len()..]);
        assert!(matches!(verify(&doc), Err(FilmError::Serialization(_))));
    }

    #[test]
    fn test_dimension_mismatch() {
        let mask = GrayImage::new(10, 10);
        assert!(matches!(
            VectorSerializer::default().to_vector_document(&mask, 20, 10),
            Err(FilmError::DimensionMismatch { .. })
        ));
    }
}
