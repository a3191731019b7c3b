//! YOLO text codec.
//!
//! One `.txt` file per image with one line per box:
//!
//! ```text
//! <class_index> <cx> <cy> <w> <h>
//! ```
//!
//! Coordinates are fractions of the image size, written with six decimals.
//! Class names live outside the label file, in the [`ClassRegistry`]
//! (persisted as `classes.txt`), so decoding needs the same registry that
//! encoding used.
//!
//! Blank lines and lines starting with `#` are skipped.
//!
//! [`ClassRegistry`]: super::ClassRegistry

use std::fmt::Write;

use super::codec::{self, Codec, CodecContext, Format};
use super::{BBoxXYXY, ClassRegistry, Document, ImageSize, LabeledShape, Normalized, Shape};
use crate::error::{LabelError, Location};

/// Codec for YOLO detection label files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct YoloCodec;

impl Codec for YoloCodec {
    fn format(&self) -> Format {
        Format::Yolo
    }

    fn decode(&self, bytes: &[u8], ctx: &CodecContext<'_>) -> Result<Document, LabelError> {
        let text = codec::decode_utf8(bytes, ctx.origin)?;
        from_yolo_str(text, ctx)
    }

    fn encode(&self, document: &Document, ctx: &CodecContext<'_>) -> Result<Vec<u8>, LabelError> {
        codec::prepare_encode(document, Format::Yolo, &ctx.options)?;
        to_yolo_string(document, ctx).map(String::into_bytes)
    }
}

#[derive(Debug, PartialEq)]
struct YoloLabelRow {
    class_index: i64,
    cx: f64,
    cy: f64,
    w: f64,
    h: f64,
}

/// Parses YOLO label text for the image described by `ctx`.
///
/// `ctx.image_size` is required.
pub fn from_yolo_str(text: &str, ctx: &CodecContext<'_>) -> Result<Document, LabelError> {
    let origin = ctx.origin;
    let image_size = ctx.require_image_size()?;
    let image_path = ctx.image_path.unwrap_or_default();
    let mut document = Document::new(image_path, image_size);

    for (line_idx, line) in text.lines().enumerate() {
        let location = Location::Line(line_idx + 1);
        let Some(row) = parse_label_line(line, origin, location)? else {
            continue;
        };
        let labeled = row_to_shape(&row, ctx.registry, image_size, origin, location)?;
        document.shapes.push(labeled);
    }

    log::debug!(
        "{}: decoded {} YOLO row(s) against {} class(es)",
        origin,
        document.shapes.len(),
        ctx.registry.len()
    );
    Ok(document)
}

/// Renders YOLO label text, assigning registry indices to new class names.
pub fn to_yolo_string(document: &Document, ctx: &CodecContext<'_>) -> Result<String, LabelError> {
    let (width, height) = document.image_size.as_f64();
    let mut out = String::new();

    for (shape_idx, labeled) in document.shapes.iter().enumerate() {
        let bounds = codec::encodable_bounds(labeled, shape_idx, Format::Yolo, &ctx.options)?;
        let class_index = ctx.registry.index_of(&labeled.class_name);
        let (cx, cy, w, h) = bounds.to_normalized(width, height).to_cxcywh();
        let [cx, cy, w, h] = quantize_box(cx, cy, w, h);

        writeln!(out, "{} {:.6} {:.6} {:.6} {:.6}", class_index, cx, cy, w, h)
            .expect("write to string");
    }

    Ok(out)
}

const MICROS: f64 = 1_000_000.0;

/// Rounds a normalized box to the six written decimals.
///
/// A side that rounds to zero is widened to one step, and the center moves
/// so both edges stay inside `[0, 1]`.
fn quantize_box(cx: f64, cy: f64, w: f64, h: f64) -> [f64; 4] {
    let (cx, w) = quantize_axis(cx, w);
    let (cy, h) = quantize_axis(cy, h);
    [cx, cy, w, h].map(|micros| micros as f64 / MICROS)
}

fn quantize_axis(center: f64, extent: f64) -> (i64, i64) {
    let full = MICROS as i64;
    let extent = ((extent.clamp(0.0, 1.0) * MICROS).round() as i64).max(1);
    let lowest = (extent + 1) / 2;
    let highest = (2 * full - extent) / 2;
    let center = ((center.clamp(0.0, 1.0) * MICROS).round() as i64).clamp(lowest, highest);
    (center, extent)
}

fn row_to_shape(
    row: &YoloLabelRow,
    registry: &ClassRegistry,
    image_size: ImageSize,
    origin: &str,
    location: Location,
) -> Result<LabeledShape, LabelError> {
    let class_name = registry
        .name_at(row.class_index)
        .map_err(|err| err.at(origin, location))?;

    let (width, height) = image_size.as_f64();
    let bbox = BBoxXYXY::<Normalized>::from_cxcywh(row.cx, row.cy, row.w, row.h)
        .to_pixel(width, height);
    let shape = codec::finish_decoded_shape(Shape::Rectangle(bbox), image_size, origin, location)?;

    Ok(LabeledShape::new(shape, class_name))
}

fn parse_label_line(
    line: &str,
    origin: &str,
    location: Location,
) -> Result<Option<YoloLabelRow>, LabelError> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    // Take at most 6 tokens so pathological inputs do not allocate unbounded memory.
    let tokens: Vec<&str> = trimmed.split_whitespace().take(6).collect();

    if tokens.len() < 5 {
        return Err(LabelError::malformed(
            origin,
            location,
            format!("expected 5 tokens, found {}", tokens.len()),
        ));
    }

    if tokens.len() > 5 {
        return Err(LabelError::malformed(
            origin,
            location,
            "expected 5 tokens; segmentation and pose rows are not supported",
        ));
    }

    let class_index = tokens[0].parse::<i64>().map_err(|_| {
        LabelError::malformed(
            origin,
            location,
            format!("invalid class index '{}'; expected an integer", tokens[0]),
        )
    })?;

    let cx = parse_f64_token(tokens[1], "x_center", origin, location)?;
    let cy = parse_f64_token(tokens[2], "y_center", origin, location)?;
    let w = parse_f64_token(tokens[3], "width", origin, location)?;
    let h = parse_f64_token(tokens[4], "height", origin, location)?;

    if w < 0.0 || h < 0.0 {
        return Err(LabelError::malformed(
            origin,
            location,
            format!("negative box size {w} x {h}"),
        ));
    }

    Ok(Some(YoloLabelRow {
        class_index,
        cx,
        cy,
        w,
        h,
    }))
}

/// Fuzz-only entrypoint for YOLO single-line parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_label_line(input: &str) -> Result<(), LabelError> {
    let _ = parse_label_line(input, "<fuzz>", Location::Line(1))?;
    Ok(())
}

fn parse_f64_token(
    raw: &str,
    field_name: &str,
    origin: &str,
    location: Location,
) -> Result<f64, LabelError> {
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| {
            LabelError::malformed(
                origin,
                location,
                format!("invalid {field_name} '{raw}'; expected a finite number"),
            )
        })
}
