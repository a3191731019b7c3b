//! The codec capability shared by every on-disk format.
//!
//! A codec turns bytes into a [`Document`] and back. Codecs never touch the
//! filesystem: the caller hands in bytes plus a [`CodecContext`] naming the
//! record (for error messages), the image it belongs to and the shared
//! [`ClassRegistry`].
//!
//! The set of formats is closed, so dispatch goes through [`AnyCodec`], a
//! tagged union resolved once from a [`Format`].

use serde::Serialize;
use std::fmt;

use super::io_createml_json::CreateMlCodec;
use super::io_voc_xml::VocCodec;
use super::io_yolo::YoloCodec;
use super::{BBoxXYXY, ClassRegistry, Document, ImageSize, LabeledShape, Pixel, Shape};
use crate::error::{LabelError, Location, MEMORY_ORIGIN};

/// On-disk label formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    /// Pascal VOC XML, one file per image.
    Voc,
    /// YOLO text, one file per image plus a shared class list.
    Yolo,
    /// CreateML JSON, one array for a batch of images.
    CreateMl,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Voc, Format::Yolo, Format::CreateMl];

    pub fn name(&self) -> &'static str {
        match self {
            Format::Voc => "voc",
            Format::Yolo => "yolo",
            Format::CreateMl => "createml",
        }
    }

    /// File extension (without the dot) of this format's label files.
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Voc => "xml",
            Format::Yolo => "txt",
            Format::CreateMl => "json",
        }
    }

    /// Parses a format name; accepts a few common aliases.
    pub fn from_name(name: &str) -> Option<Format> {
        match name.trim().to_ascii_lowercase().as_str() {
            "voc" | "pascal-voc" | "pascal_voc" | "pascalvoc" | "xml" => Some(Format::Voc),
            "yolo" | "txt" => Some(Format::Yolo),
            "createml" | "create-ml" | "create_ml" | "json" => Some(Format::CreateMl),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Format> {
        Format::ALL
            .into_iter()
            .find(|format| ext.eq_ignore_ascii_case(format.extension()))
    }

    pub fn codec(self) -> AnyCodec {
        match self {
            Format::Voc => AnyCodec::Voc(VocCodec),
            Format::Yolo => AnyCodec::Yolo(YoloCodec),
            Format::CreateMl => AnyCodec::CreateMl(CreateMlCodec),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What to do with a polygon when the target format only stores boxes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum PolygonPolicy {
    /// Encode the polygon's bounding box (lossy, reported).
    #[default]
    BoundingBox,
    /// Fail with [`LabelError::UnsupportedShape`].
    Reject,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CodecOptions {
    pub polygon_policy: PolygonPolicy,
}

/// Everything a codec call needs besides the bytes or the document.
#[derive(Clone, Copy, Debug)]
pub struct CodecContext<'a> {
    /// Identity of the record, used in error messages (usually a file path).
    pub origin: &'a str,
    /// Image the labels belong to, when the format does not name it.
    pub image_path: Option<&'a str>,
    /// Image dimensions, when the format does not store them.
    pub image_size: Option<ImageSize>,
    /// Class registry shared across the batch.
    pub registry: &'a ClassRegistry,
    pub options: CodecOptions,
}

impl<'a> CodecContext<'a> {
    pub fn new(registry: &'a ClassRegistry) -> Self {
        Self {
            origin: MEMORY_ORIGIN,
            image_path: None,
            image_size: None,
            registry,
            options: CodecOptions::default(),
        }
    }

    pub fn with_origin(mut self, origin: &'a str) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_image(mut self, image_path: &'a str, image_size: ImageSize) -> Self {
        self.image_path = Some(image_path);
        self.image_size = Some(image_size);
        self
    }

    pub fn with_image_size(mut self, image_size: ImageSize) -> Self {
        self.image_size = Some(image_size);
        self
    }

    pub fn with_options(mut self, options: CodecOptions) -> Self {
        self.options = options;
        self
    }

    /// The image size, or [`LabelError::MissingImageSize`].
    pub fn require_image_size(&self) -> Result<ImageSize, LabelError> {
        self.image_size.ok_or_else(|| LabelError::MissingImageSize {
            origin: self.origin.to_string(),
        })
    }

    /// Image path from the context, falling back to the origin.
    pub fn image_path_or_origin(&self) -> &'a str {
        self.image_path.unwrap_or(self.origin)
    }
}

/// Symmetric encode/decode for one label format.
pub trait Codec {
    fn format(&self) -> Format;

    /// Decodes one document.
    ///
    /// The result is clamped to the image and contains no degenerate shape.
    fn decode(&self, bytes: &[u8], ctx: &CodecContext<'_>) -> Result<Document, LabelError>;

    /// Encodes one document.
    ///
    /// Fails only for documents that break their invariants
    /// ([`LabelError::InvariantViolation`]) or for shapes the format cannot
    /// hold under the configured [`PolygonPolicy`].
    fn encode(&self, document: &Document, ctx: &CodecContext<'_>) -> Result<Vec<u8>, LabelError>;
}

/// The closed set of codecs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnyCodec {
    Voc(VocCodec),
    Yolo(YoloCodec),
    CreateMl(CreateMlCodec),
}

impl Codec for AnyCodec {
    fn format(&self) -> Format {
        match self {
            AnyCodec::Voc(codec) => codec.format(),
            AnyCodec::Yolo(codec) => codec.format(),
            AnyCodec::CreateMl(codec) => codec.format(),
        }
    }

    fn decode(&self, bytes: &[u8], ctx: &CodecContext<'_>) -> Result<Document, LabelError> {
        match self {
            AnyCodec::Voc(codec) => codec.decode(bytes, ctx),
            AnyCodec::Yolo(codec) => codec.decode(bytes, ctx),
            AnyCodec::CreateMl(codec) => codec.decode(bytes, ctx),
        }
    }

    fn encode(&self, document: &Document, ctx: &CodecContext<'_>) -> Result<Vec<u8>, LabelError> {
        match self {
            AnyCodec::Voc(codec) => codec.encode(document, ctx),
            AnyCodec::Yolo(codec) => codec.encode(document, ctx),
            AnyCodec::CreateMl(codec) => codec.encode(document, ctx),
        }
    }
}

pub(crate) fn decode_utf8<'b>(bytes: &'b [u8], origin: &str) -> Result<&'b str, LabelError> {
    let text = std::str::from_utf8(bytes).map_err(|source| {
        LabelError::malformed(
            origin,
            Location::Document,
            format!("input is not valid UTF-8: {source}"),
        )
    })?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text))
}

/// The box a box-only format stores for `labeled`.
pub(crate) fn encodable_bounds(
    labeled: &LabeledShape,
    index: usize,
    format: Format,
    options: &CodecOptions,
) -> Result<BBoxXYXY<Pixel>, LabelError> {
    match (&labeled.shape, options.polygon_policy) {
        (Shape::Rectangle(bbox), _) => Ok(*bbox),
        (Shape::Polygon(_), PolygonPolicy::BoundingBox) => Ok(labeled.shape.bounds()),
        (Shape::Polygon(_), PolygonPolicy::Reject) => Err(LabelError::UnsupportedShape {
            format: format.name(),
            location: Location::Shape(index + 1),
            kind: labeled.shape.kind_name(),
        }),
    }
}

/// Shared encode prologue: invariants, then a warning if polygons will be boxed.
pub(crate) fn prepare_encode(
    document: &Document,
    format: Format,
    options: &CodecOptions,
) -> Result<(), LabelError> {
    document.check_invariants()?;

    let polygons = document
        .shapes
        .iter()
        .filter(|labeled| matches!(labeled.shape, Shape::Polygon(_)))
        .count();
    if polygons > 0 && options.polygon_policy == PolygonPolicy::BoundingBox {
        log::warn!(
            "{}: {} polygon(s) written as bounding boxes in {} output",
            document.image_path,
            polygons,
            format
        );
    }
    Ok(())
}

/// Clamp a freshly decoded shape into the image, then reject it if nothing
/// of it is left.
pub(crate) fn finish_decoded_shape(
    shape: Shape,
    size: ImageSize,
    origin: &str,
    location: Location,
) -> Result<Shape, LabelError> {
    let clamped = shape.clamp_to(size);
    if clamped.is_degenerate() {
        let bounds = clamped.bounds();
        return Err(LabelError::invariant(
            origin,
            location,
            format!(
                "{} has no area after clamping to {} image: ({}, {}, {}, {})",
                clamped.kind_name(),
                size,
                bounds.xmin(),
                bounds.ymin(),
                bounds.xmax(),
                bounds.ymax()
            ),
        ));
    }
    Ok(clamped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_names_and_extensions() {
        for format in Format::ALL {
            assert_eq!(Format::from_name(format.name()), Some(format));
            assert_eq!(Format::from_extension(format.extension()), Some(format));
        }
        assert_eq!(Format::from_name("Pascal-VOC"), Some(Format::Voc));
        assert_eq!(Format::from_extension("XML"), Some(Format::Voc));
        assert_eq!(Format::from_name("coco"), None);
    }

    #[test]
    fn any_codec_reports_its_format() {
        for format in Format::ALL {
            assert_eq!(format.codec().format(), format);
        }
    }

    #[test]
    fn encodable_bounds_follows_polygon_policy() {
        let poly = LabeledShape::new(Shape::polygon([(1.0, 1.0), (9.0, 2.0), (4.0, 7.0)]), "a");
        let boxed = encodable_bounds(&poly, 0, Format::Voc, &CodecOptions::default())
            .expect("bounding box fallback");
        assert_eq!(boxed, BBoxXYXY::from_xyxy(1.0, 1.0, 9.0, 7.0));

        let strict = CodecOptions {
            polygon_policy: PolygonPolicy::Reject,
        };
        let err = encodable_bounds(&poly, 2, Format::Yolo, &strict).unwrap_err();
        assert!(matches!(
            err,
            LabelError::UnsupportedShape {
                format: "yolo",
                location: Location::Shape(3),
                kind: "polygon",
            }
        ));
    }

    #[test]
    fn decode_utf8_strips_bom_and_rejects_binary() {
        assert_eq!(decode_utf8(b"\xef\xbb\xbfhello", "x").expect("utf8"), "hello");
        assert!(matches!(
            decode_utf8(&[0xff, 0xfe, 0x00], "x"),
            Err(LabelError::MalformedDocument { .. })
        ));
    }

    #[test]
    fn missing_image_size_names_the_origin() {
        let registry = ClassRegistry::new();
        let ctx = CodecContext::new(&registry).with_origin("labels/a.txt");
        let err = ctx.require_image_size().unwrap_err();
        assert!(err.to_string().contains("labels/a.txt"));
    }
}
