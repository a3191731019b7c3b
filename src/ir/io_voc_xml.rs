//! Pascal VOC XML codec.
//!
//! One `<annotation>` document per image. Boxes are stored as integer pixel
//! corners under `<object>/<bndbox>`; the image size lives in `<size>`.
//!
//! # Decoding
//!
//! - `<size>` is used when it is present and positive; otherwise the
//!   context image size is used.
//! - The image path comes from `<path>`, else `<filename>`, else the context.
//! - Unknown elements are ignored.
//! - A box with `xmin >= xmax` or `ymin >= ymax` as written is malformed. A
//!   box that is well-formed but collapses when clamped to the image is an
//!   invariant violation.
//!
//! # Encoding
//!
//! Corners are rounded to whole pixels. If rounding collapses an axis, the
//! max side is pushed out by one pixel (or the min side when the max side
//! already sits on the image edge). Polygons are written as their bounding
//! box unless [`PolygonPolicy::Reject`](super::PolygonPolicy::Reject) is set.

use roxmltree::Node;
use std::fmt::Write;

use super::codec::{self, Codec, CodecContext, Format};
use super::{BBoxXYXY, Document, ImageSize, LabeledShape, Pixel, Shape};
use crate::error::{LabelError, Location};

const IMAGE_DEPTH: u32 = 3;

/// Codec for Pascal VOC XML annotation files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VocCodec;

impl Codec for VocCodec {
    fn format(&self) -> Format {
        Format::Voc
    }

    fn decode(&self, bytes: &[u8], ctx: &CodecContext<'_>) -> Result<Document, LabelError> {
        let xml = codec::decode_utf8(bytes, ctx.origin)?;
        from_voc_xml_str(xml, ctx)
    }

    fn encode(&self, document: &Document, ctx: &CodecContext<'_>) -> Result<Vec<u8>, LabelError> {
        codec::prepare_encode(document, Format::Voc, &ctx.options)?;
        to_voc_xml_string(document, ctx).map(String::into_bytes)
    }
}

/// Parses one VOC annotation from a string.
pub fn from_voc_xml_str(xml: &str, ctx: &CodecContext<'_>) -> Result<Document, LabelError> {
    let origin = ctx.origin;
    let parsed = roxmltree::Document::parse(xml).map_err(|source| {
        LabelError::malformed(origin, Location::Document, source.to_string())
    })?;

    let annotation = parsed.root_element();
    if annotation.tag_name().name() != "annotation" {
        return Err(LabelError::malformed(
            origin,
            Location::Document,
            "missing <annotation> root element",
        ));
    }

    let verified = match annotation.attribute("verified") {
        None => false,
        Some(raw) => parse_voc_bool(raw, "verified", origin, Location::Document)?,
    };

    let image_size = read_image_size(annotation, ctx)?;
    let image_path = optional_child_text(annotation, "path")
        .or_else(|| optional_child_text(annotation, "filename"))
        .or_else(|| ctx.image_path.map(ToOwned::to_owned))
        .unwrap_or_default();

    let mut document = Document::new(image_path, image_size).with_verified(verified);

    for (object_idx, object) in annotation
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == "object")
        .enumerate()
    {
        let location = Location::Object(object_idx + 1);
        let labeled = parse_object(object, image_size, origin, location)?;
        document.shapes.push(labeled);
    }

    log::debug!(
        "{}: decoded {} VOC object(s) for {}",
        origin,
        document.shapes.len(),
        document.image_path
    );
    Ok(document)
}

/// Renders one document as VOC XML.
///
/// The document must already satisfy its invariants; [`VocCodec::encode`]
/// checks them first.
pub fn to_voc_xml_string(document: &Document, ctx: &CodecContext<'_>) -> Result<String, LabelError> {
    let size = document.image_size;
    let folder = parent_folder(&document.image_path);

    let mut xml = String::new();
    if document.verified {
        writeln!(xml, "<annotation verified=\"yes\">").expect("write to string");
    } else {
        writeln!(xml, "<annotation>").expect("write to string");
    }
    writeln!(xml, "  <folder>{}</folder>", xml_escape(folder)).expect("write to string");
    writeln!(
        xml,
        "  <filename>{}</filename>",
        xml_escape(document.file_name())
    )
    .expect("write to string");
    writeln!(xml, "  <path>{}</path>", xml_escape(&document.image_path)).expect("write to string");
    writeln!(xml, "  <source>").expect("write to string");
    writeln!(xml, "    <database>Unknown</database>").expect("write to string");
    writeln!(xml, "  </source>").expect("write to string");
    writeln!(xml, "  <size>").expect("write to string");
    writeln!(xml, "    <width>{}</width>", size.width).expect("write to string");
    writeln!(xml, "    <height>{}</height>", size.height).expect("write to string");
    writeln!(xml, "    <depth>{}</depth>", IMAGE_DEPTH).expect("write to string");
    writeln!(xml, "  </size>").expect("write to string");
    writeln!(xml, "  <segmented>0</segmented>").expect("write to string");

    for (shape_idx, labeled) in document.shapes.iter().enumerate() {
        let bounds = codec::encodable_bounds(labeled, shape_idx, Format::Voc, &ctx.options)?;
        let bbox = integer_box(&bounds, size);
        let truncated = touches_edge(&bbox, size);

        writeln!(xml, "  <object>").expect("write to string");
        writeln!(xml, "    <name>{}</name>", xml_escape(&labeled.class_name))
            .expect("write to string");
        writeln!(xml, "    <pose>Unspecified</pose>").expect("write to string");
        writeln!(xml, "    <truncated>{}</truncated>", u8::from(truncated))
            .expect("write to string");
        writeln!(xml, "    <difficult>{}</difficult>", u8::from(labeled.difficult))
            .expect("write to string");
        writeln!(xml, "    <bndbox>").expect("write to string");
        writeln!(xml, "      <xmin>{}</xmin>", bbox.xmin()).expect("write to string");
        writeln!(xml, "      <ymin>{}</ymin>", bbox.ymin()).expect("write to string");
        writeln!(xml, "      <xmax>{}</xmax>", bbox.xmax()).expect("write to string");
        writeln!(xml, "      <ymax>{}</ymax>", bbox.ymax()).expect("write to string");
        writeln!(xml, "    </bndbox>").expect("write to string");
        writeln!(xml, "  </object>").expect("write to string");
    }

    writeln!(xml, "</annotation>").expect("write to string");
    Ok(xml)
}

fn read_image_size(annotation: Node<'_, '_>, ctx: &CodecContext<'_>) -> Result<ImageSize, LabelError> {
    let origin = ctx.origin;
    if let Some(size) = child_element(annotation, "size") {
        let width = parse_optional_u32(size, "width", origin)?;
        let height = parse_optional_u32(size, "height", origin)?;
        if let (Some(width), Some(height)) = (width, height) {
            if width > 0 && height > 0 {
                return Ok(ImageSize { width, height });
            }
        }
    }

    ctx.image_size.ok_or_else(|| {
        LabelError::malformed(
            origin,
            Location::Document,
            "missing positive <size> and no image size supplied",
        )
    })
}

fn parse_object(
    object: Node<'_, '_>,
    image_size: ImageSize,
    origin: &str,
    location: Location,
) -> Result<LabeledShape, LabelError> {
    let name = required_child_text(object, "name", origin, location, "<object>")?;
    let bndbox = required_child_element(object, "bndbox", origin, location, "<object>")?;

    let xmin = parse_required_f64(bndbox, "xmin", origin, location)?;
    let ymin = parse_required_f64(bndbox, "ymin", origin, location)?;
    let xmax = parse_required_f64(bndbox, "xmax", origin, location)?;
    let ymax = parse_required_f64(bndbox, "ymax", origin, location)?;

    if xmin >= xmax || ymin >= ymax {
        return Err(LabelError::malformed(
            origin,
            location,
            format!(
                "<bndbox> of '{}' is not ordered: xmin={} ymin={} xmax={} ymax={}",
                name, xmin, ymin, xmax, ymax
            ),
        ));
    }

    let difficult = match optional_child_text(object, "difficult") {
        None => false,
        Some(raw) => parse_voc_bool(&raw, "difficult", origin, location)?,
    };

    let shape = codec::finish_decoded_shape(
        Shape::rectangle(xmin, ymin, xmax, ymax),
        image_size,
        origin,
        location,
    )?;

    Ok(LabeledShape::new(shape, name).with_difficult(difficult))
}

/// Rounds `bounds` to whole pixels, keeping at least one pixel per axis.
fn integer_box(bounds: &BBoxXYXY<Pixel>, size: ImageSize) -> BBoxXYXY<Pixel> {
    let (width, height) = size.as_f64();
    let rounded = bounds.rounded();
    let (xmin, xmax) = widen_collapsed(rounded.xmin(), rounded.xmax(), width);
    let (ymin, ymax) = widen_collapsed(rounded.ymin(), rounded.ymax(), height);
    BBoxXYXY::from_xyxy(xmin, ymin, xmax, ymax)
}

fn widen_collapsed(min: f64, max: f64, limit: f64) -> (f64, f64) {
    if min < max {
        (min, max)
    } else if min + 1.0 <= limit {
        (min, min + 1.0)
    } else {
        (max - 1.0, max)
    }
}

fn touches_edge(bbox: &BBoxXYXY<Pixel>, size: ImageSize) -> bool {
    let (width, height) = size.as_f64();
    bbox.xmin() <= 0.0 || bbox.ymin() <= 0.0 || bbox.xmax() >= width || bbox.ymax() >= height
}

fn parent_folder(image_path: &str) -> &str {
    let mut parts = image_path.rsplit(['/', '\\']);
    parts.next();
    parts.next().unwrap_or("")
}

fn parse_voc_bool(
    raw: &str,
    field: &str,
    origin: &str,
    location: Location,
) -> Result<bool, LabelError> {
    match normalize_bool_attr(raw) {
        Some(value) => Ok(value == "1"),
        None => Err(LabelError::malformed(
            origin,
            location,
            format!("invalid {field} value '{raw}'; expected 0, 1, true, false, yes or no"),
        )),
    }
}

fn required_child_element<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &str,
    origin: &str,
    location: Location,
    context: &str,
) -> Result<Node<'a, 'input>, LabelError> {
    child_element(node, tag).ok_or_else(|| {
        LabelError::malformed(origin, location, format!("missing <{tag}> in {context}"))
    })
}

fn required_child_text(
    node: Node<'_, '_>,
    tag: &str,
    origin: &str,
    location: Location,
    context: &str,
) -> Result<String, LabelError> {
    optional_child_text(node, tag).ok_or_else(|| {
        LabelError::malformed(origin, location, format!("missing <{tag}> in {context}"))
    })
}

fn parse_optional_u32(node: Node<'_, '_>, tag: &str, origin: &str) -> Result<Option<u32>, LabelError> {
    optional_child_text(node, tag)
        .map(|raw| {
            raw.parse::<u32>().map_err(|_| {
                LabelError::malformed(
                    origin,
                    Location::Document,
                    format!("invalid <{tag}> value '{raw}' in <size>; expected u32"),
                )
            })
        })
        .transpose()
}

fn parse_required_f64(
    node: Node<'_, '_>,
    tag: &str,
    origin: &str,
    location: Location,
) -> Result<f64, LabelError> {
    let raw = required_child_text(node, tag, origin, location, "<bndbox>")?;
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| {
            LabelError::malformed(
                origin,
                location,
                format!("invalid <{tag}> value '{raw}' in <bndbox>; expected a finite number"),
            )
        })
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == tag)
}

fn optional_child_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    child_element(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned)
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn normalize_bool_attr(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some("1"),
        "false" | "no" | "0" => Some("0"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ClassRegistry;

    fn size(w: u32, h: u32) -> ImageSize {
        ImageSize::new(w, h).expect("valid size")
    }

    fn decode(xml: &str) -> Result<Document, LabelError> {
        let registry = ClassRegistry::new();
        let ctx = CodecContext::new(&registry).with_origin("a.xml");
        VocCodec.decode(xml.as_bytes(), &ctx)
    }

    const CAT_XML: &str = r#"<annotation verified="yes">
  <folder>images</folder>
  <filename>cat.jpg</filename>
  <size><width>512</width><height>512</height><depth>3</depth></size>
  <object>
    <name>cat</name>
    <difficult>1</difficult>
    <extra>ignored</extra>
    <bndbox><xmin>10</xmin><ymin>10</ymin><xmax>110</xmax><ymax>60</ymax></bndbox>
  </object>
</annotation>"#;

    #[test]
    fn decodes_objects_flags_and_size() {
        let doc = decode(CAT_XML).expect("decode");
        assert_eq!(doc.image_path, "cat.jpg");
        assert_eq!(doc.image_size, size(512, 512));
        assert!(doc.verified);
        assert_eq!(doc.shapes.len(), 1);
        assert_eq!(doc.shapes[0].class_name, "cat");
        assert!(doc.shapes[0].difficult);
        assert_eq!(doc.shapes[0].shape, Shape::rectangle(10.0, 10.0, 110.0, 60.0));
    }

    #[test]
    fn encodes_integer_corners_and_metadata() {
        let mut doc = Document::new("images/cat.jpg", size(512, 512)).with_verified(true);
        doc.add_shape(LabeledShape::new(Shape::rectangle(10.2, 9.6, 110.4, 60.0), "a<b"))
            .expect("add");
        let registry = ClassRegistry::new();
        let ctx = CodecContext::new(&registry);
        let xml = String::from_utf8(VocCodec.encode(&doc, &ctx).expect("encode")).expect("utf8");

        assert!(xml.starts_with("<annotation verified=\"yes\">"));
        assert!(xml.contains("<folder>images</folder>"));
        assert!(xml.contains("<filename>cat.jpg</filename>"));
        assert!(xml.contains("<name>a&lt;b</name>"));
        assert!(xml.contains("<xmin>10</xmin>"));
        assert!(xml.contains("<ymin>10</ymin>"));
        assert!(xml.contains("<xmax>110</xmax>"));
        assert!(xml.contains("<ymax>60</ymax>"));
        assert!(xml.contains("<truncated>0</truncated>"));
        assert!(xml.contains("<difficult>0</difficult>"));
    }

    #[test]
    fn rounding_collapse_is_widened_within_image() {
        let s = size(100, 100);
        let inner = integer_box(&BBoxXYXY::from_xyxy(10.2, 5.0, 10.4, 9.0), s);
        assert_eq!(inner, BBoxXYXY::from_xyxy(10.0, 5.0, 11.0, 9.0));

        let at_edge = integer_box(&BBoxXYXY::from_xyxy(99.6, 5.0, 99.9, 9.0), s);
        assert_eq!(at_edge, BBoxXYXY::from_xyxy(99.0, 5.0, 100.0, 9.0));
    }

    #[test]
    fn unordered_box_is_malformed() {
        let xml = CAT_XML.replace("<xmin>10</xmin>", "<xmin>200</xmin>");
        assert!(matches!(
            decode(&xml),
            Err(LabelError::MalformedDocument {
                location: Location::Object(1),
                ..
            })
        ));
    }

    #[test]
    fn box_outside_image_is_an_invariant_violation() {
        let xml = CAT_XML
            .replace("<xmin>10</xmin>", "<xmin>600</xmin>")
            .replace("<xmax>110</xmax>", "<xmax>700</xmax>");
        assert!(matches!(
            decode(&xml),
            Err(LabelError::InvariantViolation {
                location: Location::Object(1),
                ..
            })
        ));
    }

    #[test]
    fn partially_outside_box_is_clamped() {
        let xml = CAT_XML.replace("<xmax>110</xmax>", "<xmax>900</xmax>");
        let doc = decode(&xml).expect("decode");
        assert_eq!(doc.shapes[0].shape, Shape::rectangle(10.0, 10.0, 512.0, 60.0));
    }

    #[test]
    fn missing_and_non_numeric_fields_are_malformed() {
        let missing = CAT_XML.replace("<ymax>60</ymax>", "");
        assert!(matches!(
            decode(&missing),
            Err(LabelError::MalformedDocument { .. })
        ));

        let text = CAT_XML.replace("<ymax>60</ymax>", "<ymax>sixty</ymax>");
        let err = decode(&text).unwrap_err();
        assert!(err.to_string().contains("sixty"));

        let flag = CAT_XML.replace("<difficult>1</difficult>", "<difficult>maybe</difficult>");
        assert!(matches!(decode(&flag), Err(LabelError::MalformedDocument { .. })));
    }

    #[test]
    fn zero_size_falls_back_to_context() {
        let xml = CAT_XML.replace(
            "<width>512</width><height>512</height>",
            "<width>0</width><height>0</height>",
        );
        assert!(matches!(decode(&xml), Err(LabelError::MalformedDocument { .. })));

        let registry = ClassRegistry::new();
        let ctx = CodecContext::new(&registry).with_image_size(size(640, 480));
        let doc = VocCodec.decode(xml.as_bytes(), &ctx).expect("decode with context size");
        assert_eq!(doc.image_size, size(640, 480));
    }

    #[test]
    fn wrong_root_is_malformed() {
        assert!(matches!(
            decode("<dataset/>"),
            Err(LabelError::MalformedDocument {
                location: Location::Document,
                ..
            })
        ));
    }

    #[test]
    fn edge_boxes_are_marked_truncated() {
        let mut doc = Document::new("cat.jpg", size(50, 50));
        doc.add_shape(LabeledShape::new(Shape::rectangle(0.0, 10.0, 20.0, 30.0), "cat"))
            .expect("add");
        let registry = ClassRegistry::new();
        let xml = to_voc_xml_string(&doc, &CodecContext::new(&registry)).expect("encode");
        assert!(xml.contains("<truncated>1</truncated>"));
        assert!(xml.contains("<folder></folder>"));
    }
}
