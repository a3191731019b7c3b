//! CreateML JSON codec.
//!
//! A CreateML file is one JSON array covering many images:
//!
//! ```json
//! [
//!   {
//!     "image": "cat.jpg",
//!     "verified": false,
//!     "annotations": [
//!       { "label": "cat", "coordinates": { "x": 60, "y": 35, "width": 100, "height": 50 } }
//!     ]
//!   }
//! ]
//! ```
//!
//! `x`/`y` are the box center in absolute pixels. The image size is not
//! stored, so decoding needs it from the caller.
//!
//! The [`Codec`] impl works on a single document: decode picks the entry for
//! the context image, encode writes a one-entry array. [`CreateMlCodec::encode_batch`],
//! [`CreateMlCodec::decode_batch`] and [`CreateMlCodec::merge_into`] cover
//! the multi-image file.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::codec::{self, Codec, CodecContext, Format};
use super::{BBoxXYXY, Document, ImageSize, LabeledShape, Pixel, Shape};
use crate::error::{LabelError, Location};

/// Codec for CreateML object-detection JSON.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CreateMlCodec;

#[derive(Debug, Serialize, Deserialize)]
struct CreateMlEntry {
    image: String,
    #[serde(default)]
    verified: bool,
    annotations: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CreateMlAnnotation {
    label: String,
    coordinates: CreateMlCoordinates,
}

#[derive(Debug, Serialize, Deserialize)]
struct CreateMlCoordinates {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl Codec for CreateMlCodec {
    fn format(&self) -> Format {
        Format::CreateMl
    }

    fn decode(&self, bytes: &[u8], ctx: &CodecContext<'_>) -> Result<Document, LabelError> {
        let origin = ctx.origin;
        let entries = parse_array(bytes, origin)?;
        let wanted = ctx.image_path.map(file_name);

        let selected = match wanted {
            Some(name) => entries.iter().position(|value| entry_image(value) == Some(name)),
            None if entries.len() == 1 => Some(0),
            None => None,
        };

        let Some(entry_idx) = selected else {
            let message = match wanted {
                Some(name) => format!("no entry for image '{name}' among {} entries", entries.len()),
                None => format!(
                    "{} entries found; name the image to select one",
                    entries.len()
                ),
            };
            return Err(LabelError::malformed(origin, Location::Document, message));
        };

        let image_size = ctx.require_image_size()?;
        let mut document = decode_entry(&entries[entry_idx], entry_idx, image_size, origin)?;
        if let Some(path) = ctx.image_path {
            document.image_path = path.to_string();
        }
        Ok(document)
    }

    fn encode(&self, document: &Document, ctx: &CodecContext<'_>) -> Result<Vec<u8>, LabelError> {
        self.encode_batch(std::slice::from_ref(document), ctx)
    }
}

impl CreateMlCodec {
    /// Encodes every document as one CreateML array, in input order.
    pub fn encode_batch(
        &self,
        documents: &[Document],
        ctx: &CodecContext<'_>,
    ) -> Result<Vec<u8>, LabelError> {
        let entries = documents
            .iter()
            .map(|document| encode_entry(document, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        write_json(&entries, ctx.origin)
    }

    /// Decodes every entry of a CreateML array.
    ///
    /// `size_of` maps an entry's `image` value to the image dimensions; an
    /// entry it cannot size fails with [`LabelError::MissingImageSize`].
    pub fn decode_batch<F>(
        &self,
        bytes: &[u8],
        ctx: &CodecContext<'_>,
        mut size_of: F,
    ) -> Result<Vec<Document>, LabelError>
    where
        F: FnMut(&str) -> Option<ImageSize>,
    {
        let origin = ctx.origin;
        let entries = parse_array(bytes, origin)?;
        let mut documents = Vec::with_capacity(entries.len());

        for (entry_idx, value) in entries.iter().enumerate() {
            let image = entry_image(value).unwrap_or_default();
            let image_size = size_of(image).ok_or_else(|| LabelError::MissingImageSize {
                origin: format!("{origin} ({})", Location::Entry(entry_idx + 1)),
            })?;
            documents.push(decode_entry(value, entry_idx, image_size, origin)?);
        }

        log::debug!("{}: decoded {} CreateML entries", origin, documents.len());
        Ok(documents)
    }

    /// Writes `document` into an existing CreateML array.
    ///
    /// The entry with the same image file name is replaced in place; if there
    /// is none the entry is appended. Other entries are kept as they are,
    /// including keys this codec does not know. Empty `existing` input is
    /// treated as an empty array.
    pub fn merge_into(
        &self,
        existing: &[u8],
        document: &Document,
        ctx: &CodecContext<'_>,
    ) -> Result<Vec<u8>, LabelError> {
        let origin = ctx.origin;
        let mut entries = if existing.iter().all(u8::is_ascii_whitespace) {
            Vec::new()
        } else {
            parse_array(existing, origin)?
        };

        let entry = encode_entry(document, ctx)?;
        let value = serde_json::to_value(&entry).map_err(|source| LabelError::CreateMlJsonWrite {
            origin: origin.to_string(),
            source,
        })?;

        match entries
            .iter()
            .position(|existing| entry_image(existing) == Some(entry.image.as_str()))
        {
            Some(idx) => entries[idx] = value,
            None => entries.push(value),
        }

        write_json(&entries, origin)
    }
}

fn parse_array(bytes: &[u8], origin: &str) -> Result<Vec<Value>, LabelError> {
    let text = codec::decode_utf8(bytes, origin)?;
    let value: Value = serde_json::from_str(text).map_err(|source| {
        LabelError::malformed(origin, Location::Document, source.to_string())
    })?;
    match value {
        Value::Array(entries) => Ok(entries),
        _ => Err(LabelError::malformed(
            origin,
            Location::Document,
            "expected a top-level JSON array",
        )),
    }
}

fn entry_image(value: &Value) -> Option<&str> {
    value.get("image").and_then(Value::as_str)
}

fn decode_entry(
    value: &Value,
    entry_idx: usize,
    image_size: ImageSize,
    origin: &str,
) -> Result<Document, LabelError> {
    let entry_location = Location::Entry(entry_idx + 1);
    let entry = CreateMlEntry::deserialize(value)
        .map_err(|source| LabelError::malformed(origin, entry_location, source.to_string()))?;

    let mut document = Document::new(entry.image, image_size).with_verified(entry.verified);

    for (annotation_idx, raw) in entry.annotations.iter().enumerate() {
        let location = Location::EntryAnnotation {
            entry: entry_idx + 1,
            annotation: annotation_idx + 1,
        };
        let annotation = CreateMlAnnotation::deserialize(raw)
            .map_err(|source| LabelError::malformed(origin, location, source.to_string()))?;
        if annotation.label.trim().is_empty() {
            return Err(LabelError::malformed(origin, location, "empty \"label\""));
        }

        let CreateMlCoordinates {
            x,
            y,
            width,
            height,
        } = annotation.coordinates;
        if width < 0.0 || height < 0.0 {
            return Err(LabelError::malformed(
                origin,
                location,
                format!("negative box size {width} x {height}"),
            ));
        }

        let bbox: BBoxXYXY<Pixel> = BBoxXYXY::from_cxcywh(x, y, width, height);
        let shape = codec::finish_decoded_shape(Shape::Rectangle(bbox), image_size, origin, location)?;
        document
            .shapes
            .push(LabeledShape::new(shape, annotation.label));
    }

    Ok(document)
}

fn encode_entry(document: &Document, ctx: &CodecContext<'_>) -> Result<CreateMlEntry, LabelError> {
    codec::prepare_encode(document, Format::CreateMl, &ctx.options)?;

    let mut annotations = Vec::with_capacity(document.shapes.len());
    for (shape_idx, labeled) in document.shapes.iter().enumerate() {
        let bounds = codec::encodable_bounds(labeled, shape_idx, Format::CreateMl, &ctx.options)?;
        let (x, y, width, height) = bounds.to_cxcywh();
        let annotation = CreateMlAnnotation {
            label: labeled.class_name.clone(),
            coordinates: CreateMlCoordinates {
                x,
                y,
                width,
                height,
            },
        };
        annotations.push(serde_json::to_value(annotation).map_err(|source| {
            LabelError::CreateMlJsonWrite {
                origin: ctx.origin.to_string(),
                source,
            }
        })?);
    }

    Ok(CreateMlEntry {
        image: document.file_name().to_string(),
        verified: document.verified,
        annotations,
    })
}

fn write_json<T: Serialize>(value: &T, origin: &str) -> Result<Vec<u8>, LabelError> {
    serde_json::to_vec_pretty(value).map_err(|source| LabelError::CreateMlJsonWrite {
        origin: origin.to_string(),
        source,
    })
}

fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
