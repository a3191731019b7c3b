//! The annotation data model and the format codecs.
//!
//! Every conversion goes through a [`Document`]: decode with one codec,
//! re-encode with another. The model lives here together with the codecs
//! that read and write it.
//!
//! # Design Principles
//!
//! 1. **Typed coordinate spaces**: pixel and normalized boxes are different
//!    types ([`Pixel`], [`Normalized`]), so a YOLO fraction can never be
//!    written where a pixel corner is expected.
//!
//! 2. **One canonical box**: rectangles are XYXY in pixel space. Center and
//!    size layouts exist only at the codec edges.
//!
//! 3. **Permissive construction, strict boundaries**: shapes can be built in
//!    any state so validation can describe what is wrong; codecs reject
//!    invalid documents on the way in and on the way out.
//!
//! # Example
//!
//! ```
//! use labelcodec::ir::{ClassRegistry, Codec, CodecContext, Document, Format, ImageSize, LabeledShape, Shape};
//!
//! let mut doc = Document::new("cat.jpg", ImageSize::new(512, 512).unwrap());
//! doc.add_shape(LabeledShape::new(Shape::rectangle(10.0, 10.0, 110.0, 60.0), "cat"))
//!     .unwrap();
//!
//! let registry = ClassRegistry::new();
//! let ctx = CodecContext::new(&registry);
//! let yolo = Format::Yolo.codec().encode(&doc, &ctx).unwrap();
//! assert!(String::from_utf8(yolo).unwrap().starts_with("0 0.117188"));
//! ```

mod bbox;
pub mod codec;
mod coord;
pub mod io_createml_json;
pub mod io_voc_xml;
pub mod io_yolo;
mod model;
mod registry;
mod shape;
mod space;

pub use bbox::BBoxXYXY;
pub use codec::{AnyCodec, Codec, CodecContext, CodecOptions, Format, PolygonPolicy};
pub use coord::{Coord, Point};
pub use io_createml_json::CreateMlCodec;
pub use io_voc_xml::VocCodec;
pub use io_yolo::YoloCodec;
pub use model::{Document, ImageSize, LabeledShape};
pub use registry::ClassRegistry;
pub use shape::Shape;
pub use space::{Normalized, Pixel};
