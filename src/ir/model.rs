//! The annotation document: one image and its ordered labeled shapes.
//!
//! Every codec decodes into a [`Document`] and encodes from one. A document
//! belongs to the caller; codecs read it during a call and keep nothing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::shape::Shape;
use crate::error::{LabelError, Location, MEMORY_ORIGIN};
use crate::validation::{self, ValidateOptions};

/// Pixel dimensions of an image. Both sides are positive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    /// Creates a size, rejecting zero-length sides.
    pub fn new(width: u32, height: u32) -> Result<Self, LabelError> {
        if width == 0 || height == 0 {
            return Err(LabelError::invariant(
                MEMORY_ORIGIN,
                Location::Document,
                format!("image size {}x{} must be positive", width, height),
            ));
        }
        Ok(Self { width, height })
    }

    #[inline]
    pub fn as_f64(&self) -> (f64, f64) {
        (self.width as f64, self.height as f64)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Parses `WIDTHxHEIGHT`, e.g. `640x480`.
impl FromStr for ImageSize {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (w, h) = raw
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{raw}'"))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid width '{w}'"))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|_| format!("invalid height '{h}'"))?;
        ImageSize::new(width, height).map_err(|err| err.to_string())
    }
}

/// A shape with its class label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabeledShape {
    pub shape: Shape,

    /// Class name; resolved to an index only by index-based formats (YOLO).
    pub class_name: String,

    /// VOC "difficult" flag (hard or heavily occluded object).
    #[serde(default)]
    pub difficult: bool,
}

impl LabeledShape {
    pub fn new(shape: impl Into<Shape>, class_name: impl Into<String>) -> Self {
        Self {
            shape: shape.into(),
            class_name: class_name.into(),
            difficult: false,
        }
    }

    pub fn with_difficult(mut self, difficult: bool) -> Self {
        self.difficult = difficult;
        self
    }
}

/// One image's full annotation state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Path or file name of the image as the label file refers to it.
    pub image_path: String,

    pub image_size: ImageSize,

    /// Set when a human has reviewed the labels.
    #[serde(default)]
    pub verified: bool,

    /// Shapes in save order.
    #[serde(default)]
    pub shapes: Vec<LabeledShape>,
}

impl Document {
    pub fn new(image_path: impl Into<String>, image_size: ImageSize) -> Self {
        Self {
            image_path: image_path.into(),
            image_size,
            verified: false,
            shapes: Vec::new(),
        }
    }

    pub fn with_verified(mut self, verified: bool) -> Self {
        self.verified = verified;
        self
    }

    /// Last path component of `image_path`, accepting `/` and `\` separators.
    pub fn file_name(&self) -> &str {
        self.image_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.image_path)
    }

    /// Clamps `labeled` into the image and appends it.
    ///
    /// Returns the index of the new shape. A shape that has no area after
    /// clamping is rejected with [`LabelError::InvariantViolation`] and the
    /// document is left unchanged.
    pub fn add_shape(&mut self, mut labeled: LabeledShape) -> Result<usize, LabelError> {
        let location = Location::Shape(self.shapes.len() + 1);
        if !labeled.shape.is_finite() {
            return Err(LabelError::invariant(
                &self.image_path,
                location,
                "shape has non-finite coordinates",
            ));
        }

        labeled.shape = labeled.shape.clamp_to(self.image_size);
        if labeled.shape.is_degenerate() {
            return Err(LabelError::invariant(
                &self.image_path,
                location,
                format!(
                    "{} '{}' has no area inside {} image",
                    labeled.shape.kind_name(),
                    labeled.class_name,
                    self.image_size
                ),
            ));
        }

        self.shapes.push(labeled);
        Ok(self.shapes.len() - 1)
    }

    /// Removes and returns the shape at `index` (0-based), keeping order.
    pub fn remove_shape(&mut self, index: usize) -> Option<LabeledShape> {
        (index < self.shapes.len()).then(|| self.shapes.remove(index))
    }

    /// Distinct class names in first-use order.
    pub fn class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for labeled in &self.shapes {
            if !names.contains(&labeled.class_name.as_str()) {
                names.push(&labeled.class_name);
            }
        }
        names
    }

    /// Fails with [`LabelError::InvariantViolation`] on the first error-level
    /// validation issue: invalid image size, non-finite, out-of-bounds or
    /// degenerate shapes, empty or multi-line class names.
    ///
    /// Nothing is clamped or dropped here.
    pub fn check_invariants(&self) -> Result<(), LabelError> {
        let report = validation::validate_document(self, &ValidateOptions::default());
        match report.first_error() {
            None => Ok(()),
            Some(issue) => Err(LabelError::invariant(
                &self.image_path,
                issue.context.location(),
                issue.message.clone(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> Document {
        Document::new("images/cat.jpg", ImageSize::new(512, 512).expect("size"))
    }

    #[test]
    fn image_size_rejects_zero() {
        assert!(ImageSize::new(0, 10).is_err());
        assert!(ImageSize::new(10, 0).is_err());
        assert_eq!(
            "640x480".parse::<ImageSize>(),
            Ok(ImageSize {
                width: 640,
                height: 480
            })
        );
        assert!("640by480".parse::<ImageSize>().is_err());
        assert!("0x480".parse::<ImageSize>().is_err());
    }

    #[test]
    fn file_name_strips_directories() {
        assert_eq!(doc().file_name(), "cat.jpg");
        let windows = Document::new(r"C:\data\dog.png", ImageSize::new(1, 1).expect("size"));
        assert_eq!(windows.file_name(), "dog.png");
    }

    #[test]
    fn add_shape_clamps_into_image() {
        let mut d = doc();
        let idx = d
            .add_shape(LabeledShape::new(
                Shape::rectangle(-20.0, 10.0, 600.0, 60.0),
                "cat",
            ))
            .expect("add shape");
        assert_eq!(idx, 0);
        assert_eq!(d.shapes[0].shape, Shape::rectangle(0.0, 10.0, 512.0, 60.0));
    }

    #[test]
    fn add_shape_rejects_collapsed_shape() {
        let mut d = doc();
        let err = d
            .add_shape(LabeledShape::new(
                Shape::rectangle(520.0, 10.0, 600.0, 60.0),
                "cat",
            ))
            .unwrap_err();
        assert!(matches!(
            err,
            LabelError::InvariantViolation {
                location: Location::Shape(1),
                ..
            }
        ));
        assert!(d.shapes.is_empty());
    }

    #[test]
    fn check_invariants_does_not_clamp() {
        let mut d = doc();
        d.shapes.push(LabeledShape::new(
            Shape::rectangle(10.0, 10.0, 10.0, 60.0),
            "cat",
        ));
        let err = d.check_invariants().unwrap_err();
        assert!(matches!(err, LabelError::InvariantViolation { .. }));
        assert_eq!(d.shapes[0].shape, Shape::rectangle(10.0, 10.0, 10.0, 60.0));
    }

    #[test]
    fn class_names_keep_first_use_order() {
        let mut d = doc();
        for name in ["dog", "cat", "dog"] {
            d.add_shape(LabeledShape::new(Shape::rectangle(1.0, 1.0, 5.0, 5.0), name))
                .expect("add");
        }
        assert_eq!(d.class_names(), vec!["dog", "cat"]);
        assert_eq!(d.remove_shape(1).map(|s| s.class_name), Some("cat".into()));
        assert!(d.remove_shape(5).is_none());
    }
}
