//! Axis-aligned boxes in canonical XYXY layout.

use serde::{Deserialize, Serialize};

use super::coord::Coord;
use super::space::{Normalized, Pixel};

/// An axis-aligned bounding box stored as (xmin, ymin, xmax, ymax).
///
/// Construction does not enforce `min < max`. Inverted or zero-area boxes
/// can exist in memory so that validation can report them; codecs and
/// [`Document::check_invariants`](super::Document::check_invariants) reject
/// them at the boundaries.
#[derive(Clone, Copy, PartialEq)]
pub struct BBoxXYXY<TSpace> {
    pub min: Coord<TSpace>,
    pub max: Coord<TSpace>,
}

impl<TSpace> BBoxXYXY<TSpace> {
    #[inline]
    pub fn new(min: Coord<TSpace>, max: Coord<TSpace>) -> Self {
        Self { min, max }
    }

    #[inline]
    pub fn from_xyxy(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            min: Coord::new(xmin, ymin),
            max: Coord::new(xmax, ymax),
        }
    }

    /// Builds a box from its top-left corner and size.
    #[inline]
    pub fn from_xywh(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::from_xyxy(x, y, x + width, y + height)
    }

    /// Builds a box from its center and size (YOLO and CreateML layout).
    #[inline]
    pub fn from_cxcywh(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Self::from_xyxy(cx - half_w, cy - half_h, cx + half_w, cy + half_h)
    }

    #[inline]
    pub fn xmin(&self) -> f64 {
        self.min.x
    }

    #[inline]
    pub fn ymin(&self) -> f64 {
        self.min.y
    }

    #[inline]
    pub fn xmax(&self) -> f64 {
        self.max.x
    }

    #[inline]
    pub fn ymax(&self) -> f64 {
        self.max.y
    }

    /// Width of the box. Negative if the box is inverted.
    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// Height of the box. Negative if the box is inverted.
    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Returns (center_x, center_y, width, height).
    #[inline]
    pub fn to_cxcywh(&self) -> (f64, f64, f64, f64) {
        (
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            self.width(),
            self.height(),
        )
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// True when `min <= max` on both axes.
    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y
    }

    /// True when the box has strictly positive width and height.
    #[inline]
    pub fn has_area(&self) -> bool {
        self.min.x < self.max.x && self.min.y < self.max.y
    }

    /// Clips both corners into `[0, max_x] x [0, max_y]`.
    #[inline]
    pub fn clamped(&self, max_x: f64, max_y: f64) -> Self {
        Self::new(self.min.clamped(max_x, max_y), self.max.clamped(max_x, max_y))
    }
}

impl<TSpace> std::fmt::Debug for BBoxXYXY<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BBoxXYXY")
            .field("xmin", &self.min.x)
            .field("ymin", &self.min.y)
            .field("xmax", &self.max.x)
            .field("ymax", &self.max.y)
            .finish()
    }
}

impl<TSpace> Serialize for BBoxXYXY<TSpace> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("BBoxXYXY", 4)?;
        state.serialize_field("xmin", &self.min.x)?;
        state.serialize_field("ymin", &self.min.y)?;
        state.serialize_field("xmax", &self.max.x)?;
        state.serialize_field("ymax", &self.max.y)?;
        state.end()
    }
}

impl<'de, TSpace> Deserialize<'de> for BBoxXYXY<TSpace> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct BBoxData {
            xmin: f64,
            ymin: f64,
            xmax: f64,
            ymax: f64,
        }
        let data = BBoxData::deserialize(deserializer)?;
        Ok(BBoxXYXY::from_xyxy(
            data.xmin, data.ymin, data.xmax, data.ymax,
        ))
    }
}

impl BBoxXYXY<Pixel> {
    /// Divides by the image size, giving image-relative fractions.
    pub fn to_normalized(&self, image_width: f64, image_height: f64) -> BBoxXYXY<Normalized> {
        BBoxXYXY::from_xyxy(
            self.min.x / image_width,
            self.min.y / image_height,
            self.max.x / image_width,
            self.max.y / image_height,
        )
    }

    /// Rounds every corner to the nearest integer pixel.
    pub fn rounded(&self) -> Self {
        Self::from_xyxy(
            self.min.x.round(),
            self.min.y.round(),
            self.max.x.round(),
            self.max.y.round(),
        )
    }
}

impl BBoxXYXY<Normalized> {
    /// Multiplies by the image size, giving absolute pixels.
    pub fn to_pixel(&self, image_width: f64, image_height: f64) -> BBoxXYXY<Pixel> {
        BBoxXYXY::from_xyxy(
            self.min.x * image_width,
            self.min.y * image_height,
            self.max.x * image_width,
            self.max.y * image_height,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_from_cxcywh() {
        let bbox: BBoxXYXY<Pixel> = BBoxXYXY::from_cxcywh(60.0, 35.0, 100.0, 50.0);
        assert_eq!(bbox.xmin(), 10.0);
        assert_eq!(bbox.ymin(), 10.0);
        assert_eq!(bbox.xmax(), 110.0);
        assert_eq!(bbox.ymax(), 60.0);
        assert_eq!(bbox.to_cxcywh(), (60.0, 35.0, 100.0, 50.0));
    }

    #[test]
    fn test_bbox_dimensions() {
        let bbox: BBoxXYXY<Pixel> = BBoxXYXY::from_xywh(10.0, 20.0, 90.0, 60.0);
        assert_eq!(bbox.width(), 90.0);
        assert_eq!(bbox.height(), 60.0);
        assert_eq!(bbox.area(), 5400.0);
    }

    #[test]
    fn test_bbox_ordering_and_area() {
        let ordered: BBoxXYXY<Pixel> = BBoxXYXY::from_xyxy(10.0, 20.0, 100.0, 80.0);
        assert!(ordered.is_ordered());
        assert!(ordered.has_area());

        let flat: BBoxXYXY<Pixel> = BBoxXYXY::from_xyxy(10.0, 20.0, 10.0, 80.0);
        assert!(flat.is_ordered());
        assert!(!flat.has_area());

        let inverted: BBoxXYXY<Pixel> = BBoxXYXY::from_xyxy(100.0, 80.0, 10.0, 20.0);
        assert!(!inverted.is_ordered());
    }

    #[test]
    fn test_bbox_clamped() {
        let bbox: BBoxXYXY<Pixel> = BBoxXYXY::from_xyxy(-5.0, 10.0, 700.0, 500.0);
        let clamped = bbox.clamped(640.0, 480.0);
        assert_eq!(clamped, BBoxXYXY::from_xyxy(0.0, 10.0, 640.0, 480.0));
    }

    #[test]
    fn test_normalization_roundtrip() {
        let bbox: BBoxXYXY<Pixel> = BBoxXYXY::from_xyxy(10.0, 10.0, 110.0, 60.0);
        let back = bbox.to_normalized(512.0, 512.0).to_pixel(512.0, 512.0);
        assert!((back.xmax() - 110.0).abs() < 1e-9);
        assert!((back.ymin() - 10.0).abs() < 1e-9);
    }
}
