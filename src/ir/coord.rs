//! Typed 2D points.

use serde::{Deserialize, Serialize};
use std::marker::PhantomData;

use super::space::Pixel;

/// A 2D coordinate tagged with its coordinate space.
///
/// `TSpace` is [`Pixel`] or [`Normalized`](super::Normalized).
#[derive(Clone, Copy, PartialEq)]
pub struct Coord<TSpace> {
    pub x: f64,
    pub y: f64,
    _space: PhantomData<TSpace>,
}

/// A point in absolute pixel coordinates.
pub type Point = Coord<Pixel>;

impl<TSpace> Coord<TSpace> {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            _space: PhantomData,
        }
    }

    /// Returns true if both coordinates are finite (not NaN or infinite).
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Moves each coordinate into `[0, max_x]` / `[0, max_y]`.
    ///
    /// In-range coordinates are returned untouched.
    #[inline]
    pub fn clamped(&self, max_x: f64, max_y: f64) -> Self {
        Self::new(self.x.clamp(0.0, max_x), self.y.clamp(0.0, max_y))
    }
}

impl<TSpace> std::fmt::Debug for Coord<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Coord").field(&self.x).field(&self.y).finish()
    }
}

impl<TSpace> Default for Coord<TSpace> {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

// Manual impls so TSpace does not need Serialize/Deserialize bounds.
impl<TSpace> Serialize for Coord<TSpace> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeTuple;
        let mut state = serializer.serialize_tuple(2)?;
        state.serialize_element(&self.x)?;
        state.serialize_element(&self.y)?;
        state.end()
    }
}

impl<'de, TSpace> Deserialize<'de> for Coord<TSpace> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (x, y) = <(f64, f64)>::deserialize(deserializer)?;
        Ok(Coord::new(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coord_is_finite() {
        assert!(Point::new(10.0, 20.0).is_finite());
        assert!(!Point::new(f64::NAN, 20.0).is_finite());
        assert!(!Point::new(10.0, f64::INFINITY).is_finite());
    }

    #[test]
    fn test_clamped_moves_only_out_of_range_axes() {
        let p = Point::new(-3.0, 40.0).clamped(100.0, 30.0);
        assert_eq!(p.x, 0.0);
        assert_eq!(p.y, 30.0);

        let inside = Point::new(12.5, 7.25).clamped(100.0, 30.0);
        assert_eq!(inside, Point::new(12.5, 7.25));
    }

    #[test]
    fn test_point_serializes_as_pair() {
        let json = serde_json::to_string(&Point::new(1.5, 2.0)).expect("serialize");
        assert_eq!(json, "[1.5,2.0]");
        let back: Point = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, Point::new(1.5, 2.0));
    }
}
