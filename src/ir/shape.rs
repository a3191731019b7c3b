//! Shape primitives and the pure geometry the codecs rely on.
//!
//! Nothing in here knows about file formats. Codecs decide *when* to clamp
//! and check; this module only answers *what* a shape looks like after.

use serde::{Deserialize, Serialize};

use super::bbox::BBoxXYXY;
use super::coord::Point;
use super::model::ImageSize;
use super::space::Pixel;

/// A labeled region in absolute pixel coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "geometry", rename_all = "snake_case")]
pub enum Shape {
    /// Axis-aligned box; `min` is the top-left corner, `max` the bottom-right.
    Rectangle(BBoxXYXY<Pixel>),
    /// Closed polygon. Point order defines the edges and is never changed.
    Polygon(Vec<Point>),
}

impl Shape {
    pub fn rectangle(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Shape::Rectangle(BBoxXYXY::from_xyxy(xmin, ymin, xmax, ymax))
    }

    pub fn polygon(points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        Shape::Polygon(
            points
                .into_iter()
                .map(|(x, y)| Point::new(x, y))
                .collect(),
        )
    }

    /// Short name used in reports and errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Shape::Rectangle(_) => "rectangle",
            Shape::Polygon(_) => "polygon",
        }
    }

    /// Axis-aligned bounding box. Identity for rectangles.
    ///
    /// An empty polygon has a zero-sized box at the origin.
    pub fn bounds(&self) -> BBoxXYXY<Pixel> {
        match self {
            Shape::Rectangle(bbox) => *bbox,
            Shape::Polygon(points) if points.is_empty() => BBoxXYXY::from_xyxy(0.0, 0.0, 0.0, 0.0),
            Shape::Polygon(points) => {
                let mut bounds = BBoxXYXY::from_xyxy(
                    f64::INFINITY,
                    f64::INFINITY,
                    f64::NEG_INFINITY,
                    f64::NEG_INFINITY,
                );
                for point in points {
                    bounds.min.x = bounds.min.x.min(point.x);
                    bounds.min.y = bounds.min.y.min(point.y);
                    bounds.max.x = bounds.max.x.max(point.x);
                    bounds.max.y = bounds.max.y.max(point.y);
                }
                bounds
            }
        }
    }

    /// Clips every coordinate into `[0, width] x [0, height]`.
    ///
    /// Points keep their order; only out-of-range coordinates move, each to
    /// the nearest image edge.
    pub fn clamp_to(&self, size: ImageSize) -> Shape {
        let (w, h) = size.as_f64();
        match self {
            Shape::Rectangle(bbox) => Shape::Rectangle(bbox.clamped(w, h)),
            Shape::Polygon(points) => {
                Shape::Polygon(points.iter().map(|p| p.clamped(w, h)).collect())
            }
        }
    }

    /// True for shapes with no area.
    ///
    /// Rectangles need positive width and height. Polygons need at least
    /// three distinct points and a bounding box with positive area.
    pub fn is_degenerate(&self) -> bool {
        match self {
            Shape::Rectangle(bbox) => !bbox.has_area(),
            Shape::Polygon(points) => distinct_points(points) < 3 || !self.bounds().has_area(),
        }
    }

    pub fn is_finite(&self) -> bool {
        match self {
            Shape::Rectangle(bbox) => bbox.is_finite(),
            Shape::Polygon(points) => points.iter().all(Point::is_finite),
        }
    }

    /// True when every coordinate lies inside `[0, width] x [0, height]`.
    pub fn lies_within(&self, size: ImageSize) -> bool {
        let (w, h) = size.as_f64();
        let inside = |p: &Point| (0.0..=w).contains(&p.x) && (0.0..=h).contains(&p.y);
        match self {
            Shape::Rectangle(bbox) => inside(&bbox.min) && inside(&bbox.max),
            Shape::Polygon(points) => points.iter().all(inside),
        }
    }
}

impl From<BBoxXYXY<Pixel>> for Shape {
    fn from(bbox: BBoxXYXY<Pixel>) -> Self {
        Shape::Rectangle(bbox)
    }
}

fn distinct_points(points: &[Point]) -> usize {
    let mut keys: Vec<(f64, f64)> = points.iter().map(|p| (p.x, p.y)).collect();
    keys.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    keys.dedup();
    keys.len()
}
