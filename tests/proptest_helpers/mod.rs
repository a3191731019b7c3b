#![allow(dead_code)]

use labelcodec::ir::{Document, ImageSize, LabeledShape, Shape};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

/// VOC stores integer corners; rounding (plus the anti-collapse nudge) moves
/// a corner by at most one pixel.
pub const EPS_VOC: f64 = 1.0;
pub const EPS_CREATEML: f64 = 1e-9;

/// YOLO stores 6 decimals of a fraction of the image side.
pub fn eps_yolo(size: ImageSize) -> f64 {
    f64::max(1.0, size.width.max(size.height) as f64 * 1e-5)
}

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

pub fn arb_image_size() -> impl Strategy<Value = ImageSize> {
    (16u32..=2048, 16u32..=2048).prop_map(|(width, height)| ImageSize { width, height })
}

pub fn arb_class_name() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["cat", "dog", "person", "traffic light", "a&b <c>"])
        .prop_map(String::from)
}

/// A rectangle inside the image, at least one pixel on each side.
pub fn arb_rectangle(size: ImageSize) -> impl Strategy<Value = Shape> {
    let (w, h) = size.as_f64();
    (0.0..(w - 1.0), 0.0..(h - 1.0))
        .prop_flat_map(move |(x0, y0)| (Just(x0), Just(y0), 1.0..=(w - x0), 1.0..=(h - y0)))
        .prop_map(|(x0, y0, bw, bh)| Shape::rectangle(x0, y0, x0 + bw, y0 + bh))
}

/// A non-degenerate polygon inside the image whose bounds span at least one
/// pixel on each side.
pub fn arb_polygon(size: ImageSize) -> impl Strategy<Value = Shape> {
    let (w, h) = size.as_f64();
    prop::collection::vec((0.0..=w, 0.0..=h), 3..8)
        .prop_map(|points: Vec<(f64, f64)>| Shape::polygon(points))
        .prop_filter("polygon must have area", |shape| {
            let bounds = shape.bounds();
            !shape.is_degenerate() && bounds.width() >= 1.0 && bounds.height() >= 1.0
        })
}

/// A document with only rectangles.
pub fn arb_rect_document(max_shapes: usize) -> impl Strategy<Value = Document> {
    arb_image_size().prop_flat_map(move |size| {
        prop::collection::vec(
            (arb_rectangle(size), arb_class_name(), any::<bool>()),
            0..=max_shapes,
        )
        .prop_map(move |shapes| build_document(size, shapes))
    })
}

/// A document mixing rectangles and polygons.
pub fn arb_mixed_document(max_shapes: usize) -> impl Strategy<Value = Document> {
    arb_image_size().prop_flat_map(move |size| {
        let shape = prop_oneof![arb_rectangle(size).boxed(), arb_polygon(size).boxed()];
        prop::collection::vec((shape, arb_class_name(), any::<bool>()), 1..=max_shapes)
            .prop_map(move |shapes| build_document(size, shapes))
    })
}

fn build_document(size: ImageSize, shapes: Vec<(Shape, String, bool)>) -> Document {
    let mut document = Document::new("images/sample.jpg", size);
    for (shape, class_name, difficult) in shapes {
        document
            .add_shape(LabeledShape::new(shape, class_name).with_difficult(difficult))
            .expect("generated shape lies inside the image");
    }
    document
}

/// Compares class names and bounding boxes shape by shape.
pub fn assert_boxes_close(expected: &Document, actual: &Document, eps: f64) -> Result<(), String> {
    if expected.shapes.len() != actual.shapes.len() {
        return Err(format!(
            "shape count differs: expected {}, got {}",
            expected.shapes.len(),
            actual.shapes.len()
        ));
    }

    for (idx, (want, got)) in expected.shapes.iter().zip(&actual.shapes).enumerate() {
        if want.class_name != got.class_name {
            return Err(format!(
                "shape {idx}: class '{}' became '{}'",
                want.class_name, got.class_name
            ));
        }
        let a = want.shape.bounds();
        let b = got.shape.bounds();
        let pairs = [
            ("xmin", a.xmin(), b.xmin()),
            ("ymin", a.ymin(), b.ymin()),
            ("xmax", a.xmax(), b.xmax()),
            ("ymax", a.ymax(), b.ymax()),
        ];
        for (name, x, y) in pairs {
            if (x - y).abs() > eps {
                return Err(format!(
                    "shape {idx}: {name} {x} vs {y} exceeds tolerance {eps}"
                ));
            }
        }
    }
    Ok(())
}
