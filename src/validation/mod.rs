//! Document validation.
//!
//! Checks the invariants every document must satisfy before it is encoded
//! and after it is decoded:
//! - the image size is positive
//! - every shape is finite, inside the image and has area
//! - every shape has a class name that fits on one `classes.txt` line

mod report;

pub use report::{IssueCode, IssueContext, Severity, ValidationIssue, ValidationReport};

use crate::ir::{ClassRegistry, Document, Shape};

/// Options for validation behavior.
#[derive(Clone, Debug, Default)]
pub struct ValidateOptions {
    /// Report warnings as errors.
    pub strict: bool,
}

/// Validates a document and returns every issue found.
///
/// Nothing is clamped: a shape outside the image is reported, not fixed.
pub fn validate_document(document: &Document, opts: &ValidateOptions) -> ValidationReport {
    let mut report = ValidationReport::new();

    validate_image(document, &mut report);
    validate_shapes(document, &mut report);

    apply_strict(report, opts)
}

/// Like [`validate_document`], additionally warning about class names the
/// registry does not know yet (they would be appended on YOLO encode).
pub fn validate_document_with_registry(
    document: &Document,
    registry: &ClassRegistry,
    opts: &ValidateOptions,
) -> ValidationReport {
    let mut report = validate_document(document, &ValidateOptions::default());

    for (index, labeled) in document.shapes.iter().enumerate() {
        if !labeled.class_name.is_empty() && registry.lookup(&labeled.class_name).is_none() {
            report.add(ValidationIssue::warning(
                IssueCode::UnregisteredClass,
                format!("Class '{}' is not in the class list", labeled.class_name),
                IssueContext::Shape { index },
            ));
        }
    }

    apply_strict(report, opts)
}

fn apply_strict(mut report: ValidationReport, opts: &ValidateOptions) -> ValidationReport {
    if opts.strict {
        report.promote_warnings();
    }
    report
}

/// `classes.txt` stores one trimmed name per line.
fn is_storable_class_name(name: &str) -> bool {
    name.trim() == name && !name.contains(['\n', '\r'])
}

fn validate_image(document: &Document, report: &mut ValidationReport) {
    if !document.image_size.is_valid() {
        report.add(ValidationIssue::error(
            IssueCode::InvalidImageSize,
            format!(
                "Invalid image size {} (must be positive)",
                document.image_size
            ),
            IssueContext::Document,
        ));
    }

    if document.image_path.trim().is_empty() {
        report.add(ValidationIssue::warning(
            IssueCode::EmptyImagePath,
            "Empty image path",
            IssueContext::Document,
        ));
    }
}

fn validate_shapes(document: &Document, report: &mut ValidationReport) {
    let size = document.image_size;

    for (index, labeled) in document.shapes.iter().enumerate() {
        let context = IssueContext::Shape { index };

        if labeled.class_name.trim().is_empty() {
            report.add(ValidationIssue::error(
                IssueCode::EmptyClassName,
                "Empty class name",
                context,
            ));
        } else if !is_storable_class_name(&labeled.class_name) {
            report.add(ValidationIssue::error(
                IssueCode::InvalidClassName,
                format!(
                    "Class name {:?} has a line break or surrounding whitespace",
                    labeled.class_name
                ),
                context,
            ));
        }

        let shape = &labeled.shape;
        if !shape.is_finite() {
            report.add(ValidationIssue::error(
                IssueCode::ShapeNotFinite,
                format!("Non-finite coordinates in {}", shape.kind_name()),
                context,
            ));
            continue; // Further geometry checks are meaningless.
        }

        if let Shape::Polygon(points) = shape {
            if points.len() < 3 {
                report.add(ValidationIssue::error(
                    IssueCode::PolygonTooFewPoints,
                    format!("Polygon has {} point(s), needs at least 3", points.len()),
                    context,
                ));
                continue;
            }
        }

        if shape.is_degenerate() {
            let bounds = shape.bounds();
            report.add(ValidationIssue::error(
                IssueCode::DegenerateShape,
                format!(
                    "Degenerate {}: bounds ({}, {}, {}, {}) have no area",
                    shape.kind_name(),
                    bounds.xmin(),
                    bounds.ymin(),
                    bounds.xmax(),
                    bounds.ymax()
                ),
                context,
            ));
        }

        if size.is_valid() && !shape.lies_within(size) {
            let bounds = shape.bounds();
            report.add(ValidationIssue::error(
                IssueCode::ShapeOutOfBounds,
                format!(
                    "{} ({:.1}, {:.1}, {:.1}, {:.1}) extends outside image bounds (0, 0, {}, {})",
                    shape.kind_name(),
                    bounds.xmin(),
                    bounds.ymin(),
                    bounds.xmax(),
                    bounds.ymax(),
                    size.width,
                    size.height
                ),
                context,
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ImageSize, LabeledShape};

    fn valid_document() -> Document {
        let mut doc = Document::new("image.jpg", ImageSize::new(640, 480).expect("size"));
        doc.shapes.push(LabeledShape::new(
            Shape::rectangle(10.0, 20.0, 100.0, 200.0),
            "person",
        ));
        doc
    }

    fn codes(report: &ValidationReport) -> Vec<IssueCode> {
        report.issues.iter().map(|i| i.code).collect()
    }

    #[test]
    fn test_valid_document() {
        let report = validate_document(&valid_document(), &ValidateOptions::default());
        assert!(
            report.is_clean(),
            "Expected no issues, got: {:?}",
            report.issues
        );
    }

    #[test]
    fn test_invalid_image_size() {
        let mut doc = valid_document();
        doc.shapes.clear();
        doc.image_size.width = 0;

        let report = validate_document(&doc, &ValidateOptions::default());
        assert_eq!(report.error_count(), 1);
        assert_eq!(codes(&report), vec![IssueCode::InvalidImageSize]);
    }

    #[test]
    fn test_shape_out_of_bounds() {
        let mut doc = valid_document();
        doc.shapes[0].shape = Shape::rectangle(600.0, 400.0, 800.0, 600.0);

        let report = validate_document(&doc, &ValidateOptions::default());
        assert_eq!(codes(&report), vec![IssueCode::ShapeOutOfBounds]);
    }

    #[test]
    fn test_degenerate_shape() {
        let mut doc = valid_document();
        doc.shapes[0].shape = Shape::rectangle(10.0, 20.0, 10.0, 200.0);

        let report = validate_document(&doc, &ValidateOptions::default());
        assert_eq!(codes(&report), vec![IssueCode::DegenerateShape]);
        assert_eq!(
            report.first_error().map(|i| i.context.location()),
            Some(crate::error::Location::Shape(1))
        );
    }

    #[test]
    fn test_shape_not_finite_skips_other_checks() {
        let mut doc = valid_document();
        doc.shapes[0].shape = Shape::rectangle(f64::NAN, 20.0, 100.0, 200.0);

        let report = validate_document(&doc, &ValidateOptions::default());
        assert_eq!(codes(&report), vec![IssueCode::ShapeNotFinite]);
    }

    #[test]
    fn test_polygon_too_few_points() {
        let mut doc = valid_document();
        doc.shapes[0].shape = Shape::polygon([(1.0, 1.0), (5.0, 5.0)]);

        let report = validate_document(&doc, &ValidateOptions::default());
        assert_eq!(codes(&report), vec![IssueCode::PolygonTooFewPoints]);
    }

    #[test]
    fn test_empty_class_name() {
        let mut doc = valid_document();
        doc.shapes[0].class_name = String::new();

        let report = validate_document(&doc, &ValidateOptions::default());
        assert_eq!(codes(&report), vec![IssueCode::EmptyClassName]);
    }

    #[test]
    fn test_empty_image_path_is_warning() {
        let mut doc = valid_document();
        doc.image_path = String::new();

        let report = validate_document(&doc, &ValidateOptions::default());
        assert!(report.is_ok());
        assert_eq!(report.warning_count(), 1);
    }

    #[test]
    fn test_strict_promotes_warnings() {
        let mut doc = valid_document();
        doc.image_path = String::new();

        let report = validate_document(&doc, &ValidateOptions { strict: true });
        assert!(!report.is_ok());
        assert_eq!(report.warning_count(), 0);
        assert_eq!(
            report.first_error().map(|i| i.code),
            Some(IssueCode::EmptyImagePath)
        );

        let registry = ClassRegistry::from_names(["dog"]);
        let report =
            validate_document_with_registry(&valid_document(), &registry, &ValidateOptions { strict: true });
        assert_eq!(report.error_count(), 1);
        assert_eq!(codes(&report), vec![IssueCode::UnregisteredClass]);
    }

    #[test]
    fn test_class_names_must_fit_one_line() {
        for name in ["cat\ndog", "cat\r", " cat", "cat\t"] {
            let mut doc = valid_document();
            doc.shapes[0].class_name = name.to_string();

            let report = validate_document(&doc, &ValidateOptions::default());
            assert_eq!(codes(&report), vec![IssueCode::InvalidClassName], "{name:?}");
            assert!(!report.is_ok());
        }

        let mut doc = valid_document();
        doc.shapes[0].class_name = "traffic light".to_string();
        assert!(validate_document(&doc, &ValidateOptions::default()).is_clean());
    }

    #[test]
    fn test_unregistered_class_warning() {
        let registry = ClassRegistry::from_names(["dog"]);
        let report =
            validate_document_with_registry(&valid_document(), &registry, &ValidateOptions::default());
        assert!(report.is_ok());
        assert_eq!(codes(&report), vec![IssueCode::UnregisteredClass]);
    }
}
