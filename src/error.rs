use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::conversion::BatchFailure;
use crate::validation::ValidationReport;

/// Origin used for records that did not come from a named file.
pub const MEMORY_ORIGIN: &str = "<memory>";

/// Where inside a label file a failing record lives.
///
/// All indices are 1-based so they match what an editor shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Location {
    /// The file as a whole (root element, top-level array, class list).
    Document,
    /// A line of a text format (YOLO labels, class lists).
    Line(usize),
    /// An `<object>` element of a VOC file.
    Object(usize),
    /// An element of a CreateML top-level array.
    Entry(usize),
    /// An annotation nested inside a CreateML entry.
    EntryAnnotation { entry: usize, annotation: usize },
    /// A shape of an in-memory document.
    Shape(usize),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Document => write!(f, "document"),
            Location::Line(line) => write!(f, "line {}", line),
            Location::Object(index) => write!(f, "object {}", index),
            Location::Entry(index) => write!(f, "entry {}", index),
            Location::EntryAnnotation { entry, annotation } => {
                write!(f, "entry {} annotation {}", entry, annotation)
            }
            Location::Shape(index) => write!(f, "shape {}", index),
        }
    }
}

/// The main error type for labelcodec operations.
#[derive(Debug, Error)]
pub enum LabelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed document {origin} ({location}): {message}")]
    MalformedDocument {
        origin: String,
        location: Location,
        message: String,
    },

    #[error(
        "Unknown class index {index} in {origin} ({location}); class registry has {class_count} class(es)"
    )]
    UnknownClassIndex {
        origin: String,
        location: Location,
        index: i64,
        class_count: usize,
    },

    #[error("Invariant violation in {origin} ({location}): {message}")]
    InvariantViolation {
        origin: String,
        location: Location,
        message: String,
    },

    #[error("Unsupported shape in {format} output ({location}): {kind} cannot be represented")]
    UnsupportedShape {
        format: &'static str,
        location: Location,
        kind: &'static str,
    },

    #[error("No image size known for {origin}")]
    MissingImageSize { origin: String },

    #[error("Failed to write CreateML JSON for {origin}: {source}")]
    CreateMlJsonWrite {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid class list {origin}: {message}")]
    ClassListInvalid { origin: String, message: String },

    #[error("Failed to parse data.yaml {origin}: {source}")]
    DataYamlParse {
        origin: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to read image dimensions from {path}: {source}")]
    ImageDimensionRead {
        path: PathBuf,
        #[source]
        source: imagesize::ImageError,
    },

    #[error("Failed to render report as JSON: {0}")]
    ReportJson(#[source] serde_json::Error),

    #[error("Could not detect label format of {path}; pass --from explicitly")]
    FormatNotDetected { path: PathBuf },

    #[error("Validation failed with {error_count} error(s) and {warning_count} warning(s)")]
    ValidationFailed {
        error_count: usize,
        warning_count: usize,
        report: ValidationReport,
    },

    #[error("Batch conversion failed for {} of {total} document(s)", .failures.len())]
    BatchFailed {
        total: usize,
        failures: Vec<BatchFailure>,
    },
}

impl LabelError {
    /// Re-anchors a record-level error at `origin`/`location`.
    ///
    /// Errors raised without file context (for example by
    /// [`ClassRegistry::name_at`](crate::ir::ClassRegistry::name_at)) carry a
    /// placeholder origin; codecs call this to attach the record identity.
    /// Variants without a location are returned unchanged.
    pub fn at(self, origin: &str, location: Location) -> Self {
        match self {
            LabelError::MalformedDocument { message, .. } => LabelError::MalformedDocument {
                origin: origin.to_string(),
                location,
                message,
            },
            LabelError::UnknownClassIndex {
                index, class_count, ..
            } => LabelError::UnknownClassIndex {
                origin: origin.to_string(),
                location,
                index,
                class_count,
            },
            LabelError::InvariantViolation { message, .. } => LabelError::InvariantViolation {
                origin: origin.to_string(),
                location,
                message,
            },
            LabelError::UnsupportedShape { format, kind, .. } => LabelError::UnsupportedShape {
                format,
                location,
                kind,
            },
            other => other,
        }
    }

    pub(crate) fn malformed(
        origin: &str,
        location: Location,
        message: impl Into<String>,
    ) -> Self {
        LabelError::MalformedDocument {
            origin: origin.to_string(),
            location,
            message: message.into(),
        }
    }

    pub(crate) fn invariant(
        origin: &str,
        location: Location,
        message: impl Into<String>,
    ) -> Self {
        LabelError::InvariantViolation {
            origin: origin.to_string(),
            location,
            message: message.into(),
        }
    }
}
