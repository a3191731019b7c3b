//! Validation report types.
//!
//! A report collects every issue in a document instead of stopping at the
//! first, so a user can fix a label file in one pass.

use serde::Serialize;
use std::fmt;

use crate::error::Location;

/// The result of validating a document.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ValidationReport {
    /// All issues found, in shape order.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    pub fn add(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count()
    }

    /// Returns true if there are no errors.
    pub fn is_ok(&self) -> bool {
        self.error_count() == 0
    }

    /// Returns true if there are no issues at all.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Turns every warning into an error.
    pub fn promote_warnings(&mut self) {
        for issue in &mut self.issues {
            issue.severity = Severity::Error;
        }
    }

    pub fn first_error(&self) -> Option<&ValidationIssue> {
        self.issues.iter().find(|i| i.severity == Severity::Error)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.issues.is_empty() {
            return writeln!(f, "Validation passed: no issues found");
        }

        writeln!(
            f,
            "Validation completed with {} error(s) and {} warning(s):",
            self.error_count(),
            self.warning_count()
        )?;
        writeln!(f)?;

        for issue in &self.issues {
            writeln!(f, "  {}", issue)?;
        }

        Ok(())
    }
}

/// A single validation issue.
#[derive(Clone, Debug, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub code: IssueCode,
    pub message: String,
    pub context: IssueContext,
}

impl ValidationIssue {
    pub fn new(
        severity: Severity,
        code: IssueCode,
        message: impl Into<String>,
        context: IssueContext,
    ) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            context,
        }
    }

    pub fn error(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self::new(Severity::Error, code, message, context)
    }

    pub fn warning(code: IssueCode, message: impl Into<String>, context: IssueContext) -> Self {
        Self::new(Severity::Warning, code, message, context)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "ERROR",
            Severity::Warning => "WARN ",
        };
        write!(
            f,
            "[{}] {:?} in {}: {}",
            severity, self.code, self.context, self.message
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Severity {
    /// Suspicious but encodable.
    Warning,
    /// Breaks a document invariant; codecs refuse the document.
    Error,
}

/// Stable code identifying the kind of issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum IssueCode {
    // Document issues
    /// Width or height is zero.
    InvalidImageSize,
    /// The document has no image path.
    EmptyImagePath,

    // Shape issues
    /// A shape has an empty class name.
    EmptyClassName,
    /// A class name holds a line break or surrounding whitespace, so it
    /// would not survive a `classes.txt` round trip.
    InvalidClassName,
    /// A shape has NaN or infinite coordinates.
    ShapeNotFinite,
    /// A shape extends outside the image.
    ShapeOutOfBounds,
    /// A shape has zero area.
    DegenerateShape,
    /// A polygon has fewer than three points.
    PolygonTooFewPoints,
    /// A class name is missing from the supplied registry.
    UnregisteredClass,
}

/// Where a validation issue occurred.
#[derive(Clone, Copy, Debug, Serialize)]
pub enum IssueContext {
    Document,
    /// 0-based shape index.
    Shape { index: usize },
}

impl IssueContext {
    /// The 1-based error location for this context.
    pub fn location(&self) -> Location {
        match self {
            IssueContext::Document => Location::Document,
            IssueContext::Shape { index } => Location::Shape(index + 1),
        }
    }
}

impl fmt::Display for IssueContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueContext::Document => write!(f, "document"),
            IssueContext::Shape { index } => write!(f, "shape {}", index + 1),
        }
    }
}
