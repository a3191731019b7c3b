//! Format-to-format conversion through the shared [`Document`].
//!
//! [`ConversionService`] decodes with one codec, checks the document
//! invariants, and re-encodes with another. It also picks codecs from file
//! extensions or content, reports what a conversion loses, and runs batches
//! that share one [`ClassRegistry`].
//!
//! Batches run in three phases so YOLO class indices do not depend on
//! thread scheduling:
//!
//! 1. decode and check every item (in parallel when enabled)
//! 2. register class names in input order (YOLO targets only)
//! 3. encode every decoded document (in parallel when enabled)

pub mod report;

pub use report::{
    ConversionCounts, ConversionIssue, ConversionIssueCode, ConversionReport, ConversionSeverity,
};

use rayon::prelude::*;
use std::fmt;
use std::path::Path;

use crate::error::LabelError;
use crate::ir::{
    ClassRegistry, Codec, CodecContext, CodecOptions, CreateMlCodec, Document, Format, ImageSize,
    PolygonPolicy, Shape,
};

/// What a batch does when one item fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop at the first failing item (in input order).
    #[default]
    Abort,
    /// Convert every item that can be converted and report the rest.
    ContinueOnError,
}

/// Options for batch conversion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchOptions {
    pub on_error: ErrorPolicy,
    /// Decode and encode items on the rayon thread pool.
    pub parallel: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            on_error: ErrorPolicy::Abort,
            parallel: true,
        }
    }
}

/// One record of a batch: raw label bytes plus what the format may not store.
#[derive(Clone, Debug)]
pub struct BatchItem {
    /// Record identity for error messages, usually the label file path.
    pub origin: String,
    pub bytes: Vec<u8>,
    pub image_path: Option<String>,
    pub image_size: Option<ImageSize>,
}

impl BatchItem {
    pub fn new(origin: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            origin: origin.into(),
            bytes,
            image_path: None,
            image_size: None,
        }
    }

    pub fn with_image(mut self, image_path: impl Into<String>, image_size: ImageSize) -> Self {
        self.image_path = Some(image_path.into());
        self.image_size = Some(image_size);
        self
    }

    pub fn with_image_size(mut self, image_size: ImageSize) -> Self {
        self.image_size = Some(image_size);
        self
    }
}

/// A successful conversion.
#[derive(Clone, Debug)]
pub struct Converted {
    /// The decoded document the output was encoded from.
    pub document: Document,
    /// Encoded target bytes.
    pub bytes: Vec<u8>,
    pub report: ConversionReport,
}

/// One converted batch item.
#[derive(Clone, Debug)]
pub struct ConvertedItem {
    /// Position of the item in the batch input.
    pub index: usize,
    pub origin: String,
    pub converted: Converted,
}

/// One failed batch item.
#[derive(Debug)]
pub struct BatchFailure {
    /// Position of the item in the batch input.
    pub index: usize,
    pub origin: String,
    pub error: LabelError,
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.origin, self.error)
    }
}

/// Everything a batch produced.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub total: usize,
    /// Successes in input order.
    pub converted: Vec<ConvertedItem>,
    /// Failures in input order.
    pub failures: Vec<BatchFailure>,
    /// Items never attempted because the batch aborted.
    pub skipped: usize,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// The conversions, or [`LabelError::BatchFailed`] carrying every failure.
    pub fn into_result(self) -> Result<Vec<ConvertedItem>, LabelError> {
        if self.failures.is_empty() {
            Ok(self.converted)
        } else {
            Err(LabelError::BatchFailed {
                total: self.total,
                failures: self.failures,
            })
        }
    }
}

/// Picks codecs and converts documents between formats.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConversionService {
    options: CodecOptions,
}

impl ConversionService {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> CodecOptions {
        self.options
    }

    /// Decodes `bytes` and requires the result to satisfy the document
    /// invariants.
    pub fn decode(
        &self,
        bytes: &[u8],
        source: Format,
        ctx: &CodecContext<'_>,
    ) -> Result<Document, LabelError> {
        let ctx = ctx.with_options(self.options);
        let document = source.codec().decode(bytes, &ctx)?;
        document.check_invariants()?;
        Ok(document)
    }

    /// Converts one record from `source` to `target`.
    ///
    /// The decoded document is checked strictly before encoding: nothing is
    /// clamped or dropped at this boundary.
    pub fn convert(
        &self,
        source_bytes: &[u8],
        source: Format,
        target: Format,
        ctx: &CodecContext<'_>,
    ) -> Result<Vec<u8>, LabelError> {
        self.convert_with_report(source_bytes, source, target, ctx)
            .map(|converted| converted.bytes)
    }

    /// Like [`convert`](Self::convert), also returning the decoded document
    /// and the lossiness report.
    pub fn convert_with_report(
        &self,
        source_bytes: &[u8],
        source: Format,
        target: Format,
        ctx: &CodecContext<'_>,
    ) -> Result<Converted, LabelError> {
        let document = self.decode(source_bytes, source, ctx)?;
        let report =
            build_conversion_report(&document, source, target, ctx.registry, &self.options);
        let ctx = ctx.with_options(self.options);
        let bytes = target.codec().encode(&document, &ctx)?;

        log::debug!(
            "{}: {} -> {} ({} shape(s), {} lossy step(s))",
            ctx.origin,
            source,
            target,
            document.shapes.len(),
            report.warning_count()
        );

        Ok(Converted {
            document,
            bytes,
            report,
        })
    }

    /// Converts many records that share `registry`.
    pub fn convert_batch(
        &self,
        items: &[BatchItem],
        source: Format,
        target: Format,
        registry: &ClassRegistry,
        batch: &BatchOptions,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            total: items.len(),
            ..Default::default()
        };

        let decoded: Vec<(usize, Document, ConversionReport)> = self
            .decode_phase(items, source, registry, batch, &mut outcome)
            .into_iter()
            .map(|(index, document)| {
                let report =
                    build_conversion_report(&document, source, target, registry, &self.options);
                (index, document, report)
            })
            .collect();

        if target == Format::Yolo {
            for (_, document, _) in &decoded {
                for name in document.class_names() {
                    registry.index_of(name);
                }
            }
        }

        let encode_one = |(index, document, report): (usize, Document, ConversionReport)| {
            let ctx = item_context(&items[index], registry, self.options);
            let result = target.codec().encode(&document, &ctx).map(|bytes| Converted {
                document,
                bytes,
                report,
            });
            (index, result)
        };

        let encoded: Vec<(usize, Result<Converted, LabelError>)> = if batch.parallel {
            decoded.into_par_iter().map(encode_one).collect()
        } else {
            decoded.into_iter().map(encode_one).collect()
        };

        let mut stopped = false;
        for (index, result) in encoded {
            if stopped {
                outcome.skipped += 1;
                continue;
            }
            match result {
                Ok(converted) => outcome.converted.push(ConvertedItem {
                    index,
                    origin: items[index].origin.clone(),
                    converted,
                }),
                Err(error) => {
                    outcome.failures.push(failure(items, index, error));
                    stopped = batch.on_error == ErrorPolicy::Abort;
                }
            }
        }

        log::info!(
            "batch {} -> {}: {} converted, {} failed, {} skipped of {}",
            source,
            target,
            outcome.converted.len(),
            outcome.failures.len(),
            outcome.skipped,
            outcome.total
        );
        outcome
    }

    /// Converts many records into one CreateML array.
    ///
    /// Returns the array bytes (covering every item that decoded) and the
    /// outcome; `outcome.converted` entries carry empty `bytes` since the
    /// output is shared.
    pub fn convert_batch_to_createml(
        &self,
        items: &[BatchItem],
        source: Format,
        registry: &ClassRegistry,
        batch: &BatchOptions,
    ) -> Result<(Vec<u8>, BatchOutcome), LabelError> {
        let mut outcome = BatchOutcome {
            total: items.len(),
            ..Default::default()
        };

        let decoded = self.decode_phase(items, source, registry, batch, &mut outcome);
        let documents: Vec<Document> = decoded.iter().map(|(_, doc)| doc.clone()).collect();

        let ctx = CodecContext::new(registry).with_options(self.options);
        let bytes = CreateMlCodec.encode_batch(&documents, &ctx)?;

        for (index, document) in decoded {
            let report = build_conversion_report(
                &document,
                source,
                Format::CreateMl,
                registry,
                &self.options,
            );
            outcome.converted.push(ConvertedItem {
                index,
                origin: items[index].origin.clone(),
                converted: Converted {
                    document,
                    bytes: Vec::new(),
                    report,
                },
            });
        }

        log::info!(
            "batch {} -> createml: {} entries, {} failed, {} skipped of {}",
            source,
            documents.len(),
            outcome.failures.len(),
            outcome.skipped,
            outcome.total
        );
        Ok((bytes, outcome))
    }

    /// Decodes every item, recording failures in `outcome`. Successes are
    /// returned in input order.
    fn decode_phase(
        &self,
        items: &[BatchItem],
        source: Format,
        registry: &ClassRegistry,
        batch: &BatchOptions,
        outcome: &mut BatchOutcome,
    ) -> Vec<(usize, Document)> {
        let decode_one = |(index, item): (usize, &BatchItem)| {
            let ctx = item_context(item, registry, self.options);
            (index, self.decode(&item.bytes, source, &ctx))
        };

        let results: Vec<(usize, Result<Document, LabelError>)> = if batch.parallel {
            items.par_iter().enumerate().map(decode_one).collect()
        } else {
            let mut results = Vec::with_capacity(items.len());
            for entry in items.iter().enumerate() {
                let result = decode_one(entry);
                let failed = result.1.is_err();
                results.push(result);
                if failed && batch.on_error == ErrorPolicy::Abort {
                    break;
                }
            }
            results
        };

        let attempted = results.len();
        let mut decoded = Vec::with_capacity(attempted);
        let mut stopped = false;
        for (index, result) in results {
            if stopped {
                outcome.skipped += 1;
                continue;
            }
            match result {
                Ok(document) => decoded.push((index, document)),
                Err(error) => {
                    log::warn!("{}: {}", items[index].origin, error);
                    outcome.failures.push(failure(items, index, error));
                    stopped = batch.on_error == ErrorPolicy::Abort;
                }
            }
        }
        outcome.skipped += items.len() - attempted;

        if stopped {
            // Nothing after an aborting failure is encoded.
            outcome.skipped += decoded.len();
            decoded.clear();
        }
        decoded
    }
}

fn item_context<'a>(
    item: &'a BatchItem,
    registry: &'a ClassRegistry,
    options: CodecOptions,
) -> CodecContext<'a> {
    CodecContext {
        origin: &item.origin,
        image_path: item.image_path.as_deref(),
        image_size: item.image_size,
        registry,
        options,
    }
}

fn failure(items: &[BatchItem], index: usize, error: LabelError) -> BatchFailure {
    BatchFailure {
        index,
        origin: items[index].origin.clone(),
        error,
    }
}

/// Picks the format of a label file: by extension first, then by content.
pub fn detect_format(path: &Path, bytes: &[u8]) -> Result<Format, LabelError> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(Format::from_extension)
        .or_else(|| sniff_format(bytes))
        .ok_or_else(|| LabelError::FormatNotDetected {
            path: path.to_path_buf(),
        })
}

/// Guesses a format from the first meaningful bytes.
///
/// `<` means VOC XML, `[` means a CreateML array, and a leading integer
/// token means YOLO.
pub fn sniff_format(bytes: &[u8]) -> Option<Format> {
    let text = std::str::from_utf8(bytes).ok()?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text).trim_start();
    match text.chars().next()? {
        '<' => Some(Format::Voc),
        '[' => Some(Format::CreateMl),
        _ => {
            let first = text
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty() && !line.starts_with('#'))?;
            let token = first.split_whitespace().next()?;
            token.parse::<i64>().ok().map(|_| Format::Yolo)
        }
    }
}

/// Lists what converting `document` from `from` to `to` loses, and the
/// fixed policies that apply.
pub fn build_conversion_report(
    document: &Document,
    from: Format,
    to: Format,
    registry: &ClassRegistry,
    options: &CodecOptions,
) -> ConversionReport {
    let mut report = ConversionReport::new(from.name(), to.name());

    let polygons = document
        .shapes
        .iter()
        .filter(|labeled| matches!(labeled.shape, Shape::Polygon(_)))
        .count();
    report.input = ConversionCounts {
        shapes: document.shapes.len(),
        polygons,
        classes: document.class_names().len(),
    };

    // Every target stores boxes only; under Reject the encode fails instead.
    if polygons > 0 && options.polygon_policy == PolygonPolicy::BoundingBox {
        report.add(ConversionIssue::warning(
            ConversionIssueCode::PolygonAsBoundingBox,
            format!("{polygons} polygon(s) will be written as bounding boxes"),
        ));
    }

    match to {
        Format::Voc => analyze_to_voc(document, &mut report),
        Format::Yolo => analyze_to_yolo(document, registry, &mut report),
        Format::CreateMl => analyze_to_createml(document, &mut report),
    }

    report
}

fn analyze_to_voc(document: &Document, report: &mut ConversionReport) {
    let fractional = document
        .shapes
        .iter()
        .filter(|labeled| {
            let b = labeled.shape.bounds();
            [b.xmin(), b.ymin(), b.xmax(), b.ymax()]
                .iter()
                .any(|v| v.fract() != 0.0)
        })
        .count();
    if fractional > 0 {
        report.add(ConversionIssue::warning(
            ConversionIssueCode::VocIntegerRounding,
            format!("{fractional} shape(s) have fractional corners that will be rounded"),
        ));
    }
}

fn analyze_to_yolo(document: &Document, registry: &ClassRegistry, report: &mut ConversionReport) {
    add_difficult_drop(document, report);

    if document.verified {
        report.add(ConversionIssue::warning(
            ConversionIssueCode::DropVerifiedFlag,
            "the verified flag will be dropped",
        ));
    }

    report.add(ConversionIssue::info(
        ConversionIssueCode::YoloFloatPrecision,
        "normalized coordinates are written with 6 decimals",
    ));

    let unseen: Vec<&str> = document
        .class_names()
        .into_iter()
        .filter(|name| registry.lookup(name).is_none())
        .collect();
    if !unseen.is_empty() {
        report.add(ConversionIssue::info(
            ConversionIssueCode::YoloRegistryAppend,
            format!(
                "{} new class(es) appended to the class list: {}",
                unseen.len(),
                unseen.join(", ")
            ),
        ));
    }

    add_size_not_stored(report);
}

fn analyze_to_createml(document: &Document, report: &mut ConversionReport) {
    add_difficult_drop(document, report);
    add_size_not_stored(report);
}

fn add_difficult_drop(document: &Document, report: &mut ConversionReport) {
    let difficult = document.shapes.iter().filter(|s| s.difficult).count();
    if difficult > 0 {
        report.add(ConversionIssue::warning(
            ConversionIssueCode::DropDifficultFlag,
            format!("{difficult} difficult flag(s) will be dropped"),
        ));
    }
}

fn add_size_not_stored(report: &mut ConversionReport) {
    report.add(ConversionIssue::info(
        ConversionIssueCode::ImageSizeNotStored,
        "the image size is not stored; supply it when decoding",
    ));
}
