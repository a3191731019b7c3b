//! labelcodec: label files for object detection, in and out of Pascal VOC,
//! YOLO and CreateML.
//!
//! Every format decodes into one in-memory [`ir::Document`] and encodes from
//! it, so any format converts to any other through the same path.
//!
//! # Modules
//!
//! - [`ir`]: the data model (shapes, documents, class registry) and one
//!   codec per format
//! - [`validation`]: document invariant checks and reporting
//! - [`conversion`]: format detection, conversion and batch conversion
//! - [`dataset_dir`]: filesystem helpers used by the CLI
//! - [`error`]: the error type

pub mod conversion;
pub mod dataset_dir;
pub mod error;
pub mod ir;
pub mod validation;

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use conversion::{BatchItem, BatchOptions, ConversionService, ErrorPolicy};
pub use error::LabelError;
use ir::{
    ClassRegistry, Codec, CodecContext, CodecOptions, CreateMlCodec, Format, ImageSize,
    PolygonPolicy,
};

/// The labelcodec CLI application.
#[derive(Parser)]
#[command(name = "labelcodec")]
#[command(version, author, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Log more (-v info, -vv debug). RUST_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Convert one label file to another format.
    Convert(ConvertArgs),
    /// Convert every label file in a directory.
    Batch(BatchArgs),
    /// Decode a label file and report document issues.
    Validate(ValidateArgs),
}

/// Label format as named on the command line.
///
/// This mirrors [`ir::Format`] but keeps clap out of the library types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FormatArg {
    Voc,
    Yolo,
    #[value(name = "createml", alias = "create-ml")]
    CreateMl,
}

impl From<FormatArg> for Format {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Voc => Format::Voc,
            FormatArg::Yolo => Format::Yolo,
            FormatArg::CreateMl => Format::CreateMl,
        }
    }
}

/// Source format, or `auto` to detect it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SourceFormatArg {
    Auto,
    Voc,
    Yolo,
    #[value(name = "createml", alias = "create-ml")]
    CreateMl,
}

impl SourceFormatArg {
    fn resolve(self, path: &Path, bytes: &[u8]) -> Result<Format, LabelError> {
        match self {
            SourceFormatArg::Auto => conversion::detect_format(path, bytes),
            SourceFormatArg::Voc => Ok(Format::Voc),
            SourceFormatArg::Yolo => Ok(Format::Yolo),
            SourceFormatArg::CreateMl => Ok(Format::CreateMl),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportOutput {
    Text,
    Json,
}

/// Where the image for a single label file comes from.
#[derive(clap::Args)]
struct ImageArgs {
    /// Image the labels belong to; its size is read from the file header.
    #[arg(long, conflicts_with = "size")]
    image: Option<PathBuf>,

    /// Image size as WIDTHxHEIGHT when the image file is not at hand.
    #[arg(long)]
    size: Option<ImageSize>,
}

/// Arguments for the convert subcommand.
#[derive(clap::Args)]
struct ConvertArgs {
    /// Label file to convert.
    input: PathBuf,

    /// Source format.
    #[arg(long, value_enum, default_value = "auto")]
    from: SourceFormatArg,

    /// Target format.
    #[arg(long, value_enum)]
    to: FormatArg,

    #[command(flatten)]
    image: ImageArgs,

    /// Class list (classes.txt or data.yaml). Defaults to one found next to
    /// the input.
    #[arg(long, env = "LABELCODEC_CLASSES")]
    classes: Option<PathBuf>,

    /// Output file. Writes to stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Fail on polygons instead of writing their bounding box.
    #[arg(long)]
    reject_polygons: bool,

    /// Print the lossiness report to stderr.
    #[arg(long)]
    report: bool,
}

/// Arguments for the batch subcommand.
#[derive(clap::Args)]
struct BatchArgs {
    /// Directory of label files (searched recursively).
    input: PathBuf,

    /// Source format.
    #[arg(long, value_enum)]
    from: FormatArg,

    /// Target format.
    #[arg(long, value_enum)]
    to: FormatArg,

    /// Output directory.
    #[arg(short, long)]
    output: PathBuf,

    /// Class list (classes.txt or data.yaml). Defaults to one found in the
    /// input directory.
    #[arg(long, env = "LABELCODEC_CLASSES")]
    classes: Option<PathBuf>,

    /// Convert every file that can be converted and report the rest.
    #[arg(long)]
    continue_on_error: bool,

    /// Convert files one at a time instead of on the thread pool.
    #[arg(long)]
    jobs_serial: bool,

    /// Fail on polygons instead of writing their bounding box.
    #[arg(long)]
    reject_polygons: bool,
}

/// Arguments for the validate subcommand.
#[derive(clap::Args)]
struct ValidateArgs {
    /// Label file to validate.
    input: PathBuf,

    /// Input format.
    #[arg(long, value_enum, default_value = "auto")]
    from: SourceFormatArg,

    #[command(flatten)]
    image: ImageArgs,

    /// Class list; enables warnings for classes missing from it.
    #[arg(long, env = "LABELCODEC_CLASSES")]
    classes: Option<PathBuf>,

    /// Report warnings as errors (exit non-zero if any warnings).
    #[arg(long)]
    strict: bool,

    /// Output format for the report.
    #[arg(long, value_enum, default_value = "text")]
    output: ReportOutput,
}

/// Run the labelcodec CLI.
///
/// This is the main entry point for the CLI, called from `main.rs` after
/// logging is set up.
pub fn run(cli: Cli) -> Result<(), LabelError> {
    match cli.command {
        Some(Commands::Convert(args)) => run_convert(args),
        Some(Commands::Batch(args)) => run_batch(args),
        Some(Commands::Validate(args)) => run_validate(args),
        None => {
            println!("labelcodec {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Convert object detection labels between VOC, YOLO and CreateML.");
            println!();
            println!("Run 'labelcodec --help' for usage information.");
            Ok(())
        }
    }
}

fn polygon_options(reject_polygons: bool) -> CodecOptions {
    CodecOptions {
        polygon_policy: if reject_polygons {
            PolygonPolicy::Reject
        } else {
            PolygonPolicy::BoundingBox
        },
    }
}

/// Image path and size for a single label file.
fn resolve_image(
    args: &ImageArgs,
    label_path: &Path,
) -> Result<(Option<String>, Option<ImageSize>), LabelError> {
    if let Some(size) = args.size {
        return Ok((None, Some(size)));
    }
    let image = match &args.image {
        Some(path) => Some(path.clone()),
        None => dataset_dir::find_image_for_label(label_path),
    };
    match image {
        Some(path) => {
            let size = dataset_dir::read_image_dimensions(&path)?;
            Ok((Some(path_string(&path)), Some(size)))
        }
        None => Ok((None, None)),
    }
}

fn resolve_registry(
    explicit: Option<&Path>,
    search_dir: &Path,
) -> Result<ClassRegistry, LabelError> {
    match explicit
        .map(Path::to_path_buf)
        .or_else(|| dataset_dir::find_class_list(search_dir))
    {
        Some(path) => dataset_dir::load_class_registry(&path),
        None => Ok(ClassRegistry::new()),
    }
}

fn parent_dir(path: &Path) -> &Path {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Execute the convert subcommand.
fn run_convert(args: ConvertArgs) -> Result<(), LabelError> {
    let bytes = fs::read(&args.input)?;
    let source = args.from.resolve(&args.input, &bytes)?;
    let target = Format::from(args.to);

    let registry = resolve_registry(args.classes.as_deref(), parent_dir(&args.input))?;
    let (image_path, image_size) = resolve_image(&args.image, &args.input)?;
    let origin = path_string(&args.input);

    let service = ConversionService::new(polygon_options(args.reject_polygons));
    let mut ctx = CodecContext::new(&registry).with_origin(&origin);
    ctx.image_path = image_path.as_deref();
    ctx.image_size = image_size;

    let converted = service.convert_with_report(&bytes, source, target, &ctx)?;

    if args.report {
        eprintln!("Conversion report:");
        eprint!("{}", converted.report);
    }

    match &args.output {
        Some(output) => {
            // A CreateML project file holds many images; update it in place.
            let out_bytes = if target == Format::CreateMl && output.is_file() {
                let existing = fs::read(output)?;
                CreateMlCodec.merge_into(
                    &existing,
                    &converted.document,
                    &ctx.with_options(service.options()),
                )?
            } else {
                converted.bytes
            };
            fs::write(output, out_bytes)?;
            log::info!("wrote {} ({})", output.display(), target);

            if target == Format::Yolo && registry.is_dirty() {
                dataset_dir::write_class_list(parent_dir(output), &registry)?;
            }
        }
        None => {
            std::io::stdout().write_all(&converted.bytes)?;
            if target == Format::Yolo && registry.is_dirty() {
                log::warn!(
                    "class list gained {} entr(ies) that were not saved; pass -o to write classes.txt",
                    registry.len()
                );
            }
        }
    }

    Ok(())
}

/// Execute the batch subcommand.
fn run_batch(args: BatchArgs) -> Result<(), LabelError> {
    let source = Format::from(args.from);
    let target = Format::from(args.to);

    let registry = resolve_registry(args.classes.as_deref(), &args.input)?;
    let label_files = dataset_dir::collect_label_files(&args.input, source)?;
    log::info!(
        "found {} {} file(s) under {}",
        label_files.len(),
        source,
        args.input.display()
    );

    let mut items = Vec::with_capacity(label_files.len());
    for label_path in &label_files {
        let mut item = BatchItem::new(path_string(label_path), fs::read(label_path)?);
        match dataset_dir::find_image_for_label(label_path) {
            Some(image_path) => match dataset_dir::read_image_dimensions(&image_path) {
                Ok(size) => item = item.with_image(path_string(&image_path), size),
                Err(err) => log::warn!("{}", err),
            },
            None => log::debug!("no image found for {}", label_path.display()),
        }
        items.push(item);
    }

    let service = ConversionService::new(polygon_options(args.reject_polygons));
    let batch = BatchOptions {
        on_error: if args.continue_on_error {
            ErrorPolicy::ContinueOnError
        } else {
            ErrorPolicy::Abort
        },
        parallel: !args.jobs_serial,
    };

    fs::create_dir_all(&args.output)?;

    let outcome = if target == Format::CreateMl {
        let (bytes, outcome) =
            service.convert_batch_to_createml(&items, source, &registry, &batch)?;
        let path = args.output.join("annotations.json");
        fs::write(&path, bytes)?;
        outcome
    } else {
        let outcome = service.convert_batch(&items, source, target, &registry, &batch);
        for item in &outcome.converted {
            let label_path = &label_files[item.index];
            let rel = label_path.strip_prefix(&args.input).unwrap_or(label_path);
            let out_path = args.output.join(rel).with_extension(target.extension());
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&out_path, &item.converted.bytes)?;
        }
        outcome
    };

    if source == Format::Yolo || target == Format::Yolo {
        dataset_dir::write_class_list(&args.output, &registry)?;
    }

    println!(
        "Converted {} of {} file(s) from {} to {}",
        outcome.converted.len(),
        outcome.total,
        source,
        target
    );
    for failure in &outcome.failures {
        eprintln!("  failed: {}", failure);
    }
    if outcome.skipped > 0 {
        eprintln!("  skipped {} file(s) after the first failure", outcome.skipped);
    }

    outcome.into_result().map(|_| ())
}

/// Execute the validate subcommand.
fn run_validate(args: ValidateArgs) -> Result<(), LabelError> {
    let bytes = fs::read(&args.input)?;
    let source = args.from.resolve(&args.input, &bytes)?;

    let registry = resolve_registry(args.classes.as_deref(), parent_dir(&args.input))?;
    let (image_path, image_size) = resolve_image(&args.image, &args.input)?;
    let origin = path_string(&args.input);

    let mut ctx = CodecContext::new(&registry).with_origin(&origin);
    ctx.image_path = image_path.as_deref();
    ctx.image_size = image_size;

    // Codec decode, not the service: validation reports issues instead of
    // failing on the first one.
    let document = source.codec().decode(&bytes, &ctx)?;

    let opts = validation::ValidateOptions {
        strict: args.strict,
    };
    let report = if registry.is_empty() {
        validation::validate_document(&document, &opts)
    } else {
        validation::validate_document_with_registry(&document, &registry, &opts)
    };

    match args.output {
        ReportOutput::Json => {
            let json = serde_json::json!({
                "format": source.name(),
                "error_count": report.error_count(),
                "warning_count": report.warning_count(),
                "issues": &report.issues,
            });
            let rendered = serde_json::to_string_pretty(&json).map_err(LabelError::ReportJson)?;
            println!("{}", rendered);
        }
        ReportOutput::Text => print!("{}", report),
    }

    if !report.is_ok() {
        Err(LabelError::ValidationFailed {
            error_count: report.error_count(),
            warning_count: report.warning_count(),
            report,
        })
    } else {
        Ok(())
    }
}
