//! Filesystem side of the CLI: finding label files, their images and the
//! class list.
//!
//! The codecs only ever see bytes; this module is where paths turn into
//! bytes, image headers into [`ImageSize`]s and `classes.txt` into a
//! [`ClassRegistry`].

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{LabelError, Location};
use crate::ir::{ClassRegistry, Format, ImageSize};

/// Image extensions tried, in order, when looking for a label's image.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "png", "jpeg", "bmp", "webp"];

/// Class list file written next to YOLO labels.
pub const CLASSES_TXT: &str = "classes.txt";

const CLASS_LIST_NAMES: [&str; 3] = [CLASSES_TXT, "data.yaml", "data.yml"];

/// Every label file of `format` under `root`, sorted by path.
///
/// For YOLO the class list files are left out.
pub fn collect_label_files(root: &Path, format: Format) -> Result<Vec<PathBuf>, LabelError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|source| LabelError::Io(source.into()))?;
        let path = entry.path();

        if !entry.file_type().is_file() || !has_extension(path, &[format.extension()]) {
            continue;
        }
        if format == Format::Yolo && is_class_list(path) {
            continue;
        }
        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

/// Finds the image a label file belongs to.
///
/// Looks next to the label first, then in a sibling `images/` directory
/// (the `labels/` + `images/` layout), trying [`IMAGE_EXTENSIONS`] in order.
pub fn find_image_for_label(label_path: &Path) -> Option<PathBuf> {
    let stem = label_path.file_stem()?;
    let label_dir = label_path.parent().unwrap_or_else(|| Path::new(""));

    let mut dirs = vec![label_dir.to_path_buf()];
    if let Some(parent) = label_dir.parent() {
        dirs.push(parent.join("images"));
    }

    for dir in dirs {
        for ext in IMAGE_EXTENSIONS {
            let candidate = dir.join(stem).with_extension(ext);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Reads width and height from the image header.
pub fn read_image_dimensions(path: &Path) -> Result<ImageSize, LabelError> {
    let size = imagesize::size(path).map_err(|source| LabelError::ImageDimensionRead {
        path: path.to_path_buf(),
        source,
    })?;
    let origin = path.display().to_string();

    let width: u32 = size.width.try_into().map_err(|_| {
        LabelError::malformed(
            &origin,
            Location::Document,
            format!("image width {} does not fit in u32", size.width),
        )
    })?;

    let height: u32 = size.height.try_into().map_err(|_| {
        LabelError::malformed(
            &origin,
            Location::Document,
            format!("image height {} does not fit in u32", size.height),
        )
    })?;

    ImageSize::new(width, height).map_err(|err| err.at(&origin, Location::Document))
}

/// Loads a class list: `data.yaml`/`data.yml` as Ultralytics YAML,
/// anything else as `classes.txt`.
pub fn load_class_registry(path: &Path) -> Result<ClassRegistry, LabelError> {
    let text = fs::read_to_string(path)?;
    let origin = path.display().to_string();
    let registry = if has_extension(path, &["yaml", "yml"]) {
        ClassRegistry::from_data_yaml(&text, &origin)?
    } else {
        ClassRegistry::from_classes_txt(&text, &origin)?
    };
    log::info!("loaded {} class(es) from {}", registry.len(), origin);
    Ok(registry)
}

/// Looks for `classes.txt` or `data.yaml` in `dir`, then in its parent.
pub fn find_class_list(dir: &Path) -> Option<PathBuf> {
    std::iter::once(dir)
        .chain(dir.parent())
        .flat_map(|base| CLASS_LIST_NAMES.iter().map(move |name| base.join(name)))
        .find(|candidate| candidate.is_file())
}

/// Writes the registry as `<dir>/classes.txt` and marks it persisted.
pub fn write_class_list(dir: &Path, registry: &ClassRegistry) -> Result<PathBuf, LabelError> {
    let path = dir.join(CLASSES_TXT);
    fs::write(&path, registry.to_classes_txt())?;
    registry.mark_persisted();
    log::info!("wrote {} class(es) to {}", registry.len(), path.display());
    Ok(path)
}

fn is_class_list(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.eq_ignore_ascii_case(CLASSES_TXT))
        .unwrap_or(false)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}
