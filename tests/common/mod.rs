use std::fs;
use std::path::{Path, PathBuf};

/// A 24-bit BMP header with no pixel rows; enough for dimension probing.
fn bmp_header(width: u32, height: u32) -> Vec<u8> {
    let mut header = Vec::with_capacity(54);
    header.extend_from_slice(b"BM");
    header.extend_from_slice(&54u32.to_le_bytes());
    header.extend_from_slice(&[0; 4]);
    header.extend_from_slice(&54u32.to_le_bytes());
    header.extend_from_slice(&40u32.to_le_bytes());
    header.extend_from_slice(&width.to_le_bytes());
    header.extend_from_slice(&height.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&24u16.to_le_bytes());
    header.resize(54, 0);
    header
}

/// One image of a YOLO dataset laid out as
/// `labels/<stem>.txt`, `labels/classes.txt` and `images/<stem>.bmp`.
pub struct YoloSample<'a> {
    pub stem: &'a str,
    pub rows: &'a str,
    pub classes: &'a [&'a str],
    pub image_size: (u32, u32),
}

impl YoloSample<'_> {
    /// Writes the sample under `root` and returns the label file path.
    pub fn write_to(&self, root: &Path) -> PathBuf {
        let labels = root.join("labels");
        let images = root.join("images");
        fs::create_dir_all(&labels).expect("create labels dir");
        fs::create_dir_all(&images).expect("create images dir");

        let label = labels.join(format!("{}.txt", self.stem));
        fs::write(&label, self.rows).expect("write label file");

        let mut classes = self.classes.join("\n");
        classes.push('\n');
        fs::write(labels.join("classes.txt"), classes).expect("write classes.txt");

        let (width, height) = self.image_size;
        fs::write(
            images.join(format!("{}.bmp", self.stem)),
            bmp_header(width, height),
        )
        .expect("write image");
        label
    }
}
