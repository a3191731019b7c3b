//! Fuzz target for whole YOLO label files.

#![no_main]

use libfuzzer_sys::fuzz_target;
use labelcodec::ir::{ClassRegistry, Codec, CodecContext, ImageSize, YoloCodec};

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let registry = ClassRegistry::from_names(["a", "b", "c"]);
    let ctx = CodecContext::new(&registry).with_image_size(ImageSize { width: 416, height: 416 });

    if let Ok(doc) = YoloCodec.decode(data, &ctx) {
        assert!(doc.check_invariants().is_ok());
    }
});
