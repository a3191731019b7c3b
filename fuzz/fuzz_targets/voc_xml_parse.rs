//! Fuzz target for VOC XML decoding.
//!
//! Feeds arbitrary bytes to the VOC codec, checking for panics, crashes,
//! or hangs. Half the inputs get a fallback image size so the object path is
//! reached even without a `<size>` element.

#![no_main]

use libfuzzer_sys::fuzz_target;
use labelcodec::ir::{ClassRegistry, Codec, CodecContext, ImageSize, VocCodec};

fuzz_target!(|data: &[u8]| {
    // Cap input size to avoid excessive memory usage.
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let registry = ClassRegistry::new();
    let mut ctx = CodecContext::new(&registry);
    if data.len() % 2 == 0 {
        ctx = ctx.with_image_size(ImageSize { width: 640, height: 480 });
    }

    if let Ok(doc) = VocCodec.decode(data, &ctx) {
        assert!(doc.check_invariants().is_ok());
    }
});
