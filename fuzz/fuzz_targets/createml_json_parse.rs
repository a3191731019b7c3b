//! Fuzz target for CreateML JSON decoding.
//!
//! Exercises both the single-entry decode and the full-array batch decode.

#![no_main]

use libfuzzer_sys::fuzz_target;
use labelcodec::ir::{ClassRegistry, Codec, CodecContext, CreateMlCodec, ImageSize};

fuzz_target!(|data: &[u8]| {
    if data.len() > 10 * 1024 * 1024 {
        return;
    }

    let size = ImageSize { width: 1024, height: 768 };
    let registry = ClassRegistry::new();
    let ctx = CodecContext::new(&registry).with_image_size(size);

    let _ = CreateMlCodec.decode(data, &ctx);
    if let Ok(docs) = CreateMlCodec.decode_batch(data, &ctx, |_| Some(size)) {
        assert!(docs.iter().all(|doc| doc.check_invariants().is_ok()));
    }
});
