use std::collections::HashMap;

use labelcodec::ir::{
    ClassRegistry, Codec, CodecContext, CreateMlCodec, Document, ImageSize, LabeledShape, Shape,
};
use labelcodec::LabelError;
use serde_json::Value;

const TWO_IMAGES: &str = r#"[
  {
    "image": "cat.jpg",
    "annotations": [
      { "label": "cat", "coordinates": { "x": 60, "y": 35, "width": 100, "height": 50 } }
    ]
  },
  {
    "image": "dogs.png",
    "verified": true,
    "annotations": [
      { "label": "dog", "coordinates": { "x": 20, "y": 20, "width": 10, "height": 10 } },
      { "label": "dog", "coordinates": { "x": 95, "y": 50, "width": 20, "height": 20 } }
    ]
  }
]"#;

fn size(w: u32, h: u32) -> ImageSize {
    ImageSize::new(w, h).expect("valid size")
}

#[test]
fn decode_batch_reads_every_entry_in_order() {
    let registry = ClassRegistry::new();
    let ctx = CodecContext::new(&registry).with_origin("annotations.json");
    let sizes: HashMap<&str, ImageSize> =
        HashMap::from([("cat.jpg", size(512, 512)), ("dogs.png", size(100, 100))]);

    let docs = CreateMlCodec
        .decode_batch(TWO_IMAGES.as_bytes(), &ctx, |image| sizes.get(image).copied())
        .expect("decode batch");

    assert_eq!(docs.len(), 2);
    assert_eq!(docs[0].image_path, "cat.jpg");
    assert_eq!(docs[0].shapes[0].shape, Shape::rectangle(10.0, 10.0, 110.0, 60.0));
    assert!(!docs[0].verified);

    assert_eq!(docs[1].image_path, "dogs.png");
    assert!(docs[1].verified);
    assert_eq!(docs[1].shapes.len(), 2);
    // Second dog spills past the right edge and is clamped.
    assert_eq!(docs[1].shapes[1].shape, Shape::rectangle(85.0, 40.0, 100.0, 60.0));
}

#[test]
fn decode_batch_without_a_size_names_the_entry() {
    let registry = ClassRegistry::new();
    let ctx = CodecContext::new(&registry).with_origin("annotations.json");

    let err = CreateMlCodec
        .decode_batch(TWO_IMAGES.as_bytes(), &ctx, |image| {
            (image == "cat.jpg").then(|| size(512, 512))
        })
        .unwrap_err();

    match err {
        LabelError::MissingImageSize { origin } => {
            assert!(origin.contains("annotations.json"), "{origin}");
            assert!(origin.contains('2'), "{origin}");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn single_document_roundtrip() {
    let mut doc = Document::new("shots/bird.jpg", size(300, 200)).with_verified(true);
    doc.add_shape(LabeledShape::new(Shape::rectangle(12.5, 20.25, 90.0, 150.0), "bird"))
        .expect("add");

    let registry = ClassRegistry::new();
    let ctx = CodecContext::new(&registry).with_image(&doc.image_path, doc.image_size);
    let bytes = CreateMlCodec.encode(&doc, &ctx).expect("encode");
    let back = CreateMlCodec.decode(&bytes, &ctx).expect("decode");

    assert_eq!(back, doc);
}

#[test]
fn merge_replaces_matching_entry_and_keeps_the_rest() {
    let existing = r#"[
  { "image": "keep.jpg", "annotations": [], "source": "manual" },
  { "image": "cat.jpg", "annotations": [] }
]"#;

    let mut doc = Document::new("images/cat.jpg", size(512, 512));
    doc.add_shape(LabeledShape::new(Shape::rectangle(10.0, 10.0, 110.0, 60.0), "cat"))
        .expect("add");

    let registry = ClassRegistry::new();
    let ctx = CodecContext::new(&registry);
    let merged = CreateMlCodec
        .merge_into(existing.as_bytes(), &doc, &ctx)
        .expect("merge");
    let parsed: Value = serde_json::from_slice(&merged).expect("json");

    let entries = parsed.as_array().expect("array");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["image"], "keep.jpg");
    assert_eq!(entries[0]["source"], "manual");
    assert_eq!(entries[1]["image"], "cat.jpg");
    assert_eq!(entries[1]["annotations"][0]["label"], "cat");

    let mut other = doc.clone();
    other.image_path = "new.jpg".to_string();
    let appended = CreateMlCodec
        .merge_into(&merged, &other, &ctx)
        .expect("merge");
    let parsed: Value = serde_json::from_slice(&appended).expect("json");
    assert_eq!(parsed.as_array().map(Vec::len), Some(3));
}

#[test]
fn merge_into_empty_file_starts_a_new_array() {
    let doc = Document::new("empty.jpg", size(10, 10));
    let registry = ClassRegistry::new();
    let merged = CreateMlCodec
        .merge_into(b"  \n", &doc, &CodecContext::new(&registry))
        .expect("merge");
    let parsed: Value = serde_json::from_slice(&merged).expect("json");
    assert_eq!(parsed.as_array().map(Vec::len), Some(1));
}

#[test]
fn rejects_non_array_and_bad_annotations() {
    let registry = ClassRegistry::new();
    let ctx = CodecContext::new(&registry).with_image_size(size(10, 10));

    for input in [
        r#"{"image": "a.jpg"}"#,
        r#"[{"image": "a.jpg", "annotations": [{"label": "x"}]}]"#,
        r#"[{"image": "a.jpg", "annotations": [{"label": "x", "coordinates": {"x": 5, "y": 5, "width": -1, "height": 2}}]}]"#,
        r#"[{"image": "a.jpg", "annotations": [{"label": " ", "coordinates": {"x": 5, "y": 5, "width": 2, "height": 2}}]}]"#,
        "not json",
    ] {
        let err = CreateMlCodec.decode(input.as_bytes(), &ctx).unwrap_err();
        assert!(
            matches!(err, LabelError::MalformedDocument { .. }),
            "{input} gave {err}"
        );
    }
}
