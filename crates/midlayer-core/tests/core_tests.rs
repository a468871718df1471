use midlayer_core::types::{Chunk, SearchHit};

#[test]
fn chunk_builder_carries_metadata() {
    let chunk = Chunk::new("notes", "alpha bravo charlie", 0, 19)
        .with_metadata("file_name", "notes.txt")
        .with_metadata("content_type", "text/plain");

    assert_eq!(chunk.doc_id, "notes");
    assert_eq!(chunk.metadata.get("file_name").map(String::as_str), Some("notes.txt"));
    assert_eq!(chunk.id, Chunk::derive_id("notes", 0, "alpha bravo charlie"));
}

#[test]
fn search_hit_roundtrips_through_json() {
    let hit = SearchHit {
        chunk: Chunk::new("doc", "payload", 10, 17),
        rank: 1,
        raw_score: 0.42,
    };
    let json = serde_json::to_string(&hit).expect("serialize");
    let back: SearchHit = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back.chunk.id, hit.chunk.id);
    assert_eq!(back.rank, 1);
    assert!((back.raw_score - 0.42).abs() < f32::EPSILON);
}

#[test]
fn sibling_chunks_keep_monotonic_offsets() {
    let text = "first paragraph\n\nsecond paragraph";
    let chunks = vec![
        Chunk::new("doc", "first paragraph", 0, 15),
        Chunk::new("doc", "second paragraph", 17, text.len()),
    ];
    for pair in chunks.windows(2) {
        assert!(pair[0].start_offset <= pair[1].start_offset);
        assert!(pair[0].end_offset <= pair[1].end_offset);
    }
}
