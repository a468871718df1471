use tantivy::schema::{Schema, TextFieldIndexing, TextOptions, IndexRecordOption, STRING, STORED};
use tantivy::tokenizer::{TextAnalyzer, SimpleTokenizer, LowerCaser, StopWordFilter};
use tantivy::Index;

pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    let _id_field = schema_builder.add_text_field("id", STRING | STORED);
    let _doc_id_field = schema_builder.add_text_field("doc_id", STRING | STORED);
    let content_indexing = TextFieldIndexing::default()
        .set_tokenizer("text_with_stopwords")
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let content_options = TextOptions::default().set_indexing_options(content_indexing).set_stored();
    let _content_field = schema_builder.add_text_field("content", content_options);
    let _start_field = schema_builder.add_u64_field("start_offset", STORED);
    let _end_field = schema_builder.add_u64_field("end_offset", STORED);
    let _metadata_field = schema_builder.add_text_field("metadata", STORED);
    schema_builder.build()
}

pub fn register_tokenizer(index: &Index) {
    let stop_words = vec![
        "a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
    ];
    let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
        .build();
    index.tokenizers().register("text_with_stopwords", tokenizer);
}

/// Strip query-syntax characters so user text is always a plain term query.
/// Returns `None` when nothing searchable remains.
pub fn sanitize_query(raw: &str) -> Option<String> {
    const SPECIALS: &[char] = &['"', '\'', '*', '(', ')', '[', ']', '{', '}', '+', '-', '^', '~', ':', '\\', '/', '!'];
    let cleaned: Vec<String> = raw
        .split_whitespace()
        .map(|term| term.chars().filter(|c| !SPECIALS.contains(c)).collect::<String>())
        .filter(|term| !term.is_empty())
        .collect();
    if cleaned.is_empty() { None } else { Some(cleaned.join(" ")) }
}
