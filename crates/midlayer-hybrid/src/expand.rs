//! Query expansion: alternative phrasings for keyword search, semantic
//! rewrites for vector search, and an optional hypothetical answer passage
//! embedded as an extra vector probe.
//!
//! Model output parsing is strictly best-effort. `parse_expansion` accepts
//! any text and extracts what it can; garbage degrades to "no expansion",
//! never to an error.

use async_trait::async_trait;

use midlayer_core::traits::QueryExpander;
use midlayer_core::types::ExpandedQuery;

/// Parse a line-oriented expansion response:
///
/// ```text
/// lex: password recovery; forgot password
/// vec: How do I recover my account password?
/// hyde: To reset your password, open the login page and ...
/// ```
///
/// Variants are semicolon-separated. A `hyde:` passage that continues past
/// its line is recovered up to the first blank line (bounded at 500 chars).
pub fn parse_expansion(original: &str, response: &str, max_lex: usize, max_vec: usize) -> ExpandedQuery {
    let mut lex_variants = Vec::new();
    let mut vec_variants = Vec::new();
    let mut hyde: Option<String> = None;

    for line in response.lines() {
        let line = line.trim();
        let lower = line.to_lowercase();
        if let Some(rest) = lower.strip_prefix("lex:").map(|_| &line[4..]) {
            lex_variants = split_variants(rest, max_lex);
        } else if let Some(rest) = lower.strip_prefix("vec:").map(|_| &line[4..]) {
            vec_variants = split_variants(rest, max_vec);
        } else if lower.starts_with("hyde:") {
            hyde = Some(line[5..].trim().to_string());
        }
    }

    // a hyde passage often spills onto following lines; recover the whole
    // first paragraph when the tagged line alone looks truncated
    if hyde.as_ref().is_some_and(|doc| doc.len() < 50) {
        let mut lines = response.lines().skip_while(|l| !l.trim().to_lowercase().starts_with("hyde:"));
        let mut paragraph: Vec<String> = Vec::new();
        if let Some(tagged) = lines.next() {
            paragraph.push(tagged.trim()[5..].trim().to_string());
            for line in lines {
                if line.trim().is_empty() {
                    break;
                }
                paragraph.push(line.trim().to_string());
            }
            let bounded: String = paragraph.join("\n").chars().take(500).collect();
            hyde = Some(bounded.trim().to_string());
        }
    }
    hyde = hyde.filter(|h| !h.is_empty());

    ExpandedQuery { original: original.to_string(), lex_variants, vec_variants, hyde }
}

fn split_variants(raw: &str, max: usize) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .take(max)
        .map(str::to_string)
        .collect()
}

/// Rule-based expander: synonym substitution plus question-prefix
/// stripping. No model in the loop, so it is deterministic and cheap.
pub struct SynonymExpander;

const SYNONYMS: &[(&str, &[&str])] = &[
    ("create", &["make", "build"]),
    ("delete", &["remove", "erase"]),
    ("update", &["modify", "change"]),
    ("get", &["fetch", "retrieve"]),
    ("add", &["insert", "append"]),
    ("show", &["display", "list"]),
    ("find", &["search", "locate"]),
    ("error", &["bug", "issue"]),
    ("fix", &["solve", "repair"]),
];

const QUESTION_PREFIXES: &[&str] = &["how to ", "how do i ", "what is ", "where is "];

#[async_trait]
impl QueryExpander for SynonymExpander {
    async fn expand(&self, query: &str) -> anyhow::Result<ExpandedQuery> {
        let mut lex_variants = Vec::new();
        let lowered = query.to_lowercase();
        let words: Vec<&str> = lowered.split_whitespace().collect();

        for (i, word) in words.iter().enumerate() {
            if let Some((_, synonyms)) = SYNONYMS.iter().find(|(w, _)| w == word) {
                for &synonym in synonyms.iter() {
                    let mut replaced = words.clone();
                    replaced[i] = synonym;
                    lex_variants.push(replaced.join(" "));
                }
            }
        }
        if query.contains('?') {
            lex_variants.push(query.replace('?', " ").trim().to_string());
        }
        for prefix in QUESTION_PREFIXES {
            if let Some(stripped) = lowered.strip_prefix(prefix) {
                lex_variants.push(stripped.trim().to_string());
                break;
            }
        }
        lex_variants.truncate(3);

        Ok(ExpandedQuery { original: query.to_string(), lex_variants, ..ExpandedQuery::default() })
    }
}

/// Expansion turned off: the original query only.
pub struct NoopExpander;

#[async_trait]
impl QueryExpander for NoopExpander {
    async fn expand(&self, query: &str) -> anyhow::Result<ExpandedQuery> {
        Ok(ExpandedQuery::unexpanded(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_response_parses_fully() {
        let response = "lex: password recovery; forgot password; reset credentials\n\
                        vec: How do I recover my account password?; Steps to reset my login password\n\
                        hyde: To reset your password, navigate to the login page and click the reset link sent to your email address.";
        let expanded = parse_expansion("reset password", response, 2, 2);
        assert_eq!(expanded.original, "reset password");
        assert_eq!(expanded.lex_variants, vec!["password recovery", "forgot password"]);
        assert_eq!(expanded.vec_variants.len(), 2);
        assert!(expanded.hyde.as_deref().is_some_and(|h| h.starts_with("To reset your password")));
    }

    #[test]
    fn garbage_degrades_to_no_expansion() {
        let expanded = parse_expansion("reset password", "I cannot help with that.", 2, 2);
        assert_eq!(expanded.original, "reset password");
        assert!(expanded.lex_variants.is_empty());
        assert!(expanded.vec_variants.is_empty());
        assert!(expanded.hyde.is_none());
    }

    #[test]
    fn multiline_hyde_is_recovered_up_to_a_blank_line() {
        let response = "hyde: Short.\nThe reset flow emails you a one-time link that expires after a day.\n\nUnrelated trailing text.";
        let expanded = parse_expansion("reset password", response, 2, 2);
        let hyde = expanded.hyde.expect("hyde present");
        assert!(hyde.contains("one-time link"));
        assert!(!hyde.contains("Unrelated"));
        assert!(hyde.len() <= 500);
    }

    #[test]
    fn empty_hyde_tag_is_dropped() {
        let expanded = parse_expansion("q", "hyde:", 2, 2);
        assert!(expanded.hyde.is_none());
    }

    #[tokio::test]
    async fn synonym_expander_substitutes_known_words() {
        let expanded = SynonymExpander.expand("find the error").await.expect("expand");
        assert!(expanded.lex_variants.contains(&"search the error".to_string()));
        assert!(expanded.lex_variants.len() <= 3);
        assert_eq!(expanded.original, "find the error");
    }

    #[tokio::test]
    async fn question_prefix_is_stripped() {
        let expanded = SynonymExpander.expand("how to tie a bowline").await.expect("expand");
        assert!(expanded.lex_variants.contains(&"tie a bowline".to_string()));
    }

    #[tokio::test]
    async fn noop_expander_adds_nothing() {
        let expanded = NoopExpander.expand("anything at all").await.expect("expand");
        assert!(expanded.lex_variants.is_empty());
        assert!(expanded.vec_variants.is_empty());
        assert!(expanded.hyde.is_none());
    }
}
