//! Text rendering of adapter outcomes.
//!
//! This is the only place a [`SearchOutcome`] becomes display text.

use super::types::{SearchHits, SearchOutcome, SearchResult, SourceId};

/// Placeholder for a field the source did not supply.
pub const MISSING: &str = "N/A";

/// Abstracts longer than this many characters are cut.
pub const ABSTRACT_LIMIT: usize = 200;

/// Cut `text` to at most `max` characters, appending `...` when cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn or_missing(value: Option<&str>) -> &str {
    value.filter(|v| !v.trim().is_empty()).unwrap_or(MISSING)
}

/// Render one result as a numbered entry.
pub fn format_result(index: usize, result: &SearchResult) -> String {
    let mut lines = Vec::with_capacity(9);
    lines.push(format!("{}. **{}**", index, or_missing(result.title.as_deref())));
    lines.push(format!("   Authors: {}", or_missing(result.authors.as_deref())));
    lines.push(format!(
        "   Year: {}",
        result.year.map(|y| y.to_string()).as_deref().unwrap_or(MISSING)
    ));
    lines.push(format!("   Venue: {}", or_missing(result.venue.as_deref())));
    lines.push(format!(
        "   Citations: {}",
        result.citations.map(|c| c.to_string()).as_deref().unwrap_or(MISSING)
    ));

    let snippet = result
        .snippet
        .as_deref()
        .map(|s| truncate_chars(s.trim(), ABSTRACT_LIMIT));
    lines.push(format!("   Abstract: {}", or_missing(snippet.as_deref())));
    lines.push(format!("   URL: {}", or_missing(result.url.as_deref())));

    if let Some(image) = &result.image_url {
        lines.push(format!("   Image: {}", image));
    }
    if result.detail_degraded {
        lines.push("   Note: detail lookup failed, showing listing data only".to_string());
    }
    lines.join("\n")
}

pub fn format_hits(source: SourceId, hits: &SearchHits) -> String {
    let mut output = format!(
        "{} results ({} of max {}):\n",
        source.label(),
        hits.results.len(),
        hits.limit
    );
    for (i, result) in hits.results.iter().enumerate() {
        output.push('\n');
        output.push_str(&format_result(i + 1, result));
        output.push('\n');
    }
    output
}

/// Render an outcome. Errors become their human-readable message.
pub fn render_outcome(source: SourceId, outcome: &SearchOutcome) -> String {
    match outcome {
        Ok(hits) => format_hits(source, hits),
        Err(e) => format!("{} search: {}", source.label(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::types::SearchError;

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        // Multi-byte characters must not be split.
        assert_eq!(truncate_chars("억제제억제제", 3), "억제제...");
    }

    #[test]
    fn test_missing_fields_use_sentinel() {
        let mut result = SearchResult::new(SourceId::GoogleSearch);
        result.title = Some("KRAS inhibitors".to_string());
        result.url = Some("https://example.org".to_string());

        let text = format_result(1, &result);
        assert!(text.starts_with("1. **KRAS inhibitors**"));
        assert!(text.contains("Authors: N/A"));
        assert!(text.contains("Year: N/A"));
        assert!(text.contains("Citations: N/A"));
        assert!(text.contains("URL: https://example.org"));
        assert!(!text.contains("Note:"));
    }

    #[test]
    fn test_abstract_truncated() {
        let mut result = SearchResult::new(SourceId::Pubmed);
        result.snippet = Some("x".repeat(500));
        let text = format_result(2, &result);
        let line = text.lines().find(|l| l.contains("Abstract:")).unwrap();
        assert_eq!(line.trim_start().len(), "Abstract: ".len() + ABSTRACT_LIMIT + 3);
    }

    #[test]
    fn test_render_outcome() {
        let hits = SearchHits::new(vec![SearchResult::new(SourceId::Arxiv)], 3);
        let text = render_outcome(SourceId::Arxiv, &Ok(hits));
        assert!(text.starts_with("arXiv results (1 of max 3):"));
        assert!(text.contains("1. **N/A**"));

        let text = render_outcome(SourceId::Chembl, &Err(SearchError::NoResults));
        assert_eq!(text, "ChEMBL search: No results found.");
    }
}
