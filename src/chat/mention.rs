//! `@mention` scoping: restrict which documents a query is answered from.
//!
//! A query such as `compare @budget-2023 with @"Budget 2024.pdf"` limits the
//! prompt to the two named uploads. Without any mention, or when none of the
//! mentions names a loaded document, every ready document is in scope.

use crate::document::{name_key, ProcessedDocument};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

// `@` must start the query or follow whitespace/opening punctuation, so
// `mail@example.com` is not a mention.
static RE_MENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:^|[\s(\[{,;])@(?:"([^"]+)"|([^\s@"]+))"#).unwrap()
});

/// Mentions in order of first appearance, without the `@`, deduplicated
/// case-insensitively.
pub fn parse_mentions(query: &str) -> Vec<String> {
    let mut mentions: Vec<String> = Vec::new();

    for caps in RE_MENTION.captures_iter(query) {
        let raw = match (caps.get(1), caps.get(2)) {
            (Some(quoted), _) => quoted.as_str().trim(),
            (None, Some(bare)) => trim_trailing_punctuation(bare.as_str()),
            (None, None) => continue,
        };
        if raw.is_empty() {
            continue;
        }
        if !mentions.iter().any(|m| m.to_lowercase() == raw.to_lowercase()) {
            mentions.push(raw.to_string());
        }
    }

    mentions
}

/// Sentence punctuation directly after a bare mention is not part of it:
/// `about @report.pdf?` names `report.pdf`.
fn trim_trailing_punctuation(s: &str) -> &str {
    s.trim_end_matches(['.', ',', ';', ':', '!', '?', ')', ']', '}', '\'', '’'])
}

/// Which documents a query is scoped to.
#[derive(Debug, Clone)]
pub struct MentionScope<'a> {
    /// Mentions found in the query.
    pub mentions: Vec<String>,
    /// Mentions that matched no document.
    pub unmatched: Vec<String>,
    /// Documents to include, in library order.
    pub documents: Vec<&'a ProcessedDocument>,
    /// True when mentions restricted the selection.
    pub scoped: bool,
}

impl MentionScope<'_> {
    pub fn document_names(&self) -> Vec<String> {
        self.documents.iter().map(|d| d.name.clone()).collect()
    }
}

/// Whether `mention` names `doc`: equal to the name or a prefix of it,
/// case-insensitive, `.pdf` optional on both sides.
pub fn mention_matches(mention: &str, doc: &ProcessedDocument) -> bool {
    let wanted = name_key(mention);
    !wanted.is_empty() && doc.name_key().starts_with(&wanted)
}

/// Documents one mention selects. A document whose name equals the mention
/// wins over documents the mention is only a prefix of, so `@report` picks
/// `report.pdf` and not also `report (2).pdf`.
fn select<'a>(mention: &str, ready: &[&'a ProcessedDocument]) -> Vec<&'a ProcessedDocument> {
    let wanted = name_key(mention);
    if wanted.is_empty() {
        return Vec::new();
    }
    let exact: Vec<&ProcessedDocument> = ready
        .iter()
        .copied()
        .filter(|d| d.name_key() == wanted)
        .collect();
    if !exact.is_empty() {
        return exact;
    }
    ready
        .iter()
        .copied()
        .filter(|d| mention_matches(mention, d))
        .collect()
}

/// Select the documents `query` should be answered from.
///
/// Only `Ready` documents are considered.
pub fn scope<'a, I>(query: &str, documents: I) -> MentionScope<'a>
where
    I: IntoIterator<Item = &'a ProcessedDocument>,
{
    let ready: Vec<&ProcessedDocument> = documents.into_iter().filter(|d| d.is_ready()).collect();
    let mentions = parse_mentions(query);

    if mentions.is_empty() {
        return MentionScope {
            mentions,
            unmatched: Vec::new(),
            documents: ready,
            scoped: false,
        };
    }

    let mut unmatched = Vec::new();
    let mut picked: Vec<&ProcessedDocument> = Vec::new();
    for mention in &mentions {
        let hits = select(mention, &ready);
        if hits.is_empty() {
            unmatched.push(mention.clone());
        }
        picked.extend(hits);
    }

    let selected: Vec<&ProcessedDocument> = ready
        .iter()
        .copied()
        .filter(|d| picked.iter().any(|p| p.id == d.id))
        .collect();

    if selected.is_empty() {
        warn!(
            "No document matches mentions {:?}; using all {} documents",
            mentions,
            ready.len()
        );
        return MentionScope {
            mentions,
            unmatched,
            documents: ready,
            scoped: false,
        };
    }

    debug!(
        "Mentions {:?} selected {} of {} documents",
        mentions,
        selected.len(),
        ready.len()
    );
    MentionScope {
        mentions,
        unmatched,
        documents: selected,
        scoped: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentStatus;

    fn doc(name: &str) -> ProcessedDocument {
        let mut d = ProcessedDocument::pending(name);
        d.status = DocumentStatus::Ready;
        d
    }

    #[test]
    fn parses_bare_and_quoted_mentions() {
        let m = parse_mentions(r#"compare @budget-2023 with @"Budget 2024.pdf" please"#);
        assert_eq!(m, vec!["budget-2023", "Budget 2024.pdf"]);
    }

    #[test]
    fn trailing_punctuation_is_dropped() {
        assert_eq!(parse_mentions("what is in @report.pdf?"), vec!["report.pdf"]);
        assert_eq!(parse_mentions("see @notes."), vec!["notes"]);
        assert_eq!(parse_mentions("(@a, @b)"), vec!["a", "b"]);
    }

    #[test]
    fn email_addresses_are_not_mentions() {
        assert!(parse_mentions("write to bob@example.com").is_empty());
    }

    #[test]
    fn duplicates_are_dropped() {
        assert_eq!(parse_mentions("@A and @a and @A"), vec!["A"]);
    }

    #[test]
    fn matching_rules() {
        let d = doc("Annual Report 2023.pdf");
        assert!(mention_matches("annual report 2023", &d));
        assert!(mention_matches("Annual Report 2023.PDF", &d));
        assert!(mention_matches("annual", &d));
        assert!(!mention_matches("report", &d));
        assert!(!mention_matches(".pdf", &doc("x.pdf")));
    }

    #[test]
    fn no_mentions_selects_all_ready() {
        let a = doc("a.pdf");
        let b = ProcessedDocument::pending("b.pdf");
        let s = scope("summarise", [&a, &b]);
        assert!(!s.scoped);
        assert_eq!(s.document_names(), vec!["a.pdf"]);
    }

    #[test]
    fn mentions_restrict_selection_in_library_order() {
        let docs = [doc("alpha.pdf"), doc("beta.pdf"), doc("gamma.pdf")];
        let s = scope("@gamma vs @alpha and @delta", docs.iter());
        assert!(s.scoped);
        assert_eq!(s.document_names(), vec!["alpha.pdf", "gamma.pdf"]);
        assert_eq!(s.unmatched, vec!["delta"]);
    }

    #[test]
    fn exact_name_beats_prefix() {
        let docs = [doc("report.pdf"), doc("report (2).pdf"), doc("reporting.pdf")];
        let s = scope("summarise @report", docs.iter());
        assert_eq!(s.document_names(), vec!["report.pdf"]);

        let s = scope(r#"summarise @"report (2)""#, docs.iter());
        assert_eq!(s.document_names(), vec!["report (2).pdf"]);

        let s = scope("summarise @repo", docs.iter());
        assert_eq!(s.documents.len(), 3);
    }

    #[test]
    fn mentions_fold_unicode_case() {
        let docs = [doc("Émile.pdf"), doc("notes.pdf")];
        let s = scope("what does @émile say?", docs.iter());
        assert_eq!(s.document_names(), vec!["Émile.pdf"]);
        assert_eq!(parse_mentions("@Émile and @émile"), vec!["Émile"]);
    }

    #[test]
    fn unmatched_mentions_fall_back_to_all() {
        let docs = [doc("alpha.pdf"), doc("beta.pdf")];
        let s = scope("ask @nobody", docs.iter());
        assert!(!s.scoped);
        assert_eq!(s.documents.len(), 2);
        assert_eq!(s.unmatched, vec!["nobody"]);
    }
}
