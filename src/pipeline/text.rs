//! Cleanup of text extracted from a PDF page.
//!
//! pdfium returns text in content-stream order with the layout whitespace of
//! the page: CRLF line breaks, runs of spaces used for justification, words
//! hyphenated at line ends, and the occasional zero-width character. None of
//! that helps the model, and all of it costs tokens.
//!
//! Rules (applied in order):
//! 1. Normalise line endings (CRLF/CR → LF)
//! 2. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens, form feeds)
//! 3. Join words hyphenated across a line break
//! 4. Collapse runs of spaces and tabs inside a line, trim each line
//! 5. Collapse 3+ consecutive blank lines down to one blank line
//! 6. Trim the whole page

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply every cleanup rule to one page of extracted text.
pub fn clean_page_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = remove_invisible_chars(&s);
    let s = join_hyphenated_words(&s);
    let s = collapse_inline_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

/// Text used in place of a page whose extraction failed.
pub fn placeholder_text(page_num: usize) -> String {
    format!("[Page {page_num}: text could not be extracted]")
}

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{000C}',
        ],
        "",
    )
}

static RE_HYPHEN_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\p{Ll})-[ \t]*\n[ \t]*(\p{Ll})").unwrap());

/// `exam-\nple` → `example`. Only lowercase on both sides, so list dashes
/// and compound names at a break are left alone.
fn join_hyphenated_words(input: &str) -> String {
    RE_HYPHEN_BREAK.replace_all(input, "$1$2").to_string()
}

static RE_INLINE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{00A0}]+").unwrap());

fn collapse_inline_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| RE_INLINE_WS.replace_all(line.trim(), " ").into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crlf_and_whitespace() {
        let raw = "Title\r\n\r\n  Some    words\there  \r\nnext";
        assert_eq!(clean_page_text(raw), "Title\n\nSome words here\nnext");
    }

    #[test]
    fn joins_hyphenated_words() {
        assert_eq!(clean_page_text("the exam-\nple works"), "the example works");
        // Capitalised continuation is kept as-is.
        assert_eq!(clean_page_text("Jean-\nPaul"), "Jean-\nPaul");
    }

    #[test]
    fn removes_invisible_chars() {
        assert_eq!(clean_page_text("\u{FEFF}a\u{200B}b\u{00AD}c"), "abc");
    }

    #[test]
    fn collapses_blank_lines() {
        assert_eq!(clean_page_text("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(clean_page_text("a\n   \n  \n\nb"), "a\n\nb");
    }

    #[test]
    fn empty_page_stays_empty() {
        assert_eq!(clean_page_text("  \n\t \n"), "");
    }

    #[test]
    fn placeholder_mentions_page() {
        assert!(placeholder_text(7).contains("Page 7"));
    }
}
