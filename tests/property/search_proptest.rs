//! Property-based tests for search text helpers

use proptest::prelude::*;

use daydeskr::client::search::{format_snippet, highlight_terms};

proptest! {
    #[test]
    fn test_highlight_without_markup_is_identity(text in ".{0,200}", term in "[a-zA-Z]{1,8}") {
        let highlighted = highlight_terms(&text, &[term.as_str()]);
        let stripped = highlighted.replace("<mark>", "").replace("</mark>", "");
        // Only holds when the input itself contains no markers.
        prop_assume!(!text.contains("<mark>") && !text.contains("</mark>"));
        prop_assert_eq!(stripped, text);
    }

    #[test]
    fn test_highlight_accepts_regex_metacharacters(text in ".{0,100}", term in "[.*+?()\\[\\]{}|^$\\\\]{1,4}") {
        // Must not panic or fail to build a pattern.
        let _ = highlight_terms(&text, &[term.as_str()]);
    }

    #[test]
    fn test_snippet_is_bounded(content in ".{0,400}", max in 10usize..200) {
        let snippet = format_snippet(&content, max);
        prop_assert!(snippet.chars().count() <= max + 3);
        if content.chars().count() <= max {
            prop_assert_eq!(snippet, content);
        } else {
            prop_assert!(snippet.ends_with("..."));
        }
    }
}
