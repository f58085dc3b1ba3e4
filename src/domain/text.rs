//! String folding helpers shared by the normalizer, the matcher and column lookup.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Strip diacritics: decompose, drop combining marks, recompose
pub fn fold_accents(s: &str) -> String {
    s.nfd().filter(|c| !is_combining_mark(*c)).nfc().collect()
}

/// Collapse runs of whitespace into single spaces and trim both ends
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Comparison key used for fuzzy matching: lowercase, accents folded,
/// every non-alphanumeric run turned into one space.
pub fn match_key(s: &str, ignore_spaces: bool) -> String {
    let folded = fold_accents(&s.to_lowercase());
    let spaced: String = folded
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    if ignore_spaces {
        spaced.chars().filter(|c| !c.is_whitespace()).collect()
    } else {
        collapse_whitespace(&spaced)
    }
}

/// Lowercased, accent-folded form used for `~fragment` column lookups
pub fn header_key(s: &str) -> String {
    fold_accents(&s.trim().to_lowercase())
}

/// Title case where every letter following a non-letter starts a word
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_letter = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}
