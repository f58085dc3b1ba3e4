//! String similarity scorers. Every scorer returns a ratio in [0, 1].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pluggable similarity metric used by the matcher
pub trait Scorer: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
    fn name(&self) -> &'static str;
}

/// Ratcliff/Obershelp gestalt ratio: `2 * matched / (len(a) + len(b))`
pub struct SequenceScorer;

impl Scorer for SequenceScorer {
    fn score(&self, a: &str, b: &str) -> f64 {
        sequence_ratio(a, b)
    }

    fn name(&self) -> &'static str {
        "sequence"
    }
}

/// Normalized Levenshtein distance
pub struct LevenshteinScorer;

impl Scorer for LevenshteinScorer {
    fn score(&self, a: &str, b: &str) -> f64 {
        strsim::normalized_levenshtein(a, b)
    }

    fn name(&self) -> &'static str {
        "levenshtein"
    }
}

pub struct JaroWinklerScorer;

impl Scorer for JaroWinklerScorer {
    fn score(&self, a: &str, b: &str) -> f64 {
        if a.is_empty() && b.is_empty() {
            return 1.0;
        }
        strsim::jaro_winkler(a, b)
    }

    fn name(&self) -> &'static str {
        "jaro_winkler"
    }
}

/// Soundex code per word, compared with the gestalt ratio
pub struct PhoneticScorer;

impl Scorer for PhoneticScorer {
    fn score(&self, a: &str, b: &str) -> f64 {
        sequence_ratio(&phonetic_key(a), &phonetic_key(b))
    }

    fn name(&self) -> &'static str {
        "phonetic"
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    #[default]
    Sequence,
    Levenshtein,
    JaroWinkler,
    Phonetic,
}

impl ScorerKind {
    pub fn build(&self) -> Box<dyn Scorer> {
        match self {
            ScorerKind::Sequence => Box::new(SequenceScorer),
            ScorerKind::Levenshtein => Box::new(LevenshteinScorer),
            ScorerKind::JaroWinkler => Box::new(JaroWinklerScorer),
            ScorerKind::Phonetic => Box::new(PhoneticScorer),
        }
    }
}

impl fmt::Display for ScorerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.build().name())
    }
}

/// Gestalt pattern matching ratio over chars. Two empty strings are identical.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / total as f64
}

/// Sum of the sizes of the matching blocks found by recursively taking the
/// longest common substring and recursing on both sides of it
fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 {
            continue;
        }
        matched += k;
        if alo < i && blo < j {
            queue.push((alo, i, blo, j));
        }
        if i + k < ahi && j + k < bhi {
            queue.push((i + k, ahi, j + k, bhi));
        }
    }
    matched
}

/// Longest common block in `a[alo..ahi]` / `b[blo..bhi]`; ties go to the
/// earliest start in `a`, then in `b`
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let mut best = (alo, blo, 0);
    let width = bhi.saturating_sub(blo) + 1;
    let mut prev = vec![0usize; width];
    for i in alo..ahi {
        let mut cur = vec![0usize; width];
        for j in blo..bhi {
            if a[i] == b[j] {
                let k = prev[j - blo] + 1;
                cur[j - blo + 1] = k;
                if k > best.2 {
                    best = (i + 1 - k, j + 1 - k, k);
                }
            }
        }
        prev = cur;
    }
    best
}

/// Space-joined Soundex codes of the words of `s`
pub fn phonetic_key(s: &str) -> String {
    s.split_whitespace()
        .map(soundex)
        .collect::<Vec<_>>()
        .join(" ")
}

fn soundex_digit(c: char) -> Option<char> {
    match c {
        'b' | 'f' | 'p' | 'v' => Some('1'),
        'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => Some('2'),
        'd' | 't' => Some('3'),
        'l' => Some('4'),
        'm' | 'n' => Some('5'),
        'r' => Some('6'),
        _ => None,
    }
}

/// American Soundex; words without ASCII letters are returned unchanged
pub fn soundex(word: &str) -> String {
    let letters: Vec<char> = word
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let Some(&first) = letters.first() else {
        return word.to_string();
    };

    let mut code = String::with_capacity(4);
    code.push(first.to_ascii_uppercase());
    let mut last = soundex_digit(first);
    for &c in &letters[1..] {
        if code.len() == 4 {
            break;
        }
        let digit = soundex_digit(c);
        match digit {
            Some(d) if digit != last => {
                code.push(d);
                last = digit;
            }
            Some(_) => {}
            // h and w do not separate equal codes, vowels do
            None if c == 'h' || c == 'w' => {}
            None => last = None,
        }
    }
    while code.len() < 4 {
        code.push('0');
    }
    code
}
