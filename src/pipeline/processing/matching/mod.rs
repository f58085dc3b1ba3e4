//! Matcher: reconciles free-text column values against a reference vocabulary.

pub mod similarity;
pub mod vocabulary;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::constants::{
    DEFAULT_MATCH_THRESHOLD, NEW_CODE_DUPLICATE_SIMILARITY, TOKEN_COVERAGE_WEIGHT,
};
use crate::domain::text::match_key;
use crate::domain::{ColumnRef, Table, Value};
use crate::error::MatchError;
use crate::pipeline::report::ColumnMatchSummary;

pub use similarity::{sequence_ratio, Scorer, ScorerKind};
pub use vocabulary::{CanonicalEntry, ReferenceVocabulary, VocabularyItem};

/// `[matching]` section of a page
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MatchingConfig {
    pub columns: Vec<ColumnRef>,
    pub threshold: f64,
    /// Stricter bar for plain fuzzy scores; `threshold` when absent
    pub fuzzy_threshold: Option<f64>,
    pub scorer: ScorerKind,
    pub ignore_spaces: bool,
    pub token_coverage: bool,
    pub vocabulary: Vec<VocabularyItem>,
    /// Name/code sheet merged into the inline vocabulary
    pub vocabulary_file: Option<PathBuf>,
    /// Code for rows left for review (and for empty inputs)
    pub unmatched_code: Option<i64>,
    /// Hand out fresh sequential codes to names below the threshold
    pub assign_new_codes: bool,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            threshold: DEFAULT_MATCH_THRESHOLD,
            fuzzy_threshold: None,
            scorer: ScorerKind::default(),
            ignore_spaces: false,
            token_coverage: false,
            vocabulary: Vec::new(),
            vocabulary_file: None,
            unmatched_code: None,
            assign_new_codes: false,
        }
    }
}

impl MatchingConfig {
    pub fn settings(&self) -> MatchSettings {
        MatchSettings {
            threshold: self.threshold,
            fuzzy_threshold: self.fuzzy_threshold,
            scorer: self.scorer,
            ignore_spaces: self.ignore_spaces,
            token_coverage: self.token_coverage,
            unmatched_code: self.unmatched_code,
            assign_new_codes: self.assign_new_codes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchSettings {
    /// Acceptance bar for exact and token-coverage matches
    pub threshold: f64,
    /// Acceptance bar for fuzzy matches; `threshold` when absent
    pub fuzzy_threshold: Option<f64>,
    pub scorer: ScorerKind,
    pub ignore_spaces: bool,
    pub token_coverage: bool,
    pub unmatched_code: Option<i64>,
    pub assign_new_codes: bool,
}

impl Default for MatchSettings {
    fn default() -> Self {
        MatchingConfig::default().settings()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchDecision {
    Accepted,
    Review,
}

impl MatchDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchDecision::Accepted => "accepted",
            MatchDecision::Review => "review",
        }
    }
}

/// How the winning score was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exact,
    TokenCover,
    Fuzzy,
    NewEntry,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub row: usize,
    pub input: Option<String>,
    /// Best canonical suggestion, even when left for review
    pub canonical: Option<String>,
    pub code: Option<i64>,
    pub score: f64,
    pub strategy: MatchStrategy,
    pub decision: MatchDecision,
}

/// Codes handed out during one run to names the vocabulary does not know.
/// Never written back into the vocabulary.
#[derive(Debug, Clone)]
pub struct NewCodes {
    next: i64,
    assigned: Vec<(String, String, i64)>,
}

impl NewCodes {
    pub fn new(vocabulary: &ReferenceVocabulary) -> Self {
        Self {
            next: vocabulary.max_code().map_or(1, |c| c + 1),
            assigned: Vec::new(),
        }
    }

    /// Code for `name`, reusing the code of a near-identical earlier name
    pub fn code_for(&mut self, name: &str) -> i64 {
        let key = match_key(name, true);
        if let Some((_, _, code)) = self
            .assigned
            .iter()
            .find(|(k, _, _)| sequence_ratio(&key, k) >= NEW_CODE_DUPLICATE_SIMILARITY)
        {
            return *code;
        }
        let code = self.next;
        self.next += 1;
        self.assigned.push((key, name.to_string(), code));
        code
    }

    pub fn assigned(&self) -> impl Iterator<Item = (&str, i64)> {
        self.assigned.iter().map(|(_, name, code)| (name.as_str(), *code))
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }

    /// Name/code table of `vocabulary` plus the codes assigned so far,
    /// ordered by code. Entries without a code come last.
    pub fn updated_vocabulary(
        &self,
        vocabulary: &ReferenceVocabulary,
        name_header: &str,
        code_header: &str,
    ) -> Table {
        let mut rows: Vec<(Option<i64>, &str)> = vocabulary
            .entries()
            .iter()
            .map(|e| (e.code, e.name.as_str()))
            .chain(self.assigned().map(|(name, code)| (Some(code), name)))
            .collect();
        rows.sort_by(|a, b| match (a.0, b.0) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.1.cmp(b.1)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.1.cmp(b.1),
        });

        let mut table = Table::new(Vec::new());
        table.add_column(name_header, Vec::new());
        table.add_column(code_header, Vec::new());
        for (code, name) in rows {
            table.push_row(vec![
                Value::text(name),
                code.map(|c| Value::Number(c as f64)).unwrap_or(Value::Null),
            ]);
        }
        table
    }
}

/// Results for one matched column
#[derive(Debug, Clone)]
pub struct ColumnMatches {
    pub column: String,
    pub results: Vec<MatchResult>,
    pub with_codes: bool,
}

impl ColumnMatches {
    pub fn summary(&self, new_codes: &NewCodes) -> ColumnMatchSummary {
        let mut summary = ColumnMatchSummary {
            column: self.column.clone(),
            ..Default::default()
        };
        let mut fresh = HashSet::new();
        for r in &self.results {
            match (r.strategy, r.decision) {
                (MatchStrategy::Empty, _) => summary.empty += 1,
                (_, MatchDecision::Accepted) => summary.accepted += 1,
                (_, MatchDecision::Review) => summary.review += 1,
            }
            if r.strategy == MatchStrategy::NewEntry {
                if let Some(code) = r.code {
                    fresh.insert(code);
                }
            }
        }
        summary.new_codes = new_codes
            .assigned()
            .filter(|(_, code)| fresh.contains(code))
            .map(|(name, code)| (name.to_string(), code))
            .collect::<BTreeMap<_, _>>();
        summary
    }

    /// Add `C_match`, `C_score`, `C_decision` and, with codes, `C_code`.
    /// Names already in the table get a numeric suffix instead.
    pub fn annotate(&self, table: &mut Table) {
        let col = &self.column;
        let cells = |f: &dyn Fn(&MatchResult) -> Value| -> Vec<Value> {
            self.results.iter().map(f).collect()
        };

        table.add_column(
            &format!("{col}_match"),
            cells(&|r| r.canonical.clone().map(Value::Text).unwrap_or(Value::Null)),
        );
        table.add_column(
            &format!("{col}_score"),
            cells(&|r| Value::Number((r.score * 10_000.0).round() / 10_000.0)),
        );
        table.add_column(
            &format!("{col}_decision"),
            cells(&|r| Value::text(r.decision.as_str())),
        );
        if self.with_codes {
            table.add_column(
                &format!("{col}_code"),
                cells(&|r| r.code.map(|c| Value::Number(c as f64)).unwrap_or(Value::Null)),
            );
        }
    }
}

struct IndexedEntry {
    name: String,
    code: Option<i64>,
    key: String,
    tokens: Vec<String>,
}

/// Read-only matcher over one vocabulary
pub struct Matcher {
    vocabulary: Arc<ReferenceVocabulary>,
    entries: Vec<IndexedEntry>,
    scorer: Box<dyn Scorer>,
    settings: MatchSettings,
}

impl Matcher {
    pub fn new(
        vocabulary: Arc<ReferenceVocabulary>,
        settings: MatchSettings,
    ) -> Result<Self, MatchError> {
        if vocabulary.is_empty() {
            return Err(MatchError::EmptyVocabulary);
        }
        for threshold in std::iter::once(settings.threshold).chain(settings.fuzzy_threshold) {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(MatchError::InvalidThreshold(threshold));
            }
        }

        let entries = vocabulary
            .entries()
            .iter()
            .map(|e| {
                let spaced = match_key(&e.name, false);
                IndexedEntry {
                    name: e.name.clone(),
                    code: e.code,
                    key: match_key(&e.name, settings.ignore_spaces),
                    tokens: spaced.split(' ').filter(|t| !t.is_empty()).map(str::to_string).collect(),
                }
            })
            .collect();

        debug!(
            "Matcher ready: {} entries, scorer={}, threshold={}",
            vocabulary.len(),
            settings.scorer,
            settings.threshold
        );
        Ok(Self {
            vocabulary,
            entries,
            scorer: settings.scorer.build(),
            settings,
        })
    }

    pub fn vocabulary(&self) -> &ReferenceVocabulary {
        &self.vocabulary
    }

    pub fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    /// Whether results carry codes (and a `_code` column is produced)
    pub fn with_codes(&self) -> bool {
        self.vocabulary.has_codes() || self.settings.unmatched_code.is_some()
    }

    /// Best vocabulary entry for one value. Fuzzy scores must clear
    /// `fuzzy_threshold`, the other strategies `threshold`. Rows below the bar
    /// get `unmatched_code`; new-code assignment happens in
    /// [`Matcher::match_column`].
    pub fn match_value(&self, row: usize, value: &Value) -> MatchResult {
        if value.is_missing() {
            return MatchResult {
                row,
                input: None,
                canonical: None,
                code: self.settings.unmatched_code,
                score: 0.0,
                strategy: MatchStrategy::Empty,
                decision: MatchDecision::Review,
            };
        }
        let input = value.as_text().map(|t| t.trim().to_string()).unwrap_or_default();
        let key = match_key(&input, self.settings.ignore_spaces);

        let Some((entry, score, strategy)) = self.best_entry(&input, &key) else {
            return MatchResult {
                row,
                input: Some(input),
                canonical: None,
                code: self.settings.unmatched_code,
                score: 0.0,
                strategy: MatchStrategy::Fuzzy,
                decision: MatchDecision::Review,
            };
        };
        let bar = match strategy {
            MatchStrategy::Fuzzy => self
                .settings
                .fuzzy_threshold
                .unwrap_or(self.settings.threshold),
            _ => self.settings.threshold,
        };
        let accepted = score >= bar;
        MatchResult {
            row,
            input: Some(input),
            canonical: Some(entry.name.clone()),
            code: if accepted {
                entry.code
            } else {
                self.settings.unmatched_code
            },
            score,
            strategy,
            decision: if accepted {
                MatchDecision::Accepted
            } else {
                MatchDecision::Review
            },
        }
    }

    /// Match every cell of `column`
    #[instrument(skip(self, table, new_codes), fields(rows = table.row_count()))]
    pub fn match_column(
        &self,
        table: &Table,
        column: usize,
        new_codes: &mut NewCodes,
    ) -> ColumnMatches {
        let name = table.columns()[column].clone();
        let assign = self.settings.assign_new_codes && self.vocabulary.has_codes();

        let results: Vec<MatchResult> = table
            .column_values(column)
            .enumerate()
            .map(|(row, value)| {
                let mut result = self.match_value(row, value);
                if assign
                    && result.decision == MatchDecision::Review
                    && result.strategy != MatchStrategy::Empty
                {
                    if let Some(input) = &result.input {
                        result.code = Some(new_codes.code_for(input));
                        result.strategy = MatchStrategy::NewEntry;
                    }
                }
                result
            })
            .collect();

        let accepted = results
            .iter()
            .filter(|r| r.decision == MatchDecision::Accepted)
            .count();
        info!(
            "Matched column {}: {}/{} accepted",
            name,
            accepted,
            results.len()
        );
        for result in &results {
            crate::observability::metrics::matching::decision(result.decision.as_str());
        }

        ColumnMatches {
            column: name,
            results,
            with_codes: self.with_codes(),
        }
    }

    fn best_entry(&self, input: &str, key: &str) -> Option<(&IndexedEntry, f64, MatchStrategy)> {
        let exact = self
            .entries
            .iter()
            .filter(|e| !key.is_empty() && e.key == key)
            .min_by(|a, b| tie_break(a, b));
        if let Some(entry) = exact {
            return Some((entry, 1.0, MatchStrategy::Exact));
        }

        let spaced = if self.settings.token_coverage {
            match_key(input, false)
        } else {
            String::new()
        };
        let input_tokens: HashSet<&str> = spaced.split(' ').filter(|t| !t.is_empty()).collect();

        let mut best: Option<(&IndexedEntry, f64, MatchStrategy)> = None;
        for entry in &self.entries {
            let similarity = self.scorer.score(key, &entry.key).clamp(0.0, 1.0);
            let (score, strategy) = match self.coverage(entry, &input_tokens) {
                Some(coverage) => {
                    let blended = TOKEN_COVERAGE_WEIGHT * coverage
                        + (1.0 - TOKEN_COVERAGE_WEIGHT) * similarity;
                    if blended > similarity {
                        (blended, MatchStrategy::TokenCover)
                    } else {
                        (similarity, MatchStrategy::Fuzzy)
                    }
                }
                None => (similarity, MatchStrategy::Fuzzy),
            };

            let better = match &best {
                None => true,
                Some((current, current_score, _)) => {
                    score > *current_score
                        || (score == *current_score
                            && tie_break(entry, current) == std::cmp::Ordering::Less)
                }
            };
            if better {
                best = Some((entry, score, strategy));
            }
        }
        best
    }

    /// Share of the entry's tokens present in the input, when enough are
    fn coverage(&self, entry: &IndexedEntry, input_tokens: &HashSet<&str>) -> Option<f64> {
        if !self.settings.token_coverage || entry.tokens.is_empty() {
            return None;
        }
        let have = entry
            .tokens
            .iter()
            .filter(|t| input_tokens.contains(t.as_str()))
            .count();
        let need = if entry.tokens.len() >= 3 {
            2
        } else {
            entry.tokens.len()
        };
        (have >= need).then(|| have as f64 / entry.tokens.len() as f64)
    }
}

/// Shorter canonical name first, then lexicographic
fn tie_break(a: &IndexedEntry, b: &IndexedEntry) -> std::cmp::Ordering {
    a.name
        .chars()
        .count()
        .cmp(&b.name.chars().count())
        .then_with(|| a.name.cmp(&b.name))
}
