use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ConfigError, MatchError, NormalizationError};
use crate::pipeline::export::{ExportConfig, Exporter, VocabularyExportConfig};
use crate::pipeline::ingestion::IngestConfig;
use crate::pipeline::processing::matching::{MatchingConfig, ReferenceVocabulary};
use crate::pipeline::processing::normalize::{DeriveRule, NormalizationRule, Normalizer};
use crate::pipeline::processing::reshape::PivotConfig;
use crate::pipeline::processing::validation::{ValidationRule, Validator};
use crate::pipeline::Stage;

/// One page: everything a pipeline run needs besides the input files
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub page: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub ingest: IngestConfig,
    /// New columns computed from the ingested cells, before `normalize`
    #[serde(default)]
    pub derive: Vec<DeriveRule>,
    #[serde(default)]
    pub normalize: Vec<NormalizationRule>,
    /// Long-to-wide reshape after normalization
    #[serde(default)]
    pub pivot: Option<PivotConfig>,
    #[serde(default)]
    pub matching: Option<MatchingConfig>,
    #[serde(default)]
    pub validate: Vec<ValidationRule>,
    #[serde(default)]
    pub export: ExportConfig,
    /// Further files written from the same table
    #[serde(default)]
    pub extra_export: Vec<ExportConfig>,
    #[serde(default)]
    pub vocabulary_export: Option<VocabularyExportConfig>,
    /// Directory relative vocabulary files resolve against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = toml::from_str(content)?;
        if config.page.trim().is_empty() {
            return Err(ConfigError::Invalid("page id must not be empty".to_string()));
        }
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        debug!("Loaded page {} from {}", config.page, path.display());
        Ok(config)
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.page)
    }

    /// Inline entries merged with the configured vocabulary file.
    /// `None` when the page does no matching.
    pub fn vocabulary(&self) -> Result<Option<ReferenceVocabulary>, MatchError> {
        let Some(matching) = &self.matching else {
            return Ok(None);
        };
        let inline = ReferenceVocabulary::from_items(&matching.vocabulary);
        let vocabulary = match &matching.vocabulary_file {
            Some(file) => {
                let path = match &self.base_dir {
                    Some(base) if file.is_relative() => base.join(file),
                    _ => file.clone(),
                };
                inline.merged(&ReferenceVocabulary::load(path)?)
            }
            None => inline,
        };
        Ok(Some(vocabulary))
    }

    /// Build every stage component without running anything. Returns the
    /// problems found, each with the stage that would fail on it.
    ///
    /// With `vocabulary_supplied`, an empty configured vocabulary is not a
    /// problem since the caller brings its own.
    pub fn check(&self, vocabulary_supplied: bool) -> Vec<(Stage, String)> {
        let mut problems = Vec::new();

        if let Err(e) = self.ingest.skip_pattern() {
            problems.push((Stage::Ingesting, e.to_string()));
        }

        if let Err(e) = self.normalizer() {
            problems.push((Stage::Normalizing, e.to_string()));
        }
        if self.pivot.as_ref().is_some_and(|p| p.index.is_empty()) {
            problems.push((Stage::Normalizing, "pivot names no index columns".to_string()));
        }

        if let Some(matching) = &self.matching {
            if matching.columns.iter().all(|c| c.is_empty()) {
                problems.push((Stage::Matching, MatchError::NoColumns.to_string()));
            }
            let thresholds = std::iter::once(matching.threshold).chain(matching.fuzzy_threshold);
            for threshold in thresholds {
                if !(0.0..=1.0).contains(&threshold) {
                    problems.push((
                        Stage::Matching,
                        MatchError::InvalidThreshold(threshold).to_string(),
                    ));
                }
            }
            match self.vocabulary() {
                Ok(Some(vocabulary)) if vocabulary.is_empty() && !vocabulary_supplied => {
                    problems.push((Stage::Matching, MatchError::EmptyVocabulary.to_string()));
                }
                Ok(_) => {}
                Err(e) => problems.push((Stage::Matching, e.to_string())),
            }
        }

        if let Err(e) = Validator::new(&self.validate) {
            problems.push((Stage::Validating, e.to_string()));
        }

        let exports = std::iter::once(self.export.clone())
            .chain(self.extra_export.iter().cloned())
            .chain(self.vocabulary_export.iter().map(|v| v.export_config()));
        for export in exports {
            if let Err(e) = Exporter::new(export) {
                problems.push((Stage::Exporting, e.to_string()));
            }
        }

        problems
    }

    /// Derive and normalization rules compiled together
    pub fn normalizer(&self) -> Result<Normalizer, NormalizationError> {
        Normalizer::new(&self.normalize)?.with_derived(&self.derive)
    }
}
