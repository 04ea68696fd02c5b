//! Configuration structures for corpus building.
//!
//! Mix and split ratios are always supplied as data (a versioned
//! [`MixSpec`]); only tuning knobs have defaults.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::schema::fields;
use crate::types::{Action, SourceId};

/// Allowed drift of a ratio sum from 1.0.
pub const RATIO_TOLERANCE: f64 = 1e-6;

/// Largest corpus size whose ratio products are exact in `f64` (2^53).
pub const MAX_TOTAL_SIZE: usize = 1 << 53;

/// Check that a quality threshold lies in `[0, 1]`.
pub fn validate_threshold(threshold: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::config(format!(
            "quality threshold must lie in [0, 1], got {threshold}"
        )));
    }
    Ok(())
}

fn validate_ratio(name: &str, ratio: f64) -> Result<()> {
    if !ratio.is_finite() || !(0.0..=1.0).contains(&ratio) {
        return Err(Error::config(format!(
            "ratio for '{name}' must lie in [0, 1], got {ratio}"
        )));
    }
    Ok(())
}

fn validate_sum(what: &str, sum: f64) -> Result<()> {
    if (sum - 1.0).abs() > RATIO_TOLERANCE {
        return Err(Error::config(format!(
            "{what} ratios must sum to 1.0, got {sum}"
        )));
    }
    Ok(())
}

/// Train/validation/test proportions of the mixed corpus.
///
/// Independent of the per-source mix ratios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitRatios {
    /// Fraction assigned to train.
    pub train: f64,
    /// Fraction assigned to validation.
    pub validation: f64,
    /// Fraction assigned to test.
    pub test: f64,
}

impl SplitRatios {
    /// Create split ratios.
    pub fn new(train: f64, validation: f64, test: f64) -> Self {
        Self {
            train,
            validation,
            test,
        }
    }

    /// Validate that each ratio is in range and they sum to 1.0.
    pub fn validate(&self) -> Result<()> {
        validate_ratio("train", self.train)?;
        validate_ratio("validation", self.validation)?;
        validate_ratio("test", self.test)?;
        validate_sum("split", self.train + self.validation + self.test)
    }

    /// Ratios in train, validation, test order.
    pub fn as_array(&self) -> [f64; 3] {
        [self.train, self.validation, self.test]
    }
}

/// Target share of one source in the mixed corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMix {
    /// Registered source id.
    pub source_id: SourceId,
    /// Fraction of the total drawn from this source.
    pub ratio: f64,
    /// Minimum record quality kept from this source.
    pub quality_threshold: f64,
}

impl SourceMix {
    /// Create a source mix entry.
    pub fn new(source_id: impl Into<SourceId>, ratio: f64, quality_threshold: f64) -> Self {
        Self {
            source_id: source_id.into(),
            ratio,
            quality_threshold,
        }
    }
}

/// Versioned description of one corpus build.
///
/// Source order matters: it breaks allocation ties and orders
/// cross-source deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixSpec {
    /// Free-form revision label, recorded in the manifest.
    pub version: String,
    /// Sources in declaration order.
    pub sources: Vec<SourceMix>,
    /// Total number of records in the mixed corpus.
    pub total_size: usize,
    /// Train/validation/test proportions.
    pub split: SplitRatios,
    /// Seed for sampling and splitting.
    pub seed: u64,
}

impl MixSpec {
    /// Validate ratios, thresholds, totals and source ids.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(Error::config("mix spec version must not be empty"));
        }
        if self.sources.is_empty() {
            return Err(Error::config("mix spec must name at least one source"));
        }
        if self.total_size == 0 {
            return Err(Error::config("total_size must be positive"));
        }
        if self.total_size > MAX_TOTAL_SIZE {
            return Err(Error::config(format!(
                "total_size {} exceeds the maximum of {MAX_TOTAL_SIZE}",
                self.total_size
            )));
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.source_id.trim().is_empty() {
                return Err(Error::config("source ids must not be empty"));
            }
            if !seen.insert(source.source_id.as_str()) {
                return Err(Error::config(format!(
                    "source '{}' appears more than once in the mix",
                    source.source_id
                )));
            }
            validate_ratio(&source.source_id, source.ratio)?;
            validate_threshold(source.quality_threshold)?;
        }

        validate_sum("mix", self.sources.iter().map(|s| s.ratio).sum())?;
        self.split.validate()
    }

    /// Look up a source's mix entry.
    pub fn source(&self, source_id: &str) -> Option<&SourceMix> {
        self.sources.iter().find(|s| s.source_id == source_id)
    }

    /// Source ids in declaration order.
    pub fn source_ids(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.source_id.as_str())
    }
}

/// Deduplication settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Jaccard similarity at or above which two records are near duplicates.
    /// `None` disables near-duplicate detection.
    #[serde(default)]
    pub near_duplicate_threshold: Option<f64>,
    /// Number of most recent kept records compared against.
    #[serde(default = "default_dedup_window")]
    pub window: usize,
}

fn default_dedup_window() -> usize {
    256
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            near_duplicate_threshold: None,
            window: default_dedup_window(),
        }
    }
}

impl DedupConfig {
    /// Validate threshold range and window size.
    pub fn validate(&self) -> Result<()> {
        if let Some(threshold) = self.near_duplicate_threshold {
            if !(threshold > 0.0 && threshold <= 1.0) {
                return Err(Error::config(format!(
                    "near-duplicate threshold must lie in (0, 1], got {threshold}"
                )));
            }
            if self.window == 0 {
                return Err(Error::config("near-duplicate window must be positive"));
            }
        }
        Ok(())
    }
}

/// Unit conversion applied to a native value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Conversion {
    /// Use the value as is.
    #[default]
    Identity,
    /// Value is expressed in percent (`85`, `"85%"`).
    Percent,
    /// Multiply by a constant.
    Scale {
        /// Multiplier.
        factor: f64,
    },
    /// Money string such as `"$1,234.50"`.
    Currency,
}

/// Where one canonical field comes from in a native payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    /// Native key; dots address nested objects (`signal.levels.stop`).
    pub key: String,
    /// Conversion applied to the value.
    #[serde(default)]
    pub conversion: Conversion,
    /// Field may be absent. Only honoured for confidence and indicators.
    #[serde(default)]
    pub optional: bool,
}

impl FieldRule {
    /// Required field read from `key` without conversion.
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            conversion: Conversion::Identity,
            optional: false,
        }
    }

    /// Set the conversion.
    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = conversion;
        self
    }

    /// Mark the field optional.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Mapping from a source's native shape to the canonical record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    /// Signal direction.
    pub action: FieldRule,
    /// Integer confidence, 0 to 100.
    pub confidence: FieldRule,
    /// Price at signal time.
    pub current_price: FieldRule,
    /// Stop-loss level.
    pub stop_loss: FieldRule,
    /// Take-profit level.
    pub take_profit: FieldRule,
    /// Ten daily price forecasts.
    pub forecast_10d: FieldRule,
    /// Free-text rationale.
    pub analysis: FieldRule,
    /// Risk in `[0, 1]`.
    pub risk_score: FieldRule,
    /// Indicator name to value map; optional by default.
    pub technical_indicators: FieldRule,
    /// Extra native action spellings (case-insensitive), e.g. `long -> BUY`.
    #[serde(default)]
    pub action_aliases: BTreeMap<String, Action>,
}

impl FieldMapping {
    /// Identity mapping for sources already in canonical shape.
    pub fn canonical() -> Self {
        Self {
            action: FieldRule::key(fields::ACTION),
            confidence: FieldRule::key(fields::CONFIDENCE),
            current_price: FieldRule::key(fields::CURRENT_PRICE),
            stop_loss: FieldRule::key(fields::STOP_LOSS),
            take_profit: FieldRule::key(fields::TAKE_PROFIT),
            forecast_10d: FieldRule::key(fields::FORECAST_10D),
            analysis: FieldRule::key(fields::ANALYSIS),
            risk_score: FieldRule::key(fields::RISK_SCORE),
            technical_indicators: FieldRule::key(fields::TECHNICAL_INDICATORS),
            action_aliases: BTreeMap::new(),
        }
    }

    /// Rules paired with their canonical field names.
    pub fn rules(&self) -> [(&'static str, &FieldRule); 9] {
        [
            (fields::ACTION, &self.action),
            (fields::CONFIDENCE, &self.confidence),
            (fields::CURRENT_PRICE, &self.current_price),
            (fields::STOP_LOSS, &self.stop_loss),
            (fields::TAKE_PROFIT, &self.take_profit),
            (fields::FORECAST_10D, &self.forecast_10d),
            (fields::ANALYSIS, &self.analysis),
            (fields::RISK_SCORE, &self.risk_score),
            (fields::TECHNICAL_INDICATORS, &self.technical_indicators),
        ]
    }

    /// Reject empty keys, bad scale factors, and optional business fields.
    pub fn validate(&self) -> Result<()> {
        for (field, rule) in self.rules() {
            if rule.key.trim().is_empty() || rule.key.split('.').any(str::is_empty) {
                return Err(Error::config(format!(
                    "field '{field}' has an invalid native key '{}'",
                    rule.key
                )));
            }
            if let Conversion::Scale { factor } = rule.conversion {
                if !factor.is_finite() || factor == 0.0 {
                    return Err(Error::config(format!(
                        "field '{field}' has an invalid scale factor {factor}"
                    )));
                }
            }
            let may_be_optional =
                field == fields::CONFIDENCE || field == fields::TECHNICAL_INDICATORS;
            if rule.optional && !may_be_optional {
                return Err(Error::config(format!(
                    "field '{field}' is required and cannot be marked optional"
                )));
            }
        }
        Ok(())
    }
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self::canonical()
    }
}

/// How a source's records get their quality score.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityOrigin {
    /// Every record inherits the source's declared score.
    #[default]
    Source,
    /// Per-record score read from a native key (`0.8`, `80`, `"80%"`);
    /// records without it inherit the declared score.
    Field {
        /// Native key holding the score.
        key: String,
    },
    /// Score the text under `text_key` with the text-quality heuristics.
    Heuristic {
        /// Native key holding the text to score.
        text_key: String,
        /// Domain keywords used for the relevance component.
        #[serde(default)]
        keywords: Vec<String>,
    },
}

/// Everything the catalog needs to ingest one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSchema {
    /// Source-level quality score in `[0, 1]`.
    pub declared_quality: f64,
    /// Where per-record quality comes from.
    #[serde(default)]
    pub quality_origin: QualityOrigin,
    /// Native-to-canonical field mapping.
    #[serde(default)]
    pub mapping: FieldMapping,
    /// Clamp out-of-range confidence and risk score instead of dropping.
    #[serde(default)]
    pub repair: bool,
}

impl SourceSchema {
    /// Canonical-shape source with a declared quality.
    pub fn canonical(declared_quality: f64) -> Self {
        Self {
            declared_quality,
            quality_origin: QualityOrigin::Source,
            mapping: FieldMapping::canonical(),
            repair: false,
        }
    }

    /// Validate quality and mapping.
    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.declared_quality)
            .map_err(|_| Error::config(format!(
                "declared quality must lie in [0, 1], got {}",
                self.declared_quality
            )))?;
        match &self.quality_origin {
            QualityOrigin::Field { key } if key.trim().is_empty() => {
                return Err(Error::config("quality field key must not be empty"));
            }
            QualityOrigin::Heuristic { text_key, .. } if text_key.trim().is_empty() => {
                return Err(Error::config("heuristic quality text key must not be empty"));
            }
            _ => {}
        }
        self.mapping.validate()
    }
}

/// A source file plus its schema, as listed in a pipeline config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDefinition {
    /// Source id referenced by the mix.
    pub id: SourceId,
    /// JSONL file with one native record per line.
    pub path: PathBuf,
    /// Ingestion schema.
    #[serde(flatten)]
    pub schema: SourceSchema,
}

/// Complete configuration for a corpus build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Mix specification.
    pub mix: MixSpec,
    /// Deduplication settings.
    #[serde(default)]
    pub dedup: DedupConfig,
    /// Source files.
    #[serde(default)]
    pub sources: Vec<SourceDefinition>,
    /// Directory the corpus is written to.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl PipelineConfig {
    /// Load from a `.json` or `.toml` file.
    ///
    /// Relative source paths are resolved against the config file's directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let mut config = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text)?,
            Some("json") | None => Self::from_json_str(&text)?,
            Some(other) => {
                return Err(Error::config(format!(
                    "unsupported config extension '.{other}' (expected .json or .toml)"
                )))
            }
        };
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Parse JSON.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::config(format!("invalid pipeline config: {e}")))
    }

    /// Parse TOML.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(format!("invalid pipeline config: {e}")))
    }

    fn resolve_paths(&mut self, base: &Path) {
        for source in &mut self.sources {
            if source.path.is_relative() {
                source.path = base.join(&source.path);
            }
        }
        if let Some(dir) = &self.output_dir {
            if dir.is_relative() {
                self.output_dir = Some(base.join(dir));
            }
        }
    }

    /// Validate the mix, dedup settings and every source definition.
    pub fn validate(&self) -> Result<()> {
        self.mix.validate()?;
        self.dedup.validate()?;
        for source in &self.sources {
            source
                .schema
                .validate()
                .map_err(|e| Error::config(format!("source '{}': {e}", source.id)))?;
        }
        for id in self.mix.source_ids() {
            if !self.sources.iter().any(|s| s.id == id) {
                return Err(Error::config(format!(
                    "mix references source '{id}' which has no definition"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mix(ratios: &[(&str, f64)]) -> MixSpec {
        MixSpec {
            version: "test".to_string(),
            sources: ratios
                .iter()
                .map(|(id, r)| SourceMix::new(*id, *r, 0.5))
                .collect(),
            total_size: 100,
            split: SplitRatios::new(0.85, 0.10, 0.05),
            seed: 7,
        }
    }

    #[test]
    fn test_documented_mixes_validate() {
        assert!(mix(&[("a", 0.85), ("b", 0.10), ("c", 0.05)]).validate().is_ok());
        assert!(mix(&[("a", 0.90), ("b", 0.07), ("c", 0.03)]).validate().is_ok());
    }

    #[test]
    fn test_ratio_sum_rejected() {
        let err = mix(&[("a", 0.5), ("b", 0.3)]).validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_total_size_bounds() {
        let mut spec = mix(&[("a", 0.5), ("b", 0.5)]);
        spec.total_size = MAX_TOTAL_SIZE;
        assert!(spec.validate().is_ok());
        spec.total_size = usize::MAX;
        assert!(matches!(spec.validate(), Err(Error::Config(_))));
        spec.total_size = 0;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_duplicate_source_rejected() {
        assert!(mix(&[("a", 0.5), ("a", 0.5)]).validate().is_err());
    }

    #[test]
    fn test_threshold_out_of_range() {
        let mut spec = mix(&[("a", 1.0)]);
        spec.sources[0].quality_threshold = 1.5;
        assert!(spec.validate().is_err());
        assert!(validate_threshold(-0.01).is_err());
        assert!(validate_threshold(f64::NAN).is_err());
    }

    #[test]
    fn test_split_ratios() {
        assert!(SplitRatios::new(0.90, 0.07, 0.03).validate().is_ok());
        assert!(SplitRatios::new(0.90, 0.10, 0.10).validate().is_err());
    }

    #[test]
    fn test_optional_price_rejected() {
        let mut mapping = FieldMapping::canonical();
        mapping.confidence = mapping.confidence.optional();
        assert!(mapping.validate().is_ok());
        mapping.current_price = mapping.current_price.optional();
        assert!(mapping.validate().is_err());
    }

    #[test]
    fn test_negative_total_is_config_error() {
        let json = r#"{
            "mix": {
                "version": "v1",
                "sources": [{"source_id": "a", "ratio": 1.0, "quality_threshold": 0.5}],
                "total_size": -3,
                "split": {"train": 0.9, "validation": 0.07, "test": 0.03},
                "seed": 1
            }
        }"#;
        let err = PipelineConfig::from_json_str(json).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_toml_config_round_trip() {
        let text = r#"
            output_dir = "out"

            [mix]
            version = "2024-revision-b"
            total_size = 12
            seed = 42
            sources = [
                { source_id = "news", ratio = 0.5, quality_threshold = 0.5 },
                { source_id = "tech", ratio = 0.5, quality_threshold = 0.0 },
            ]
            split = { train = 0.8, validation = 0.1, test = 0.1 }

            [[sources]]
            id = "news"
            path = "news.jsonl"
            declared_quality = 0.9

            [[sources]]
            id = "tech"
            path = "tech.jsonl"
            declared_quality = 0.7
            repair = true
            quality_origin = { kind = "field", key = "score" }
        "#;
        let config = PipelineConfig::from_toml_str(text).unwrap();
        config.validate().unwrap();
        assert_eq!(config.dedup, DedupConfig::default());
        assert_eq!(config.sources[1].schema.quality_origin, QualityOrigin::Field {
            key: "score".to_string()
        });
        assert!(config.sources[1].schema.repair);
        assert_eq!(config.sources[0].schema.mapping, FieldMapping::canonical());
    }

    #[test]
    fn test_from_path_resolves_relative_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let json = r#"{
            "mix": {
                "version": "v1",
                "sources": [{"source_id": "a", "ratio": 1.0, "quality_threshold": 0.5}],
                "total_size": 3,
                "split": {"train": 0.9, "validation": 0.07, "test": 0.03},
                "seed": 1
            },
            "sources": [{"id": "a", "path": "a.jsonl", "declared_quality": 1.0}]
        }"#;
        fs::write(&path, json).unwrap();
        let config = PipelineConfig::from_path(&path).unwrap();
        assert_eq!(config.sources[0].path, dir.path().join("a.jsonl"));
    }

    #[test]
    fn test_missing_source_definition() {
        let config = PipelineConfig {
            mix: mix(&[("a", 1.0)]),
            dedup: DedupConfig::default(),
            sources: Vec::new(),
            output_dir: None,
        };
        assert!(config.validate().is_err());
    }
}
