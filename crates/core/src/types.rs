//! Core data types shared by the corpus pipeline and the validator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::hash;

/// Identifier of a registered raw dataset.
pub type SourceId = String;

/// Native record payload as delivered by a source.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// Quality score bounded to `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct QualityScore(f64);

impl QualityScore {
    /// Highest possible score.
    pub const MAX: QualityScore = QualityScore(1.0);
    /// Lowest possible score.
    pub const MIN: QualityScore = QualityScore(0.0);

    /// Create a score, rejecting NaN and values outside `[0, 1]`.
    pub fn new(value: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&value) {
            return Err(Error::config(format!(
                "quality score must lie in [0, 1], got {value}"
            )));
        }
        Ok(Self(value))
    }

    /// Raw value.
    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Whether the score passes `threshold` (inclusive).
    #[inline]
    pub fn meets(self, threshold: f64) -> bool {
        self.0 >= threshold
    }
}

impl TryFrom<f64> for QualityScore {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<QualityScore> for f64 {
    fn from(score: QualityScore) -> Self {
        score.0
    }
}

/// SHA-256 of a payload's canonical JSON, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash a payload. Key order does not affect the result.
    pub fn of_payload(payload: &Payload) -> Self {
        Self(hash::sha256_hex(hash::canonical_json_object(payload).as_bytes()))
    }

    /// Hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough for logs.
        f.write_str(&self.0[..self.0.len().min(12)])
    }
}

/// A record as ingested from a source. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    /// Source that produced the record.
    pub source_id: SourceId,
    /// Position within the source's record stream.
    pub index: usize,
    /// Native payload.
    pub payload: Payload,
    /// Record quality (own score or inherited from the source).
    pub quality: QualityScore,
    /// Content hash of `payload`.
    pub hash: ContentHash,
}

impl RawRecord {
    /// Build a record and compute its content hash.
    pub fn new(
        source_id: impl Into<SourceId>,
        index: usize,
        payload: Payload,
        quality: QualityScore,
    ) -> Self {
        let hash = ContentHash::of_payload(&payload);
        Self {
            source_id: source_id.into(),
            index,
            payload,
            quality,
            hash,
        }
    }
}

/// Trading action carried by a canonical record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    /// Open or add to a long position.
    Buy,
    /// Exit or go short.
    Sell,
    /// Keep the current position.
    Hold,
    /// Build a position gradually.
    Accumulate,
}

impl Action {
    /// All actions in declaration order.
    pub const ALL: [Action; 4] = [Action::Buy, Action::Sell, Action::Hold, Action::Accumulate];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
            Action::Accumulate => "ACCUMULATE",
        }
    }

    /// Parse an exact wire name.
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == name)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified trading-signal record used for training data and generated output.
///
/// Field order here is the serialized order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Recommended action.
    pub action: Action,
    /// Model confidence, 0-100.
    pub confidence: u8,
    /// Price at analysis time.
    pub current_price: f64,
    /// Stop-loss level.
    pub stop_loss: f64,
    /// Take-profit level.
    pub take_profit: f64,
    /// Ten daily price forecasts.
    pub forecast_10d: Vec<f64>,
    /// Narrative analysis.
    pub analysis: String,
    /// Risk estimate in `[0, 1]`.
    pub risk_score: f64,
    /// Indicator name to value.
    pub technical_indicators: BTreeMap<String, f64>,
}

/// Dataset partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitLabel {
    /// Training split.
    Train,
    /// Validation split.
    Validation,
    /// Test split.
    Test,
}

impl SplitLabel {
    /// Splits in slicing order.
    pub const ALL: [SplitLabel; 3] = [SplitLabel::Train, SplitLabel::Validation, SplitLabel::Test];

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            SplitLabel::Train => "train",
            SplitLabel::Validation => "validation",
            SplitLabel::Test => "test",
        }
    }

    /// Corpus file name for this split.
    pub fn file_name(self) -> String {
        format!("{}.jsonl", self.as_str())
    }
}

impl fmt::Display for SplitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized record travelling through allocation and splitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry {
    /// Source the record came from.
    pub source_id: SourceId,
    /// Content hash of the originating raw record.
    pub hash: ContentHash,
    /// Normalized record.
    pub record: CanonicalRecord,
}

/// Locations of a written corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusPaths {
    /// Training split file.
    pub train: PathBuf,
    /// Validation split file.
    pub validation: PathBuf,
    /// Test split file.
    pub test: PathBuf,
    /// Build manifest.
    pub manifest: PathBuf,
}

impl CorpusPaths {
    /// Paths under `dir` using the standard file names.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            train: dir.join(SplitLabel::Train.file_name()),
            validation: dir.join(SplitLabel::Validation.file_name()),
            test: dir.join(SplitLabel::Test.file_name()),
            manifest: dir.join("manifest.json"),
        }
    }

    /// File for one split.
    pub fn split(&self, label: SplitLabel) -> &PathBuf {
        match label {
            SplitLabel::Train => &self.train,
            SplitLabel::Validation => &self.validation,
            SplitLabel::Test => &self.test,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_quality_score_bounds() {
        assert!(QualityScore::new(0.0).is_ok());
        assert!(QualityScore::new(1.0).is_ok());
        assert!(QualityScore::new(1.01).is_err());
        assert!(QualityScore::new(-0.1).is_err());
        assert!(QualityScore::new(f64::NAN).is_err());
    }

    #[test]
    fn test_quality_score_deserialize_rejects_out_of_range() {
        let ok: QualityScore = serde_json::from_str("0.75").unwrap();
        assert_eq!(ok.value(), 0.75);
        assert!(serde_json::from_str::<QualityScore>("1.5").is_err());
    }

    #[test]
    fn test_content_hash_ignores_key_order() {
        let a = payload(json!({"b": 1, "a": {"y": 2, "x": 3}}));
        let b = payload(json!({"a": {"x": 3, "y": 2}, "b": 1}));
        assert_eq!(ContentHash::of_payload(&a), ContentHash::of_payload(&b));

        let c = payload(json!({"a": {"x": 3, "y": 2}, "b": 2}));
        assert_ne!(ContentHash::of_payload(&a), ContentHash::of_payload(&c));
    }

    #[test]
    fn test_action_wire_names() {
        assert_eq!(serde_json::to_string(&Action::Accumulate).unwrap(), "\"ACCUMULATE\"");
        assert_eq!(Action::from_wire("SELL"), Some(Action::Sell));
        assert_eq!(Action::from_wire("sell"), None);
    }

    #[test]
    fn test_split_file_names() {
        let paths = CorpusPaths::in_dir("/tmp/out");
        assert!(paths.split(SplitLabel::Validation).ends_with("validation.jsonl"));
        assert!(paths.manifest.ends_with("manifest.json"));
    }
}
