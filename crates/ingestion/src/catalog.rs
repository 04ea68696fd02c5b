//! Registry of raw datasets.
//!
//! Each source is registered once with its schema and native records. The
//! catalog assigns every record a quality score (declared, per-record field,
//! or text heuristic) and a content hash at registration time.

use corpus_core::{
    Error, Payload, PipelineConfig, QualityOrigin, QualityScore, RawRecord, Result, SourceId,
    SourceSchema,
};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::heuristics::TextQualityScorer;
use crate::normalizer::lookup;

/// A registered source.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    /// Source id.
    pub id: SourceId,
    /// Ingestion schema.
    pub schema: SourceSchema,
    /// Records in ingestion order.
    pub records: Vec<RawRecord>,
    /// Records whose own quality value could not be read (scored 0.0).
    pub invalid_quality: usize,
}

/// Set of registered sources, in registration order.
#[derive(Debug, Clone, Default)]
pub struct SourceCatalog {
    entries: Vec<SourceEntry>,
}

impl SourceCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every source listed in a pipeline config, reading its file.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let mut catalog = Self::new();
        for source in &config.sources {
            catalog.register_jsonl(source.id.clone(), &source.path, source.schema.clone())?;
        }
        Ok(catalog)
    }

    /// Register a source from in-memory payloads.
    pub fn register<I>(
        &mut self,
        id: impl Into<SourceId>,
        payloads: I,
        schema: SourceSchema,
    ) -> Result<&SourceEntry>
    where
        I: IntoIterator<Item = Payload>,
    {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::config("source id must not be empty"));
        }
        if self.get(&id).is_some() {
            return Err(Error::config(format!("source '{id}' is already registered")));
        }
        schema
            .validate()
            .map_err(|e| Error::config(format!("source '{id}': {e}")))?;

        let payloads: Vec<Payload> = payloads.into_iter().collect();
        let (scores, invalid_quality) = assign_quality(&id, &schema, &payloads)?;

        let records: Vec<RawRecord> = payloads
            .into_iter()
            .zip(scores)
            .enumerate()
            .map(|(index, (payload, quality))| RawRecord::new(id.clone(), index, payload, quality))
            .collect();

        tracing::info!(
            source = %id,
            records = records.len(),
            declared_quality = schema.declared_quality,
            invalid_quality,
            "registered source"
        );

        self.entries.push(SourceEntry {
            id,
            schema,
            records,
            invalid_quality,
        });
        // Just pushed.
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Register a source from a JSONL file (one JSON object per line).
    pub fn register_jsonl(
        &mut self,
        id: impl Into<SourceId>,
        path: impl AsRef<Path>,
        schema: SourceSchema,
    ) -> Result<&SourceEntry> {
        let id = id.into();
        let path = path.as_ref();
        let payloads = read_jsonl(path)
            .map_err(|e| match e {
                Error::Io(io) => Error::data(format!(
                    "source '{id}': cannot read {}: {io}",
                    path.display()
                )),
                other => other,
            })?;
        tracing::debug!(source = %id, path = %path.display(), "loaded source file");
        self.register(id, payloads, schema)
    }

    /// Look up a source.
    pub fn get(&self, id: &str) -> Option<&SourceEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Sources in registration order.
    pub fn sources(&self) -> &[SourceEntry] {
        &self.entries
    }

    /// Number of registered sources.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no source is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total records across sources.
    pub fn total_records(&self) -> usize {
        self.entries.iter().map(|e| e.records.len()).sum()
    }
}

/// Read a JSONL file, skipping blank lines.
pub fn read_jsonl(path: &Path) -> Result<Vec<Payload>> {
    let reader = BufReader::new(File::open(path)?);
    let mut payloads = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(Value::Object(map)) => payloads.push(map),
            Ok(_) => {
                return Err(Error::data(format!(
                    "{}:{}: expected a JSON object",
                    path.display(),
                    line_no + 1
                )))
            }
            Err(e) => {
                return Err(Error::data(format!(
                    "{}:{}: invalid JSON: {e}",
                    path.display(),
                    line_no + 1
                )))
            }
        }
    }
    Ok(payloads)
}

fn assign_quality(
    id: &str,
    schema: &SourceSchema,
    payloads: &[Payload],
) -> Result<(Vec<QualityScore>, usize)> {
    let declared = QualityScore::new(schema.declared_quality)?;
    match &schema.quality_origin {
        QualityOrigin::Source => Ok((vec![declared; payloads.len()], 0)),
        QualityOrigin::Field { key } => {
            let mut invalid = 0;
            let scores = payloads
                .iter()
                .enumerate()
                .map(|(index, payload)| match lookup(payload, key) {
                    None | Some(Value::Null) => declared,
                    Some(value) => parse_quality(value).unwrap_or_else(|| {
                        tracing::warn!(source = id, index, key = %key, "unreadable quality value, scoring 0.0");
                        invalid += 1;
                        QualityScore::MIN
                    }),
                })
                .collect();
            Ok((scores, invalid))
        }
        QualityOrigin::Heuristic { text_key, keywords } => {
            let scorer = TextQualityScorer::new(keywords);
            let texts: Vec<&str> = payloads
                .iter()
                .map(|p| lookup(p, text_key).and_then(Value::as_str).unwrap_or(""))
                .collect();
            Ok((scorer.score_all(&texts), 0))
        }
    }
}

/// Read a per-record quality value.
///
/// `[0, 1]` is taken as is; `(1, 100]` and `"NN%"` are percentages.
pub fn parse_quality(value: &Value) -> Option<QualityScore> {
    let (raw, percent) = match value {
        Value::Number(n) => (n.as_f64()?, false),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(stripped) => (stripped.trim_end().parse::<f64>().ok()?, true),
                None => (s.parse::<f64>().ok()?, false),
            }
        }
        _ => return None,
    };
    let fraction = if percent || raw > 1.0 { raw / 100.0 } else { raw };
    QualityScore::new(fraction).ok()
}
