//! Native-to-canonical record normalization.
//!
//! Each source declares a [`FieldMapping`]; a record that cannot be mapped
//! fails with a normalization error naming the record and the field, and is
//! dropped by the caller. Business fields (action, prices, forecast,
//! analysis, risk) never get defaults.

use corpus_core::schema::{fields, MAX_CONFIDENCE};
use corpus_core::{
    Action, CanonicalRecord, Conversion, CorpusEntry, Error, FieldRule, Payload, RawRecord,
    Result, SourceSchema, NEUTRAL_CONFIDENCE,
};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Unit of a canonical numeric field; decides what `percent` means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUnit {
    /// Fraction in `[0, 1]` (risk score). Percent values are divided by 100.
    Fraction,
    /// Percentage points (confidence). Percent values are kept.
    Points,
    /// Plain quantity (prices, indicators).
    Plain,
}

/// Resolve a dotted key (`signal.levels.stop`) inside a payload.
pub fn lookup<'a>(payload: &'a Payload, key: &str) -> Option<&'a Value> {
    let mut parts = key.split('.');
    let mut current = payload.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Parse a native numeric value (JSON number or numeric string) and apply
/// `conversion` for a field of the given unit.
pub fn convert_number(
    value: &Value,
    conversion: Conversion,
    unit: FieldUnit,
) -> std::result::Result<f64, String> {
    let raw = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("number {n} is not representable"))?,
        Value::String(s) => parse_numeric_str(s, conversion)?,
        other => return Err(format!("expected a number, found {}", type_name(other))),
    };

    let converted = match conversion {
        Conversion::Identity | Conversion::Currency => raw,
        Conversion::Percent => match unit {
            FieldUnit::Fraction => raw / 100.0,
            FieldUnit::Points | FieldUnit::Plain => raw,
        },
        Conversion::Scale { factor } => raw * factor,
    };

    if !converted.is_finite() {
        return Err(format!("value {converted} is not finite"));
    }
    Ok(converted)
}

fn parse_numeric_str(text: &str, conversion: Conversion) -> std::result::Result<f64, String> {
    let mut cleaned: String = text.trim().to_string();
    match conversion {
        Conversion::Percent => {
            if let Some(stripped) = cleaned.strip_suffix('%') {
                cleaned = stripped.trim_end().to_string();
            }
        }
        Conversion::Currency => {
            cleaned.retain(|c| c != '$' && c != ',' && !c.is_whitespace());
        }
        Conversion::Identity | Conversion::Scale { .. } => {}
    }
    cleaned
        .parse::<f64>()
        .map_err(|_| format!("'{text}' is not a number"))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A successfully normalized record.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    /// Canonical form.
    pub record: CanonicalRecord,
    /// Whether the repair step changed confidence or risk score.
    pub repaired: bool,
}

/// Result of normalizing a batch from one source.
#[derive(Debug, Default)]
pub struct NormalizeOutcome {
    /// Normalized entries in input order.
    pub entries: Vec<CorpusEntry>,
    /// One error per dropped record.
    pub failures: Vec<Error>,
    /// Number of entries the repair step touched.
    pub repaired: usize,
}

/// Maps a single source's native records into canonical records.
pub struct RecordNormalizer<'a> {
    source_id: &'a str,
    schema: &'a SourceSchema,
    /// Uppercased alias -> action.
    aliases: HashMap<String, Action>,
}

impl<'a> RecordNormalizer<'a> {
    /// Create a normalizer for one source.
    pub fn new(source_id: &'a str, schema: &'a SourceSchema) -> Self {
        let aliases = schema
            .mapping
            .action_aliases
            .iter()
            .map(|(alias, action)| (alias.trim().to_uppercase(), *action))
            .collect();
        Self {
            source_id,
            schema,
            aliases,
        }
    }

    /// Normalize a batch, dropping and collecting failures.
    pub fn normalize_all<'r, I>(&self, records: I) -> NormalizeOutcome
    where
        I: IntoIterator<Item = &'r RawRecord>,
    {
        let mut outcome = NormalizeOutcome::default();
        for raw in records {
            match self.normalize(raw) {
                Ok(normalized) => {
                    if normalized.repaired {
                        outcome.repaired += 1;
                    }
                    outcome.entries.push(CorpusEntry {
                        source_id: raw.source_id.clone(),
                        hash: raw.hash.clone(),
                        record: normalized.record,
                    });
                }
                Err(err) => {
                    tracing::debug!(source = self.source_id, error = %err, "record dropped");
                    outcome.failures.push(err);
                }
            }
        }
        outcome
    }

    /// Normalize one record.
    pub fn normalize(&self, raw: &RawRecord) -> Result<NormalizedRecord> {
        let mapping = &self.schema.mapping;
        let mut repaired = false;

        let action = self.action(raw, &mapping.action)?;

        let confidence = match self.optional_value(raw, fields::CONFIDENCE, &mapping.confidence)? {
            Some(value) => {
                let points = self.number(raw, fields::CONFIDENCE, value, &mapping.confidence, FieldUnit::Points)?;
                let (confidence, changed) = self.confidence(raw, points)?;
                repaired |= changed;
                confidence
            }
            None => NEUTRAL_CONFIDENCE,
        };

        let current_price = self.required_number(raw, fields::CURRENT_PRICE, &mapping.current_price)?;
        let stop_loss = self.required_number(raw, fields::STOP_LOSS, &mapping.stop_loss)?;
        let take_profit = self.required_number(raw, fields::TAKE_PROFIT, &mapping.take_profit)?;
        let forecast_10d = self.forecast(raw, &mapping.forecast_10d)?;
        let analysis = self.analysis(raw, &mapping.analysis)?;

        let mut risk_score =
            self.required_number_with_unit(raw, fields::RISK_SCORE, &mapping.risk_score, FieldUnit::Fraction)?;
        if self.schema.repair && !(0.0..=1.0).contains(&risk_score) {
            risk_score = risk_score.clamp(0.0, 1.0);
            repaired = true;
        }

        let technical_indicators = match self.optional_value(
            raw,
            fields::TECHNICAL_INDICATORS,
            &mapping.technical_indicators,
        )? {
            Some(value) => self.indicators(raw, value, &mapping.technical_indicators)?,
            None => BTreeMap::new(),
        };

        let record = CanonicalRecord {
            action,
            confidence,
            current_price,
            stop_loss,
            take_profit,
            forecast_10d,
            analysis,
            risk_score,
            technical_indicators,
        };

        if let Some(violation) = record
            .field_violations()
            .into_iter()
            .chain(record.invariant_violations())
            .next()
        {
            return Err(self.error(raw, violation.field, violation.reason));
        }

        Ok(NormalizedRecord { record, repaired })
    }

    fn error(&self, raw: &RawRecord, field: impl Into<String>, reason: impl Into<String>) -> Error {
        Error::normalization(self.source_id, raw.index, field, reason)
    }

    /// Value for a field that may be optional; null counts as absent.
    fn optional_value<'r>(
        &self,
        raw: &'r RawRecord,
        field: &str,
        rule: &FieldRule,
    ) -> Result<Option<&'r Value>> {
        match lookup(&raw.payload, &rule.key) {
            Some(Value::Null) | None if rule.optional => Ok(None),
            Some(Value::Null) | None => Err(self.error(
                raw,
                field,
                format!("missing required field (native key '{}')", rule.key),
            )),
            Some(value) => Ok(Some(value)),
        }
    }

    fn required_value<'r>(&self, raw: &'r RawRecord, field: &str, rule: &FieldRule) -> Result<&'r Value> {
        match lookup(&raw.payload, &rule.key) {
            Some(Value::Null) | None => Err(self.error(
                raw,
                field,
                format!("missing required field (native key '{}')", rule.key),
            )),
            Some(value) => Ok(value),
        }
    }

    fn number(
        &self,
        raw: &RawRecord,
        field: &str,
        value: &Value,
        rule: &FieldRule,
        unit: FieldUnit,
    ) -> Result<f64> {
        convert_number(value, rule.conversion, unit).map_err(|reason| self.error(raw, field, reason))
    }

    fn required_number(&self, raw: &RawRecord, field: &str, rule: &FieldRule) -> Result<f64> {
        self.required_number_with_unit(raw, field, rule, FieldUnit::Plain)
    }

    fn required_number_with_unit(
        &self,
        raw: &RawRecord,
        field: &str,
        rule: &FieldRule,
        unit: FieldUnit,
    ) -> Result<f64> {
        let value = self.required_value(raw, field, rule)?;
        self.number(raw, field, value, rule, unit)
    }

    fn action(&self, raw: &RawRecord, rule: &FieldRule) -> Result<Action> {
        let value = self.required_value(raw, fields::ACTION, rule)?;
        let Some(text) = value.as_str() else {
            return Err(self.error(
                raw,
                fields::ACTION,
                format!("expected a string, found {}", type_name(value)),
            ));
        };
        let key = text.trim().to_uppercase();
        self.aliases
            .get(&key)
            .copied()
            .or_else(|| Action::from_wire(&key))
            .ok_or_else(|| self.error(raw, fields::ACTION, format!("unrecognized action '{text}'")))
    }

    /// Integral 0-100, or rounded and clamped when repair is enabled.
    fn confidence(&self, raw: &RawRecord, points: f64) -> Result<(u8, bool)> {
        let in_range = (0.0..=MAX_CONFIDENCE as f64).contains(&points);
        let integral = points.fract() == 0.0;
        if in_range && integral {
            return Ok((points as u8, false));
        }
        if self.schema.repair {
            let fixed = points.round().clamp(0.0, MAX_CONFIDENCE as f64);
            return Ok((fixed as u8, true));
        }
        Err(self.error(
            raw,
            fields::CONFIDENCE,
            format!("must be an integer between 0 and 100, got {points}"),
        ))
    }

    fn forecast(&self, raw: &RawRecord, rule: &FieldRule) -> Result<Vec<f64>> {
        let value = self.required_value(raw, fields::FORECAST_10D, rule)?;
        let Some(items) = value.as_array() else {
            return Err(self.error(
                raw,
                fields::FORECAST_10D,
                format!("expected an array, found {}", type_name(value)),
            ));
        };
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                convert_number(item, rule.conversion, FieldUnit::Plain).map_err(|reason| {
                    self.error(raw, format!("{}[{i}]", fields::FORECAST_10D), reason)
                })
            })
            .collect()
    }

    fn analysis(&self, raw: &RawRecord, rule: &FieldRule) -> Result<String> {
        let value = self.required_value(raw, fields::ANALYSIS, rule)?;
        match value {
            Value::String(text) => Ok(text.trim().to_string()),
            other => Err(self.error(
                raw,
                fields::ANALYSIS,
                format!("expected a string, found {}", type_name(other)),
            )),
        }
    }

    fn indicators(
        &self,
        raw: &RawRecord,
        value: &Value,
        rule: &FieldRule,
    ) -> Result<BTreeMap<String, f64>> {
        let Some(map) = value.as_object() else {
            return Err(self.error(
                raw,
                fields::TECHNICAL_INDICATORS,
                format!("expected an object, found {}", type_name(value)),
            ));
        };
        map.iter()
            .map(|(name, v)| {
                convert_number(v, rule.conversion, FieldUnit::Plain)
                    .map(|n| (name.clone(), n))
                    .map_err(|reason| {
                        self.error(raw, format!("{}.{name}", fields::TECHNICAL_INDICATORS), reason)
                    })
            })
            .collect()
    }
}
