//! Schema validation of generated signal records.
//!
//! Classifies candidate text into one of four states. Validation never
//! coerces a value into range; the only text handling is removal of a single
//! surrounding Markdown code fence.

use corpus_core::schema::{
    check_analysis, check_confidence, check_forecast_len, check_forecast_value, check_indicator,
    check_price, check_risk_score, price_ordering_violations,
};
use corpus_core::{fields, Action, CanonicalRecord, Violation};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::probe::audit_keys;

/// Outcome class of a validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationState {
    /// Every constraint holds.
    Valid,
    /// Text is not parseable JSON.
    MalformedJson,
    /// Missing, mistyped, out-of-range, duplicate or unknown fields.
    SchemaViolation,
    /// Fields are individually valid but price ordering fails.
    InvariantViolation,
}

impl ValidationState {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationState::Valid => "valid",
            ValidationState::MalformedJson => "malformed-json",
            ValidationState::SchemaViolation => "schema-violation",
            ValidationState::InvariantViolation => "invariant-violation",
        }
    }
}

impl fmt::Display for ValidationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of validating one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Outcome class.
    pub state: ValidationState,
    /// Every violation found; empty when valid.
    pub violations: Vec<Violation>,
    /// Parsed record, present only when valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<CanonicalRecord>,
}

impl ValidationReport {
    fn rejected(state: ValidationState, violations: Vec<Violation>) -> Self {
        Self {
            state,
            violations,
            record: None,
        }
    }

    /// Whether the candidate is valid.
    pub fn is_valid(&self) -> bool {
        self.state == ValidationState::Valid
    }

    /// Whether any violation names `field`.
    pub fn names_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

/// Validator options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorOptions {
    /// Strip one surrounding ```` ``` ```` fence before parsing.
    pub strip_code_fences: bool,
    /// Accept top-level fields outside the canonical schema.
    pub allow_unknown_fields: bool,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            strip_code_fences: true,
            allow_unknown_fields: false,
        }
    }
}

/// Stateless validator for candidate signal records.
#[derive(Debug, Clone, Default)]
pub struct SchemaValidator {
    options: ValidatorOptions,
}

impl SchemaValidator {
    /// Create a validator with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a validator with explicit options.
    pub fn with_options(options: ValidatorOptions) -> Self {
        Self { options }
    }

    /// Options in use.
    pub fn options(&self) -> ValidatorOptions {
        self.options
    }

    /// Validate one candidate text.
    pub fn validate(&self, candidate: &str) -> ValidationReport {
        let body = if self.options.strip_code_fences {
            strip_code_fence(candidate)
        } else {
            candidate.trim()
        };

        let value: Value = match serde_json::from_str(body) {
            Ok(value) => value,
            // Well-formed JSON whose number does not fit an f64.
            Err(e) if is_number_out_of_range(&e) => {
                return ValidationReport::rejected(
                    ValidationState::SchemaViolation,
                    vec![Violation::new("$", e.to_string())],
                )
            }
            Err(e) => {
                return ValidationReport::rejected(
                    ValidationState::MalformedJson,
                    vec![Violation::new("$", e.to_string())],
                )
            }
        };

        let map = match value {
            Value::Object(map) => map,
            other => {
                return ValidationReport::rejected(
                    ValidationState::SchemaViolation,
                    vec![Violation::new(
                        "$",
                        format!("expected a JSON object, found {}", kind(&other)),
                    )],
                )
            }
        };

        let mut violations = Vec::new();

        if let Ok(audit) = audit_keys(body) {
            for key in audit.top_level {
                violations.push(Violation::new(key, "duplicate key"));
            }
            for key in audit.indicators {
                violations.push(Violation::new(
                    format!("{}.{key}", fields::TECHNICAL_INDICATORS),
                    "duplicate key",
                ));
            }
        }

        if !self.options.allow_unknown_fields {
            for key in map.keys() {
                if !fields::ALL.contains(&key.as_str()) {
                    violations.push(Violation::new(key.clone(), "unknown field"));
                }
            }
        }

        let mut reader = FieldReader {
            map: &map,
            violations: &mut violations,
        };
        let action = reader.action();
        let confidence = reader.confidence();
        let current_price = reader.price(fields::CURRENT_PRICE);
        let stop_loss = reader.price(fields::STOP_LOSS);
        let take_profit = reader.price(fields::TAKE_PROFIT);
        let forecast_10d = reader.forecast();
        let analysis = reader.analysis();
        let risk_score = reader.risk_score();
        let technical_indicators = reader.indicators();

        let (
            Some(action),
            Some(confidence),
            Some(current_price),
            Some(stop_loss),
            Some(take_profit),
            Some(forecast_10d),
            Some(analysis),
            Some(risk_score),
            Some(technical_indicators),
        ) = (
            action,
            confidence,
            current_price,
            stop_loss,
            take_profit,
            forecast_10d,
            analysis,
            risk_score,
            technical_indicators,
        )
        else {
            return ValidationReport::rejected(ValidationState::SchemaViolation, violations);
        };

        if !violations.is_empty() {
            return ValidationReport::rejected(ValidationState::SchemaViolation, violations);
        }

        let ordering = price_ordering_violations(action, current_price, stop_loss, take_profit);
        if !ordering.is_empty() {
            return ValidationReport::rejected(ValidationState::InvariantViolation, ordering);
        }

        ValidationReport {
            state: ValidationState::Valid,
            violations: Vec::new(),
            record: Some(CanonicalRecord {
                action,
                confidence,
                current_price,
                stop_loss,
                take_profit,
                forecast_10d,
                analysis,
                risk_score,
                technical_indicators,
            }),
        }
    }

    /// Validate many candidates in parallel; output order matches input.
    pub fn validate_batch<S: AsRef<str> + Sync>(&self, candidates: &[S]) -> Vec<ValidationReport> {
        let reports: Vec<ValidationReport> = candidates
            .par_iter()
            .map(|c| self.validate(c.as_ref()))
            .collect();
        let valid = reports.iter().filter(|r| r.is_valid()).count();
        tracing::debug!(total = reports.len(), valid, "batch validated");
        reports
    }
}

/// Remove one surrounding Markdown code fence and outer whitespace.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return trimmed;
    };
    // An info string (`json`) may follow the opening fence.
    let (first, rest) = match inner.split_once('\n') {
        Some(split) => split,
        None => match inner.trim_start().split_once(char::is_whitespace) {
            Some(split) => split,
            None => return inner.trim(),
        },
    };
    if first.trim().chars().all(|c| c.is_ascii_alphanumeric()) {
        rest.trim()
    } else {
        inner.trim()
    }
}

fn is_number_out_of_range(error: &serde_json::Error) -> bool {
    error.is_syntax() && error.to_string().starts_with("number out of range")
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Typed field extraction that records violations instead of failing fast.
struct FieldReader<'a> {
    map: &'a Map<String, Value>,
    violations: &'a mut Vec<Violation>,
}

impl<'a> FieldReader<'a> {
    fn get(&mut self, field: &str) -> Option<&'a Value> {
        let value = self.map.get(field);
        if value.is_none() {
            self.violations
                .push(Violation::new(field, "missing required field"));
        }
        value
    }

    fn wrong_type(&mut self, field: &str, expected: &str, found: &Value) {
        self.violations.push(Violation::new(
            field,
            format!("expected {expected}, found {}", kind(found)),
        ));
    }

    fn number(&mut self, field: &str, value: &Value) -> Option<f64> {
        match value.as_f64() {
            Some(n) => Some(n),
            None => {
                self.wrong_type(field, "a number", value);
                None
            }
        }
    }

    fn push(&mut self, violation: Option<Violation>) -> bool {
        match violation {
            Some(v) => {
                self.violations.push(v);
                false
            }
            None => true,
        }
    }

    fn action(&mut self) -> Option<Action> {
        let value = self.get(fields::ACTION)?;
        let Some(text) = value.as_str() else {
            self.wrong_type(fields::ACTION, "a string", value);
            return None;
        };
        let action = Action::from_wire(text);
        if action.is_none() {
            self.violations.push(Violation::new(
                fields::ACTION,
                format!("must be one of BUY, SELL, HOLD, ACCUMULATE, got '{text}'"),
            ));
        }
        action
    }

    fn confidence(&mut self) -> Option<u8> {
        let value = self.get(fields::CONFIDENCE)?;
        let Value::Number(n) = value else {
            self.wrong_type(fields::CONFIDENCE, "an integer", value);
            return None;
        };
        let Some(points) = n.as_i64() else {
            let reason = if n.is_u64() {
                format!("must be between 0 and 100, got {n}")
            } else {
                format!("must be an integer, got {n}")
            };
            self.violations.push(Violation::new(fields::CONFIDENCE, reason));
            return None;
        };
        if !self.push(check_confidence(points)) {
            return None;
        }
        u8::try_from(points).ok()
    }

    fn price(&mut self, field: &str) -> Option<f64> {
        let value = self.get(field)?;
        let price = self.number(field, value)?;
        self.push(check_price(field, price)).then_some(price)
    }

    fn forecast(&mut self) -> Option<Vec<f64>> {
        let value = self.get(fields::FORECAST_10D)?;
        let Some(items) = value.as_array() else {
            self.wrong_type(fields::FORECAST_10D, "an array", value);
            return None;
        };
        let mut ok = self.push(check_forecast_len(items.len()));
        let mut forecast = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let field = format!("{}[{i}]", fields::FORECAST_10D);
            match self.number(&field, item) {
                Some(n) => {
                    ok &= self.push(check_forecast_value(i, n));
                    forecast.push(n);
                }
                None => ok = false,
            }
        }
        ok.then_some(forecast)
    }

    fn analysis(&mut self) -> Option<String> {
        let value = self.get(fields::ANALYSIS)?;
        let Some(text) = value.as_str() else {
            self.wrong_type(fields::ANALYSIS, "a string", value);
            return None;
        };
        self.push(check_analysis(text)).then(|| text.to_string())
    }

    fn risk_score(&mut self) -> Option<f64> {
        let value = self.get(fields::RISK_SCORE)?;
        let risk = self.number(fields::RISK_SCORE, value)?;
        self.push(check_risk_score(risk)).then_some(risk)
    }

    fn indicators(&mut self) -> Option<BTreeMap<String, f64>> {
        let value = self.get(fields::TECHNICAL_INDICATORS)?;
        let Some(map) = value.as_object() else {
            self.wrong_type(fields::TECHNICAL_INDICATORS, "an object", value);
            return None;
        };
        let mut ok = true;
        let mut indicators = BTreeMap::new();
        for (name, v) in map {
            let field = format!("{}.{name}", fields::TECHNICAL_INDICATORS);
            match self.number(&field, v) {
                Some(n) => {
                    ok &= self.push(check_indicator(name, n));
                    indicators.insert(name.clone(), n);
                }
                None => ok = false,
            }
        }
        ok.then_some(indicators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_buy() -> Value {
        json!({
            "action": "BUY",
            "confidence": 78,
            "current_price": 64250.0,
            "stop_loss": 61000.0,
            "take_profit": 70100.0,
            "forecast_10d": [64400.0, 64700.0, 65000.0, 65300.0, 65600.0, 66000.0, 66400.0, 66900.0, 67300.0, 67800.0],
            "analysis": "Spot-led breakout with rising open interest.",
            "risk_score": 0.35,
            "technical_indicators": {"rsi": 61.4, "macd": 220.5}
        })
    }

    fn check(value: &Value) -> ValidationReport {
        SchemaValidator::new().validate(&value.to_string())
    }

    #[test]
    fn test_valid_record_accepted() {
        let report = check(&valid_buy());
        assert!(report.is_valid(), "{:?}", report.violations);
        let record = report.record.unwrap();
        assert_eq!(record.action, Action::Buy);
        assert_eq!(record.confidence, 78);
        assert_eq!(serde_json::to_value(&record).unwrap(), valid_buy());
    }

    #[test]
    fn test_buy_stop_above_price_is_invariant_violation() {
        let mut value = valid_buy();
        value["stop_loss"] = json!(64250.0);
        let report = check(&value);
        assert_eq!(report.state, ValidationState::InvariantViolation);
        assert!(report.names_field(fields::STOP_LOSS));
        assert!(report.record.is_none());
    }

    #[test]
    fn test_sell_invariant() {
        let mut value = valid_buy();
        value["action"] = json!("SELL");
        let report = check(&value);
        assert_eq!(report.state, ValidationState::InvariantViolation);
        assert!(report.names_field(fields::STOP_LOSS));
        assert!(report.names_field(fields::TAKE_PROFIT));

        value["stop_loss"] = json!(66000.0);
        value["take_profit"] = json!(60000.0);
        assert!(check(&value).is_valid());
    }

    #[test]
    fn test_forecast_length_and_presence() {
        for len in [9usize, 11] {
            let mut value = valid_buy();
            value["forecast_10d"] = json!(vec![65000.0; len]);
            let report = check(&value);
            assert_eq!(report.state, ValidationState::SchemaViolation);
            assert!(report.names_field(fields::FORECAST_10D), "len {len}");
        }

        let mut value = valid_buy();
        value.as_object_mut().unwrap().remove("forecast_10d");
        let report = check(&value);
        assert_eq!(report.state, ValidationState::SchemaViolation);
        assert!(report.names_field(fields::FORECAST_10D));
    }

    #[test]
    fn test_forecast_element_named() {
        let mut value = valid_buy();
        value["forecast_10d"][3] = json!(-1.0);
        assert!(check(&value).names_field("forecast_10d[3]"));
    }

    #[test]
    fn test_code_fence_stripped() {
        let text = format!("```json\n{}\n```\n", valid_buy());
        assert!(SchemaValidator::new().validate(&text).is_valid());

        let strict = SchemaValidator::with_options(ValidatorOptions {
            strip_code_fences: false,
            ..Default::default()
        });
        assert_eq!(strict.validate(&text).state, ValidationState::MalformedJson);
    }

    #[test]
    fn test_single_line_fence_with_info_string() {
        let text = format!("```json {}```", valid_buy());
        assert!(SchemaValidator::new().validate(&text).is_valid());
        assert_eq!(strip_code_fence("```{\"a\": 1}```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```json```"), "json");
    }

    #[test]
    fn test_empty_indicator_name_accepted() {
        let mut value = valid_buy();
        value["technical_indicators"] = json!({"": 1.0});
        let report = check(&value);
        assert!(report.is_valid(), "{:?}", report.violations);
    }

    #[test]
    fn test_unrepresentable_number_is_schema_violation() {
        let text = valid_buy()
            .to_string()
            .replace("\"risk_score\":0.35", "\"risk_score\":1e400");
        assert!(text.contains("1e400"));
        let report = SchemaValidator::new().validate(&text);
        assert_eq!(report.state, ValidationState::SchemaViolation);
        assert!(report.violations[0].reason.contains("out of range"));
    }

    #[test]
    fn test_malformed_json() {
        let report = SchemaValidator::new().validate("{\"action\": \"BUY\",");
        assert_eq!(report.state, ValidationState::MalformedJson);
        assert!(report.violations[0].reason.contains("line"));
    }

    #[test]
    fn test_not_an_object() {
        let report = SchemaValidator::new().validate("[1, 2, 3]");
        assert_eq!(report.state, ValidationState::SchemaViolation);
    }

    #[test]
    fn test_duplicate_indicator_key() {
        let text = valid_buy()
            .to_string()
            .replace("\"rsi\":61.4", "\"rsi\":61.4,\"rsi\":30.0");
        assert!(text.contains("\"rsi\":30.0"));
        let report = SchemaValidator::new().validate(&text);
        assert_eq!(report.state, ValidationState::SchemaViolation);
        assert!(report.names_field("technical_indicators.rsi"));
    }

    #[test]
    fn test_unknown_field() {
        let mut value = valid_buy();
        value["sentiment"] = json!("bullish");
        let report = check(&value);
        assert_eq!(report.state, ValidationState::SchemaViolation);
        assert!(report.names_field("sentiment"));

        let lenient = SchemaValidator::with_options(ValidatorOptions {
            allow_unknown_fields: true,
            ..Default::default()
        });
        assert!(lenient.validate(&value.to_string()).is_valid());
    }

    #[test]
    fn test_no_coercion() {
        let mut value = valid_buy();
        value["confidence"] = json!(78.5);
        assert!(check(&value).names_field(fields::CONFIDENCE));

        let mut value = valid_buy();
        value["confidence"] = json!(120);
        assert!(check(&value).names_field(fields::CONFIDENCE));

        let mut value = valid_buy();
        value["current_price"] = json!("64250");
        assert!(check(&value).names_field(fields::CURRENT_PRICE));

        let mut value = valid_buy();
        value["action"] = json!("buy");
        assert!(check(&value).names_field(fields::ACTION));

        let mut value = valid_buy();
        value["risk_score"] = json!(1.2);
        assert!(check(&value).names_field(fields::RISK_SCORE));
    }

    #[test]
    fn test_batch_preserves_order() {
        let texts = vec![valid_buy().to_string(), "nope".to_string(), valid_buy().to_string()];
        let states: Vec<_> = SchemaValidator::new()
            .validate_batch(&texts)
            .into_iter()
            .map(|r| r.state)
            .collect();
        assert_eq!(
            states,
            vec![
                ValidationState::Valid,
                ValidationState::MalformedJson,
                ValidationState::Valid
            ]
        );
    }

    #[test]
    fn test_state_wire_names() {
        assert_eq!(
            serde_json::to_string(&ValidationState::InvariantViolation).unwrap(),
            "\"invariant-violation\""
        );
    }
}
