//! Field constraints and domain invariants of the canonical record.
//!
//! The checks are exposed per field so that the normalizer (typed records)
//! and the validator (untyped JSON) report identical violations.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Action, CanonicalRecord};

/// Canonical field names.
pub mod fields {
    /// Signal direction.
    pub const ACTION: &str = "action";
    /// Integer confidence.
    pub const CONFIDENCE: &str = "confidence";
    /// Price at signal time.
    pub const CURRENT_PRICE: &str = "current_price";
    /// Stop-loss level.
    pub const STOP_LOSS: &str = "stop_loss";
    /// Take-profit level.
    pub const TAKE_PROFIT: &str = "take_profit";
    /// Ten-day forecast.
    pub const FORECAST_10D: &str = "forecast_10d";
    /// Rationale text.
    pub const ANALYSIS: &str = "analysis";
    /// Risk score.
    pub const RISK_SCORE: &str = "risk_score";
    /// Indicator map.
    pub const TECHNICAL_INDICATORS: &str = "technical_indicators";

    /// All fields in serialized order.
    pub const ALL: [&str; 9] = [
        ACTION,
        CONFIDENCE,
        CURRENT_PRICE,
        STOP_LOSS,
        TAKE_PROFIT,
        FORECAST_10D,
        ANALYSIS,
        RISK_SCORE,
        TECHNICAL_INDICATORS,
    ];
}

/// Required number of forecast entries.
pub const FORECAST_DAYS: usize = 10;

/// Confidence assigned when a source marks confidence optional and omits it.
pub const NEUTRAL_CONFIDENCE: u8 = 50;

/// Upper bound of the confidence scale.
pub const MAX_CONFIDENCE: i64 = 100;

/// A single failed constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Field (or `field[i]` / `field.key`) the violation refers to.
    pub field: String,
    /// What is wrong with it.
    pub reason: String,
}

impl Violation {
    /// Create a violation.
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Confidence must be an integer in 0-100.
pub fn check_confidence(value: i64) -> Option<Violation> {
    if !(0..=MAX_CONFIDENCE).contains(&value) {
        return Some(Violation::new(
            fields::CONFIDENCE,
            format!("must be between 0 and 100, got {value}"),
        ));
    }
    None
}

/// Prices must be finite and strictly positive.
pub fn check_price(field: &str, value: f64) -> Option<Violation> {
    if !value.is_finite() {
        return Some(Violation::new(field, "must be a finite number"));
    }
    if value <= 0.0 {
        return Some(Violation::new(field, format!("must be > 0, got {value}")));
    }
    None
}

/// Forecast must have exactly [`FORECAST_DAYS`] entries.
pub fn check_forecast_len(len: usize) -> Option<Violation> {
    if len != FORECAST_DAYS {
        return Some(Violation::new(
            fields::FORECAST_10D,
            format!("expected exactly {FORECAST_DAYS} entries, found {len}"),
        ));
    }
    None
}

/// Each forecast entry must be a positive price.
pub fn check_forecast_value(index: usize, value: f64) -> Option<Violation> {
    check_price(&format!("{}[{index}]", fields::FORECAST_10D), value)
}

/// Analysis must contain non-whitespace text.
pub fn check_analysis(text: &str) -> Option<Violation> {
    if text.trim().is_empty() {
        return Some(Violation::new(fields::ANALYSIS, "must not be empty"));
    }
    None
}

/// Risk score must lie in `[0, 1]`.
pub fn check_risk_score(value: f64) -> Option<Violation> {
    if !(0.0..=1.0).contains(&value) {
        return Some(Violation::new(
            fields::RISK_SCORE,
            format!("must be between 0.0 and 1.0, got {value}"),
        ));
    }
    None
}

/// Indicator values must be finite; any name is accepted.
pub fn check_indicator(name: &str, value: f64) -> Option<Violation> {
    if !value.is_finite() {
        return Some(Violation::new(
            format!("{}.{name}", fields::TECHNICAL_INDICATORS),
            "must be a finite number",
        ));
    }
    None
}

/// Price ordering required by `action`.
///
/// BUY: stop_loss < current_price < take_profit.
/// SELL: take_profit < current_price < stop_loss.
/// HOLD / ACCUMULATE: stop_loss < current_price.
pub fn price_ordering_violations(
    action: Action,
    current_price: f64,
    stop_loss: f64,
    take_profit: f64,
) -> Vec<Violation> {
    let mut violations = Vec::new();
    match action {
        Action::Buy => {
            if stop_loss >= current_price {
                violations.push(Violation::new(
                    fields::STOP_LOSS,
                    format!(
                        "BUY requires stop_loss < current_price ({stop_loss} >= {current_price})"
                    ),
                ));
            }
            if take_profit <= current_price {
                violations.push(Violation::new(
                    fields::TAKE_PROFIT,
                    format!(
                        "BUY requires take_profit > current_price ({take_profit} <= {current_price})"
                    ),
                ));
            }
        }
        Action::Sell => {
            if take_profit >= current_price {
                violations.push(Violation::new(
                    fields::TAKE_PROFIT,
                    format!(
                        "SELL requires take_profit < current_price ({take_profit} >= {current_price})"
                    ),
                ));
            }
            if stop_loss <= current_price {
                violations.push(Violation::new(
                    fields::STOP_LOSS,
                    format!(
                        "SELL requires stop_loss > current_price ({stop_loss} <= {current_price})"
                    ),
                ));
            }
        }
        Action::Hold | Action::Accumulate => {
            if stop_loss >= current_price {
                violations.push(Violation::new(
                    fields::STOP_LOSS,
                    format!(
                        "{action} requires stop_loss < current_price ({stop_loss} >= {current_price})"
                    ),
                ));
            }
        }
    }
    violations
}

impl CanonicalRecord {
    /// Per-field constraint violations.
    pub fn field_violations(&self) -> Vec<Violation> {
        let mut out = Vec::new();
        out.extend(check_confidence(i64::from(self.confidence)));
        out.extend(check_price(fields::CURRENT_PRICE, self.current_price));
        out.extend(check_price(fields::STOP_LOSS, self.stop_loss));
        out.extend(check_price(fields::TAKE_PROFIT, self.take_profit));
        out.extend(check_forecast_len(self.forecast_10d.len()));
        for (i, value) in self.forecast_10d.iter().enumerate() {
            out.extend(check_forecast_value(i, *value));
        }
        out.extend(check_analysis(&self.analysis));
        out.extend(check_risk_score(self.risk_score));
        for (name, value) in &self.technical_indicators {
            out.extend(check_indicator(name, *value));
        }
        out
    }

    /// Cross-field invariant violations (price ordering).
    pub fn invariant_violations(&self) -> Vec<Violation> {
        price_ordering_violations(
            self.action,
            self.current_price,
            self.stop_loss,
            self.take_profit,
        )
    }

    /// Whether the record satisfies every constraint.
    pub fn is_conforming(&self) -> bool {
        self.field_violations().is_empty() && self.invariant_violations().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn buy_record() -> CanonicalRecord {
        CanonicalRecord {
            action: Action::Buy,
            confidence: 72,
            current_price: 100.0,
            stop_loss: 95.0,
            take_profit: 110.0,
            forecast_10d: vec![101.0; FORECAST_DAYS],
            analysis: "Breakout above resistance on rising volume.".to_string(),
            risk_score: 0.35,
            technical_indicators: BTreeMap::from([("rsi".to_string(), 58.2)]),
        }
    }

    #[test]
    fn test_conforming_record() {
        assert!(buy_record().is_conforming());
    }

    #[test]
    fn test_buy_stop_above_price() {
        let mut record = buy_record();
        record.stop_loss = 100.0;
        let violations = record.invariant_violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, fields::STOP_LOSS);
    }

    #[test]
    fn test_sell_ordering() {
        let mut record = buy_record();
        record.action = Action::Sell;
        // BUY-shaped levels are backwards for SELL.
        let named: Vec<_> = record
            .invariant_violations()
            .into_iter()
            .map(|v| v.field)
            .collect();
        assert_eq!(named, vec![fields::TAKE_PROFIT, fields::STOP_LOSS]);

        record.stop_loss = 105.0;
        record.take_profit = 90.0;
        assert!(record.invariant_violations().is_empty());
    }

    #[test]
    fn test_hold_has_no_upper_bound() {
        let mut record = buy_record();
        record.action = Action::Hold;
        record.take_profit = 50.0;
        assert!(record.invariant_violations().is_empty());
        record.stop_loss = 120.0;
        assert_eq!(record.invariant_violations().len(), 1);
    }

    #[test]
    fn test_field_checks() {
        assert!(check_confidence(101).is_some());
        assert!(check_confidence(0).is_none());
        assert!(check_price("current_price", 0.0).is_some());
        assert!(check_price("current_price", f64::INFINITY).is_some());
        assert_eq!(check_forecast_len(9).unwrap().field, fields::FORECAST_10D);
        assert_eq!(check_forecast_value(3, -1.0).unwrap().field, "forecast_10d[3]");
        assert!(check_analysis("   ").is_some());
        assert!(check_risk_score(1.2).is_some());
        assert!(check_indicator("macd", f64::NAN).is_some());
        assert!(check_indicator("", 1.0).is_none());
    }
}
