//! Shared fixtures for unit tests.

use corpus_core::{CanonicalRecord, ContentHash, CorpusEntry, Payload};
use serde_json::{json, Value};

/// A valid canonical payload; `i` varies price and text so payloads differ.
pub fn signal_payload(tag: &str, i: usize) -> Payload {
    let price = 100.0 + i as f64;
    let value: Value = json!({
        "action": "BUY",
        "confidence": 60 + (i % 40),
        "current_price": price,
        "stop_loss": price - 5.0,
        "take_profit": price + 10.0,
        "forecast_10d": (1..=10).map(|d| price + d as f64 * 0.5).collect::<Vec<_>>(),
        "analysis": format!("{tag} setup {i}: higher lows with rising volume."),
        "risk_score": 0.3,
        "technical_indicators": {"rsi": 55.0 + (i % 10) as f64}
    });
    value.as_object().cloned().unwrap_or_default()
}

/// A corpus entry built from [`signal_payload`].
pub fn entry(source: &str, i: usize) -> CorpusEntry {
    let payload = signal_payload(source, i);
    let hash = ContentHash::of_payload(&payload);
    let record: CanonicalRecord = serde_json::from_value(Value::Object(payload)).unwrap();
    CorpusEntry {
        source_id: source.to_string(),
        hash,
        record,
    }
}
