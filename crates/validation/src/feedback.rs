//! Violation feedback for an external re-generation loop.

use corpus_core::{fields, KnowledgeRetriever, Result};
use std::fmt::Write;

use crate::validator::ValidationReport;

const DEFAULT_PASSAGE_LIMIT: usize = 3;

impl ValidationReport {
    /// Numbered list of violations, or a one-line confirmation when valid.
    pub fn feedback(&self) -> String {
        if self.is_valid() {
            return "The output satisfies the signal schema.".to_string();
        }
        let mut out = format!("The output was rejected ({}):\n", self.state);
        for (i, violation) in self.violations.iter().enumerate() {
            // Writing to a String cannot fail.
            let _ = writeln!(out, "{}. {}", i + 1, violation);
        }
        out
    }
}

/// Composes a re-generation prompt from a query, grounding passages and
/// the violations of the rejected output.
pub struct RetryPrompt<'a> {
    retriever: &'a dyn KnowledgeRetriever,
    passage_limit: usize,
}

impl<'a> RetryPrompt<'a> {
    /// Create a prompt builder backed by `retriever`.
    pub fn new(retriever: &'a dyn KnowledgeRetriever) -> Self {
        Self {
            retriever,
            passage_limit: DEFAULT_PASSAGE_LIMIT,
        }
    }

    /// Maximum passages included.
    pub fn with_passage_limit(mut self, limit: usize) -> Self {
        self.passage_limit = limit;
        self
    }

    /// Build the prompt text.
    pub fn compose(&self, query: &str, report: &ValidationReport) -> Result<String> {
        let passages = if self.passage_limit == 0 {
            Vec::new()
        } else {
            self.retriever.retrieve(query, self.passage_limit)?
        };

        let mut prompt = String::new();
        let _ = writeln!(prompt, "Query:\n{}\n", query.trim());

        if !passages.is_empty() {
            prompt.push_str("Context:\n");
            for passage in passages.iter().take(self.passage_limit) {
                let _ = writeln!(prompt, "- {}", passage.text.trim());
            }
            prompt.push('\n');
        }

        prompt.push_str(&report.feedback());
        let _ = write!(
            prompt,
            "\nRespond with a single JSON object with exactly these fields: {}.",
            fields::ALL.join(", ")
        );

        tracing::debug!(
            violations = report.violations.len(),
            passages = passages.len(),
            "retry prompt composed"
        );
        Ok(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::SchemaValidator;
    use corpus_core::{Error, RetrievedPassage};

    struct FixedRetriever(Vec<&'static str>);

    impl KnowledgeRetriever for FixedRetriever {
        fn retrieve(&self, _query: &str, limit: usize) -> Result<Vec<RetrievedPassage>> {
            Ok(self
                .0
                .iter()
                .take(limit)
                .enumerate()
                .map(|(i, text)| RetrievedPassage {
                    text: text.to_string(),
                    relevance: 1.0 - i as f64 * 0.1,
                })
                .collect())
        }
    }

    struct DownRetriever;

    impl KnowledgeRetriever for DownRetriever {
        fn retrieve(&self, _query: &str, _limit: usize) -> Result<Vec<RetrievedPassage>> {
            Err(Error::data("index offline"))
        }
    }

    fn rejected() -> ValidationReport {
        SchemaValidator::new().validate(r#"{"action": "BUY", "confidence": 150}"#)
    }

    #[test]
    fn test_feedback_numbers_violations() {
        let feedback = rejected().feedback();
        assert!(feedback.starts_with("The output was rejected (schema-violation)"));
        assert!(feedback.contains("1. "));
        assert!(feedback.contains("confidence: must be between 0 and 100"));
    }

    #[test]
    fn test_compose_includes_context_and_feedback() {
        let retriever = FixedRetriever(vec!["Halving reduces issuance.", "ETF flows", "Hashrate"]);
        let prompt = RetryPrompt::new(&retriever)
            .with_passage_limit(2)
            .compose("Should I buy BTC here?", &rejected())
            .unwrap();
        assert!(prompt.starts_with("Query:\nShould I buy BTC here?"));
        assert!(prompt.contains("- Halving reduces issuance."));
        assert!(prompt.contains("- ETF flows"));
        assert!(!prompt.contains("Hashrate"));
        assert!(prompt.contains("schema-violation"));
        assert!(prompt.ends_with("risk_score, technical_indicators."));
    }

    #[test]
    fn test_retriever_error_propagates() {
        let result = RetryPrompt::new(&DownRetriever).compose("q", &rejected());
        assert!(result.is_err());
    }
}
