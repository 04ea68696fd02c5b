//! Text quality heuristics.
//!
//! Scores free text for sources that do not ship a trustworthy quality
//! score. Four components, each in `[0, 1]`:
//! - length (very short analyses carry little signal)
//! - uniqueness of lines/sentences (templated repetition)
//! - format (runs of repeated characters, replacement characters)
//! - keyword relevance (only when keywords are configured)

use corpus_core::QualityScore;
use rayon::prelude::*;

const WEIGHT_LENGTH: f64 = 0.30;
const WEIGHT_UNIQUENESS: f64 = 0.30;
const WEIGHT_FORMAT: f64 = 0.20;
const WEIGHT_RELEVANCE: f64 = 0.20;

/// Longest run of one character before the text counts as garbled.
const MAX_CHAR_RUN: usize = 10;

/// Per-component breakdown of a text score.
#[derive(Debug, Clone, PartialEq)]
pub struct TextQualityReport {
    /// Weighted overall score.
    pub score: QualityScore,
    /// Length component.
    pub length: f64,
    /// Uniqueness component.
    pub uniqueness: f64,
    /// Format component.
    pub format: f64,
    /// Relevance component, if keywords were configured.
    pub relevance: Option<f64>,
    /// Problems found.
    pub issues: Vec<String>,
}

/// Heuristic scorer for analysis text.
#[derive(Debug, Clone, Default)]
pub struct TextQualityScorer {
    /// Lowercased domain keywords.
    keywords: Vec<String>,
}

impl TextQualityScorer {
    /// Create a scorer. Keywords are matched case-insensitively.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Score one text.
    pub fn score(&self, text: &str) -> TextQualityReport {
        let mut issues = Vec::new();

        let length = length_score(text.chars().count(), &mut issues);
        let uniqueness = uniqueness_score(text, &mut issues);
        let format = format_score(text, &mut issues);
        let relevance = if self.keywords.is_empty() {
            None
        } else {
            Some(self.relevance_score(text, &mut issues))
        };

        let (weighted, weights) = match relevance {
            Some(r) => (
                length * WEIGHT_LENGTH
                    + uniqueness * WEIGHT_UNIQUENESS
                    + format * WEIGHT_FORMAT
                    + r * WEIGHT_RELEVANCE,
                WEIGHT_LENGTH + WEIGHT_UNIQUENESS + WEIGHT_FORMAT + WEIGHT_RELEVANCE,
            ),
            None => (
                length * WEIGHT_LENGTH + uniqueness * WEIGHT_UNIQUENESS + format * WEIGHT_FORMAT,
                WEIGHT_LENGTH + WEIGHT_UNIQUENESS + WEIGHT_FORMAT,
            ),
        };

        let score = QualityScore::new((weighted / weights).clamp(0.0, 1.0))
            .unwrap_or(QualityScore::MIN);

        TextQualityReport {
            score,
            length,
            uniqueness,
            format,
            relevance,
            issues,
        }
    }

    /// Score many texts in parallel; output order matches input order.
    pub fn score_all<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Vec<QualityScore> {
        texts
            .par_iter()
            .map(|text| self.score(text.as_ref()).score)
            .collect()
    }

    fn relevance_score(&self, text: &str, issues: &mut Vec<String>) -> f64 {
        let lower = text.to_lowercase();
        let found = self.keywords.iter().filter(|k| lower.contains(k.as_str())).count();
        let ratio = found as f64 / self.keywords.len() as f64;
        if ratio < 0.1 {
            issues.push("low domain relevance".to_string());
            0.2
        } else if ratio < 0.3 {
            0.6
        } else {
            0.9
        }
    }
}

fn length_score(chars: usize, issues: &mut Vec<String>) -> f64 {
    match chars {
        0 => {
            issues.push("empty text".to_string());
            0.0
        }
        1..=39 => {
            issues.push("text too short (< 40 characters)".to_string());
            0.3
        }
        40..=199 => 0.6,
        200..=2000 => 0.85,
        _ => 0.95,
    }
}

fn uniqueness_score(text: &str, issues: &mut Vec<String>) -> f64 {
    let segments: Vec<&str> = text
        .split(['\n', '.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if segments.is_empty() {
        return 0.0;
    }

    let mut unique: Vec<&str> = segments.clone();
    unique.sort_unstable();
    unique.dedup();
    let ratio = unique.len() as f64 / segments.len() as f64;

    if ratio < 0.7 {
        issues.push("high repetition".to_string());
        0.3
    } else if ratio < 0.9 {
        issues.push("some repetition".to_string());
        0.7
    } else {
        0.95
    }
}

fn format_score(text: &str, issues: &mut Vec<String>) -> f64 {
    let mut score: f64 = 1.0;

    if longest_char_run(text) > MAX_CHAR_RUN {
        issues.push("excessive character repetition".to_string());
        score -= 0.3;
    }
    if text.contains('\u{FFFD}') {
        issues.push("contains replacement characters".to_string());
        score -= 0.25;
    }

    score.max(0.0)
}

fn longest_char_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut prev: Option<char> = None;
    for ch in text.chars() {
        if Some(ch) == prev {
            current += 1;
        } else {
            current = 1;
            prev = Some(ch);
        }
        longest = longest.max(current);
    }
    longest
}

/// Lowercase, replace non-alphanumerics with spaces, collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut seen_space = true;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            normalized.extend(ch.to_lowercase());
            seen_space = false;
        } else if !seen_space {
            normalized.push(' ');
            seen_space = true;
        }
    }
    if normalized.ends_with(' ') {
        normalized.pop();
    }
    normalized
}
