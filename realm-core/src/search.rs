use serde_json::{Map, Value};
use thiserror::Error;

pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Approximate matches score below any exact substring hit.
const FUZZY_WEIGHT: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SearchError {
    #[error("threshold must be within (0, 1], got {0}")]
    Threshold(f64),
    #[error("no search keys configured")]
    NoKeys,
}

/// Edit-distance tolerant matcher over a fixed set of text fields.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzyMatcher {
    keys: Vec<String>,
    threshold: f64,
}

impl FuzzyMatcher {
    pub fn new<S: Into<String>>(
        keys: impl IntoIterator<Item = S>,
        threshold: f64,
    ) -> Result<Self, SearchError> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(SearchError::Threshold(threshold));
        }
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        if keys.is_empty() {
            return Err(SearchError::NoKeys);
        }
        Ok(Self { keys, threshold })
    }

    /// Matcher over `name` and `description`.
    pub fn default_keys(threshold: f64) -> Result<Self, SearchError> {
        Self::new(["name", "description"], threshold)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Best score across the configured keys, `None` below the threshold.
    pub fn score(&self, record: &Map<String, Value>, query: &str) -> Option<f64> {
        let best = self
            .keys
            .iter()
            .filter_map(|k| record.get(k).and_then(Value::as_str))
            .map(|text| text_score(text, query))
            .fold(0.0_f64, f64::max);
        (best >= self.threshold).then_some(best)
    }
}

/// Similarity of `query` against `text` in `[0, 1]`.
pub fn text_score(text: &str, query: &str) -> f64 {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return 1.0;
    }
    let t = text.to_lowercase();
    if let Some(pos) = t.find(&q) {
        // earlier hits rank higher
        return 1.0 - 0.1 * (pos as f64 / (t.len() as f64 + 1.0));
    }

    let q_len = q.chars().count();
    let chars: Vec<char> = t.chars().collect();
    let mut best = t
        .split_whitespace()
        .map(|word| strsim::jaro_winkler(&q, word))
        .fold(0.0_f64, f64::max);
    if chars.len() > q_len {
        for start in 0..=(chars.len() - q_len) {
            let window: String = chars[start..start + q_len].iter().collect();
            best = best.max(strsim::normalized_levenshtein(&q, &window));
        }
    }
    best * FUZZY_WEIGHT
}

/// Plain case-insensitive containment over `name`, used when no matcher can be
/// built.
pub fn name_contains(record: &Map<String, Value>, query: &str) -> bool {
    let q = query.trim().to_lowercase();
    record
        .get("name")
        .and_then(Value::as_str)
        .map(|name| name.to_lowercase().contains(&q))
        .unwrap_or(false)
}
