//! Response translation — validating the engine's loosely-typed payload
//! into the strict internal result model.
//!
//! Validation is eager: an explicit `error` field takes precedence over
//! everything else, a present-but-wrong-typed field is a failure rather
//! than a silent default, and one malformed matched-source entry fails
//! the whole translation. Only domain extraction degrades gracefully,
//! because domain is auxiliary metadata used for statistics.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use super::EngineOutput;

/// Sentinel domain for urls whose host cannot be parsed.
pub const UNKNOWN_DOMAIN: &str = "unknown";

/// One detected similar document, as translated from the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMatch {
    pub url: String,
    pub title: String,
    /// Similarity of the matched document, 0–100.
    pub similarity_percentage: f64,
    pub matched_text: String,
    /// Host portion of `url`, or [`UNKNOWN_DOMAIN`].
    pub domain: String,
}

/// Strict result of one successful engine run.
///
/// `ai_confidence` is always on the 0–100 scale: payload values in
/// `(0, 1]` are treated as fractions and normalized at this boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineReport {
    pub similarity_score: f64,
    pub ai_detected: bool,
    pub ai_confidence: f64,
    pub paraphrased_text: Option<String>,
    pub matched_sources: Vec<SourceMatch>,
}

/// Errors from translating an engine payload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranslateError {
    /// The payload explicitly carried an error field.
    #[error("analysis engine reported an error: {0}")]
    EngineReported(String),

    #[error("field `{field}` has unexpected type")]
    WrongType { field: String },

    #[error("field `{field}` is out of range: {value}")]
    OutOfRange { field: String, value: f64 },

    #[error("matched source {index} is malformed: {reason}")]
    MalformedSource { index: usize, reason: String },
}

/// Translate a raw engine payload into the strict result model.
pub fn translate(output: &EngineOutput) -> Result<EngineReport, TranslateError> {
    let payload = &output.payload;

    // An explicit error wins regardless of other fields present.
    if let Some(error) = payload.get("error") {
        if !error.is_null() {
            let message = error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(TranslateError::EngineReported(message));
        }
    }

    let similarity_score = number_field(payload, "similarityScore")?.unwrap_or(0.0);
    if !(0.0..=100.0).contains(&similarity_score) {
        return Err(TranslateError::OutOfRange {
            field: "similarityScore".to_string(),
            value: similarity_score,
        });
    }

    let ai_detected = bool_field(payload, "aiDetected")?.unwrap_or(false);
    let ai_confidence = normalize_confidence(number_field(payload, "aiConfidence")?.unwrap_or(0.0))?;
    let paraphrased_text = string_field(payload, "paraphrasedText")?;
    let matched_sources = translate_sources(payload)?;

    Ok(EngineReport {
        similarity_score,
        ai_detected,
        ai_confidence,
        paraphrased_text,
        matched_sources,
    })
}

/// Extract the host portion of a url, falling back to the sentinel.
pub fn extract_domain(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .unwrap_or_else(|| UNKNOWN_DOMAIN.to_string())
}

/// Normalize a confidence value to the 0–100 scale.
///
/// Payloads are seen in both conventions; values in `(0, 1]` are taken as
/// fractions. Anything outside 0–100 after normalization is rejected.
fn normalize_confidence(value: f64) -> Result<f64, TranslateError> {
    let scaled = if value > 0.0 && value <= 1.0 {
        value * 100.0
    } else {
        value
    };
    if !(0.0..=100.0).contains(&scaled) {
        return Err(TranslateError::OutOfRange {
            field: "aiConfidence".to_string(),
            value,
        });
    }
    Ok(scaled)
}

fn number_field(payload: &Value, field: &str) -> Result<Option<f64>, TranslateError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .map(Some)
            .ok_or_else(|| TranslateError::WrongType {
                field: field.to_string(),
            }),
    }
}

fn bool_field(payload: &Value, field: &str) -> Result<Option<bool>, TranslateError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_bool()
            .map(Some)
            .ok_or_else(|| TranslateError::WrongType {
                field: field.to_string(),
            }),
    }
}

fn string_field(payload: &Value, field: &str) -> Result<Option<String>, TranslateError> {
    match payload.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| TranslateError::WrongType {
                field: field.to_string(),
            }),
    }
}

fn translate_sources(payload: &Value) -> Result<Vec<SourceMatch>, TranslateError> {
    let entries = match payload.get("matchedSources") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(entries)) => entries,
        Some(_) => {
            return Err(TranslateError::WrongType {
                field: "matchedSources".to_string(),
            })
        }
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| translate_source(index, entry))
        .collect()
}

fn translate_source(index: usize, entry: &Value) -> Result<SourceMatch, TranslateError> {
    let malformed = |reason: &str| TranslateError::MalformedSource {
        index,
        reason: reason.to_string(),
    };

    let entry = entry.as_object().ok_or_else(|| malformed("not an object"))?;

    let url = entry
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing url"))?
        .to_string();
    let title = entry
        .get("title")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing title"))?
        .to_string();
    let similarity_percentage = entry
        .get("similarityPercentage")
        .and_then(Value::as_f64)
        .ok_or_else(|| malformed("missing similarityPercentage"))?;
    let matched_text = entry
        .get("matchedText")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("missing matchedText"))?
        .to_string();

    if !(0.0..=100.0).contains(&similarity_percentage) {
        return Err(malformed("similarityPercentage out of range"));
    }

    let domain = extract_domain(&url);

    Ok(SourceMatch {
        url,
        title,
        similarity_percentage,
        matched_text,
        domain,
    })
}
