use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// A single multiple-choice question as returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct McqItem {
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
}

/// The validated payload of a successful MCQ generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct McqResult {
    pub result: Vec<McqItem>,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Failed to parse model response as JSON")]
    Parse { raw: String },
    #[error("Invalid MCQ payload at {location}: {reason}")]
    Validation { location: String, reason: String },
}

fn validation(location: impl Into<String>, reason: impl Into<String>) -> ExtractError {
    ExtractError::Validation {
        location: location.into(),
        reason: reason.into(),
    }
}

/// Selects the candidate JSON span: first `{` through last `}` inclusive.
///
/// Models tend to wrap the object in prose or markdown fences; everything
/// outside the outermost braces is discarded. If either brace is missing
/// (or they are inverted) the whole text is returned and left to fail
/// parsing downstream.
fn json_candidate(raw: &str) -> &str {
    match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start <= end => &raw[start..=end],
        _ => raw,
    }
}

/// Parses and validates the accumulated model output into an [`McqResult`].
///
/// Malformed output is expected and comes back as a typed error, never a
/// panic: `Parse` keeps the full raw text for diagnostics, `Validation`
/// names the offending field.
pub fn extract_mcqs(raw: &str) -> Result<McqResult, ExtractError> {
    let candidate = json_candidate(raw);

    let value: Value = serde_json::from_str(candidate).map_err(|_| ExtractError::Parse {
        raw: raw.to_string(),
    })?;

    validate(&value)
}

fn validate(value: &Value) -> Result<McqResult, ExtractError> {
    let object = value
        .as_object()
        .ok_or_else(|| validation("$", "response is not a JSON object"))?;

    let entries = object
        .get("result")
        .ok_or_else(|| validation("result", "missing `result` key"))?
        .as_array()
        .ok_or_else(|| validation("result", "`result` is not an array"))?;

    let mut items = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        items.push(validate_item(index, entry)?);
    }

    Ok(McqResult { result: items })
}

fn validate_item(index: usize, entry: &Value) -> Result<McqItem, ExtractError> {
    let at = |field: &str| format!("result[{}].{}", index, field);

    let object = entry
        .as_object()
        .ok_or_else(|| validation(format!("result[{}]", index), "entry is not an object"))?;

    let question = object
        .get("question")
        .and_then(Value::as_str)
        .ok_or_else(|| validation(at("question"), "missing or not a string"))?;

    let raw_options = object
        .get("options")
        .and_then(Value::as_array)
        .ok_or_else(|| validation(at("options"), "missing or not an array"))?;

    let mut options = Vec::with_capacity(raw_options.len());
    for (opt_index, option) in raw_options.iter().enumerate() {
        let option = option.as_str().ok_or_else(|| {
            validation(format!("result[{}].options[{}]", index, opt_index), "not a string")
        })?;
        options.push(option.to_string());
    }

    if options.len() < 3 || options.len() > 4 {
        return Err(validation(
            at("options"),
            format!("expected 3 or 4 options, got {}", options.len()),
        ));
    }

    for (opt_index, option) in options.iter().enumerate() {
        if options[..opt_index].contains(option) {
            return Err(validation(
                at("options"),
                format!("duplicate option {:?}", option),
            ));
        }
    }

    let answer = object
        .get("answer")
        .and_then(Value::as_str)
        .ok_or_else(|| validation(at("answer"), "missing or not a string"))?;

    if !options.iter().any(|option| option == answer) {
        return Err(validation(at("answer"), "answer is not one of the options"));
    }

    Ok(McqItem {
        question: question.to_string(),
        options,
        answer: answer.to_string(),
    })
}
