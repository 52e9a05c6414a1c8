use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::extract::{self, ExtractError, McqResult};
use crate::ollama::{OllamaClient, OllamaError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct McqRequest {
    pub transcript: String,
    #[serde(rename = "noOfMCQs")]
    pub no_of_mcqs: String,
}

#[derive(Debug, Error)]
pub enum McqError {
    #[error("`noOfMCQs` must be a positive integer")]
    InvalidCount,
    #[error("`transcript` must not be empty")]
    EmptyTranscript,
    #[error("Failed to parse model response as JSON")]
    Parse { raw: String },
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Upstream(#[from] OllamaError),
}

impl From<ExtractError> for McqError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Parse { raw } => McqError::Parse { raw },
            other @ ExtractError::Validation { .. } => McqError::Validation(other.to_string()),
        }
    }
}

impl IntoResponse for McqError {
    fn into_response(self) -> Response {
        let status = match &self {
            McqError::InvalidCount | McqError::EmptyTranscript => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Parse failures keep the raw model output for diagnostics.
        let body = match &self {
            McqError::Parse { raw } => json!({ "error": self.to_string(), "raw": raw }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

/// Renders the fixed MCQ instruction template. Pure: the same transcript and
/// count always produce the same prompt.
pub fn build_prompt(transcript: &str, question_count: u32) -> String {
    format!(
        r#"You are an assistant that ONLY outputs valid JSON. No extra text, no explanations.

From the transcript below, generate up to {question_count} multiple-choice questions.

Each question must have 3 or 4 options, and exactly one correct answer.

The JSON output must include the "answer" field for every question, and the answer must be one of the "options".

Return JSON exactly in this format:

{{
  "result": [
    {{
      "question": "string",
      "options": ["string", "string", "string", "string"],
      "answer": "string"
    }}
  ]
}}

Transcript:
"""
{transcript}
"""
"#
    )
}

/// `POST /api/v1/mcq` — generate multiple-choice questions from a transcript.
pub async fn generate_mcqs(
    State(state): State<AppState>,
    Json(req): Json<McqRequest>,
) -> Result<Json<McqResult>, McqError> {
    let question_count: u32 = req
        .no_of_mcqs
        .trim()
        .parse()
        .ok()
        .filter(|count| *count > 0)
        .ok_or(McqError::InvalidCount)?;

    if req.transcript.trim().is_empty() {
        return Err(McqError::EmptyTranscript);
    }

    let prompt = build_prompt(&req.transcript, question_count);

    let client = OllamaClient::new(&state.ollama_url);
    let stream = client.chat_stream(&state.mcq_model, &prompt).await?;

    // Drain the full response before extraction; partial output is never
    // handed to the parser.
    let mut stream = std::pin::pin!(stream);
    let mut response_text = String::new();
    while let Some(fragment) = stream.next().await {
        response_text.push_str(&fragment?);
    }

    let parsed = extract::extract_mcqs(&response_text).map_err(|e| {
        match &e {
            ExtractError::Parse { raw } => {
                tracing::error!("JSON decode error; raw response: {}", raw);
            }
            ExtractError::Validation { location, reason } => {
                tracing::error!("Model output failed validation at {}: {}", location, reason);
            }
        }
        e
    })?;

    Ok(Json(parsed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_interpolates_transcript_and_count() {
        let prompt = build_prompt("Water boils at 100C.", 1);
        assert!(prompt.contains("Water boils at 100C."));
        assert!(prompt.contains("up to 1 multiple-choice questions"));
        assert!(prompt.contains(r#""result""#));
        assert!(prompt.contains(r#""answer""#));
    }

    #[test]
    fn prompt_is_deterministic() {
        assert_eq!(build_prompt("same input", 3), build_prompt("same input", 3));
    }

    #[test]
    fn request_accepts_the_boundary_field_names() {
        let req: McqRequest =
            serde_json::from_str(r#"{"transcript":"abc","noOfMCQs":"5"}"#).unwrap();
        assert_eq!(req.transcript, "abc");
        assert_eq!(req.no_of_mcqs, "5");
    }

    #[test]
    fn parse_error_response_includes_raw_output() {
        let response = McqError::Parse {
            raw: "Sorry, I cannot help with that.".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn invalid_count_is_a_client_error() {
        let response = McqError::InvalidCount.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn validation_error_is_a_server_error() {
        let response = McqError::Validation("result[0].answer: bad".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
