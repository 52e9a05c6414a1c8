use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::json;
use std::path::Path;
use thiserror::Error;

use crate::storage::ScratchFile;
use crate::whisper::Transcriber;
use crate::AppState;

/// Extensions accepted for upload, matching what the transcription models
/// are known to handle.
const ALLOWED_AUDIO_EXTENSIONS: [&str; 3] = ["wav", "mp3", "m4a"];

#[derive(Debug, Error)]
pub enum SttError {
    #[error("Invalid file type. Only .wav, .mp3, and .m4a files are allowed.")]
    UnsupportedFormat,
    #[error("Transcription failed. Please try again with a different audio file.")]
    TranscriptionFailed,
    #[error("Error during transcription: {0}")]
    Transcription(String),
    #[error("Failed to read upload: {0}")]
    Upload(String),
    #[error("Failed to stage upload: {0}")]
    Storage(#[from] std::io::Error),
}

impl IntoResponse for SttError {
    fn into_response(self) -> Response {
        let status = match &self {
            SttError::UnsupportedFormat | SttError::Upload(_) => StatusCode::BAD_REQUEST,
            SttError::TranscriptionFailed | SttError::Transcription(_) | SttError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// `POST /api/v1/stt` — multipart audio upload, transcribed text back.
pub async fn transcribe_audio(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, SttError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| SttError::Upload(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or("unknown_file").to_string();
        let transcription = transcribe_upload(
            &state.storage_dir,
            &filename,
            field,
            state.transcriber.as_ref(),
        )
        .await
        .map_err(|e| {
            tracing::error!("Transcription request for {} failed: {}", filename, e);
            e
        })?;

        return Ok(Json(json!({ "transcription": transcription })));
    }

    Err(SttError::Upload("missing `file` field".to_string()))
}

/// Stages the byte source in the scratch directory, validates the extension,
/// and hands the file to the transcriber.
///
/// The staged file is gone by the time this returns, whatever the outcome:
/// the explicit removals cover the decided paths, and the [`ScratchFile`]
/// drop guard covers early errors and cancellation.
pub async fn transcribe_upload<S, E, T>(
    scratch_dir: &Path,
    filename: &str,
    body: S,
    transcriber: &T,
) -> Result<String, SttError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: std::fmt::Display,
    T: Transcriber + ?Sized,
{
    let mut staged = ScratchFile::create(scratch_dir, filename).await?;

    // Copy chunk by chunk; the whole body is never held in memory.
    let mut body = std::pin::pin!(body);
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| SttError::Upload(e.to_string()))?;
        staged.write_chunk(&chunk).await?;
    }
    staged.finish().await?;

    let supported = staged
        .extension()
        .is_some_and(|ext| ALLOWED_AUDIO_EXTENSIONS.contains(&ext));
    if !supported {
        staged.remove().await;
        return Err(SttError::UnsupportedFormat);
    }

    let outcome = transcriber.transcribe(staged.path()).await;
    staged.remove().await;

    let transcription = outcome.map_err(|e| SttError::Transcription(e.to_string()))?;
    if transcription.trim().is_empty() {
        return Err(SttError::TranscriptionFailed);
    }

    Ok(transcription)
}
