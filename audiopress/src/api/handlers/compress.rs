use crate::AppState;
use crate::api::models::ErrorBody;
use crate::errors::{Error, Result};
use crate::staging::JobFiles;
use anyhow::Context;
use axum::{
    body::Body,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartRejection},
    },
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::Instrument;

/// Multipart field carrying the upload
pub const FILE_FIELD: &str = "file";

/// Marks the response as a download named `compressed_audio.mp3`
pub const DOWNLOAD_DISPOSITION: &str = "attachment; filename=\"compressed_audio.mp3\"";

pub const MP3_CONTENT_TYPE: &str = "audio/mpeg";

const NO_FILE_PART: &str = "No file part in the request";

#[utoipa::path(
    post,
    path = "/compress",
    tag = "compress",
    summary = "Compress audio",
    description = "Upload a media file in the `file` field. Any video stream is dropped and the audio is \
                   re-encoded to a 64 kbps MP3, which is returned as a download.",
    request_body(
        content_type = "multipart/form-data",
        description = "Media file to compress, in a part named `file`"
    ),
    responses(
        (status = 200, description = "Compressed MP3", content_type = "audio/mpeg", body = Vec<u8>),
        (status = 400, description = "Missing file part or empty filename", body = ErrorBody),
        (status = 413, description = "Request body exceeds the upload limit"),
        (status = 500, description = "Encoder failed or internal error", body = ErrorBody),
        (status = 504, description = "Encoder timed out", body = ErrorBody)
    )
)]
pub async fn compress_audio(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    // Anything that isn't a well-formed multipart request has no file part to find
    let mut multipart = multipart.map_err(|rejection| {
        tracing::debug!("Rejected non-multipart request: {}", rejection.body_text());
        Error::BadRequest {
            message: NO_FILE_PART.to_string(),
        }
    })?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        // A part without a filename is a plain form value, not a file
        match field.file_name().map(str::to_owned).as_deref() {
            None => continue,
            Some("") => {
                return Err(Error::BadRequest {
                    message: "No selected file".to_string(),
                });
            }
            Some(_) => {
                // Dropping `job` removes both temp files, whichever way the upload exits
                let job = JobFiles::new(&state.config.temp_dir);
                let span = tracing::info_span!("compress", job_id = %job.id());

                let result = compress_upload(&state, job, field).instrument(span.clone()).await;
                return Ok(span.in_scope(|| result.into_response()));
            }
        }
    }

    Err(Error::BadRequest {
        message: NO_FILE_PART.to_string(),
    })
}

async fn compress_upload(state: &AppState, job: JobFiles, mut field: Field<'_>) -> Result<Response> {
    tracing::debug!(
        client_filename = ?field.file_name(),
        content_type = ?field.content_type(),
        "Receiving upload"
    );

    let size = stage_upload(&mut field, job.input_path()).await?;
    tracing::info!(path = %job.input_path().display(), bytes = size, "Saved upload");

    state.encoder.run(job.input_path(), job.output_path()).await?;
    tracing::info!(path = %job.output_path().display(), "FFmpeg compression successful");

    let output = tokio::fs::File::open(job.output_path())
        .await
        .with_context(|| format!("opening encoder output {}", job.output_path().display()))?;
    let length = output.metadata().await.context("reading encoder output metadata")?.len();

    // The open handle keeps the data readable after the paths are unlinked
    drop(job);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(MP3_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, HeaderValue::from_static(DOWNLOAD_DISPOSITION)),
            (header::CONTENT_LENGTH, HeaderValue::from(length)),
        ],
        Body::from_stream(ReaderStream::new(output)),
    )
        .into_response())
}

/// Stream a multipart field to `path` chunk by chunk, returning the number of bytes written.
async fn stage_upload(field: &mut Field<'_>, path: &Path) -> Result<u64> {
    let mut file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("creating staging file {}", path.display()))?;

    let mut written = 0u64;
    while let Some(chunk) = field.chunk().await? {
        file.write_all(&chunk)
            .await
            .with_context(|| format!("writing staging file {}", path.display()))?;
        written += chunk.len() as u64;
    }

    file.flush().await.context("flushing staging file")?;
    Ok(written)
}
