//! `POST /api/process-signature`: multipart submission in, JSON summary out.

use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;

use crate::application::error::HttpError;
use crate::application::pipeline::PipelineError;
use crate::domain::signature::{NamedBlob, SignatureRequest, SlotIndex};

use super::HttpState;
use super::models::SignatureResponse;

const SOURCE: &str = "infra::http::signature";

const FIELD_HTML: &str = "html";
const FIELD_ADVISOR_EMAIL: &str = "advisorEmail";
const FIELD_USER_ID: &str = "userId";

pub(super) async fn process_signature(
    State(state): State<HttpState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HttpError> {
    let request = read_signature_request(&mut multipart).await?;
    let result = state
        .pipeline
        .process(request)
        .await
        .map_err(pipeline_error_to_http)?;
    Ok(Json(SignatureResponse::from(result)))
}

/// Collect the form fields into a pipeline request. Slot order comes from field names.
async fn read_signature_request(multipart: &mut Multipart) -> Result<SignatureRequest, HttpError> {
    let mut request = SignatureRequest::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        match name.as_str() {
            FIELD_HTML => request.markup = field.text().await.map_err(multipart_error)?,
            FIELD_ADVISOR_EMAIL => {
                request.owner_email = field.text().await.map_err(multipart_error)?
            }
            FIELD_USER_ID => request.owner_id = field.text().await.map_err(multipart_error)?,
            other => {
                let slot = SlotIndex::from_field_name(other).map_err(|err| {
                    HttpError::from_error(
                        SOURCE,
                        StatusCode::BAD_REQUEST,
                        format!("Invalid image field `{other}`"),
                        &err,
                    )
                })?;
                let Some(slot) = slot else {
                    debug!(target = SOURCE, field = other, "ignoring unknown form field");
                    continue;
                };
                let Some(filename) = field.file_name().map(str::to_string) else {
                    debug!(target = SOURCE, field = other, "ignoring image field without a file");
                    continue;
                };
                let mime_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?;

                request.images.push(NamedBlob {
                    slot,
                    filename,
                    bytes,
                    mime_type,
                });
            }
        }
    }

    Ok(request)
}

fn multipart_error(err: MultipartError) -> HttpError {
    let status = err.status();
    let message = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "Submission exceeds the configured size limit"
    } else {
        "Invalid multipart payload"
    };
    HttpError::from_error(SOURCE, status, message, &err)
}

/// Map pipeline failures onto the response contract: client faults are 400, storage faults 500.
pub fn pipeline_error_to_http(err: PipelineError) -> HttpError {
    let status = match &err {
        PipelineError::Validation { .. } | PipelineError::MalformedMarkup(_) => {
            StatusCode::BAD_REQUEST
        }
        PipelineError::PartialUpload { .. }
        | PipelineError::DocumentPersist { .. }
        | PipelineError::Invariant { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let public_message = match &err {
        PipelineError::Invariant { .. } => "Failed to process signature".to_string(),
        other => other.to_string(),
    };
    HttpError::from_error(SOURCE, status, public_message, &err)
}
