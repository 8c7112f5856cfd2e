//! HTTP handlers.

use axum::{
    Json,
    extract::{self, Multipart, State, multipart::MultipartRejection},
    http::Uri,
    response::{IntoResponse, Response},
};
use serde::de::DeserializeOwned;

use crate::{
    chain::{InvokeRequest, InvokeResponse},
    intake::{
        document::{CniLanguage, DocumentKind, DocumentRequest},
        envelope::ResponseEnvelope,
        error::IntakeError,
        is_archive_name,
    },
    prelude::*,
};

use super::{AppState, upload::read_upload};

impl IntoResponse for IntakeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, %status, "Request failed");
        } else {
            debug!(error = %self, %status, "Request rejected");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Parse a wire name like `cni_front` into one of our enums.
fn parse_wire_name<T: DeserializeOwned>(what: &str, name: &str) -> Result<T, IntakeError> {
    serde_json::from_value(Value::String(name.to_owned()))
        .map_err(|_| IntakeError::BadRequest(format!("Unknown {what}: '{name}'")))
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `POST /ocr/resume`
#[instrument(level = "debug", skip_all)]
pub async fn ocr_resume(
    State(state): State<AppState>,
    uri: Uri,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ResponseEnvelope>, IntakeError> {
    let upload = read_upload(multipart, "file").await?;
    let request = DocumentRequest::validate(DocumentKind::Resume, None)?;
    let envelope = state
        .processor
        .process_document(&upload.file_name, &upload.data, &request, uri.path())
        .await?;
    Ok(Json(envelope))
}

/// `POST /ocr/smalter/{image_type}`
///
/// Accepts a single document, or a ZIP archive of documents.
#[instrument(level = "debug", skip_all, fields(%image_type))]
pub async fn ocr_smalter(
    State(state): State<AppState>,
    extract::Path(image_type): extract::Path<String>,
    uri: Uri,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, IntakeError> {
    let kind: DocumentKind = parse_wire_name("document type", &image_type)?;
    let upload = read_upload(multipart, "file").await?;
    let language = upload
        .lang
        .as_deref()
        .map(|lang| parse_wire_name::<CniLanguage>("language", lang))
        .transpose()?;
    let request = DocumentRequest::validate(kind, language)?;

    if is_archive_name(&upload.file_name) {
        info!(file_name = %upload.file_name, "Bulk upload");
        let fragments = state
            .bulk
            .dispatch_bulk(upload.data, &request, uri.path())
            .await?;
        Ok(Json(fragments).into_response())
    } else {
        let envelope = state
            .processor
            .process_document(&upload.file_name, &upload.data, &request, uri.path())
            .await?;
        Ok(Json(envelope).into_response())
    }
}

/// `POST /ocr/eilify`
#[instrument(level = "debug", skip_all)]
pub async fn ocr_eilify(
    State(state): State<AppState>,
    uri: Uri,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ResponseEnvelope>, IntakeError> {
    let upload = read_upload(multipart, "image").await?;
    let request = DocumentRequest::validate(DocumentKind::Generic, None)?;
    let envelope = state
        .processor
        .process_document(&upload.file_name, &upload.data, &request, uri.path())
        .await?;
    Ok(Json(envelope))
}

/// `POST /chain/invoke`
#[instrument(level = "debug", skip_all)]
pub async fn chain_invoke(
    State(state): State<AppState>,
    Json(body): Json<InvokeRequest>,
) -> Result<Json<InvokeResponse>, IntakeError> {
    let output = state
        .translate
        .invoke(&body.input.to_bindings())
        .await
        .map_err(IntakeError::Collaborator)?;
    Ok(Json(InvokeResponse::new(output)))
}
