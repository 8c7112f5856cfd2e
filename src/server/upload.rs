//! Reading multipart uploads.

use axum::extract::{Multipart, multipart::MultipartRejection};

use crate::intake::error::IntakeError;

/// The parts of a multipart form that we care about.
#[derive(Debug)]
pub struct Upload {
    /// The uploaded file's name, as sent by the client.
    pub file_name: String,
    /// The file contents.
    pub data: Vec<u8>,
    /// The `lang` form field, if present and non-empty.
    pub lang: Option<String>,
}

/// Read a multipart form, expecting a file in `file_field`.
pub async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
    file_field: &str,
) -> Result<Upload, IntakeError> {
    let mut multipart =
        multipart.map_err(|err| IntakeError::BadRequest(err.body_text()))?;

    let mut file = None;
    let mut lang = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| IntakeError::BadRequest(format!("Failed to read multipart: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_owned();
        if name == file_field {
            if file.is_some() {
                return Err(IntakeError::BadRequest(format!(
                    "Multiple '{file_field}' fields are not allowed"
                )));
            }
            let file_name = field.file_name().unwrap_or("unknown").to_owned();
            let data = field.bytes().await.map_err(|err| {
                IntakeError::BadRequest(format!("Failed to read file data: {err}"))
            })?;
            file = Some((file_name, data.to_vec()));
        } else if name == "lang" {
            let text = field.text().await.map_err(|err| {
                IntakeError::BadRequest(format!("Failed to read 'lang': {err}"))
            })?;
            let text = text.trim();
            if !text.is_empty() {
                lang = Some(text.to_owned());
            }
        }
    }

    let (file_name, data) = file
        .ok_or_else(|| IntakeError::BadRequest(format!("Missing '{file_field}' field")))?;
    Ok(Upload {
        file_name,
        data,
        lang,
    })
}
