use crate::error::ServiceError;
use crate::types::UploadedFile;
use bytes::Bytes;
use futures_util::future::ready;
use futures_util::stream::once;
use multer::Multipart;
use std::collections::HashMap;
use std::convert::Infallible;

/// Parsed `multipart/form-data` body
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl FormData {
    /// Text field, `None` when absent or blank
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }

    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        self.files.remove(name)
    }
}

pub async fn parse_form(content_type: Option<&str>, body: &[u8]) -> Result<FormData, ServiceError> {
    let content_type = content_type
        .ok_or_else(|| ServiceError::Validation("Missing Content-Type header".to_string()))?;
    let boundary = multer::parse_boundary(content_type).map_err(|e| {
        ServiceError::Validation(format!("Expected multipart/form-data body: {}", e))
    })?;

    let data = Bytes::copy_from_slice(body);
    let stream = once(ready(Ok::<Bytes, Infallible>(data)));
    let mut multipart = Multipart::new(stream, boundary);

    let mut form = FormData::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::Validation(format!("Invalid form data: {}", e)))?
    {
        let Some(name) = field.name().map(|n| n.to_string()) else {
            continue;
        };

        match field.file_name().map(|n| n.to_string()) {
            Some(file_name) => {
                let content_type = field
                    .content_type()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "application/octet-stream".to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ServiceError::Validation(format!("Invalid form data: {}", e)))?;

                // An empty file input is sent with no name and no content
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }

                form.files.insert(
                    name,
                    UploadedFile {
                        file_name,
                        content_type,
                        bytes: bytes.to_vec(),
                    },
                );
            }
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| ServiceError::Validation(format!("Invalid form data: {}", e)))?;
                form.fields.insert(name, value);
            }
        }
    }

    Ok(form)
}

/// Build a multipart body. Returns the `Content-Type` header value and the
/// encoded body.
#[cfg(any(test, feature = "testing"))]
pub fn encode(fields: &[(&str, &str)], files: &[(&str, &UploadedFile)]) -> (String, Vec<u8>) {
    const BOUNDARY: &str = "----thesis-hub-form-boundary";
    let mut body = Vec::new();

    for (name, value) in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }

    for (name, file) in files {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                name, file.file_name
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", file.content_type).as_bytes());
        body.extend_from_slice(&file.bytes);
        body.extend_from_slice(b"\r\n");
    }

    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}
