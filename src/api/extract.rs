use std::collections::HashMap;

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Form,
};
use bytes::Bytes;

use crate::error::AppError;

/// An uploaded file part
#[derive(Debug)]
pub struct UploadedFile {
    /// Client supplied filename, if any
    pub file_name: Option<String>,
    /// Raw file content
    pub content: Bytes,
}

/// Text fields and file parts of a form submission.
///
/// Accepts both `multipart/form-data` and `application/x-www-form-urlencoded`
/// bodies; only multipart bodies can carry files.
#[derive(Debug, Default)]
pub struct FormData {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl FormData {
    /// A required text field
    pub fn text(&self, name: &str) -> Result<&str, AppError> {
        self.fields
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| AppError::InvalidInput(format!("missing form field '{}'", name)))
    }

    /// A required file field
    pub fn take_file(&mut self, name: &str) -> Result<UploadedFile, AppError> {
        self.files
            .remove(name)
            .ok_or_else(|| AppError::InvalidInput(format!("missing file field '{}'", name)))
    }
}

#[async_trait]
impl<S> FromRequest<S> for FormData
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |ct| ct.starts_with("multipart/form-data"));

        if !is_multipart {
            let Form(fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| AppError::InvalidInput(e.body_text()))?;
            return Ok(Self {
                fields,
                files: HashMap::new(),
            });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::UploadError(e.body_text()))?;

        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or("").to_string();
            if name.is_empty() {
                continue;
            }

            match field.file_name().map(String::from) {
                Some(file_name) => {
                    let content = field.bytes().await?;
                    form.files.insert(
                        name,
                        UploadedFile {
                            file_name: Some(file_name).filter(|n| !n.is_empty()),
                            content,
                        },
                    );
                }
                None if field.content_type().is_some_and(|ct| !ct.starts_with("text/")) => {
                    let content = field.bytes().await?;
                    form.files.insert(
                        name,
                        UploadedFile {
                            file_name: None,
                            content,
                        },
                    );
                }
                None => {
                    let value = field.text().await?;
                    form.fields.insert(name, value);
                }
            }
        }
        Ok(form)
    }
}
