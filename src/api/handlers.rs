use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Path as UrlPath, Query, State},
    response::{IntoResponse, Redirect},
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{AppError, Result},
    models::template::TemplateListing,
    utils::{generate_filename, validate_file_extension},
    AppState,
};

use super::extract::{FormData, UploadedFile};
use super::responses::{
    DishDeleted, PredictResponse, StatusResponse, TemplateAdded, ThresholdSet, ThresholdValue,
};

/// Upper bound on `top_k`
const MAX_TOP_K: usize = 100;

pub async fn index() -> Redirect {
    Redirect::temporary("/static/index.html")
}

pub async fn add_template(
    State(state): State<Arc<AppState>>,
    mut form: FormData,
) -> Result<impl IntoResponse> {
    let dish = form.text("dish")?.trim().to_string();
    let upload = form.take_file("file")?;
    let file_name = resolve_file_name(&upload, &state.config.allowed_extensions)?;

    let recognizer = Arc::clone(&state.recognizer);
    let record = {
        let dish = dish.clone();
        let file_name = file_name.clone();
        tokio::task::spawn_blocking(move || {
            recognizer.add_template(&dish, &file_name, &upload.content)
        })
        .await??
    };

    Ok(Json(TemplateAdded {
        status: "ok",
        dish,
        file: record.file,
    }))
}

pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    UrlPath((dish, filename)): UrlPath<(String, String)>,
) -> Result<impl IntoResponse> {
    let recognizer = Arc::clone(&state.recognizer);
    tokio::task::spawn_blocking(move || recognizer.remove_template(&dish, &filename)).await??;
    Ok(Json(StatusResponse::deleted()))
}

pub async fn delete_dish(
    State(state): State<Arc<AppState>>,
    UrlPath(dish): UrlPath<String>,
) -> Result<impl IntoResponse> {
    let recognizer = Arc::clone(&state.recognizer);
    let removed = dish.clone();
    tokio::task::spawn_blocking(move || recognizer.remove_dish(&removed)).await??;
    Ok(Json(DishDeleted {
        status: "deleted",
        dish,
    }))
}

pub async fn list_templates(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TemplateListing>> {
    let recognizer = Arc::clone(&state.recognizer);
    let listing = tokio::task::spawn_blocking(move || recognizer.list_templates()).await??;
    Ok(Json(listing))
}

pub async fn set_threshold(
    State(state): State<Arc<AppState>>,
    form: FormData,
) -> Result<impl IntoResponse> {
    let raw = form.text("value")?;
    let value: f32 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::InvalidInput(format!("threshold {:?} is not a number", raw)))?;

    let recognizer = Arc::clone(&state.recognizer);
    let threshold = tokio::task::spawn_blocking(move || recognizer.set_threshold(value)).await??;
    Ok(Json(ThresholdSet {
        status: "ok",
        threshold,
    }))
}

pub async fn get_threshold(State(state): State<Arc<AppState>>) -> Json<ThresholdValue> {
    Json(ThresholdValue {
        threshold: state.recognizer.threshold(),
    })
}

#[derive(Debug, Deserialize)]
pub struct PredictParams {
    pub top_k: Option<usize>,
}

pub async fn predict(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PredictParams>,
    mut form: FormData,
) -> Result<Json<PredictResponse>> {
    let upload = form.take_file("file")?;
    let top_k = match params.top_k {
        Some(0) => return Err(AppError::InvalidInput("top_k must be at least 1".to_string())),
        Some(k) => Some(k.min(MAX_TOP_K)),
        None => None,
    };

    let recognizer = Arc::clone(&state.recognizer);
    let prediction =
        tokio::task::spawn_blocking(move || recognizer.predict(&upload.content, top_k)).await??;
    Ok(Json(PredictResponse::from(prediction)))
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": crate::built_info::PKG_NAME,
        "version": crate::built_info::PKG_VERSION,
        "built_at": crate::built_info::BUILT_TIME_UTC,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Pick the stored filename for an upload.
///
/// Uses the last path component of the client's filename; uploads without
/// one get a generated name with the extension of the decoded format.
fn resolve_file_name(upload: &UploadedFile, allowed_extensions: &[String]) -> Result<String> {
    let file_name = match upload.file_name.as_deref() {
        Some(raw) => {
            // Some clients send a full path
            let last = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
            Path::new(last)
                .file_name()
                .and_then(|n| n.to_str())
                .map(String::from)
                .ok_or_else(|| AppError::InvalidInput(format!("invalid filename {:?}", raw)))?
        }
        None => {
            let format = image::guess_format(&upload.content)?;
            let extension = format.extensions_str().first().copied().unwrap_or("img");
            generate_filename(extension)
        }
    };

    if !validate_file_extension(&file_name, allowed_extensions) {
        return Err(AppError::UploadError(format!(
            "unsupported file type for {:?}, expected one of {}",
            file_name,
            allowed_extensions.join(", ")
        )));
    }
    Ok(file_name)
}
