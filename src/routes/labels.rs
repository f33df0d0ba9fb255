use crate::prediction::TumorClass;
use axum::{response::IntoResponse, response::Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct ClassLabels {
    labels: Vec<&'static str>,
}

/// Class labels in the order the model scores them.
pub async fn class_labels() -> impl IntoResponse {
    Json(ClassLabels {
        labels: TumorClass::labels(),
    })
}
