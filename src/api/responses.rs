use serde::Serialize;

use crate::models::prediction::{Candidate, Decision, Prediction};

/// Plain `{status}` acknowledgement
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl StatusResponse {
    pub fn deleted() -> Self {
        Self { status: "deleted" }
    }
}

#[derive(Debug, Serialize)]
pub struct TemplateAdded {
    pub status: &'static str,
    pub dish: String,
    pub file: String,
}

#[derive(Debug, Serialize)]
pub struct DishDeleted {
    pub status: &'static str,
    pub dish: String,
}

#[derive(Debug, Serialize)]
pub struct ThresholdSet {
    pub status: &'static str,
    pub threshold: f32,
}

#[derive(Debug, Serialize)]
pub struct ThresholdValue {
    pub threshold: f32,
}

#[derive(Debug, Serialize)]
pub struct Label {
    pub label: String,
    pub score: f32,
}

#[derive(Debug, Serialize)]
pub struct RankedLabel {
    pub label: String,
    pub file: String,
    pub score: f32,
}

impl From<Candidate> for RankedLabel {
    fn from(c: Candidate) -> Self {
        Self {
            label: c.dish,
            file: c.file,
            score: c.score,
        }
    }
}

/// Body of `POST /predict`
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PredictResponse {
    Recognized {
        best: Label,
        #[serde(skip_serializing_if = "Option::is_none")]
        candidates: Option<Vec<RankedLabel>>,
    },
    NotRecognized {
        error: &'static str,
        best_score: Option<f32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        candidates: Option<Vec<RankedLabel>>,
    },
}

impl From<Prediction> for PredictResponse {
    fn from(prediction: Prediction) -> Self {
        let candidates = prediction
            .candidates
            .map(|list| list.into_iter().map(RankedLabel::from).collect());

        match prediction.decision {
            Decision::Accepted(best) => PredictResponse::Recognized {
                best: Label {
                    label: best.dish,
                    score: best.score,
                },
                candidates,
            },
            Decision::Rejected { best } => PredictResponse::NotRecognized {
                error: "not recognized",
                best_score: best.map(|c| c.score),
                candidates,
            },
        }
    }
}
