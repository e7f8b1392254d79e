use serde::{Deserialize, Serialize};

use crate::domains::analysis::ScoreBreakdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    /// The model returned a usable score.
    Model,
    /// The model's score was missing or out of range.
    Structural,
}

/// Narrative audit report stored on a completed audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub overall_score: i32,
    pub score_source: ScoreSource,
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendations: Vec<String>,
    pub breakdown: ScoreBreakdown,
}

/// What the model is asked to return for an audit.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelAuditReport {
    #[serde(default)]
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl AuditReport {
    /// Combines the model's narrative with the structural score.
    ///
    /// A missing or out-of-range model score falls back to the structural
    /// total.
    pub fn from_model(model: ModelAuditReport, breakdown: ScoreBreakdown) -> Self {
        let (overall_score, score_source) = match model.overall_score {
            Some(score) if (0.0..=100.0).contains(&score) => {
                (score.round() as i32, ScoreSource::Model)
            }
            _ => (breakdown.total.clamp(0, 100), ScoreSource::Structural),
        };

        Self {
            overall_score,
            score_source,
            summary: model.summary,
            strengths: model.strengths,
            weaknesses: model.weaknesses,
            recommendations: model.recommendations,
            breakdown,
        }
    }
}
