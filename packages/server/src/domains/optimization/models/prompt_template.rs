use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::PromptTemplateId;
use crate::domains::analysis::OptimizationOption;

pub const DEFAULT_TEMPERATURE: f32 = 0.4;
pub const DEFAULT_MAX_TOKENS: u32 = 8000;

/// Admin-editable model settings for one optimization stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: PromptTemplateId,
    pub option: OptimizationOption,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub model: Option<String>,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

/// Settings for the single model call of an optimization job.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub model: Option<String>,
    pub system: Option<String>,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            model: None,
            system: None,
        }
    }
}

/// Lowest temperature and largest token budget among the active templates of
/// the selected options. System prompts are concatenated in option order;
/// the first template naming a model wins.
pub fn resolve_call_settings(
    templates: &[PromptTemplate],
    options: &[OptimizationOption],
) -> CallSettings {
    let mut selected: Vec<&PromptTemplate> = templates
        .iter()
        .filter(|t| t.active && options.contains(&t.option))
        .collect();
    if selected.is_empty() {
        return CallSettings::default();
    }
    selected.sort_by_key(|t| t.option);

    let temperature = selected
        .iter()
        .map(|t| t.temperature)
        .fold(f32::INFINITY, f32::min);
    let max_tokens = selected.iter().map(|t| t.max_tokens).max().unwrap_or(DEFAULT_MAX_TOKENS);
    let model = selected.iter().find_map(|t| t.model.clone());
    let system = selected
        .iter()
        .map(|t| t.system_prompt.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    CallSettings {
        temperature,
        max_tokens,
        model,
        system: (!system.is_empty()).then_some(system),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(option: OptimizationOption, temperature: f32, max_tokens: u32, active: bool) -> PromptTemplate {
        PromptTemplate {
            id: PromptTemplateId::new(),
            option,
            system_prompt: format!("You handle {}.", option),
            temperature,
            max_tokens,
            model: None,
            active,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_defaults_without_templates() {
        let settings = resolve_call_settings(&[], &[OptimizationOption::Seo]);
        assert_eq!(settings, CallSettings::default());
    }

    #[test]
    fn test_min_temperature_max_tokens() {
        let templates = vec![
            template(OptimizationOption::Seo, 0.7, 4000, true),
            template(OptimizationOption::Descriptions, 0.3, 12000, true),
            template(OptimizationOption::Tags, 0.1, 20000, false),
            template(OptimizationOption::Prices, 0.0, 30000, true),
        ];
        let settings = resolve_call_settings(
            &templates,
            &[OptimizationOption::Seo, OptimizationOption::Descriptions, OptimizationOption::Tags],
        );
        assert!((settings.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(settings.max_tokens, 12000);
        let system = settings.system.unwrap();
        assert!(system.starts_with("You handle descriptions."));
        assert!(!system.contains("tags"));
    }
}
