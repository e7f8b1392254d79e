//! Keyword and category analysis.
//!
//! Pure, synchronous functions shared by the audit and optimization
//! pipelines. Nothing here touches storage or the network.

pub mod distribution;
pub mod keywords;
pub mod options;
pub mod prompt;
pub mod proposal;
pub mod scoring;
pub mod vocabulary;

use serde::{Deserialize, Serialize};

pub use distribution::{calculate_category_distribution, CategoryDistribution, KeywordCount};
pub use keywords::{extract_keywords, KeywordMatch};
pub use options::{normalize_options, validate_optimization_options, OptimizationOption, OptionsError};
pub use prompt::{build_optimization_prompt, section_marker, PromptContext};
pub use proposal::{
    generate_category_proposal, CategoryChange, CategoryChangeKind, CategoryProposal,
};
pub use scoring::{structural_score, ScoreBreakdown};

use crate::common::PricingData;

/// Keyword analysis attached to a completed audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordReport {
    pub keywords: Vec<KeywordMatch>,
    pub distribution: Vec<CategoryDistribution>,
}

impl KeywordReport {
    pub fn analyze(data: &PricingData) -> Self {
        let keywords = extract_keywords(data);
        let distribution = calculate_category_distribution(data, &keywords);
        Self {
            keywords,
            distribution,
        }
    }

    /// The `limit` most frequent keywords.
    pub fn top_keywords(&self, limit: usize) -> Vec<String> {
        self.keywords
            .iter()
            .take(limit)
            .map(|k| k.keyword.clone())
            .collect()
    }

    pub fn proposal(&self, data: &PricingData) -> CategoryProposal {
        generate_category_proposal(data, &self.keywords, &self.distribution)
    }
}
