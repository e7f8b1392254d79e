use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// An optimization stage the user can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationOption {
    Descriptions,
    Seo,
    Categories,
    Order,
    Prices,
    Duplicates,
    Duration,
    Tags,
}

impl OptimizationOption {
    pub const ALL: [OptimizationOption; 8] = [
        OptimizationOption::Descriptions,
        OptimizationOption::Seo,
        OptimizationOption::Categories,
        OptimizationOption::Order,
        OptimizationOption::Prices,
        OptimizationOption::Duplicates,
        OptimizationOption::Duration,
        OptimizationOption::Tags,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptimizationOption::Descriptions => "descriptions",
            OptimizationOption::Seo => "seo",
            OptimizationOption::Categories => "categories",
            OptimizationOption::Order => "order",
            OptimizationOption::Prices => "prices",
            OptimizationOption::Duplicates => "duplicates",
            OptimizationOption::Duration => "duration",
            OptimizationOption::Tags => "tags",
        }
    }

    /// Whether this option changes how services are grouped or ordered.
    pub fn restructures(&self) -> bool {
        matches!(
            self,
            OptimizationOption::Categories | OptimizationOption::Order
        )
    }
}

impl fmt::Display for OptimizationOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptimizationOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OptimizationOption::ALL
            .into_iter()
            .find(|o| o.as_str() == s)
            .ok_or_else(|| format!("unknown optimization option: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    #[error("Select at least one optimization option")]
    Empty,

    #[error("Category restructuring needs a category proposal from a completed audit")]
    CategoriesWithoutProposal,
}

/// Rejects an empty selection, and `categories` without a proposal.
pub fn validate_optimization_options(
    options: &[OptimizationOption],
    has_proposal: bool,
) -> Result<(), OptionsError> {
    if options.is_empty() {
        return Err(OptionsError::Empty);
    }
    if options.contains(&OptimizationOption::Categories) && !has_proposal {
        return Err(OptionsError::CategoriesWithoutProposal);
    }
    Ok(())
}

/// Sorted, de-duplicated copy of a selection.
pub fn normalize_options(options: &[OptimizationOption]) -> Vec<OptimizationOption> {
    let mut normalized = options.to_vec();
    normalized.sort();
    normalized.dedup();
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use OptimizationOption::*;

    #[test]
    fn test_empty_is_always_invalid() {
        assert_eq!(validate_optimization_options(&[], true), Err(OptionsError::Empty));
        assert_eq!(validate_optimization_options(&[], false), Err(OptionsError::Empty));
    }

    #[test]
    fn test_categories_requires_proposal() {
        assert_eq!(
            validate_optimization_options(&[Categories], false),
            Err(OptionsError::CategoriesWithoutProposal)
        );
        assert_eq!(
            validate_optimization_options(&[Descriptions, Seo, Categories], false),
            Err(OptionsError::CategoriesWithoutProposal)
        );
        assert!(validate_optimization_options(&[Categories], true).is_ok());
    }

    #[test]
    fn test_other_options_need_no_proposal() {
        assert!(validate_optimization_options(&[Descriptions, Prices], false).is_ok());
    }

    #[test]
    fn test_parse_and_normalize() {
        assert_eq!("seo".parse::<OptimizationOption>().unwrap(), Seo);
        assert!("magic".parse::<OptimizationOption>().is_err());
        assert_eq!(normalize_options(&[Tags, Seo, Tags]), vec![Seo, Tags]);
    }
}
