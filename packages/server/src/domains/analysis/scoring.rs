//! Structural quality score of a price list, computed without the model.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::common::PricingData;

const DESCRIPTION_WEIGHT: f64 = 30.0;
const DURATION_WEIGHT: f64 = 20.0;
const NAMING_WEIGHT: f64 = 25.0;
const BALANCE_WEIGHT: f64 = 25.0;

/// Each component is a 0-100 percentage; `total` is their weighted sum.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub description_coverage: i32,
    pub duration_coverage: i32,
    pub naming_quality: i32,
    pub category_balance: i32,
    pub total: i32,
}

fn ratio(hits: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

fn is_well_named(name: &str) -> bool {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    let shouting = trimmed.chars().any(|c| c.is_alphabetic())
        && trimmed
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(|c| c.is_uppercase());
    (3..=60).contains(&len) && !shouting && trimmed == name
}

pub fn structural_score(data: &PricingData) -> ScoreBreakdown {
    let services = data.flat_services();
    let total = services.len();
    if total == 0 {
        return ScoreBreakdown::default();
    }

    let described = services
        .iter()
        .filter(|(_, s)| s.description.as_deref().is_some_and(|d| !d.trim().is_empty()))
        .count();
    let timed = services
        .iter()
        .filter(|(_, s)| s.duration.as_deref().is_some_and(|d| !d.trim().is_empty()))
        .count();

    let mut well_named = 0;
    for category in &data.categories {
        let mut seen = HashSet::new();
        for service in &category.services {
            let unique = seen.insert(service.name.trim().to_lowercase());
            if unique && is_well_named(&service.name) {
                well_named += 1;
            }
        }
    }

    let balanced = data
        .categories
        .iter()
        .filter(|c| (2..=15).contains(&c.services.len()))
        .count();

    let description_coverage = ratio(described, total);
    let duration_coverage = ratio(timed, total);
    let naming_quality = ratio(well_named, total);
    let category_balance = ratio(balanced, data.categories.len());

    let weighted = description_coverage * DESCRIPTION_WEIGHT
        + duration_coverage * DURATION_WEIGHT
        + naming_quality * NAMING_WEIGHT
        + category_balance * BALANCE_WEIGHT;

    ScoreBreakdown {
        description_coverage: (description_coverage * 100.0).round() as i32,
        duration_coverage: (duration_coverage * 100.0).round() as i32,
        naming_quality: (naming_quality * 100.0).round() as i32,
        category_balance: (category_balance * 100.0).round() as i32,
        total: (weighted.round() as i32).clamp(0, 100),
    }
}
