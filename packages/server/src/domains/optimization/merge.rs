//! Merging the model's rewrite back into a price list.
//!
//! The model sees services as a flat, indexed list and must answer with one
//! entry per index. A field is taken from the answer only when an option
//! that owns it was selected; everything else, price variants included, is
//! carried over from the input.

use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};

use crate::common::{Category, PricingData, Service};
use crate::domains::analysis::{structural_score, OptimizationOption};
use crate::kernel::AiError;

use super::models::{ChangeKind, OptimizationChange, OptimizationResult};

/// What the model is asked to return for an optimization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelOptimizationOutput {
    #[serde(default)]
    pub services: Vec<ModelService>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub quality_score: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelService {
    pub index: usize,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedPriceList {
    pub output: PricingData,
    pub result: OptimizationResult,
}

/// Options that let the model rewrite each field.
struct FieldPermissions {
    name: bool,
    description: bool,
    price: bool,
    duration: bool,
    tags: bool,
    category: bool,
    regroup: bool,
}

impl FieldPermissions {
    fn from_options(options: &[OptimizationOption]) -> Self {
        use OptimizationOption::*;
        let has = |o: OptimizationOption| options.contains(&o);
        Self {
            name: has(Seo) || has(Duplicates),
            description: has(Descriptions) || has(Seo),
            price: has(Prices),
            duration: has(Duration),
            tags: has(Tags),
            category: has(Categories),
            regroup: options.iter().any(|o| o.restructures()),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn merge_service(original: &Service, entry: &ModelService, allow: &FieldPermissions) -> Service {
    let mut service = original.clone();
    if allow.name {
        if let Some(name) = non_empty(&entry.name) {
            service.name = name;
        }
    }
    if allow.description {
        if let Some(description) = non_empty(&entry.description) {
            service.description = Some(description);
        }
    }
    if allow.price {
        if let Some(price) = non_empty(&entry.price) {
            service.price = price;
        }
    }
    if allow.duration {
        if let Some(duration) = non_empty(&entry.duration) {
            service.duration = Some(duration);
        }
    }
    if allow.tags {
        if let Some(tags) = &entry.tags {
            service.tags = tags
                .iter()
                .map(|t| t.trim())
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }
    }
    service
}

/// Exactly one entry per input service, indices `0..n` each used once.
fn check_entries(entries: &[ModelService], expected: usize) -> Result<(), AiError> {
    if entries.len() != expected {
        return Err(AiError::MalformedOutput(format!(
            "expected {} services, model returned {}",
            expected,
            entries.len()
        )));
    }
    let mut seen = HashSet::with_capacity(expected);
    for entry in entries {
        if entry.index >= expected || !seen.insert(entry.index) {
            return Err(AiError::MalformedOutput(format!(
                "invalid or repeated service index {}",
                entry.index
            )));
        }
    }
    Ok(())
}

fn tags_text(tags: &[String]) -> Option<String> {
    (!tags.is_empty()).then(|| tags.join(", "))
}

fn push_change(
    changes: &mut Vec<OptimizationChange>,
    kind: ChangeKind,
    category: &str,
    service: &str,
    before: Option<String>,
    after: Option<String>,
) {
    if before != after {
        changes.push(OptimizationChange {
            kind,
            category: category.to_string(),
            service: service.to_string(),
            before,
            after,
        });
    }
}

/// Apply the model's answer to `input` under the selected `options`.
///
/// Fails with [`AiError::MalformedOutput`] when the answer does not cover
/// every service exactly once.
pub fn merge_optimization(
    input: &PricingData,
    options: &[OptimizationOption],
    model: ModelOptimizationOutput,
) -> Result<MergedPriceList, AiError> {
    let originals = input.flat_services();
    check_entries(&model.services, originals.len())?;
    let allow = FieldPermissions::from_options(options);

    // (original index, target category, merged service) in output order.
    let mut merged: Vec<(usize, String, Service)> = Vec::with_capacity(originals.len());
    if allow.regroup {
        for entry in &model.services {
            let (category, original) = originals[entry.index];
            let target = if allow.category {
                non_empty(&entry.category).unwrap_or_else(|| category.to_string())
            } else {
                category.to_string()
            };
            merged.push((entry.index, target, merge_service(original, entry, &allow)));
        }
    } else {
        let mut by_index: Vec<Option<&ModelService>> = vec![None; originals.len()];
        for entry in &model.services {
            by_index[entry.index] = Some(entry);
        }
        for (index, ((category, original), entry)) in originals.iter().zip(by_index).enumerate() {
            let service = match entry {
                Some(entry) => merge_service(original, entry, &allow),
                None => (*original).clone(),
            };
            merged.push((index, category.to_string(), service));
        }
    }

    let output = if allow.regroup {
        let mut categories: Vec<Category> = Vec::new();
        for (_, target, service) in &merged {
            match categories.iter_mut().find(|c| &c.name == target) {
                Some(category) => category.services.push(service.clone()),
                None => categories.push(Category::new(target.clone(), vec![service.clone()])),
            }
        }
        PricingData::new(categories)
    } else {
        let mut services = merged.iter().map(|(_, _, s)| s.clone());
        let categories = input
            .categories
            .iter()
            .map(|c| {
                let kept = services.by_ref().take(c.services.len()).collect();
                Category::new(c.name.clone(), kept)
            })
            .collect();
        PricingData::new(categories)
    };

    let mut position = vec![0usize; originals.len()];
    for (flat_position, index) in output_order(&output, &merged).into_iter().enumerate() {
        position[index] = flat_position;
    }

    let mut changes = Vec::new();
    for (index, target, service) in &merged {
        let (category, original) = originals[*index];
        let name = service.name.as_str();
        push_change(&mut changes, ChangeKind::Name, target, name, Some(original.name.clone()), Some(service.name.clone()));
        push_change(&mut changes, ChangeKind::Description, target, name, original.description.clone(), service.description.clone());
        push_change(&mut changes, ChangeKind::Price, target, name, Some(original.price.clone()), Some(service.price.clone()));
        push_change(&mut changes, ChangeKind::Duration, target, name, original.duration.clone(), service.duration.clone());
        push_change(&mut changes, ChangeKind::Tags, target, name, tags_text(&original.tags), tags_text(&service.tags));
        push_change(&mut changes, ChangeKind::Category, target, name, Some(category.to_string()), Some(target.clone()));
        if allow.regroup && position[*index] != *index {
            push_change(
                &mut changes,
                ChangeKind::Order,
                target,
                name,
                Some(format!("#{}", index + 1)),
                Some(format!("#{}", position[*index] + 1)),
            );
        }
    }

    let mut changes_by_kind = BTreeMap::new();
    for change in &changes {
        *changes_by_kind.entry(change.kind).or_insert(0) += 1;
    }

    let quality_score = match model.quality_score {
        Some(score) if (0.0..=100.0).contains(&score) => score.round() as i32,
        _ => structural_score(&output).total.clamp(0, 100),
    };

    Ok(MergedPriceList {
        output,
        result: OptimizationResult {
            changes,
            changes_by_kind,
            quality_score,
            recommendations: model.recommendations,
        },
    })
}

/// Original indices in the order services appear in `output`.
fn output_order(output: &PricingData, merged: &[(usize, String, Service)]) -> Vec<usize> {
    let mut order = Vec::with_capacity(merged.len());
    for category in &output.categories {
        order.extend(
            merged
                .iter()
                .filter(|(_, target, _)| target == &category.name)
                .map(|(index, _, _)| *index),
        );
    }
    order
}
