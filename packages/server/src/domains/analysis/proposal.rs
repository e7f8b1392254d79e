//! Category reorganization proposals.
//!
//! A proposal is generated once per audit from the scraped price list and is
//! never mutated afterwards. It remembers the category names it was computed
//! from so consumers can tell when the price list has since changed shape.

use serde::{Deserialize, Serialize};

use super::distribution::{local_counts, CategoryDistribution};
use super::keywords::KeywordMatch;
use super::vocabulary::terms_in;
use crate::common::PricingData;

const GENERIC_NAMES: &[&str] = &[
    "inne",
    "pozostałe",
    "usługi",
    "różne",
    "dodatkowe",
    "oferta",
    "cennik",
    "kategoria",
    "other",
    "services",
    "misc",
];

pub const SPLIT_THRESHOLD: usize = 15;
const CLUSTER_MIN_SERVICES: usize = 3;
const CLUSTER_MIN_CATEGORIES: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryChangeKind {
    CreateCategory,
    RenameCategory,
    ReorderCategories,
    MergeCategories,
    SplitCategory,
    MoveService,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CategoryChange {
    CreateCategory {
        name: String,
        services: Vec<String>,
        rationale: String,
    },
    RenameCategory {
        from: String,
        to: String,
        rationale: String,
    },
    ReorderCategories {
        order: Vec<String>,
        rationale: String,
    },
    MergeCategories {
        from: String,
        into: String,
        rationale: String,
    },
    SplitCategory {
        category: String,
        into: Vec<String>,
        rationale: String,
    },
    MoveService {
        service: String,
        from: String,
        to: String,
        rationale: String,
    },
}

impl CategoryChange {
    pub fn kind(&self) -> CategoryChangeKind {
        match self {
            CategoryChange::CreateCategory { .. } => CategoryChangeKind::CreateCategory,
            CategoryChange::RenameCategory { .. } => CategoryChangeKind::RenameCategory,
            CategoryChange::ReorderCategories { .. } => CategoryChangeKind::ReorderCategories,
            CategoryChange::MergeCategories { .. } => CategoryChangeKind::MergeCategories,
            CategoryChange::SplitCategory { .. } => CategoryChangeKind::SplitCategory,
            CategoryChange::MoveService { .. } => CategoryChangeKind::MoveService,
        }
    }

    pub fn rationale(&self) -> &str {
        match self {
            CategoryChange::CreateCategory { rationale, .. }
            | CategoryChange::RenameCategory { rationale, .. }
            | CategoryChange::ReorderCategories { rationale, .. }
            | CategoryChange::MergeCategories { rationale, .. }
            | CategoryChange::SplitCategory { rationale, .. }
            | CategoryChange::MoveService { rationale, .. } => rationale,
        }
    }

    /// One-line rendering used in prompts and reports.
    pub fn describe(&self) -> String {
        match self {
            CategoryChange::CreateCategory { name, services, .. } => {
                format!("Create category \"{}\" for: {}", name, services.join(", "))
            }
            CategoryChange::RenameCategory { from, to, .. } => {
                format!("Rename category \"{}\" to \"{}\"", from, to)
            }
            CategoryChange::ReorderCategories { order, .. } => {
                format!("Reorder categories: {}", order.join(" > "))
            }
            CategoryChange::MergeCategories { from, into, .. } => {
                format!("Merge category \"{}\" into \"{}\"", from, into)
            }
            CategoryChange::SplitCategory { category, into, .. } => {
                format!("Split category \"{}\" into: {}", category, into.join(", "))
            }
            CategoryChange::MoveService { service, from, to, .. } => {
                format!("Move \"{}\" from \"{}\" to \"{}\"", service, from, to)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryProposal {
    pub changes: Vec<CategoryChange>,
    /// Category names, in order, of the price list the proposal was built from.
    pub based_on: Vec<String>,
}

impl CategoryProposal {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// True when `data` no longer has the category structure the proposal
    /// was computed from. Stale proposals are flagged, never reconciled.
    pub fn is_stale_for(&self, data: &PricingData) -> bool {
        data.categories.len() != self.based_on.len()
            || data
                .categories
                .iter()
                .zip(&self.based_on)
                .any(|(c, name)| &c.name != name)
    }
}

fn is_generic_name(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    lower.is_empty() || GENERIC_NAMES.contains(&lower.as_str())
}

fn title_case(term: &str) -> String {
    let mut chars = term.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn name_contains(category_name: &str, keyword: &str) -> bool {
    category_name.to_lowercase().contains(keyword)
}

/// Builds a reorganization proposal from a price list and its keyword
/// analysis. `distribution` must come from the same `keywords`.
pub fn generate_category_proposal(
    data: &PricingData,
    keywords: &[KeywordMatch],
    distribution: &[CategoryDistribution],
) -> CategoryProposal {
    let mut changes = Vec::new();
    let find_distribution =
        |name: &str| distribution.iter().find(|d| d.category_name == name);

    // Generic names
    for category in &data.categories {
        if !is_generic_name(&category.name) {
            continue;
        }
        let top = find_distribution(&category.name).and_then(|d| d.top_keywords.first());
        if let Some(top) = top {
            changes.push(CategoryChange::RenameCategory {
                from: category.name.clone(),
                to: title_case(&top.keyword),
                rationale: format!(
                    "\"{}\" says nothing about the services; most of them are about \"{}\"",
                    category.name, top.keyword
                ),
            });
        }
    }

    // Single-service categories
    if data.categories.len() > 1 {
        for category in data.categories.iter().filter(|c| c.services.len() == 1) {
            let own: Vec<&str> = category
                .services
                .iter()
                .flat_map(|s| terms_in(&s.searchable_text()))
                .collect();

            let target = data
                .categories
                .iter()
                .filter(|other| other.name != category.name && other.services.len() > 1)
                .map(|other| {
                    let shared = local_counts(other, keywords)
                        .iter()
                        .filter(|k| own.contains(&k.keyword.as_str()))
                        .count();
                    (other, shared)
                })
                .max_by(|(a, a_shared), (b, b_shared)| {
                    a_shared
                        .cmp(b_shared)
                        .then_with(|| a.services.len().cmp(&b.services.len()))
                });

            if let Some((target, _)) = target {
                changes.push(CategoryChange::MergeCategories {
                    from: category.name.clone(),
                    into: target.name.clone(),
                    rationale: format!(
                        "\"{}\" holds a single service; clients will find it faster in \"{}\"",
                        category.name, target.name
                    ),
                });
            }
        }
    }

    // Oversized categories
    for category in data
        .categories
        .iter()
        .filter(|c| c.services.len() > SPLIT_THRESHOLD)
    {
        let top: Vec<String> = find_distribution(&category.name)
            .map(|d| {
                d.top_keywords
                    .iter()
                    .take(3)
                    .map(|k| title_case(&k.keyword))
                    .collect()
            })
            .unwrap_or_default();
        let into = if top.len() >= 2 {
            top
        } else {
            vec![
                format!("{} (część 1)", category.name),
                format!("{} (część 2)", category.name),
            ]
        };
        changes.push(CategoryChange::SplitCategory {
            category: category.name.clone(),
            into,
            rationale: format!(
                "\"{}\" has {} services; long categories are hard to scan",
                category.name,
                category.services.len()
            ),
        });
    }

    // Misplaced services
    for category in &data.categories {
        for service in &category.services {
            let terms = terms_in(&service.searchable_text());
            if terms.is_empty() || terms.iter().any(|t| name_contains(&category.name, t)) {
                continue;
            }
            let home = terms.iter().find_map(|term| {
                data.categories
                    .iter()
                    .find(|other| other.name != category.name && name_contains(&other.name, term))
                    .map(|other| (other, *term))
            });
            if let Some((home, term)) = home {
                changes.push(CategoryChange::MoveService {
                    service: service.name.clone(),
                    from: category.name.clone(),
                    to: home.name.clone(),
                    rationale: format!(
                        "\"{}\" is a {} service and \"{}\" is where clients look for it",
                        service.name, term, home.name
                    ),
                });
            }
        }
    }

    // Keyword clusters without a home
    for keyword in keywords {
        if keyword.services.len() < CLUSTER_MIN_SERVICES
            || keyword.categories.len() < CLUSTER_MIN_CATEGORIES
            || data
                .categories
                .iter()
                .any(|c| name_contains(&c.name, &keyword.keyword))
        {
            continue;
        }
        changes.push(CategoryChange::CreateCategory {
            name: title_case(&keyword.keyword),
            services: keyword.services.clone(),
            rationale: format!(
                "{} \"{}\" services are spread over {} categories",
                keyword.services.len(),
                keyword.keyword,
                keyword.categories.len()
            ),
        });
    }

    // Ordering by keyword density
    let current: Vec<String> = data.categories.iter().map(|c| c.name.clone()).collect();
    let mut by_density: Vec<&CategoryDistribution> = distribution.iter().collect();
    by_density.sort_by(|a, b| {
        b.density()
            .partial_cmp(&a.density())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let proposed: Vec<String> = by_density.iter().map(|d| d.category_name.clone()).collect();
    if current.len() > 1 && proposed.len() == current.len() && proposed != current {
        changes.push(CategoryChange::ReorderCategories {
            order: proposed,
            rationale: "Categories with the most searched-for services should come first"
                .to_string(),
        });
    }

    CategoryProposal {
        changes,
        based_on: current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Category, Service};
    use crate::domains::analysis::{calculate_category_distribution, extract_keywords};

    fn propose(data: &PricingData) -> CategoryProposal {
        let keywords = extract_keywords(data);
        let distribution = calculate_category_distribution(data, &keywords);
        generate_category_proposal(data, &keywords, &distribution)
    }

    fn kinds(proposal: &CategoryProposal) -> Vec<CategoryChangeKind> {
        proposal.changes.iter().map(|c| c.kind()).collect()
    }

    #[test]
    fn test_generic_name_is_renamed() {
        let data = PricingData::new(vec![Category::new(
            "Inne",
            vec![
                Service::new("Masaż relaksacyjny", "150 zł"),
                Service::new("Masaż gorącymi kamieniami", "200 zł"),
            ],
        )]);
        let proposal = propose(&data);
        assert!(proposal.changes.iter().any(|c| matches!(
            c,
            CategoryChange::RenameCategory { to, .. } if to == "Masaż"
        )));
    }

    #[test]
    fn test_single_service_category_is_merged() {
        let data = PricingData::new(vec![
            Category::new(
                "Paznokcie",
                vec![
                    Service::new("Manicure klasyczny", "80 zł"),
                    Service::new("Manicure hybrydowy", "120 zł"),
                ],
            ),
            Category::new("Stopy", vec![Service::new("Pedicure", "150 zł")]),
        ]);
        let proposal = propose(&data);
        assert!(proposal.changes.iter().any(|c| matches!(
            c,
            CategoryChange::MergeCategories { from, into, .. } if from == "Stopy" && into == "Paznokcie"
        )));
    }

    #[test]
    fn test_oversized_category_is_split() {
        let services = (0..16)
            .map(|i| Service::new(format!("Zabieg {}", i), "100 zł"))
            .collect();
        let data = PricingData::new(vec![Category::new("Kosmetologia", services)]);
        assert!(kinds(&propose(&data)).contains(&CategoryChangeKind::SplitCategory));
    }

    #[test]
    fn test_misplaced_service_is_moved() {
        let data = PricingData::new(vec![
            Category::new(
                "Brwi",
                vec![
                    Service::new("Henna brwi", "30 zł"),
                    Service::new("Regulacja brwi", "25 zł"),
                ],
            ),
            Category::new(
                "Twarz",
                vec![
                    Service::new("Oczyszczanie twarzy", "200 zł"),
                    Service::new("Laminacja brwi", "120 zł"),
                ],
            ),
        ]);
        let proposal = propose(&data);
        assert!(proposal.changes.iter().any(|c| matches!(
            c,
            CategoryChange::MoveService { service, to, .. } if service == "Laminacja brwi" && to == "Brwi"
        )));
    }

    #[test]
    fn test_scattered_cluster_creates_category() {
        let data = PricingData::new(vec![
            Category::new(
                "Zabiegi",
                vec![
                    Service::new("Peeling kawitacyjny", "120 zł"),
                    Service::new("Peeling enzymatyczny", "110 zł"),
                ],
            ),
            Category::new(
                "Pielęgnacja",
                vec![
                    Service::new("Peeling dłoni", "40 zł"),
                    Service::new("Konsultacja", "0 zł"),
                ],
            ),
        ]);
        let proposal = propose(&data);
        assert!(proposal.changes.iter().any(|c| matches!(
            c,
            CategoryChange::CreateCategory { name, services, .. } if name == "Peeling" && services.len() == 3
        )));
    }

    #[test]
    fn test_every_change_has_rationale() {
        let data = PricingData::new(vec![
            Category::new("Inne", vec![Service::new("Masaż", "100 zł")]),
            Category::new(
                "Paznokcie",
                vec![
                    Service::new("Manicure", "80 zł"),
                    Service::new("Pedicure", "100 zł"),
                ],
            ),
        ]);
        let proposal = propose(&data);
        assert!(!proposal.is_empty());
        assert!(proposal.changes.iter().all(|c| !c.rationale().is_empty()));
    }

    #[test]
    fn test_staleness() {
        let data = PricingData::new(vec![
            Category::new("A", vec![Service::new("Manicure", "1")]),
            Category::new("B", vec![Service::new("Pedicure", "1")]),
        ]);
        let proposal = propose(&data);
        assert!(!proposal.is_stale_for(&data));

        let mut renamed = data.clone();
        renamed.categories[0].name = "Paznokcie".into();
        assert!(proposal.is_stale_for(&renamed));
    }

    #[test]
    fn test_empty_price_list() {
        let proposal = propose(&PricingData::default());
        assert!(proposal.is_empty());
        assert!(proposal.based_on.is_empty());
    }
}
