use serde::{Deserialize, Serialize};

use super::keywords::KeywordMatch;
use super::vocabulary::occurrences;
use crate::common::{Category, PricingData};

pub const TOP_KEYWORDS_PER_CATEGORY: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCount {
    pub keyword: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDistribution {
    pub category_name: String,
    pub service_count: usize,
    /// Distinct extracted keywords occurring in this category.
    pub keyword_count: usize,
    pub top_keywords: Vec<KeywordCount>,
}

impl CategoryDistribution {
    /// Keywords per service; zero for an empty category.
    pub fn density(&self) -> f64 {
        if self.service_count == 0 {
            0.0
        } else {
            self.keyword_count as f64 / self.service_count as f64
        }
    }
}

/// Local frequency of each keyword inside a single category, most frequent
/// first. Keywords absent from the category are omitted.
pub fn local_counts(category: &Category, keywords: &[KeywordMatch]) -> Vec<KeywordCount> {
    let texts: Vec<String> = category
        .services
        .iter()
        .map(|s| s.searchable_text())
        .collect();

    let mut counts: Vec<KeywordCount> = keywords
        .iter()
        .map(|k| KeywordCount {
            keyword: k.keyword.clone(),
            count: texts.iter().map(|t| occurrences(t, &k.keyword)).sum(),
        })
        .filter(|k| k.count > 0)
        .collect();

    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.keyword.cmp(&b.keyword)));
    counts
}

/// One entry per category, sorted by descending keyword count. Ties keep the
/// price list's category order.
pub fn calculate_category_distribution(
    data: &PricingData,
    keywords: &[KeywordMatch],
) -> Vec<CategoryDistribution> {
    let mut distribution: Vec<CategoryDistribution> = data
        .categories
        .iter()
        .map(|category| {
            let mut counts = local_counts(category, keywords);
            let keyword_count = counts.len();
            counts.truncate(TOP_KEYWORDS_PER_CATEGORY);
            CategoryDistribution {
                category_name: category.name.clone(),
                service_count: category.services.len(),
                keyword_count,
                top_keywords: counts,
            }
        })
        .collect();

    distribution.sort_by(|a, b| b.keyword_count.cmp(&a.keyword_count));
    distribution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Service;
    use crate::domains::analysis::extract_keywords;

    fn sample() -> PricingData {
        PricingData::new(vec![
            Category::new("Konsultacje", vec![Service::new("Konsultacja", "0 zł")]),
            Category::new(
                "Paznokcie",
                vec![
                    Service::new("Manicure hybrydowy", "120 zł"),
                    Service::new("Pedicure hybrydowy", "150 zł"),
                    Service::new("Zdobienie paznokci", "10 zł"),
                ],
            ),
        ])
    }

    #[test]
    fn test_one_entry_per_category_sorted() {
        let data = sample();
        let keywords = extract_keywords(&data);
        let distribution = calculate_category_distribution(&data, &keywords);

        assert_eq!(distribution.len(), 2);
        assert_eq!(distribution[0].category_name, "Paznokcie");
        assert!(distribution
            .windows(2)
            .all(|w| w[0].keyword_count >= w[1].keyword_count));
        assert!(distribution
            .iter()
            .all(|d| d.top_keywords.len() <= TOP_KEYWORDS_PER_CATEGORY));
        assert_eq!(distribution[1].keyword_count, 0);
    }

    #[test]
    fn test_top_keywords_ranked_by_local_frequency() {
        let data = sample();
        let keywords = extract_keywords(&data);
        let distribution = calculate_category_distribution(&data, &keywords);
        let top = &distribution[0].top_keywords;
        assert_eq!(top[0].keyword, "hybrydowy");
        assert_eq!(top[0].count, 2);
    }

    #[test]
    fn test_empty_profile() {
        assert!(calculate_category_distribution(&PricingData::default(), &[]).is_empty());
    }

    #[test]
    fn test_empty_keywords_keeps_every_category() {
        let distribution = calculate_category_distribution(&sample(), &[]);
        assert_eq!(distribution.len(), 2);
        assert!(distribution.iter().all(|d| d.keyword_count == 0));
        assert!(distribution.iter().all(|d| d.top_keywords.is_empty()));
    }
}
