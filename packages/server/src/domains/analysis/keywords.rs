use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::vocabulary::{occurrences, VOCABULARY};
use crate::common::PricingData;

pub const MAX_KEYWORDS: usize = 50;

/// A vocabulary term found in a price list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordMatch {
    pub keyword: String,
    pub count: usize,
    /// Distinct category names the term appeared in, first-seen order.
    pub categories: Vec<String>,
    /// Distinct service names the term appeared in, first-seen order.
    pub services: Vec<String>,
}

#[derive(Debug, Default)]
struct Tally {
    count: usize,
    categories: Vec<String>,
    services: Vec<String>,
}

fn push_distinct(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// Scans every service name and description against the vocabulary.
///
/// Sorted by descending count (ties broken alphabetically) and capped at
/// [`MAX_KEYWORDS`].
pub fn extract_keywords(data: &PricingData) -> Vec<KeywordMatch> {
    let mut tallies: HashMap<&'static str, Tally> = HashMap::new();

    for category in &data.categories {
        for service in &category.services {
            let text = service.searchable_text();
            for term in VOCABULARY {
                let hits = occurrences(&text, term);
                if hits == 0 {
                    continue;
                }
                let tally = tallies.entry(term).or_default();
                tally.count += hits;
                push_distinct(&mut tally.categories, &category.name);
                push_distinct(&mut tally.services, &service.name);
            }
        }
    }

    let mut keywords: Vec<KeywordMatch> = tallies
        .into_iter()
        .map(|(keyword, tally)| KeywordMatch {
            keyword: keyword.to_string(),
            count: tally.count,
            categories: tally.categories,
            services: tally.services,
        })
        .collect();

    keywords.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.keyword.cmp(&b.keyword)));
    keywords.truncate(MAX_KEYWORDS);
    keywords
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Category, Service};

    fn sample() -> PricingData {
        PricingData::new(vec![
            Category::new(
                "Paznokcie",
                vec![
                    Service::new("Manicure hybrydowy", "120 zł")
                        .with_description("Manicure z malowaniem hybrydą"),
                    Service::new("Pedicure", "150 zł"),
                ],
            ),
            Category::new(
                "Brwi i rzęsy",
                vec![
                    Service::new("Henna brwi", "30 zł"),
                    Service::new("Laminacja brwi", "120 zł"),
                ],
            ),
        ])
    }

    #[test]
    fn test_counts_and_locations() {
        let keywords = extract_keywords(&sample());
        let manicure = keywords.iter().find(|k| k.keyword == "manicure").unwrap();
        assert_eq!(manicure.count, 2);
        assert_eq!(manicure.categories, vec!["Paznokcie"]);
        assert_eq!(manicure.services, vec!["Manicure hybrydowy"]);

        let brwi = keywords.iter().find(|k| k.keyword == "brwi").unwrap();
        assert_eq!(brwi.count, 2);
        assert_eq!(brwi.services.len(), 2);
    }

    #[test]
    fn test_sorted_by_non_increasing_count() {
        let keywords = extract_keywords(&sample());
        assert!(!keywords.is_empty());
        assert!(keywords.windows(2).all(|w| w[0].count >= w[1].count));
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(extract_keywords(&sample()), extract_keywords(&sample()));
    }

    #[test]
    fn test_empty_inputs() {
        assert!(extract_keywords(&PricingData::default()).is_empty());

        let no_matches = PricingData::new(vec![Category::new(
            "Inne",
            vec![Service::new("Konsultacja", "0 zł")],
        )]);
        assert!(extract_keywords(&no_matches).is_empty());
    }

    #[test]
    fn test_capped() {
        let services = crate::domains::analysis::vocabulary::VOCABULARY
            .iter()
            .map(|term| Service::new(*term, "10 zł"))
            .collect();
        let data = PricingData::new(vec![Category::new("Wszystko", services)]);
        assert_eq!(extract_keywords(&data).len(), MAX_KEYWORDS);
    }
}
