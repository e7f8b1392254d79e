//! Price list documents.
//!
//! `PricingData` is the product's core artifact: categories of services with
//! prices. The same shape is produced by the scraper, stored on price lists,
//! and rewritten by the optimization pipeline.

use serde::{Deserialize, Serialize};

/// Categories of services, in display order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingData {
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    /// Display price as the salon writes it ("120 zł", "od 80 zł").
    #[serde(default)]
    pub price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variants: Option<Vec<PriceVariant>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// A price variant of a service (e.g. hair length). Unknown fields coming
/// from the scraper are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceVariant {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub price: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PricingData {
    pub fn new(categories: Vec<Category>) -> Self {
        Self { categories }
    }

    pub fn categories_count(&self) -> usize {
        self.categories.len()
    }

    pub fn services_count(&self) -> usize {
        self.categories.iter().map(|c| c.services.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.services_count() == 0
    }

    /// Services in document order, paired with their category name.
    pub fn flat_services(&self) -> Vec<(&str, &Service)> {
        self.categories
            .iter()
            .flat_map(|c| c.services.iter().map(move |s| (c.name.as_str(), s)))
            .collect()
    }
}

impl Service {
    pub fn new(name: impl Into<String>, price: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            price: price.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = Some(duration.into());
        self
    }

    pub fn with_variants(mut self, variants: Vec<PriceVariant>) -> Self {
        self.variants = Some(variants);
        self
    }

    /// Name and description joined for text scanning.
    pub fn searchable_text(&self) -> String {
        match &self.description {
            Some(description) => format!("{} {}", self.name, description),
            None => self.name.clone(),
        }
    }
}

impl Category {
    pub fn new(name: impl Into<String>, services: Vec<Service>) -> Self {
        Self {
            name: name.into(),
            services,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counts() {
        let data = PricingData::new(vec![
            Category::new("Paznokcie", vec![Service::new("Manicure", "80 zł")]),
            Category::new(
                "Brwi",
                vec![
                    Service::new("Henna brwi", "30 zł"),
                    Service::new("Regulacja brwi", "25 zł"),
                ],
            ),
        ]);
        assert_eq!(data.categories_count(), 2);
        assert_eq!(data.services_count(), 3);
        assert_eq!(data.flat_services()[2].0, "Brwi");
    }

    #[test]
    fn test_variant_unknown_fields_survive() {
        let raw = json!({
            "name": "Strzyżenie",
            "price": "od 90 zł",
            "variants": [{"label": "Długie", "price": "150 zł", "booksyVariantId": 7731}]
        });
        let service: Service = serde_json::from_value(raw.clone()).unwrap();
        let back = serde_json::to_value(&service).unwrap();
        assert_eq!(back["variants"][0]["booksyVariantId"], 7731);
    }
}
