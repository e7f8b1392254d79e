use serde::{Deserialize, Serialize};

use crate::common::{Category, PricingData};

/// Structured snapshot of an external salon profile, as returned by the
/// scraper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedProfile {
    #[serde(default)]
    pub salon_name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub logo_url: Option<String>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl ScrapedProfile {
    /// The price list portion of the profile, variants included verbatim.
    pub fn pricing_data(&self) -> PricingData {
        PricingData::new(self.categories.clone())
    }

    pub fn services_count(&self) -> usize {
        self.categories.iter().map(|c| c.services.len()).sum()
    }
}
