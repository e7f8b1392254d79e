use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::common::{AuditJobId, OptimizationJobId, PriceListId, PricingData, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceListSource {
    Manual,
    /// Imported from a scraped profile. Kept as the untouched baseline.
    Booksy,
    /// The optimizable ("pro") copy a completed audit makes of its base list.
    Audit,
}

impl PriceListSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceListSource::Manual => "manual",
            PriceListSource::Booksy => "booksy",
            PriceListSource::Audit => "audit",
        }
    }
}

impl fmt::Display for PriceListSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceListSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(PriceListSource::Manual),
            "booksy" => Ok(PriceListSource::Booksy),
            "audit" => Ok(PriceListSource::Audit),
            other => Err(format!("unknown price list source: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceList {
    pub id: PriceListId,
    pub user_id: UserId,
    pub name: String,
    pub source: PriceListSource,
    pub pricing_data: PricingData,
    /// Pre-optimization snapshot, kept for diffing.
    pub original_pricing_data: Option<PricingData>,
    pub is_optimized: bool,
    pub audit_id: Option<AuditJobId>,
    pub optimization_job_id: Option<OptimizationJobId>,
    /// For a base list: its optimizable ("pro") sibling.
    pub optimized_version_id: Option<PriceListId>,
    pub quality_score: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PriceList {
    /// Replaces imported data after a repeated scrape.
    pub fn refresh_import(&mut self, pricing_data: PricingData, now: DateTime<Utc>) {
        self.pricing_data = pricing_data;
        self.updated_at = now;
    }

    pub fn services_count(&self) -> usize {
        self.pricing_data.services_count()
    }

    pub fn categories_count(&self) -> usize {
        self.pricing_data.categories_count()
    }

    /// Replaces the live data with an optimization result, keeping `input`
    /// as the original for diffing.
    pub fn apply_optimization(
        &mut self,
        job_id: OptimizationJobId,
        input: PricingData,
        output: PricingData,
        quality_score: i32,
        now: DateTime<Utc>,
    ) {
        self.original_pricing_data = Some(input);
        self.pricing_data = output;
        self.is_optimized = true;
        self.optimization_job_id = Some(job_id);
        self.quality_score = Some(quality_score);
        self.updated_at = now;
    }
}

#[derive(Debug, Clone)]
pub struct NewPriceList {
    pub user_id: UserId,
    pub name: String,
    pub source: PriceListSource,
    pub pricing_data: PricingData,
    pub audit_id: Option<AuditJobId>,
    pub quality_score: Option<i32>,
}

impl NewPriceList {
    pub fn manual(user_id: UserId, name: impl Into<String>, pricing_data: PricingData) -> Self {
        Self {
            user_id,
            name: name.into(),
            source: PriceListSource::Manual,
            pricing_data,
            audit_id: None,
            quality_score: None,
        }
    }

    pub fn into_price_list(self, now: DateTime<Utc>) -> PriceList {
        PriceList {
            id: PriceListId::new(),
            user_id: self.user_id,
            name: self.name,
            source: self.source,
            pricing_data: self.pricing_data,
            original_pricing_data: None,
            is_optimized: false,
            audit_id: self.audit_id,
            optimization_job_id: None,
            optimized_version_id: None,
            quality_score: self.quality_score,
            created_at: now,
            updated_at: now,
        }
    }
}
