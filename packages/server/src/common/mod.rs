// Common types and utilities shared across the application

pub mod auth;
pub mod entity_ids;
pub mod error;
pub mod id;
pub mod pricing;

pub use auth::{require_actor, Actor};
pub use entity_ids::*;
pub use error::{ErrorCategory, PipelineError, PipelineResult};
pub use id::Id;
pub use pricing::{Category, PriceVariant, PricingData, Service};
