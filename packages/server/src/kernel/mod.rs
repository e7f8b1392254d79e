//! Kernel module - server infrastructure and dependencies.

pub mod ai;
pub mod deps;
pub mod email;
pub mod jobs;
pub mod scraper_client;
pub mod store;
pub mod test_dependencies;
pub mod traits;

pub use ai::{parse_model_json, OpenAiAdapter, DEFAULT_MODEL};
pub use deps::ServerDeps;
pub use email::{DisabledEmailService, HttpEmailService};
pub use scraper_client::HttpProfileScraper;
pub use test_dependencies::{MockAI, MockEmailService, MockScraper, TestDependencies};
pub use traits::*;
