pub mod models;

pub use models::{NewPriceList, PriceList, PriceListSource};
