mod price_list;

pub use price_list::{NewPriceList, PriceList, PriceListSource};
