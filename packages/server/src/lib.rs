// Salon price list platform - pipeline core
//
// Audit and optimization pipelines, the credit ledger and the analysis
// engine, plus the HTTP boundary and job runner that drive them.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
