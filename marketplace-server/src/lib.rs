//! Bazaar marketplace wiring
//!
//! Builds every service over one shared store and notification sink.

pub mod config;
pub mod demo;
pub mod marketplace;

pub use config::MarketplaceConfig;
pub use marketplace::Marketplace;
