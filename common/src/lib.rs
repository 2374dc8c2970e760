//! Common types and utilities for the marketplace
//!
//! This library contains shared types, utilities, and abstractions used across
//! all services of the marketplace. It provides a unified approach to error
//! handling, storage access, notification content, and domain models.

pub mod error;
pub mod model;
pub mod decimal;
pub mod db;
pub mod notify;

/// Re-export important types
pub use error::{Error, Result, ErrorExt, IntoError};
pub use decimal::*;

// Re-export storage types
pub use db::transaction::{DBTransaction, TransactionManager, UnitOfWork};
pub use db::{Store, StoreType};
