//! Listing (product) models and their reference data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{precision, Credits, Price};
use crate::error::{Error, Result};

text_enum! {
    /// Listing status
    pub enum ListingStatus {
        Active => "active",
        Inactive => "inactive",
        SoldOut => "sold_out",
        Expired => "expired",
    }
}

/// Listing category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
}

impl Category {
    pub fn new(name: String) -> Self {
        Self { id: Uuid::new_v4(), name, active: true }
    }
}

/// Place where buyer and seller meet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingPoint {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub active: bool,
}

impl MeetingPoint {
    pub fn new(name: String, address: Option<String>) -> Self {
        Self { id: Uuid::new_v4(), name, address, active: true }
    }
}

/// Seller-supplied listing data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewListing {
    pub name: String,
    pub description: String,
    pub price: Price,
    pub category_id: Uuid,
    pub meeting_point_id: Uuid,
}

impl NewListing {
    /// Validate the shape of the listing data
    pub fn validate(&self) -> Result<()> {
        let name_len = self.name.trim().chars().count();
        if !(3..=150).contains(&name_len) {
            return Err(Error::ValidationError(
                "listing name must be between 3 and 150 characters".to_string(),
            ));
        }
        if self.description.trim().chars().count() < 5 {
            return Err(Error::ValidationError(
                "listing description must have at least 5 characters".to_string(),
            ));
        }
        if self.price <= Price::ZERO {
            return Err(Error::ValidationError("listing price must be positive".to_string()));
        }
        Ok(())
    }
}

/// Listing model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing {
    /// Unique listing ID
    pub id: Uuid,
    /// Owning seller
    pub seller_id: Uuid,
    pub category_id: Uuid,
    pub meeting_point_id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Price,
    /// Units on offer
    pub stock: i32,
    /// Credits debited when the listing was published
    pub credits_used: Credits,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Listing {
    /// Build an active listing from validated data
    pub fn new(seller_id: Uuid, data: NewListing, stock: i32, credits_used: Credits) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            seller_id,
            category_id: data.category_id,
            meeting_point_id: data.meeting_point_id,
            name: data.name.trim().to_string(),
            description: data.description.trim().to_string(),
            price: precision::round_price(data.price),
            stock,
            credits_used,
            status: ListingStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ListingStatus::Active
    }

    /// Check if the listing can still be booked
    pub fn has_stock(&self) -> bool {
        self.stock > 0
    }
}
