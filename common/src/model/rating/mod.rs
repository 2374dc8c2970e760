//! Rating models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{precision, Decimal};
use crate::error::{Error, Result};
use crate::model::account::Role;

text_enum! {
    /// Who rates whom
    pub enum RatingDirection {
        BuyerToSeller => "buyer_to_seller",
        SellerToBuyer => "seller_to_buyer",
    }
}

impl RatingDirection {
    /// Role the rater must hold in the appointment
    pub fn rater_role(&self) -> Role {
        match self {
            RatingDirection::BuyerToSeller => Role::Buyer,
            RatingDirection::SellerToBuyer => Role::Seller,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            RatingDirection::BuyerToSeller => RatingDirection::SellerToBuyer,
            RatingDirection::SellerToBuyer => RatingDirection::BuyerToSeller,
        }
    }
}

text_enum! {
    /// Hidden ratings are excluded from averages
    pub enum RatingStatus {
        Active => "active",
        Hidden => "hidden",
    }
}

/// Score between 1 and 5 inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Score(u8);

impl Score {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self> {
        if !(Self::MIN..=Self::MAX).contains(&value) {
            return Err(Error::ValidationError(format!(
                "score must be between {} and {}, got {}",
                Self::MIN,
                Self::MAX,
                value
            )));
        }
        Ok(Score(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Score {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Score::new(value)
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> u8 {
        score.0
    }
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rating left by one appointment participant for the other
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rating {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub listing_id: Uuid,
    pub rater_id: Uuid,
    pub rated_id: Uuid,
    pub direction: RatingDirection,
    pub score: Score,
    pub comment: Option<String>,
    pub status: RatingStatus,
    pub created_at: DateTime<Utc>,
}

impl Rating {
    pub fn new(
        appointment_id: Uuid,
        listing_id: Uuid,
        rater_id: Uuid,
        rated_id: Uuid,
        direction: RatingDirection,
        score: Score,
        comment: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            appointment_id,
            listing_id,
            rater_id,
            rated_id,
            direction,
            score,
            comment: comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            status: RatingStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RatingStatus::Active
    }
}

/// Mean of the given scores, rounded to two places; `None` when empty
pub fn average(scores: &[Score]) -> Option<Decimal> {
    if scores.is_empty() {
        return None;
    }
    let total: u64 = scores.iter().map(|s| u64::from(s.value())).sum();
    let mean = Decimal::from(total) / Decimal::from(scores.len() as u64);
    Some(precision::round_score(mean))
}
