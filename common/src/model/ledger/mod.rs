//! Ledger movement models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Credits;
use crate::error::{Error, Result};

text_enum! {
    /// Movement direction
    pub enum Direction {
        Debit => "debit",
        Credit => "credit",
    }
}

text_enum! {
    /// Why the balance moved
    pub enum ReasonCode {
        /// Credits spent to publish a listing
        ListingPublication => "listing_publication",
        /// Credits bought through an approved credit transaction
        CreditPurchase => "credit_purchase",
        /// Operator correction
        ManualAdjustment => "manual_adjustment",
    }
}

/// Entity that caused a movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EntityRef {
    Listing(Uuid),
    CreditTransaction(Uuid),
    /// Adjustments carry no causing entity
    None,
}

impl EntityRef {
    /// Storage form: (kind, id)
    pub fn parts(&self) -> (&'static str, Option<Uuid>) {
        match self {
            EntityRef::Listing(id) => ("listing", Some(*id)),
            EntityRef::CreditTransaction(id) => ("credit_transaction", Some(*id)),
            EntityRef::None => ("none", None),
        }
    }

    /// Rebuild from storage form
    pub fn from_parts(kind: &str, id: Option<Uuid>) -> Result<Self> {
        match (kind, id) {
            ("listing", Some(id)) => Ok(EntityRef::Listing(id)),
            ("credit_transaction", Some(id)) => Ok(EntityRef::CreditTransaction(id)),
            ("none", _) => Ok(EntityRef::None),
            (kind, id) => Err(Error::Internal(format!(
                "invalid movement reference {} {:?}",
                kind, id
            ))),
        }
    }
}

/// Immutable record of one balance mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerMovement {
    /// Unique movement ID
    pub id: Uuid,
    /// Account whose balance moved
    pub account_id: Uuid,
    pub direction: Direction,
    /// Always positive
    pub amount: Credits,
    pub reason: ReasonCode,
    pub balance_before: Credits,
    pub balance_after: Credits,
    /// Causing entity
    pub reference: EntityRef,
    pub created_at: DateTime<Utc>,
}

impl LedgerMovement {
    /// Record a movement between two observed balances
    pub fn new(
        account_id: Uuid,
        direction: Direction,
        amount: Credits,
        reason: ReasonCode,
        balance_before: Credits,
        balance_after: Credits,
        reference: EntityRef,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            direction,
            amount,
            reason,
            balance_before,
            balance_after,
            reference,
            created_at: Utc::now(),
        }
    }

    /// Check `balance_after = balance_before ± amount`
    pub fn is_consistent(&self) -> bool {
        match self.direction {
            Direction::Debit => self.balance_before - self.amount == self.balance_after,
            Direction::Credit => self.balance_before + self.amount == self.balance_after,
        }
    }
}
