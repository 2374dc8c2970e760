//! Credit packs and credit purchase transactions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Amount, Credits, Price};
use crate::error::{Error, Result};

text_enum! {
    /// Credit pack availability
    pub enum PackStatus {
        Active => "active",
        Inactive => "inactive",
    }
}

text_enum! {
    /// Credit transaction review state
    pub enum TransactionStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

text_enum! {
    /// Reviewer decision on a pending transaction
    pub enum ReviewDecision {
        Approve => "approve",
        Reject => "reject",
    }
}

/// Purchasable bundle of credits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditPack {
    pub id: Uuid,
    pub name: String,
    /// Credits granted on approval
    pub credits: Credits,
    pub price: Price,
    pub status: PackStatus,
    pub created_at: DateTime<Utc>,
}

impl CreditPack {
    /// Create a new active pack
    pub fn new(name: String, credits: Credits, price: Price) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            credits,
            price,
            status: PackStatus::Active,
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PackStatus::Active
    }
}

/// Request to top up an account's balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// Unique transaction ID
    pub id: Uuid,
    /// Submitting account
    pub account_id: Uuid,
    /// Pack being purchased
    pub pack_id: Uuid,
    /// Credits to grant; falls back to the pack amount when absent
    pub credits: Option<Credits>,
    /// Money the submitter claims to have paid
    pub amount_paid: Option<Amount>,
    /// Reference to the externally stored proof of payment
    pub proof_ref: String,
    pub status: TransactionStatus,
    /// Reviewer who approved or rejected
    pub reviewer_id: Option<Uuid>,
    /// Reviewer comment; mandatory on rejection
    pub review_comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl CreditTransaction {
    /// Create a new pending transaction
    pub fn new(
        account_id: Uuid,
        pack_id: Uuid,
        proof_ref: String,
        credits: Option<Credits>,
        amount_paid: Option<Amount>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            pack_id,
            credits,
            amount_paid,
            proof_ref,
            status: TransactionStatus::Pending,
            reviewer_id: None,
            review_comment: None,
            submitted_at: Utc::now(),
            reviewed_at: None,
        }
    }

    /// Credits granted on approval
    pub fn credits_to_grant(&self, pack: Option<&CreditPack>) -> Result<Credits> {
        match self.credits.filter(|c| *c > 0) {
            Some(credits) => Ok(credits),
            None => pack
                .map(|p| p.credits)
                .filter(|c| *c > 0)
                .ok_or_else(|| {
                    Error::ValidationError(format!(
                        "credit pack {} for transaction {} does not exist",
                        self.pack_id, self.id
                    ))
                }),
        }
    }

    fn ensure_pending(&self) -> Result<()> {
        if self.status != TransactionStatus::Pending {
            return Err(Error::Conflict(format!(
                "credit transaction {} already reviewed ({})",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// Mark as approved
    pub fn approve(&mut self, reviewer_id: Uuid, comment: Option<String>) -> Result<()> {
        self.ensure_pending()?;
        self.status = TransactionStatus::Approved;
        self.reviewer_id = Some(reviewer_id);
        self.review_comment = comment;
        self.reviewed_at = Some(Utc::now());
        Ok(())
    }

    /// Mark as rejected; the reason is mandatory
    pub fn reject(&mut self, reviewer_id: Uuid, reason: &str) -> Result<()> {
        self.ensure_pending()?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::ValidationError("rejection reason is required".to_string()));
        }
        self.status = TransactionStatus::Rejected;
        self.reviewer_id = Some(reviewer_id);
        self.review_comment = Some(reason.to_string());
        self.reviewed_at = Some(Utc::now());
        Ok(())
    }
}
