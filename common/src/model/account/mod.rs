//! Account models and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Credits, Decimal};

text_enum! {
    /// Account lifecycle status; accounts are never deleted
    pub enum AccountStatus {
        Active => "active",
        Inactive => "inactive",
        Suspended => "suspended",
    }
}

text_enum! {
    /// Account role
    pub enum Role {
        Buyer => "buyer",
        Seller => "seller",
        Admin => "admin",
    }
}

/// Account model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique account ID
    pub id: Uuid,
    /// Display name used in notifications
    pub name: String,
    /// Account role
    pub role: Role,
    /// Account status
    pub status: AccountStatus,
    /// Spendable credits
    pub credit_balance: Credits,
    /// Mean of active ratings received, if any
    pub average_score: Option<Decimal>,
    /// Account creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new active account
    pub fn new(name: String, role: Role, credit_balance: Credits) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            role,
            status: AccountStatus::Active,
            credit_balance,
            average_score: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account is active
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Remove credits from the balance
    pub fn debit(&mut self, amount: Credits) -> Result<(), String> {
        if amount > self.credit_balance {
            return Err(format!(
                "requires {} credits, available {}",
                amount, self.credit_balance
            ));
        }

        self.credit_balance -= amount;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Add credits to the balance
    pub fn credit(&mut self, amount: Credits) -> Result<(), String> {
        self.credit_balance = self
            .credit_balance
            .checked_add(amount)
            .ok_or_else(|| format!("crediting {} overflows the balance", amount))?;
        self.updated_at = Utc::now();
        Ok(())
    }
}
