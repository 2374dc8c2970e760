//! Balance mutation primitives
//!
//! Both operations run inside the caller's unit of work and hold the account
//! row lock until it ends, so the balance read, the new balance and the
//! movement all belong to the same atomic unit.

use common::decimal::Credits;
use common::error::{Error, Result};
use common::model::{Direction, EntityRef, LedgerMovement, ReasonCode};
use common::UnitOfWork;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// One requested balance change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub account_id: Uuid,
    /// Strictly positive
    pub amount: Credits,
    pub reason: ReasonCode,
    pub reference: EntityRef,
}

impl LedgerEntry {
    pub fn new(account_id: Uuid, amount: Credits, reason: ReasonCode, reference: EntityRef) -> Self {
        Self { account_id, amount, reason, reference }
    }

    fn validate(&self) -> Result<()> {
        if self.amount <= 0 {
            return Err(Error::ValidationError(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }
}

/// Remove credits from an active account
pub async fn debit(tx: &mut dyn UnitOfWork, entry: &LedgerEntry) -> Result<LedgerMovement> {
    entry.validate()?;

    let mut account = tx
        .lock_account(entry.account_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("account {}", entry.account_id)))?;

    if !account.is_active() {
        return Err(Error::AccountInactive(format!(
            "account {} is {}",
            account.id, account.status
        )));
    }

    let balance_before = account.credit_balance;
    account.debit(entry.amount).map_err(|e| {
        Error::InsufficientFunds(format!("account {} {}", account.id, e))
    })?;
    debug!(
        "Debiting {} credits from account {} ({} -> {})",
        entry.amount, account.id, balance_before, account.credit_balance
    );

    tx.set_balance(account.id, account.credit_balance).await?;
    let movement = LedgerMovement::new(
        account.id,
        Direction::Debit,
        entry.amount,
        entry.reason,
        balance_before,
        account.credit_balance,
        entry.reference,
    );
    tx.append_movement(&movement).await?;

    info!(
        "Debited {} credits from account {} for {}",
        entry.amount, account.id, entry.reason
    );
    Ok(movement)
}

/// Add credits to an account; applies whatever the account status
pub async fn credit(tx: &mut dyn UnitOfWork, entry: &LedgerEntry) -> Result<LedgerMovement> {
    entry.validate()?;

    let mut account = tx
        .lock_account(entry.account_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("account {}", entry.account_id)))?;

    let balance_before = account.credit_balance;
    account.credit(entry.amount).map_err(Error::ValidationError)?;

    tx.set_balance(account.id, account.credit_balance).await?;
    let movement = LedgerMovement::new(
        account.id,
        Direction::Credit,
        entry.amount,
        entry.reason,
        balance_before,
        account.credit_balance,
        entry.reference,
    );
    tx.append_movement(&movement).await?;

    info!(
        "Credited {} credits to account {} for {}",
        entry.amount, account.id, entry.reason
    );
    Ok(movement)
}
