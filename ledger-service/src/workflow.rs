//! Credit transaction workflow
//!
//! A credit transaction is created `pending` and reviewed exactly once. The
//! review locks the transaction row before the account row; approval credits
//! the submitter through the ledger inside the same unit of work.

use std::sync::Arc;

use common::db::finish;
use common::decimal::{Amount, Credits};
use common::error::{Error, Result};
use common::model::{
    CreditTransaction, EntityRef, LedgerMovement, ReasonCode, ReviewDecision, Role,
    TransactionStatus,
};
use common::notify::{self, LogSink, NotificationSink};
use common::{Store, UnitOfWork};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::ledger::{self, LedgerEntry};

/// Input for `SubmitCreditTransaction`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitCreditTransaction {
    pub account_id: Uuid,
    pub pack_id: Uuid,
    /// Reference to the stored proof of payment
    pub proof_ref: String,
    /// Overrides the pack's credits when present
    pub credits: Option<Credits>,
    pub amount_paid: Option<Amount>,
}

impl SubmitCreditTransaction {
    fn validate(&self) -> Result<()> {
        if self.proof_ref.trim().is_empty() {
            return Err(Error::ValidationError("proof of payment is required".to_string()));
        }
        if let Some(credits) = self.credits {
            if credits <= 0 {
                return Err(Error::ValidationError(format!(
                    "credits must be positive, got {}",
                    credits
                )));
            }
        }
        if let Some(amount) = self.amount_paid {
            if amount.is_sign_negative() {
                return Err(Error::ValidationError(format!(
                    "amount paid must not be negative, got {}",
                    amount
                )));
            }
        }
        Ok(())
    }
}

/// Input for `ReviewCreditTransaction`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewCreditTransaction {
    pub transaction_id: Uuid,
    pub decision: ReviewDecision,
    pub reviewer_id: Uuid,
    /// Mandatory when rejecting
    pub comment: Option<String>,
}

/// Result of a review
#[derive(Debug, Clone)]
pub struct Review {
    pub transaction: CreditTransaction,
    /// The credit movement, for approvals
    pub movement: Option<LedgerMovement>,
}

/// Credit transaction workflow
pub struct CreditTransactionWorkflow {
    store: Arc<dyn Store>,
    sink: Arc<dyn NotificationSink>,
}

impl CreditTransactionWorkflow {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_sink(store, Arc::new(LogSink))
    }

    pub fn with_sink(store: Arc<dyn Store>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    /// Submit a pending credit purchase
    pub async fn submit(&self, input: SubmitCreditTransaction) -> Result<CreditTransaction> {
        input.validate()?;

        let mut tx = self.store.begin_transaction().await?;
        let result = submit_in(tx.as_mut(), &input).await;
        let (transaction, notifications) = finish(tx, result).await?;
        self.sink.deliver_all(&notifications);

        info!(
            "Credit transaction {} submitted by account {}",
            transaction.id, transaction.account_id
        );
        Ok(transaction)
    }

    /// Approve or reject a pending credit transaction
    pub async fn review(&self, input: ReviewCreditTransaction) -> Result<Review> {
        let mut tx = self.store.begin_transaction().await?;
        let result = review_in(tx.as_mut(), &input).await;
        let (review, notifications) = match finish(tx, result).await {
            Ok(done) => done,
            Err(e) => {
                warn!("Review of credit transaction {} failed: {}", input.transaction_id, e);
                return Err(e);
            }
        };
        self.sink.deliver_all(&notifications);

        info!(
            "Credit transaction {} {} by {}",
            review.transaction.id, review.transaction.status, input.reviewer_id
        );
        Ok(review)
    }

    /// Credit transactions, newest first, optionally filtered by status
    pub async fn list(&self, status: Option<TransactionStatus>) -> Result<Vec<CreditTransaction>> {
        self.store.credit_transactions(status).await
    }

    pub async fn get(&self, id: Uuid) -> Result<CreditTransaction> {
        self.store
            .get_credit_transaction(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("credit transaction {}", id)))
    }
}

async fn submit_in(
    tx: &mut dyn UnitOfWork,
    input: &SubmitCreditTransaction,
) -> Result<CreditTransaction> {
    tx.get_account(input.account_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("account {}", input.account_id)))?;

    let pack = tx
        .get_pack(input.pack_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("credit pack {}", input.pack_id)))?;
    if !pack.is_active() {
        return Err(Error::ValidationError(format!("credit pack {} is not available", pack.id)));
    }

    let transaction = CreditTransaction::new(
        input.account_id,
        input.pack_id,
        input.proof_ref.trim().to_string(),
        input.credits,
        input.amount_paid,
    );
    tx.insert_credit_transaction(&transaction).await?;
    Ok(transaction)
}

async fn review_in(tx: &mut dyn UnitOfWork, input: &ReviewCreditTransaction) -> Result<Review> {
    let reviewer = tx.get_account(input.reviewer_id).await?;
    match reviewer {
        Some(reviewer) if reviewer.role == Role::Admin => {}
        _ => {
            return Err(Error::AuthorizationError(format!(
                "account {} may not review credit transactions",
                input.reviewer_id
            )))
        }
    }

    let mut transaction = tx
        .lock_credit_transaction(input.transaction_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("credit transaction {}", input.transaction_id)))?;

    match input.decision {
        ReviewDecision::Reject => {
            transaction.reject(input.reviewer_id, input.comment.as_deref().unwrap_or_default())?;
            tx.save_credit_transaction(&transaction).await?;
            tx.emit(notify::credits_rejected(&transaction, input.reviewer_id));
            Ok(Review { transaction, movement: None })
        }
        ReviewDecision::Approve => {
            let comment = input
                .comment
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            transaction.approve(input.reviewer_id, comment)?;

            let pack = tx.get_pack(transaction.pack_id).await?;
            let credits = transaction.credits_to_grant(pack.as_ref())?;
            let entry = LedgerEntry::new(
                transaction.account_id,
                credits,
                ReasonCode::CreditPurchase,
                EntityRef::CreditTransaction(transaction.id),
            );
            let movement = ledger::credit(tx, &entry).await?;

            tx.save_credit_transaction(&transaction).await?;
            tx.emit(notify::credits_approved(
                &transaction,
                input.reviewer_id,
                credits,
                movement.balance_after,
            ));
            Ok(Review { transaction, movement: Some(movement) })
        }
    }
}
