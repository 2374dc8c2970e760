//! Transaction handling for store operations
//!
//! This module provides a standardized approach to atomic units of work
//! across all services. A unit holds its row locks until commit or rollback;
//! writes made through it become visible to other units only on commit.

use async_trait::async_trait;
use chrono::NaiveTime;
use tracing::error;
use uuid::Uuid;

use crate::decimal::{Credits, Decimal};
use crate::error::Result;
use crate::model::{
    Account, AccountStatus, Appointment, AvailabilityWindow, Category, CreditPack,
    CreditTransaction, DayOfWeek, LedgerMovement, Listing, MeetingPoint, Notification,
    NotificationEvent, Rating, RatingDirection, Score,
};

/// One atomic unit of work against the store
///
/// `lock_*` methods take an exclusive row lock held until the unit ends.
/// Lock order across the workspace is credit transaction before account and
/// appointment before account.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Lock an account row and read it
    async fn lock_account(&mut self, id: Uuid) -> Result<Option<Account>>;

    /// Read an account without locking
    async fn get_account(&mut self, id: Uuid) -> Result<Option<Account>>;

    async fn insert_account(&mut self, account: &Account) -> Result<()>;

    /// Requires the account lock
    async fn set_balance(&mut self, id: Uuid, balance: Credits) -> Result<()>;

    async fn set_average_score(&mut self, id: Uuid, score: Option<Decimal>) -> Result<()>;

    async fn set_account_status(&mut self, id: Uuid, status: AccountStatus) -> Result<()>;

    async fn append_movement(&mut self, movement: &LedgerMovement) -> Result<()>;

    async fn get_pack(&mut self, id: Uuid) -> Result<Option<CreditPack>>;

    async fn insert_credit_transaction(&mut self, transaction: &CreditTransaction) -> Result<()>;

    /// Lock a credit transaction row and read it
    async fn lock_credit_transaction(&mut self, id: Uuid) -> Result<Option<CreditTransaction>>;

    async fn save_credit_transaction(&mut self, transaction: &CreditTransaction) -> Result<()>;

    async fn get_category(&mut self, id: Uuid) -> Result<Option<Category>>;

    async fn get_meeting_point(&mut self, id: Uuid) -> Result<Option<MeetingPoint>>;

    async fn get_listing(&mut self, id: Uuid) -> Result<Option<Listing>>;

    async fn insert_listing(&mut self, listing: &Listing) -> Result<()>;

    async fn save_listing(&mut self, listing: &Listing) -> Result<()>;

    /// First active window of the seller containing the given weekday and time
    async fn find_window(
        &mut self,
        seller_id: Uuid,
        day: DayOfWeek,
        time: NaiveTime,
    ) -> Result<Option<AvailabilityWindow>>;

    async fn insert_appointment(&mut self, appointment: &Appointment) -> Result<()>;

    /// Lock an appointment row and read it
    async fn lock_appointment(&mut self, id: Uuid) -> Result<Option<Appointment>>;

    async fn save_appointment(&mut self, appointment: &Appointment) -> Result<()>;

    async fn find_rating(
        &mut self,
        appointment_id: Uuid,
        rater_id: Uuid,
        direction: RatingDirection,
    ) -> Result<Option<Rating>>;

    /// Fails with a conflict if (appointment, rater, direction) already exists
    async fn insert_rating(&mut self, rating: &Rating) -> Result<()>;

    async fn ratings_for_appointment(&mut self, appointment_id: Uuid) -> Result<Vec<Rating>>;

    /// Scores of all active ratings received by an account
    async fn active_scores_for(&mut self, rated_id: Uuid) -> Result<Vec<Score>>;

    /// Stage a notification; it is persisted with the commit
    fn emit(&mut self, event: NotificationEvent);

    /// Commit the unit, returning the notifications it persisted
    async fn commit(&mut self) -> Result<Vec<Notification>>;

    /// Discard every write and staged notification
    async fn rollback(&mut self) -> Result<()>;
}

/// Boxed unit of work handed out by a [`TransactionManager`]
pub type DBTransaction = Box<dyn UnitOfWork>;

/// Transaction manager trait for creating and managing transactions
#[async_trait]
pub trait TransactionManager: Send + Sync {
    /// Begin a new transaction
    async fn begin_transaction(&self) -> Result<DBTransaction>;
}

/// Commit on success or roll back on failure, returning the committed notifications
pub async fn finish<T>(mut tx: DBTransaction, result: Result<T>) -> Result<(T, Vec<Notification>)> {
    match result {
        Ok(value) => {
            let notifications = tx.commit().await?;
            Ok((value, notifications))
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!("Failed to rollback transaction: {}", rollback_err);
            }
            Err(e)
        }
    }
}
