//! PostgreSQL store
//!
//! Row locks are `SELECT ... FOR UPDATE` inside a sqlx transaction. Each unit
//! sets `lock_timeout`, so a long wait fails like a deadlock does: as a
//! transient error.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use crate::decimal::{Credits, Decimal};
use crate::error::{Error, Result};
use crate::model::{
    Account, AccountStatus, Appointment, AvailabilityWindow, Category, CreditPack,
    CreditTransaction, DayOfWeek, LedgerMovement, Listing, MeetingPoint, Notification,
    NotificationEvent, Rating, RatingDirection, Score, TransactionStatus, WindowStatus,
};

use super::models::{
    convert_all, score_from_column, DbAccount, DbAppointment, DbAvailabilityWindow, DbCategory,
    DbCreditPack, DbCreditTransaction, DbLedgerMovement, DbListing, DbMeetingPoint,
    DbNotification, DbRating,
};
use super::transaction::{DBTransaction, TransactionManager, UnitOfWork};
use super::{DbPool, Store};

/// PostgreSQL store implementation
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
    lock_timeout: Duration,
}

impl PgStore {
    /// Create a new store over an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self::with_lock_timeout(pool, Duration::from_millis(5000))
    }

    pub fn with_lock_timeout(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl TransactionManager for PgStore {
    async fn begin_transaction(&self) -> Result<DBTransaction> {
        let mut tx = self.pool.begin().await?;
        // SET takes no bind parameters
        sqlx::query(&format!("SET LOCAL lock_timeout = {}", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgTransaction::new(tx)))
    }
}

async fn insert_account(conn: &mut PgConnection, account: &Account) -> Result<()> {
    sqlx::query(
        "INSERT INTO accounts (id, name, role, status, credit_balance, average_score, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(account.id)
    .bind(&account.name)
    .bind(account.role.as_str())
    .bind(account.status.as_str())
    .bind(account.credit_balance)
    .bind(account.average_score.map(|s| s.to_string()))
    .bind(account.created_at)
    .bind(account.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn upsert_credit_transaction(conn: &mut PgConnection, tx: &CreditTransaction) -> Result<()> {
    sqlx::query(
        "INSERT INTO credit_transactions
            (id, account_id, pack_id, credits, amount_paid, proof_ref, status, reviewer_id,
             review_comment, submitted_at, reviewed_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            reviewer_id = EXCLUDED.reviewer_id,
            review_comment = EXCLUDED.review_comment,
            reviewed_at = EXCLUDED.reviewed_at",
    )
    .bind(tx.id)
    .bind(tx.account_id)
    .bind(tx.pack_id)
    .bind(tx.credits)
    .bind(tx.amount_paid.map(|a| a.to_string()))
    .bind(&tx.proof_ref)
    .bind(tx.status.as_str())
    .bind(tx.reviewer_id)
    .bind(&tx.review_comment)
    .bind(tx.submitted_at)
    .bind(tx.reviewed_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn upsert_listing(conn: &mut PgConnection, listing: &Listing) -> Result<()> {
    sqlx::query(
        "INSERT INTO listings
            (id, seller_id, category_id, meeting_point_id, name, description, price, stock,
             credits_used, status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
         ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            description = EXCLUDED.description,
            price = EXCLUDED.price,
            stock = EXCLUDED.stock,
            status = EXCLUDED.status,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(listing.id)
    .bind(listing.seller_id)
    .bind(listing.category_id)
    .bind(listing.meeting_point_id)
    .bind(&listing.name)
    .bind(&listing.description)
    .bind(listing.price.to_string())
    .bind(listing.stock)
    .bind(listing.credits_used)
    .bind(listing.status.as_str())
    .bind(listing.created_at)
    .bind(listing.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn upsert_appointment(conn: &mut PgConnection, appointment: &Appointment) -> Result<()> {
    sqlx::query(
        "INSERT INTO appointments
            (id, listing_id, buyer_id, seller_id, meeting_point_id, meeting_date, meeting_time, day,
             total_price, status, cancellation_reason, completion_trigger, scheduled_at,
             confirmed_at, cancelled_at, completed_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
         ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            cancellation_reason = EXCLUDED.cancellation_reason,
            completion_trigger = EXCLUDED.completion_trigger,
            confirmed_at = EXCLUDED.confirmed_at,
            cancelled_at = EXCLUDED.cancelled_at,
            completed_at = EXCLUDED.completed_at,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(appointment.id)
    .bind(appointment.listing_id)
    .bind(appointment.buyer_id)
    .bind(appointment.seller_id)
    .bind(appointment.meeting_point_id)
    .bind(appointment.date)
    .bind(appointment.time)
    .bind(appointment.day.index())
    .bind(appointment.total_price.to_string())
    .bind(appointment.status.as_str())
    .bind(&appointment.cancellation_reason)
    .bind(appointment.completion_trigger.map(|t| t.as_str()))
    .bind(appointment.scheduled_at)
    .bind(appointment.confirmed_at)
    .bind(appointment.cancelled_at)
    .bind(appointment.completed_at)
    .bind(appointment.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_notification(conn: &mut PgConnection, notification: &Notification) -> Result<()> {
    sqlx::query(
        "INSERT INTO notifications (id, recipient_id, sender_id, title, body, category, read, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(notification.id)
    .bind(notification.recipient_id)
    .bind(notification.sender_id)
    .bind(&notification.title)
    .bind(&notification.body)
    .bind(notification.category.as_str())
    .bind(notification.read)
    .bind(notification.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    async fn insert_category(&self, category: &Category) -> Result<()> {
        sqlx::query("INSERT INTO categories (id, name, active) VALUES ($1, $2, $3)")
            .bind(category.id)
            .bind(&category.name)
            .bind(category.active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_meeting_point(&self, meeting_point: &MeetingPoint) -> Result<()> {
        sqlx::query("INSERT INTO meeting_points (id, name, address, active) VALUES ($1, $2, $3, $4)")
            .bind(meeting_point.id)
            .bind(&meeting_point.name)
            .bind(&meeting_point.address)
            .bind(meeting_point.active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_pack(&self, pack: &CreditPack) -> Result<()> {
        sqlx::query(
            "INSERT INTO credit_packs (id, name, credits, price, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(pack.id)
        .bind(&pack.name)
        .bind(pack.credits)
        .bind(pack.price.to_string())
        .bind(pack.status.as_str())
        .bind(pack.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_window(&self, window: &AvailabilityWindow) -> Result<()> {
        sqlx::query(
            "INSERT INTO availability_windows (id, seller_id, day, start_time, end_time, status)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(window.id)
        .bind(window.seller_id)
        .bind(window.day.index())
        .bind(window.start)
        .bind(window.end)
        .bind(window.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_window(&self, id: Uuid) -> Result<Option<AvailabilityWindow>> {
        sqlx::query_as::<_, DbAvailabilityWindow>("SELECT * FROM availability_windows WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(AvailabilityWindow::try_from)
            .transpose()
    }

    async fn set_window_status(&self, id: Uuid, status: WindowStatus) -> Result<()> {
        let result = sqlx::query("UPDATE availability_windows SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("availability window {}", id)));
        }
        Ok(())
    }

    async fn windows_for_seller(&self, seller_id: Uuid) -> Result<Vec<AvailabilityWindow>> {
        let rows = sqlx::query_as::<_, DbAvailabilityWindow>(
            "SELECT * FROM availability_windows WHERE seller_id = $1 ORDER BY day, start_time",
        )
        .bind(seller_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
        sqlx::query_as::<_, DbAccount>("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn movements_for(&self, account_id: Uuid) -> Result<Vec<LedgerMovement>> {
        let rows = sqlx::query_as::<_, DbLedgerMovement>(
            "SELECT * FROM ledger_movements WHERE account_id = $1 ORDER BY created_at",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn get_credit_transaction(&self, id: Uuid) -> Result<Option<CreditTransaction>> {
        sqlx::query_as::<_, DbCreditTransaction>("SELECT * FROM credit_transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(CreditTransaction::try_from)
            .transpose()
    }

    async fn credit_transactions(
        &self,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<CreditTransaction>> {
        let rows = sqlx::query_as::<_, DbCreditTransaction>(
            "SELECT * FROM credit_transactions
             WHERE ($1::TEXT IS NULL OR status = $1)
             ORDER BY submitted_at DESC",
        )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn get_listing(&self, id: Uuid) -> Result<Option<Listing>> {
        sqlx::query_as::<_, DbListing>("SELECT * FROM listings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Listing::try_from)
            .transpose()
    }

    async fn listings_for_seller(&self, seller_id: Uuid) -> Result<Vec<Listing>> {
        let rows = sqlx::query_as::<_, DbListing>(
            "SELECT * FROM listings WHERE seller_id = $1 ORDER BY created_at DESC",
        )
        .bind(seller_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>> {
        sqlx::query_as::<_, DbAppointment>("SELECT * FROM appointments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Appointment::try_from)
            .transpose()
    }

    async fn appointments_for_seller(&self, seller_id: Uuid) -> Result<Vec<Appointment>> {
        let rows = sqlx::query_as::<_, DbAppointment>(
            "SELECT * FROM appointments WHERE seller_id = $1 ORDER BY scheduled_at DESC",
        )
        .bind(seller_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn appointments_for_buyer(&self, buyer_id: Uuid) -> Result<Vec<Appointment>> {
        let rows = sqlx::query_as::<_, DbAppointment>(
            "SELECT * FROM appointments WHERE buyer_id = $1 ORDER BY scheduled_at DESC",
        )
        .bind(buyer_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn ratings_for_appointment(&self, appointment_id: Uuid) -> Result<Vec<Rating>> {
        let rows = sqlx::query_as::<_, DbRating>(
            "SELECT * FROM ratings WHERE appointment_id = $1 ORDER BY created_at",
        )
        .bind(appointment_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn unrated_appointments_for(&self, user_id: Uuid) -> Result<Vec<Appointment>> {
        let rows = sqlx::query_as::<_, DbAppointment>(
            "SELECT a.* FROM appointments a
             WHERE a.status IN ('confirmed', 'completed')
               AND (a.buyer_id = $1 OR a.seller_id = $1)
               AND NOT EXISTS (
                   SELECT 1 FROM ratings r
                   WHERE r.appointment_id = a.id
                     AND r.rater_id = $1
                     AND r.direction = CASE WHEN a.buyer_id = $1
                                            THEN 'buyer_to_seller'
                                            ELSE 'seller_to_buyer' END)
             ORDER BY a.meeting_date DESC, a.meeting_time DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn ratings_received(&self, rated_id: Uuid) -> Result<Vec<Rating>> {
        let rows = sqlx::query_as::<_, DbRating>(
            "SELECT * FROM ratings WHERE rated_id = $1 AND status = 'active' ORDER BY created_at DESC",
        )
        .bind(rated_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn notifications_for(&self, recipient_id: Uuid) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, DbNotification>(
            "SELECT * FROM notifications WHERE recipient_id = $1 ORDER BY created_at DESC",
        )
        .bind(recipient_id)
        .fetch_all(&self.pool)
        .await?;
        convert_all(rows)
    }

    async fn mark_notification_read(&self, id: Uuid, recipient_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE WHERE id = $1 AND recipient_id = $2",
        )
        .bind(id)
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn unread_notification_count(&self, recipient_id: Uuid) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND NOT read",
        )
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u64)
    }

    async fn mark_all_notifications_read(&self, recipient_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE WHERE recipient_id = $1 AND NOT read",
        )
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// A PostgreSQL unit of work
pub struct PgTransaction {
    tx: Option<Transaction<'static, Postgres>>,
    notifications: Vec<NotificationEvent>,
}

impl PgTransaction {
    /// Create a new PgTransaction
    pub fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            tx: Some(tx),
            notifications: Vec::new(),
        }
    }

    fn conn(&mut self) -> Result<&mut PgConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| Error::Internal("transaction already finished".to_string()))
    }

    async fn update_account(&mut self, id: Uuid, sql: &str, value: Option<String>) -> Result<()> {
        let conn = self.conn()?;
        let result = sqlx::query(sql)
            .bind(id)
            .bind(value)
            .bind(Utc::now())
            .execute(conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("account {}", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PgTransaction {
    async fn lock_account(&mut self, id: Uuid) -> Result<Option<Account>> {
        let conn = self.conn()?;
        debug!("Locking account {}", id);
        sqlx::query_as::<_, DbAccount>("SELECT * FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn get_account(&mut self, id: Uuid) -> Result<Option<Account>> {
        let conn = self.conn()?;
        sqlx::query_as::<_, DbAccount>("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await?
            .map(Account::try_from)
            .transpose()
    }

    async fn insert_account(&mut self, account: &Account) -> Result<()> {
        let conn = self.conn()?;
        insert_account(conn, account).await
    }

    async fn set_balance(&mut self, id: Uuid, balance: Credits) -> Result<()> {
        let conn = self.conn()?;
        let result = sqlx::query(
            "UPDATE accounts SET credit_balance = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(balance)
        .bind(Utc::now())
        .execute(conn)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("account {}", id)));
        }
        Ok(())
    }

    async fn set_average_score(&mut self, id: Uuid, score: Option<Decimal>) -> Result<()> {
        self.update_account(
            id,
            "UPDATE accounts SET average_score = $2, updated_at = $3 WHERE id = $1",
            score.map(|s| s.to_string()),
        )
        .await
    }

    async fn set_account_status(&mut self, id: Uuid, status: AccountStatus) -> Result<()> {
        self.update_account(
            id,
            "UPDATE accounts SET status = $2, updated_at = $3 WHERE id = $1",
            Some(status.as_str().to_string()),
        )
        .await
    }

    async fn append_movement(&mut self, movement: &LedgerMovement) -> Result<()> {
        let conn = self.conn()?;
        let (kind, reference_id) = movement.reference.parts();
        sqlx::query(
            "INSERT INTO ledger_movements
                (id, account_id, direction, amount, reason, balance_before, balance_after,
                 reference_kind, reference_id, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(movement.id)
        .bind(movement.account_id)
        .bind(movement.direction.as_str())
        .bind(movement.amount)
        .bind(movement.reason.as_str())
        .bind(movement.balance_before)
        .bind(movement.balance_after)
        .bind(kind)
        .bind(reference_id)
        .bind(movement.created_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn get_pack(&mut self, id: Uuid) -> Result<Option<CreditPack>> {
        let conn = self.conn()?;
        sqlx::query_as::<_, DbCreditPack>("SELECT * FROM credit_packs WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await?
            .map(CreditPack::try_from)
            .transpose()
    }

    async fn insert_credit_transaction(&mut self, transaction: &CreditTransaction) -> Result<()> {
        let conn = self.conn()?;
        upsert_credit_transaction(conn, transaction).await
    }

    async fn lock_credit_transaction(&mut self, id: Uuid) -> Result<Option<CreditTransaction>> {
        let conn = self.conn()?;
        debug!("Locking credit transaction {}", id);
        sqlx::query_as::<_, DbCreditTransaction>(
            "SELECT * FROM credit_transactions WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(conn)
        .await?
        .map(CreditTransaction::try_from)
        .transpose()
    }

    async fn save_credit_transaction(&mut self, transaction: &CreditTransaction) -> Result<()> {
        let conn = self.conn()?;
        upsert_credit_transaction(conn, transaction).await
    }

    async fn get_category(&mut self, id: Uuid) -> Result<Option<Category>> {
        let conn = self.conn()?;
        let row = sqlx::query_as::<_, DbCategory>("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(row.map(Category::from))
    }

    async fn get_meeting_point(&mut self, id: Uuid) -> Result<Option<MeetingPoint>> {
        let conn = self.conn()?;
        let row = sqlx::query_as::<_, DbMeetingPoint>("SELECT * FROM meeting_points WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(row.map(MeetingPoint::from))
    }

    async fn get_listing(&mut self, id: Uuid) -> Result<Option<Listing>> {
        let conn = self.conn()?;
        sqlx::query_as::<_, DbListing>("SELECT * FROM listings WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await?
            .map(Listing::try_from)
            .transpose()
    }

    async fn insert_listing(&mut self, listing: &Listing) -> Result<()> {
        let conn = self.conn()?;
        upsert_listing(conn, listing).await
    }

    async fn save_listing(&mut self, listing: &Listing) -> Result<()> {
        let conn = self.conn()?;
        upsert_listing(conn, listing).await
    }

    async fn find_window(
        &mut self,
        seller_id: Uuid,
        day: DayOfWeek,
        time: NaiveTime,
    ) -> Result<Option<AvailabilityWindow>> {
        let conn = self.conn()?;
        sqlx::query_as::<_, DbAvailabilityWindow>(
            "SELECT * FROM availability_windows
             WHERE seller_id = $1 AND day = $2 AND status = 'active'
               AND start_time <= $3 AND end_time >= $3
             ORDER BY start_time
             LIMIT 1",
        )
        .bind(seller_id)
        .bind(day.index())
        .bind(time)
        .fetch_optional(conn)
        .await?
        .map(AvailabilityWindow::try_from)
        .transpose()
    }

    async fn insert_appointment(&mut self, appointment: &Appointment) -> Result<()> {
        let conn = self.conn()?;
        upsert_appointment(conn, appointment).await
    }

    async fn lock_appointment(&mut self, id: Uuid) -> Result<Option<Appointment>> {
        let conn = self.conn()?;
        debug!("Locking appointment {}", id);
        sqlx::query_as::<_, DbAppointment>("SELECT * FROM appointments WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?
            .map(Appointment::try_from)
            .transpose()
    }

    async fn save_appointment(&mut self, appointment: &Appointment) -> Result<()> {
        let conn = self.conn()?;
        upsert_appointment(conn, appointment).await
    }

    async fn find_rating(
        &mut self,
        appointment_id: Uuid,
        rater_id: Uuid,
        direction: RatingDirection,
    ) -> Result<Option<Rating>> {
        let conn = self.conn()?;
        sqlx::query_as::<_, DbRating>(
            "SELECT * FROM ratings WHERE appointment_id = $1 AND rater_id = $2 AND direction = $3",
        )
        .bind(appointment_id)
        .bind(rater_id)
        .bind(direction.as_str())
        .fetch_optional(conn)
        .await?
        .map(Rating::try_from)
        .transpose()
    }

    async fn insert_rating(&mut self, rating: &Rating) -> Result<()> {
        let conn = self.conn()?;
        sqlx::query(
            "INSERT INTO ratings
                (id, appointment_id, listing_id, rater_id, rated_id, direction, score, comment,
                 status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(rating.id)
        .bind(rating.appointment_id)
        .bind(rating.listing_id)
        .bind(rating.rater_id)
        .bind(rating.rated_id)
        .bind(rating.direction.as_str())
        .bind(i16::from(rating.score.value()))
        .bind(&rating.comment)
        .bind(rating.status.as_str())
        .bind(rating.created_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn ratings_for_appointment(&mut self, appointment_id: Uuid) -> Result<Vec<Rating>> {
        let conn = self.conn()?;
        let rows = sqlx::query_as::<_, DbRating>(
            "SELECT * FROM ratings WHERE appointment_id = $1 ORDER BY created_at",
        )
        .bind(appointment_id)
        .fetch_all(conn)
        .await?;
        convert_all(rows)
    }

    async fn active_scores_for(&mut self, rated_id: Uuid) -> Result<Vec<Score>> {
        let conn = self.conn()?;
        let scores: Vec<i16> = sqlx::query_scalar(
            "SELECT score FROM ratings WHERE rated_id = $1 AND status = 'active'",
        )
        .bind(rated_id)
        .fetch_all(conn)
        .await?;
        scores.into_iter().map(score_from_column).collect()
    }

    fn emit(&mut self, event: NotificationEvent) {
        self.notifications.push(event);
    }

    async fn commit(&mut self) -> Result<Vec<Notification>> {
        let mut tx = self
            .tx
            .take()
            .ok_or_else(|| Error::Internal("transaction already finished".to_string()))?;

        let notifications: Vec<Notification> = self
            .notifications
            .drain(..)
            .map(Notification::from_event)
            .collect();
        for notification in &notifications {
            insert_notification(&mut tx, notification).await?;
        }

        tx.commit().await?;
        debug!("PostgreSQL transaction committed");
        Ok(notifications)
    }

    async fn rollback(&mut self) -> Result<()> {
        self.notifications.clear();
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
            debug!("PostgreSQL transaction rolled back");
        }
        Ok(())
    }
}
