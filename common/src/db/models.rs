//! Row types for the PostgreSQL store and their conversion into domain models

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{Error, IntoError, Result};
use crate::model::{
    Account, Appointment, AvailabilityWindow, Category, CreditPack, CreditTransaction,
    DayOfWeek, EntityRef, LedgerMovement, Listing, MeetingPoint, Notification, Rating, Score,
};

fn decimal(text: &str) -> Result<Decimal> {
    Ok(Decimal::from_str(text)?)
}

fn optional_decimal(text: Option<String>) -> Result<Option<Decimal>> {
    text.as_deref().map(decimal).transpose()
}

fn optional_enum<T: FromStr<Err = Error>>(text: Option<String>) -> Result<Option<T>> {
    text.as_deref().map(T::from_str).transpose()
}

/// Database model for accounts table
#[derive(Debug, Clone, FromRow)]
pub struct DbAccount {
    pub id: Uuid,
    pub name: String,
    pub role: String,
    pub status: String,
    pub credit_balance: i64,
    pub average_score: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbAccount> for Account {
    type Error = Error;

    fn try_from(row: DbAccount) -> Result<Self> {
        Ok(Account {
            id: row.id,
            name: row.name,
            role: row.role.parse()?,
            status: row.status.parse()?,
            credit_balance: row.credit_balance,
            average_score: optional_decimal(row.average_score)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database model for ledger_movements table
#[derive(Debug, Clone, FromRow)]
pub struct DbLedgerMovement {
    pub id: Uuid,
    pub account_id: Uuid,
    pub direction: String,
    pub amount: i64,
    pub reason: String,
    pub balance_before: i64,
    pub balance_after: i64,
    pub reference_kind: String,
    pub reference_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbLedgerMovement> for LedgerMovement {
    type Error = Error;

    fn try_from(row: DbLedgerMovement) -> Result<Self> {
        Ok(LedgerMovement {
            id: row.id,
            account_id: row.account_id,
            direction: row.direction.parse()?,
            amount: row.amount,
            reason: row.reason.parse()?,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            reference: EntityRef::from_parts(&row.reference_kind, row.reference_id)?,
            created_at: row.created_at,
        })
    }
}

/// Database model for credit_packs table
#[derive(Debug, Clone, FromRow)]
pub struct DbCreditPack {
    pub id: Uuid,
    pub name: String,
    pub credits: i64,
    pub price: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbCreditPack> for CreditPack {
    type Error = Error;

    fn try_from(row: DbCreditPack) -> Result<Self> {
        Ok(CreditPack {
            id: row.id,
            name: row.name,
            credits: row.credits,
            price: decimal(&row.price)?,
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

/// Database model for credit_transactions table
#[derive(Debug, Clone, FromRow)]
pub struct DbCreditTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub pack_id: Uuid,
    pub credits: Option<i64>,
    pub amount_paid: Option<String>,
    pub proof_ref: String,
    pub status: String,
    pub reviewer_id: Option<Uuid>,
    pub review_comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbCreditTransaction> for CreditTransaction {
    type Error = Error;

    fn try_from(row: DbCreditTransaction) -> Result<Self> {
        Ok(CreditTransaction {
            id: row.id,
            account_id: row.account_id,
            pack_id: row.pack_id,
            credits: row.credits,
            amount_paid: optional_decimal(row.amount_paid)?,
            proof_ref: row.proof_ref,
            status: row.status.parse()?,
            reviewer_id: row.reviewer_id,
            review_comment: row.review_comment,
            submitted_at: row.submitted_at,
            reviewed_at: row.reviewed_at,
        })
    }
}

/// Database model for categories table
#[derive(Debug, Clone, FromRow)]
pub struct DbCategory {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
}

impl From<DbCategory> for Category {
    fn from(row: DbCategory) -> Self {
        Category { id: row.id, name: row.name, active: row.active }
    }
}

/// Database model for meeting_points table
#[derive(Debug, Clone, FromRow)]
pub struct DbMeetingPoint {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub active: bool,
}

impl From<DbMeetingPoint> for MeetingPoint {
    fn from(row: DbMeetingPoint) -> Self {
        MeetingPoint {
            id: row.id,
            name: row.name,
            address: row.address,
            active: row.active,
        }
    }
}

/// Database model for listings table
#[derive(Debug, Clone, FromRow)]
pub struct DbListing {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub category_id: Uuid,
    pub meeting_point_id: Uuid,
    pub name: String,
    pub description: String,
    pub price: String,
    pub stock: i32,
    pub credits_used: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbListing> for Listing {
    type Error = Error;

    fn try_from(row: DbListing) -> Result<Self> {
        Ok(Listing {
            id: row.id,
            seller_id: row.seller_id,
            category_id: row.category_id,
            meeting_point_id: row.meeting_point_id,
            name: row.name,
            description: row.description,
            price: decimal(&row.price)?,
            stock: row.stock,
            credits_used: row.credits_used,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database model for availability_windows table
#[derive(Debug, Clone, FromRow)]
pub struct DbAvailabilityWindow {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub day: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: String,
}

impl TryFrom<DbAvailabilityWindow> for AvailabilityWindow {
    type Error = Error;

    fn try_from(row: DbAvailabilityWindow) -> Result<Self> {
        Ok(AvailabilityWindow {
            id: row.id,
            seller_id: row.seller_id,
            day: DayOfWeek::from_index(row.day)?,
            start: row.start_time,
            end: row.end_time,
            status: row.status.parse()?,
        })
    }
}

/// Database model for appointments table
#[derive(Debug, Clone, FromRow)]
pub struct DbAppointment {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub meeting_point_id: Uuid,
    pub meeting_date: NaiveDate,
    pub meeting_time: NaiveTime,
    pub day: i16,
    pub total_price: String,
    pub status: String,
    pub cancellation_reason: Option<String>,
    pub completion_trigger: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbAppointment> for Appointment {
    type Error = Error;

    fn try_from(row: DbAppointment) -> Result<Self> {
        Ok(Appointment {
            id: row.id,
            listing_id: row.listing_id,
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            meeting_point_id: row.meeting_point_id,
            date: row.meeting_date,
            time: row.meeting_time,
            day: DayOfWeek::from_index(row.day)?,
            total_price: decimal(&row.total_price)?,
            status: row.status.parse()?,
            cancellation_reason: row.cancellation_reason,
            completion_trigger: optional_enum(row.completion_trigger)?,
            scheduled_at: row.scheduled_at,
            confirmed_at: row.confirmed_at,
            cancelled_at: row.cancelled_at,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database model for ratings table
#[derive(Debug, Clone, FromRow)]
pub struct DbRating {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub listing_id: Uuid,
    pub rater_id: Uuid,
    pub rated_id: Uuid,
    pub direction: String,
    pub score: i16,
    pub comment: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Stored score column to a validated score
pub fn score_from_column(score: i16) -> Result<Score> {
    let value = u8::try_from(score)
        .map_err(|e| e.into_error(&format!("stored score {} out of range", score)))?;
    Score::new(value)
}

impl TryFrom<DbRating> for Rating {
    type Error = Error;

    fn try_from(row: DbRating) -> Result<Self> {
        Ok(Rating {
            id: row.id,
            appointment_id: row.appointment_id,
            listing_id: row.listing_id,
            rater_id: row.rater_id,
            rated_id: row.rated_id,
            direction: row.direction.parse()?,
            score: score_from_column(row.score)?,
            comment: row.comment,
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

/// Database model for notifications table
#[derive(Debug, Clone, FromRow)]
pub struct DbNotification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub title: String,
    pub body: String,
    pub category: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbNotification> for Notification {
    type Error = Error;

    fn try_from(row: DbNotification) -> Result<Self> {
        Ok(Notification {
            id: row.id,
            recipient_id: row.recipient_id,
            sender_id: row.sender_id,
            title: row.title,
            body: row.body,
            category: row.category.parse()?,
            read: row.read,
            created_at: row.created_at,
        })
    }
}

/// Convert a batch of rows
pub fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = Error>,
{
    rows.into_iter().map(T::try_from).collect()
}
