//! Appointment models and the appointment state machine

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Price;
use crate::error::{Error, Result};
use crate::model::availability::DayOfWeek;

text_enum! {
    /// Appointment status
    pub enum AppointmentStatus {
        Scheduled => "scheduled",
        Confirmed => "confirmed",
        Cancelled => "cancelled",
        Completed => "completed",
    }
}

impl AppointmentStatus {
    /// Cancelled and completed appointments never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::Completed)
    }
}

text_enum! {
    /// What moved the appointment to completed
    pub enum CompletionTrigger {
        Manual => "manual",
        RatingPair => "rating_pair",
    }
}

/// Scheduled meeting between a buyer and the seller of a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    /// Unique appointment ID
    pub id: Uuid,
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub seller_id: Uuid,
    pub meeting_point_id: Uuid,
    /// Requested meeting date
    pub date: NaiveDate,
    /// Requested meeting time
    pub time: NaiveTime,
    pub day: DayOfWeek,
    /// Listing price at booking time
    pub total_price: Price,
    pub status: AppointmentStatus,
    pub cancellation_reason: Option<String>,
    pub completion_trigger: Option<CompletionTrigger>,
    pub scheduled_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// Create a scheduled appointment
    pub fn new(
        listing_id: Uuid,
        buyer_id: Uuid,
        seller_id: Uuid,
        meeting_point_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        total_price: Price,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            listing_id,
            buyer_id,
            seller_id,
            meeting_point_id,
            date,
            time,
            day: DayOfWeek::from_date(date),
            total_price,
            status: AppointmentStatus::Scheduled,
            cancellation_reason: None,
            completion_trigger: None,
            scheduled_at: now,
            confirmed_at: None,
            cancelled_at: None,
            completed_at: None,
            updated_at: now,
        }
    }

    /// Check whether the account takes part in the appointment
    pub fn is_participant(&self, account_id: Uuid) -> bool {
        self.buyer_id == account_id || self.seller_id == account_id
    }

    /// Meeting moment as a naive local timestamp
    pub fn meeting_at(&self) -> chrono::NaiveDateTime {
        self.date.and_time(self.time)
    }

    fn conflict(&self, action: &str) -> Error {
        Error::Conflict(format!(
            "cannot {} appointment {}: already in state {}",
            action, self.id, self.status
        ))
    }

    /// scheduled -> confirmed
    pub fn confirm(&mut self) -> Result<()> {
        if self.status != AppointmentStatus::Scheduled {
            return Err(self.conflict("confirm"));
        }
        let now = Utc::now();
        self.status = AppointmentStatus::Confirmed;
        self.confirmed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// scheduled|confirmed -> cancelled
    pub fn cancel(&mut self, reason: &str) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.conflict("cancel"));
        }
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(Error::ValidationError("cancellation reason is required".to_string()));
        }
        let now = Utc::now();
        self.status = AppointmentStatus::Cancelled;
        self.cancellation_reason = Some(reason.to_string());
        self.cancelled_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// confirmed -> completed
    pub fn complete(&mut self, trigger: CompletionTrigger) -> Result<()> {
        if self.status != AppointmentStatus::Confirmed {
            return Err(self.conflict("complete"));
        }
        let now = Utc::now();
        self.status = AppointmentStatus::Completed;
        self.completion_trigger = Some(trigger);
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}
