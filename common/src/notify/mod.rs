//! Notification content and delivery
//!
//! Every transition builds its notifications here so that wording and
//! addressing live in one place. Events are staged on the open unit of work
//! and persisted with its commit; the committed records are then handed to a
//! [`NotificationSink`].

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, info};
use uuid::Uuid;

use crate::db::Store;
use crate::decimal::Credits;
use crate::error::{Error, Result};
use crate::model::{
    Account, Appointment, CreditTransaction, Listing, MeetingPoint, Notification,
    NotificationCategory, NotificationEvent, Rating, RatingDirection,
};

/// DD/MM/YYYY
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// HH:MM
pub fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

fn event(
    recipient_id: Uuid,
    sender_id: Option<Uuid>,
    title: &str,
    body: String,
    category: NotificationCategory,
) -> NotificationEvent {
    NotificationEvent {
        recipient_id,
        sender_id,
        title: title.to_string(),
        body,
        category,
    }
}

/// New booking, addressed to the seller
pub fn appointment_requested(
    appointment: &Appointment,
    buyer: &Account,
    listing: &Listing,
    meeting_point: &MeetingPoint,
) -> NotificationEvent {
    event(
        appointment.seller_id,
        Some(buyer.id),
        "New appointment",
        format!(
            "{} booked \"{}\" on {} at {} at {}. Total price: {}.",
            buyer.name,
            listing.name,
            format_date(appointment.date),
            format_time(appointment.time),
            meeting_point.name,
            appointment.total_price
        ),
        NotificationCategory::Appointment,
    )
}

/// Seller confirmed, addressed to the buyer
pub fn appointment_confirmed(
    appointment: &Appointment,
    seller: &Account,
    listing: &Listing,
) -> NotificationEvent {
    event(
        appointment.buyer_id,
        Some(seller.id),
        "Appointment confirmed",
        format!(
            "{} confirmed the appointment for \"{}\" on {} at {}.",
            seller.name,
            listing.name,
            format_date(appointment.date),
            format_time(appointment.time)
        ),
        NotificationCategory::Appointment,
    )
}

/// Seller cancelled, addressed to the buyer with the reason
pub fn appointment_cancelled(
    appointment: &Appointment,
    seller: &Account,
    listing: &Listing,
) -> NotificationEvent {
    event(
        appointment.buyer_id,
        Some(seller.id),
        "Appointment cancelled",
        format!(
            "{} cancelled the appointment for \"{}\" on {} at {}. Reason: {}",
            seller.name,
            listing.name,
            format_date(appointment.date),
            format_time(appointment.time),
            appointment.cancellation_reason.as_deref().unwrap_or_default()
        ),
        NotificationCategory::Appointment,
    )
}

/// Appointment completed, one event per participant
pub fn appointment_completed(appointment: &Appointment, listing: &Listing) -> Vec<NotificationEvent> {
    [appointment.buyer_id, appointment.seller_id]
        .into_iter()
        .map(|recipient| {
            event(
                recipient,
                None,
                "Appointment completed",
                format!(
                    "The appointment for \"{}\" on {} at {} is completed.",
                    listing.name,
                    format_date(appointment.date),
                    format_time(appointment.time)
                ),
                NotificationCategory::Appointment,
            )
        })
        .collect()
}

/// Credit purchase approved, addressed to the submitter
pub fn credits_approved(
    transaction: &CreditTransaction,
    reviewer_id: Uuid,
    credits: Credits,
    balance: Credits,
) -> NotificationEvent {
    event(
        transaction.account_id,
        Some(reviewer_id),
        "Credits approved",
        format!(
            "Your credit purchase was approved: {} credits added. New balance: {} credits.",
            credits, balance
        ),
        NotificationCategory::Credits,
    )
}

/// Credit purchase rejected, addressed to the submitter with the reason
pub fn credits_rejected(transaction: &CreditTransaction, reviewer_id: Uuid) -> NotificationEvent {
    event(
        transaction.account_id,
        Some(reviewer_id),
        "Credits rejected",
        format!(
            "Your credit purchase was rejected. Reason: {}",
            transaction.review_comment.as_deref().unwrap_or_default()
        ),
        NotificationCategory::Credits,
    )
}

/// Rating received, addressed to the rated party
pub fn rating_received(rating: &Rating, rater: &Account) -> NotificationEvent {
    let stars = if rating.score.value() == 1 { "star" } else { "stars" };
    let role = match rating.direction {
        RatingDirection::BuyerToSeller => "seller",
        RatingDirection::SellerToBuyer => "buyer",
    };
    let mut body = format!(
        "{} rated you {} {} as {}",
        rater.name, rating.score, stars, role
    );
    if let Some(comment) = &rating.comment {
        body.push_str(&format!(": \"{}\"", comment));
    }
    event(
        rating.rated_id,
        Some(rater.id),
        &format!("New rating received: {}/5", rating.score),
        body,
        NotificationCategory::Rating,
    )
}

/// Listing published, addressed to the seller
pub fn listing_published(listing: &Listing, remaining_balance: Credits) -> NotificationEvent {
    event(
        listing.seller_id,
        None,
        "Listing published",
        format!(
            "\"{}\" is live. {} credits charged, {} credits remaining.",
            listing.name, listing.credits_used, remaining_balance
        ),
        NotificationCategory::Listing,
    )
}

/// Delivery seam for committed notifications
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: &Notification);

    fn deliver_all(&self, notifications: &[Notification]) {
        for notification in notifications {
            self.deliver(notification);
        }
    }
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, notification: &Notification) {
        info!(
            recipient = %notification.recipient_id,
            category = %notification.category,
            "Notification: {}",
            notification.title
        );
    }
}

/// Keeps delivered notifications in memory
#[derive(Debug, Default, Clone)]
pub struct RecordingSink {
    delivered: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything delivered so far
    pub fn delivered(&self) -> Vec<Notification> {
        match self.delivered.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Delivered notifications addressed to one recipient
    pub fn delivered_to(&self, recipient_id: Uuid) -> Vec<Notification> {
        self.delivered()
            .into_iter()
            .filter(|n| n.recipient_id == recipient_id)
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn deliver(&self, notification: &Notification) {
        let mut guard = match self.delivered.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(notification.clone());
    }
}

/// Read side of the persisted notifications
pub struct Inbox {
    store: Arc<dyn Store>,
}

impl Inbox {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Notifications addressed to a user, newest first
    pub async fn notifications_for(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        self.store.notifications_for(user_id).await
    }

    /// Unread notifications addressed to a user, newest first
    pub async fn unread_for(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        let notifications = self.store.notifications_for(user_id).await?;
        Ok(notifications.into_iter().filter(|n| !n.read).collect())
    }

    /// Mark one of the user's notifications as read
    pub async fn mark_read(&self, notification_id: Uuid, user_id: Uuid) -> Result<()> {
        if !self.store.mark_notification_read(notification_id, user_id).await? {
            return Err(Error::NotFound(format!(
                "notification {} for user {}",
                notification_id, user_id
            )));
        }
        Ok(())
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<u64> {
        self.store.unread_notification_count(user_id).await
    }

    /// Mark every unread notification of the user as read; returns how many changed
    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let marked = self.store.mark_all_notifications_read(user_id).await?;
        debug!("Marked {} notifications read for {}", marked, user_id);
        Ok(marked)
    }
}
