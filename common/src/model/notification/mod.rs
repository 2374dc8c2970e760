//! Notification outbox models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

text_enum! {
    /// Notification category tag
    pub enum NotificationCategory {
        Appointment => "appointment",
        Credits => "credits",
        Rating => "rating",
        Listing => "listing",
    }
}

/// Notification staged by a state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
}

/// Persisted notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub title: String,
    pub body: String,
    pub category: NotificationCategory,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Materialize a staged event
    pub fn from_event(event: NotificationEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id: event.recipient_id,
            sender_id: event.sender_id,
            title: event.title,
            body: event.body,
            category: event.category,
            read: false,
            created_at: Utc::now(),
        }
    }
}
