//! Seller availability calendar

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use common::error::{Error, Result};
use common::model::{AvailabilityWindow, DayOfWeek, Role, WindowStatus};
use common::Store;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

/// Input for declaring a weekly availability window
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddWindow {
    pub seller_id: Uuid,
    pub day: DayOfWeek,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

pub struct AvailabilityCalendar {
    store: Arc<dyn Store>,
}

impl AvailabilityCalendar {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Declare a window; overlapping windows are allowed
    pub async fn add_window(&self, input: AddWindow) -> Result<AvailabilityWindow> {
        let seller = self
            .store
            .get_account(input.seller_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("seller {}", input.seller_id)))?;
        if seller.role != Role::Seller {
            return Err(Error::AuthorizationError(format!(
                "account {} is not a seller",
                seller.id
            )));
        }

        let window = AvailabilityWindow::new(seller.id, input.day, input.start, input.end)?;
        self.store.insert_window(&window).await?;
        info!(
            "Seller {} available on {} {}-{}",
            seller.id,
            window.day,
            window.start.format("%H:%M"),
            window.end.format("%H:%M")
        );
        Ok(window)
    }

    /// Active windows of a seller
    pub async fn windows_for(&self, seller_id: Uuid) -> Result<Vec<AvailabilityWindow>> {
        let windows = self.store.windows_for_seller(seller_id).await?;
        Ok(windows.into_iter().filter(|w| w.is_active()).collect())
    }

    /// Soft-delete a window owned by the seller
    pub async fn deactivate_window(&self, seller_id: Uuid, window_id: Uuid) -> Result<()> {
        let window = self
            .store
            .get_window(window_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("availability window {}", window_id)))?;
        if window.seller_id != seller_id {
            return Err(Error::AuthorizationError(format!(
                "account {} does not own window {}",
                seller_id, window_id
            )));
        }
        self.store.set_window_status(window_id, WindowStatus::Inactive).await
    }

    /// Whether a booking at this date and time falls inside an active window
    pub async fn is_available(&self, seller_id: Uuid, date: NaiveDate, time: NaiveTime) -> Result<bool> {
        let day = DayOfWeek::from_date(date);
        Ok(self
            .windows_for(seller_id)
            .await?
            .iter()
            .any(|w| w.contains(day, time)))
    }
}
