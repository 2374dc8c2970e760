//! Appointment scheduler
//!
//! Every transition runs in its own unit of work with the appointment row
//! locked, so concurrent confirm/cancel/complete calls serialize and the
//! loser sees the state the winner left behind.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use common::db::finish;
use common::error::{Error, ErrorExt, Result};
use common::model::{Account, Appointment, CompletionTrigger, DayOfWeek, Listing};
use common::notify::{self, format_time, LogSink, NotificationSink};
use common::{Store, UnitOfWork};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Input for booking a meeting on a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointment {
    pub listing_id: Uuid,
    pub buyer_id: Uuid,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmAppointment {
    pub appointment_id: Uuid,
    /// Must be the seller
    pub actor_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointment {
    pub appointment_id: Uuid,
    /// Must be the seller
    pub actor_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteAppointment {
    pub appointment_id: Uuid,
}

pub struct AppointmentScheduler {
    store: Arc<dyn Store>,
    sink: Arc<dyn NotificationSink>,
}

impl AppointmentScheduler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_sink(store, Arc::new(LogSink))
    }

    pub fn with_sink(store: Arc<dyn Store>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    /// Book a meeting inside one of the seller's availability windows
    pub async fn create(&self, input: CreateAppointment) -> Result<Appointment> {
        info!(
            "Buyer {} booking listing {} on {} at {}",
            input.buyer_id,
            input.listing_id,
            input.date,
            format_time(input.time)
        );

        let mut tx = self.store.begin_transaction().await?;
        let result = create_in(tx.as_mut(), &input).await;
        let (appointment, notifications) = finish(tx, result).await?;
        self.sink.deliver_all(&notifications);

        info!("Appointment {} scheduled", appointment.id);
        Ok(appointment)
    }

    /// Seller accepts a scheduled appointment
    pub async fn confirm(&self, input: ConfirmAppointment) -> Result<Appointment> {
        let mut tx = self.store.begin_transaction().await?;
        let result = confirm_in(tx.as_mut(), &input).await;
        let (appointment, notifications) = finish(tx, result).await?;
        self.sink.deliver_all(&notifications);

        info!("Appointment {} confirmed", appointment.id);
        Ok(appointment)
    }

    /// Seller rejects or cancels a non-terminal appointment
    pub async fn cancel(&self, input: CancelAppointment) -> Result<Appointment> {
        let mut tx = self.store.begin_transaction().await?;
        let result = cancel_in(tx.as_mut(), &input).await;
        let (appointment, notifications) = finish(tx, result).await?;
        self.sink.deliver_all(&notifications);

        info!("Appointment {} cancelled", appointment.id);
        Ok(appointment)
    }

    /// Manual completion of a confirmed appointment
    pub async fn complete(&self, input: CompleteAppointment) -> Result<Appointment> {
        let mut tx = self.store.begin_transaction().await?;
        let result = async {
            let mut appointment = lock_appointment(tx.as_mut(), input.appointment_id).await?;
            complete_locked(tx.as_mut(), &mut appointment, CompletionTrigger::Manual).await?;
            Ok::<Appointment, Error>(appointment)
        }
        .await;
        let (appointment, notifications) = finish(tx, result).await?;
        self.sink.deliver_all(&notifications);

        info!("Appointment {} completed manually", appointment.id);
        Ok(appointment)
    }

    pub async fn get(&self, id: Uuid) -> Result<Appointment> {
        self.store
            .get_appointment(id)
            .await
            .with_context(|| format!("Failed to retrieve appointment {}", id))?
            .ok_or_else(|| Error::NotFound(format!("appointment {}", id)))
    }

    /// Appointments where the account sells, newest first
    pub async fn for_seller(&self, seller_id: Uuid) -> Result<Vec<Appointment>> {
        self.store.appointments_for_seller(seller_id).await
    }

    /// Appointments where the account buys, newest first
    pub async fn for_buyer(&self, buyer_id: Uuid) -> Result<Vec<Appointment>> {
        self.store.appointments_for_buyer(buyer_id).await
    }
}

async fn create_in(tx: &mut dyn UnitOfWork, input: &CreateAppointment) -> Result<Appointment> {
    let listing = tx
        .get_listing(input.listing_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("listing {}", input.listing_id)))?;
    if listing.seller_id == input.buyer_id {
        return Err(Error::ValidationError(
            "self-booking forbidden: buyers cannot book their own listing".to_string(),
        ));
    }

    let buyer = tx
        .get_account(input.buyer_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("buyer {}", input.buyer_id)))?;
    if !buyer.is_active() {
        return Err(Error::AccountInactive(format!(
            "buyer {} is {}",
            buyer.id, buyer.status
        )));
    }

    if !listing.is_active() {
        return Err(Error::Conflict(format!(
            "listing {} is {}",
            listing.id, listing.status
        )));
    }
    let seller = tx
        .get_account(listing.seller_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("seller {}", listing.seller_id)))?;
    if !seller.is_active() {
        return Err(Error::AccountInactive(format!(
            "seller {} is {}",
            seller.id, seller.status
        )));
    }
    if !listing.has_stock() {
        return Err(Error::Conflict(format!("listing {} has no stock left", listing.id)));
    }

    let day = DayOfWeek::from_date(input.date);
    let window = tx.find_window(seller.id, day, input.time).await?;
    let Some(window) = window else {
        return Err(Error::ValidationError(format!(
            "{} at {} is not in seller's schedule",
            day,
            format_time(input.time)
        )));
    };
    debug!("Booking falls inside window {}", window.id);

    let meeting_point = tx
        .get_meeting_point(listing.meeting_point_id)
        .await?
        .ok_or_else(|| {
            Error::InvalidMeetingPoint(format!(
                "meeting point {} does not exist",
                listing.meeting_point_id
            ))
        })?;

    let appointment = Appointment::new(
        listing.id,
        buyer.id,
        seller.id,
        meeting_point.id,
        input.date,
        input.time,
        listing.price,
    );
    tx.insert_appointment(&appointment).await?;
    tx.emit(notify::appointment_requested(&appointment, &buyer, &listing, &meeting_point));
    Ok(appointment)
}

async fn confirm_in(tx: &mut dyn UnitOfWork, input: &ConfirmAppointment) -> Result<Appointment> {
    let mut appointment = lock_appointment(tx, input.appointment_id).await?;
    require_seller(&appointment, input.actor_id)?;
    appointment.confirm()?;
    tx.save_appointment(&appointment).await?;

    let (seller, listing) = seller_and_listing(tx, &appointment).await?;
    tx.emit(notify::appointment_confirmed(&appointment, &seller, &listing));
    Ok(appointment)
}

async fn cancel_in(tx: &mut dyn UnitOfWork, input: &CancelAppointment) -> Result<Appointment> {
    let mut appointment = lock_appointment(tx, input.appointment_id).await?;
    require_seller(&appointment, input.actor_id)?;
    appointment.cancel(&input.reason)?;
    tx.save_appointment(&appointment).await?;

    let (seller, listing) = seller_and_listing(tx, &appointment).await?;
    tx.emit(notify::appointment_cancelled(&appointment, &seller, &listing));
    Ok(appointment)
}

/// The single completion transition shared by manual completion and the
/// rating pair trigger. The appointment row must already be locked.
pub(crate) async fn complete_locked(
    tx: &mut dyn UnitOfWork,
    appointment: &mut Appointment,
    trigger: CompletionTrigger,
) -> Result<()> {
    appointment.complete(trigger)?;
    tx.save_appointment(appointment).await?;

    let listing = listing_of(tx, appointment).await?;
    for event in notify::appointment_completed(appointment, &listing) {
        tx.emit(event);
    }
    debug!("Appointment {} completed by {}", appointment.id, trigger);
    Ok(())
}

pub(crate) async fn lock_appointment(tx: &mut dyn UnitOfWork, id: Uuid) -> Result<Appointment> {
    tx.lock_appointment(id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("appointment {}", id)))
}

fn require_seller(appointment: &Appointment, actor_id: Uuid) -> Result<()> {
    if appointment.seller_id != actor_id {
        return Err(Error::AuthorizationError(format!(
            "only the seller may change appointment {}",
            appointment.id
        )));
    }
    Ok(())
}

async fn listing_of(tx: &mut dyn UnitOfWork, appointment: &Appointment) -> Result<Listing> {
    tx.get_listing(appointment.listing_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("listing {}", appointment.listing_id)))
}

async fn seller_and_listing(
    tx: &mut dyn UnitOfWork,
    appointment: &Appointment,
) -> Result<(Account, Listing)> {
    let seller = tx
        .get_account(appointment.seller_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("seller {}", appointment.seller_id)))?;
    let listing = listing_of(tx, appointment).await?;
    Ok((seller, listing))
}
