//! Ratings and the rating-driven completion trigger
//!
//! A rating locks the appointment, then the rated account while its average
//! is recomputed. Once both directions are present on a confirmed
//! appointment it is completed through the scheduler's transition.

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime, Utc};
use common::db::finish;
use common::decimal::Decimal;
use common::error::{Error, Result};
use common::model::rating::average;
use common::model::{
    Appointment, AppointmentStatus, CompletionTrigger, Rating, RatingDirection, Score,
};
use common::notify::{self, LogSink, NotificationSink};
use common::{Store, UnitOfWork};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::scheduler::{complete_locked, lock_appointment};

/// Input for rating the other party of an appointment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRating {
    pub appointment_id: Uuid,
    pub rater_id: Uuid,
    pub direction: RatingDirection,
    /// 1 to 5
    pub score: u8,
    pub comment: Option<String>,
}

/// Result of a successful rating
#[derive(Debug, Clone)]
pub struct RatingOutcome {
    pub rating: Rating,
    /// Rated account's new average
    pub average_score: Option<Decimal>,
    /// Appointment as left by this rating
    pub appointment: Appointment,
}

/// Whether a user may rate an appointment in a given direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingEligibility {
    pub allowed: bool,
    pub reason: Option<String>,
}

/// An appointment the user has met on but not yet rated
#[derive(Debug, Clone)]
pub struct PendingRating {
    pub appointment: Appointment,
    /// Direction the user rates in
    pub direction: RatingDirection,
    pub minutes_since_meeting: i64,
}

/// Summary of a user's outstanding ratings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRatingsAlert {
    pub has_pending: bool,
    pub count: usize,
    /// Minutes since the oldest unrated meeting, 0 when none
    pub oldest_minutes: i64,
}

pub struct RatingService {
    store: Arc<dyn Store>,
    sink: Arc<dyn NotificationSink>,
    delay: Duration,
}

impl RatingService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_sink(store, Arc::new(LogSink))
    }

    pub fn with_sink(store: Arc<dyn Store>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink, delay: Duration::zero() }
    }

    /// Extra wait after the meeting time before ratings open; negative values count as zero
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay.max(Duration::zero());
        self
    }

    pub async fn submit(&self, input: SubmitRating) -> Result<RatingOutcome> {
        let score = Score::new(input.score)?;
        info!(
            "Account {} rating appointment {} ({}) with {}",
            input.rater_id, input.appointment_id, input.direction, score
        );

        let rules = self.rules();
        let mut tx = self.store.begin_transaction().await?;
        let result = submit_in(tx.as_mut(), &input, score, &rules).await;
        let (outcome, notifications) = finish(tx, result).await?;
        self.sink.deliver_all(&notifications);

        info!(
            "Rating {} stored, appointment {} is {}",
            outcome.rating.id, outcome.appointment.id, outcome.appointment.status
        );
        Ok(outcome)
    }

    /// Ratings of an appointment, oldest first
    pub async fn ratings_for(&self, appointment_id: Uuid) -> Result<Vec<Rating>> {
        self.store.ratings_for_appointment(appointment_id).await
    }

    /// Active ratings the user has received, newest first
    pub async fn received_by(&self, user_id: Uuid) -> Result<Vec<Rating>> {
        self.store.ratings_received(user_id).await
    }

    /// Appointments the user can rate right now, latest meeting first
    pub async fn pending_for(&self, user_id: Uuid) -> Result<Vec<PendingRating>> {
        let rules = self.rules();
        let pending = self
            .store
            .unrated_appointments_for(user_id)
            .await?
            .into_iter()
            .filter(|a| rules.is_open(a))
            .map(|appointment| {
                let direction = if appointment.buyer_id == user_id {
                    RatingDirection::BuyerToSeller
                } else {
                    RatingDirection::SellerToBuyer
                };
                let minutes_since_meeting = (rules.now - appointment.meeting_at()).num_minutes();
                PendingRating { appointment, direction, minutes_since_meeting }
            })
            .collect::<Vec<_>>();
        debug!("Account {} has {} ratings pending", user_id, pending.len());
        Ok(pending)
    }

    pub async fn pending_alert(&self, user_id: Uuid) -> Result<PendingRatingsAlert> {
        let pending = self.pending_for(user_id).await?;
        Ok(PendingRatingsAlert {
            has_pending: !pending.is_empty(),
            count: pending.len(),
            oldest_minutes: pending
                .iter()
                .map(|p| p.minutes_since_meeting)
                .max()
                .unwrap_or(0),
        })
    }

    fn rules(&self) -> Rules {
        Rules { delay: self.delay, now: Utc::now().naive_utc() }
    }

    /// Check the rating rules without writing anything
    pub async fn can_rate(
        &self,
        appointment_id: Uuid,
        user_id: Uuid,
        direction: RatingDirection,
    ) -> Result<RatingEligibility> {
        let appointment = self
            .store
            .get_appointment(appointment_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("appointment {}", appointment_id)))?;
        let already_rated = self
            .store
            .ratings_for_appointment(appointment_id)
            .await?
            .iter()
            .any(|r| r.rater_id == user_id && r.direction == direction);

        let rules = self.rules();
        match rules.check(&appointment, user_id, direction, already_rated) {
            Ok(()) => Ok(RatingEligibility { allowed: true, reason: None }),
            Err(e @ (Error::Conflict(_) | Error::AuthorizationError(_))) => {
                Ok(RatingEligibility { allowed: false, reason: Some(e.to_string()) })
            }
            Err(e) => Err(e),
        }
    }
}

/// `now` is UTC wall-clock time, compared with the meeting's stored date and time
struct Rules {
    delay: Duration,
    now: NaiveDateTime,
}

impl Rules {
    fn opens_at(&self, appointment: &Appointment) -> NaiveDateTime {
        appointment.meeting_at() + self.delay
    }

    fn is_open(&self, appointment: &Appointment) -> bool {
        self.now >= self.opens_at(appointment)
    }

    fn check(
        &self,
        appointment: &Appointment,
        rater_id: Uuid,
        direction: RatingDirection,
        already_rated: bool,
    ) -> Result<()> {
        if !matches!(
            appointment.status,
            AppointmentStatus::Confirmed | AppointmentStatus::Completed
        ) {
            return Err(Error::Conflict(format!(
                "appointment {} is {} and cannot be rated",
                appointment.id, appointment.status
            )));
        }
        if !appointment.is_participant(rater_id) {
            return Err(Error::AuthorizationError(format!(
                "account {} is not part of appointment {}",
                rater_id, appointment.id
            )));
        }
        let expected = match direction {
            RatingDirection::BuyerToSeller => appointment.buyer_id,
            RatingDirection::SellerToBuyer => appointment.seller_id,
        };
        if expected != rater_id {
            return Err(Error::AuthorizationError(format!(
                "only the {} may rate {}",
                direction.rater_role(),
                direction
            )));
        }
        if !self.is_open(appointment) {
            return Err(Error::Conflict(format!(
                "ratings for appointment {} open at {}",
                appointment.id,
                self.opens_at(appointment).format("%d/%m/%Y %H:%M")
            )));
        }
        if already_rated {
            return Err(Error::Conflict(format!(
                "account {} already rated appointment {} ({})",
                rater_id, appointment.id, direction
            )));
        }
        Ok(())
    }
}

async fn submit_in(
    tx: &mut dyn UnitOfWork,
    input: &SubmitRating,
    score: Score,
    rules: &Rules,
) -> Result<RatingOutcome> {
    let mut appointment = lock_appointment(tx, input.appointment_id).await?;
    let already_rated = tx
        .find_rating(appointment.id, input.rater_id, input.direction)
        .await?
        .is_some();
    rules.check(&appointment, input.rater_id, input.direction, already_rated)?;

    let rated_id = match input.direction {
        RatingDirection::BuyerToSeller => appointment.seller_id,
        RatingDirection::SellerToBuyer => appointment.buyer_id,
    };
    let rating = Rating::new(
        appointment.id,
        appointment.listing_id,
        input.rater_id,
        rated_id,
        input.direction,
        score,
        input.comment.clone(),
    );
    tx.insert_rating(&rating).await?;

    tx.lock_account(rated_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("account {}", rated_id)))?;
    let scores = tx.active_scores_for(rated_id).await?;
    let average_score = average(&scores);
    tx.set_average_score(rated_id, average_score).await?;
    debug!("Account {} now averages {:?} over {} ratings", rated_id, average_score, scores.len());

    let rater = tx
        .get_account(input.rater_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("account {}", input.rater_id)))?;
    tx.emit(notify::rating_received(&rating, &rater));

    if appointment.status == AppointmentStatus::Confirmed {
        let ratings = tx.ratings_for_appointment(appointment.id).await?;
        let has_opposite = ratings
            .iter()
            .any(|r| r.is_active() && r.direction == input.direction.opposite());
        if has_opposite {
            complete_locked(tx, &mut appointment, CompletionTrigger::RatingPair).await?;
        }
    }

    Ok(RatingOutcome { rating, average_score, appointment })
}
