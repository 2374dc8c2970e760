//! Booking: seller availability, the appointment state machine and the
//! rating-driven completion trigger

pub mod calendar;
pub mod ratings;
pub mod scheduler;

pub use calendar::{AddWindow, AvailabilityCalendar};
pub use ratings::{
    PendingRating, PendingRatingsAlert, RatingEligibility, RatingOutcome, RatingService,
    SubmitRating,
};
pub use scheduler::{
    AppointmentScheduler, CancelAppointment, CompleteAppointment, ConfirmAppointment,
    CreateAppointment,
};
