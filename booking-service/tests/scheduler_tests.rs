mod support;

use booking_service::{CancelAppointment, CompleteAppointment, ConfirmAppointment};
use common::model::{
    AccountStatus, AppointmentStatus, CompletionTrigger, ListingStatus, NotificationCategory,
};
use futures::future::join_all;
use listing_service::SetListingStatus;
use rust_decimal_macros::dec;
use support::{setup, time, tuesday, wednesday};
use uuid::Uuid;

fn appointment_notices(h: &support::Harness, recipient: Uuid) -> Vec<common::model::Notification> {
    h.sink
        .delivered_to(recipient)
        .into_iter()
        .filter(|n| n.category == NotificationCategory::Appointment)
        .collect()
}

#[tokio::test]
async fn test_booking_inside_window_is_scheduled() {
    let h = setup().await;
    let appointment = h.scheduled().await;

    assert_eq!(appointment.status, AppointmentStatus::Scheduled);
    assert_eq!(appointment.seller_id, h.seller);
    assert_eq!(appointment.meeting_point_id, h.meeting_point.id);
    assert_eq!(appointment.total_price, dec!(45000));

    let notices = appointment_notices(&h, h.seller);
    assert_eq!(notices.len(), 1);
    let body = &notices[0].body;
    assert!(body.contains("Bruno Buyer"));
    assert!(body.contains("Used headphones"));
    assert!(body.contains("04/06/2024"));
    assert!(body.contains("10:30"));
    assert!(body.contains("Main square"));
    assert!(body.contains("Total price: 45000"));
    assert!(appointment_notices(&h, h.buyer).is_empty());

    // Stock is not consumed by bookings
    assert_eq!(h.publisher.get(h.listing_id).await.unwrap().stock, 2);
}

#[tokio::test]
async fn test_window_bounds_are_inclusive() {
    let h = setup().await;
    h.scheduler.create(h.booking(tuesday(), time(9, 0))).await.unwrap();
    h.scheduler.create(h.booking(tuesday(), time(12, 0))).await.unwrap();
    assert_eq!(h.scheduler.for_buyer(h.buyer).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_booking_outside_schedule_is_rejected() {
    let h = setup().await;

    let err = h.scheduler.create(h.booking(tuesday(), time(13, 0))).await.unwrap_err();
    assert_eq!(err.code(), "validation_error");
    let message = err.to_string();
    assert!(message.contains("not in seller's schedule"));
    assert!(message.contains("Tuesday"));
    assert!(message.contains("13:00"));

    let err = h.scheduler.create(h.booking(wednesday(), time(10, 30))).await.unwrap_err();
    assert!(err.to_string().contains("Wednesday"));

    assert!(h.scheduler.for_seller(h.seller).await.unwrap().is_empty());
    assert!(appointment_notices(&h, h.seller).is_empty());
}

#[tokio::test]
async fn test_deactivated_window_no_longer_accepts_bookings() {
    let h = setup().await;
    let window = h.calendar.windows_for(h.seller).await.unwrap().remove(0);
    h.calendar.deactivate_window(h.seller, window.id).await.unwrap();

    let err = h.scheduler.create(h.booking(tuesday(), time(10, 30))).await.unwrap_err();
    assert!(err.to_string().contains("not in seller's schedule"));
}

#[tokio::test]
async fn test_self_booking_is_rejected() {
    let h = setup().await;
    let mut booking = h.booking(tuesday(), time(10, 30));
    booking.buyer_id = h.seller;

    let err = h.scheduler.create(booking).await.unwrap_err();
    assert_eq!(err.code(), "validation_error");
    assert!(err.to_string().contains("self-booking"));
}

#[tokio::test]
async fn test_booking_guards() {
    let h = setup().await;

    let mut unknown_listing = h.booking(tuesday(), time(10, 30));
    unknown_listing.listing_id = Uuid::new_v4();
    assert_eq!(h.scheduler.create(unknown_listing).await.unwrap_err().code(), "not_found");

    let mut unknown_buyer = h.booking(tuesday(), time(10, 30));
    unknown_buyer.buyer_id = Uuid::new_v4();
    assert_eq!(h.scheduler.create(unknown_buyer).await.unwrap_err().code(), "not_found");

    h.ledger.set_status(h.seller, AccountStatus::Suspended).await.unwrap();
    assert_eq!(
        h.scheduler.create(h.booking(tuesday(), time(10, 30))).await.unwrap_err().code(),
        "account_inactive"
    );
    h.ledger.set_status(h.seller, AccountStatus::Active).await.unwrap();

    h.ledger.set_status(h.buyer, AccountStatus::Inactive).await.unwrap();
    assert_eq!(
        h.scheduler.create(h.booking(tuesday(), time(10, 30))).await.unwrap_err().code(),
        "account_inactive"
    );
    h.ledger.set_status(h.buyer, AccountStatus::Active).await.unwrap();

    h.publisher
        .set_status(SetListingStatus {
            listing_id: h.listing_id,
            actor_id: h.seller,
            status: ListingStatus::Inactive,
        })
        .await
        .unwrap();
    assert_eq!(
        h.scheduler.create(h.booking(tuesday(), time(10, 30))).await.unwrap_err().code(),
        "conflict"
    );
}

#[tokio::test]
async fn test_confirm_is_seller_only_and_not_idempotent() {
    let h = setup().await;
    let appointment = h.scheduled().await;

    let err = h
        .scheduler
        .confirm(ConfirmAppointment { appointment_id: appointment.id, actor_id: h.buyer })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "authorization_error");

    let confirmed = h
        .scheduler
        .confirm(ConfirmAppointment { appointment_id: appointment.id, actor_id: h.seller })
        .await
        .unwrap();
    assert_eq!(confirmed.status, AppointmentStatus::Confirmed);
    assert!(confirmed.confirmed_at.is_some());

    let err = h
        .scheduler
        .confirm(ConfirmAppointment { appointment_id: appointment.id, actor_id: h.seller })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "conflict");
    assert!(err.to_string().contains("confirmed"));

    let notices = appointment_notices(&h, h.buyer);
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].title, "Appointment confirmed");
}

#[tokio::test]
async fn test_cancel_requires_reason_and_is_terminal() {
    let h = setup().await;
    let appointment = h.confirmed().await;

    let cancel = |reason: &str| CancelAppointment {
        appointment_id: appointment.id,
        actor_id: h.seller,
        reason: reason.to_string(),
    };

    assert_eq!(h.scheduler.cancel(cancel("  ")).await.unwrap_err().code(), "validation_error");
    assert_eq!(
        h.scheduler.get(appointment.id).await.unwrap().status,
        AppointmentStatus::Confirmed
    );

    let cancelled = h.scheduler.cancel(cancel("Item already sold")).await.unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Item already sold"));

    let notices = appointment_notices(&h, h.buyer);
    let last = notices.last().unwrap();
    assert_eq!(last.title, "Appointment cancelled");
    assert!(last.body.contains("Reason: Item already sold"));

    assert_eq!(h.scheduler.cancel(cancel("again")).await.unwrap_err().code(), "conflict");
    let err = h
        .scheduler
        .confirm(ConfirmAppointment { appointment_id: appointment.id, actor_id: h.seller })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("cancelled"));
}

#[tokio::test]
async fn test_buyer_cannot_cancel() {
    let h = setup().await;
    let appointment = h.scheduled().await;
    let err = h
        .scheduler
        .cancel(CancelAppointment {
            appointment_id: appointment.id,
            actor_id: h.buyer,
            reason: "Changed my mind".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "authorization_error");
}

#[tokio::test]
async fn test_manual_completion_requires_confirmation() {
    let h = setup().await;
    let appointment = h.scheduled().await;

    let complete = CompleteAppointment { appointment_id: appointment.id };
    assert_eq!(h.scheduler.complete(complete.clone()).await.unwrap_err().code(), "conflict");

    h.scheduler
        .confirm(ConfirmAppointment { appointment_id: appointment.id, actor_id: h.seller })
        .await
        .unwrap();
    let completed = h.scheduler.complete(complete.clone()).await.unwrap();
    assert_eq!(completed.status, AppointmentStatus::Completed);
    assert_eq!(completed.completion_trigger, Some(CompletionTrigger::Manual));

    for party in [h.buyer, h.seller] {
        assert!(appointment_notices(&h, party)
            .iter()
            .any(|n| n.title == "Appointment completed"));
    }

    assert_eq!(h.scheduler.complete(complete).await.unwrap_err().code(), "conflict");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_confirmations_apply_once() {
    let h = setup().await;
    let appointment = h.scheduled().await;

    let handles = (0..5).map(|_| {
        let scheduler = h.scheduler.clone();
        let input = ConfirmAppointment { appointment_id: appointment.id, actor_id: h.seller };
        tokio::spawn(async move { scheduler.confirm(input).await })
    });
    let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(appointment_notices(&h, h.buyer).len(), 1);
}
