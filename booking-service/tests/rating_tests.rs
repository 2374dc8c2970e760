mod support;

use booking_service::{
    CancelAppointment, CompleteAppointment, ConfirmAppointment, CreateAppointment, RatingService,
    SubmitRating,
};
use chrono::{Duration, NaiveDate};
use common::model::{
    AppointmentStatus, CompletionTrigger, NotificationCategory, RatingDirection, Role,
};
use futures::future::join_all;
use rust_decimal_macros::dec;
use support::{register, setup, setup_with_ratings, time, tuesday, Harness};
use uuid::Uuid;

fn rating(appointment_id: Uuid, rater_id: Uuid, direction: RatingDirection, score: u8) -> SubmitRating {
    SubmitRating {
        appointment_id,
        rater_id,
        direction,
        score,
        comment: Some("Punctual and friendly".to_string()),
    }
}

#[tokio::test]
async fn test_rating_pair_completes_appointment() {
    let h = setup().await;
    let appointment = h.confirmed().await;

    let first = h
        .ratings
        .submit(rating(appointment.id, h.buyer, RatingDirection::BuyerToSeller, 4))
        .await
        .unwrap();
    assert_eq!(first.appointment.status, AppointmentStatus::Confirmed);
    assert_eq!(first.rating.rated_id, h.seller);
    assert_eq!(first.average_score, Some(dec!(4)));
    assert_eq!(
        h.scheduler.get(appointment.id).await.unwrap().status,
        AppointmentStatus::Confirmed
    );

    let second = h
        .ratings
        .submit(rating(appointment.id, h.seller, RatingDirection::SellerToBuyer, 5))
        .await
        .unwrap();
    assert_eq!(second.appointment.status, AppointmentStatus::Completed);
    assert_eq!(second.appointment.completion_trigger, Some(CompletionTrigger::RatingPair));

    let stored = h.scheduler.get(appointment.id).await.unwrap();
    assert_eq!(stored.status, AppointmentStatus::Completed);
    assert!(stored.completed_at.is_some());

    assert_eq!(h.ledger.get_account(h.seller).await.unwrap().average_score, Some(dec!(4)));
    assert_eq!(h.ledger.get_account(h.buyer).await.unwrap().average_score, Some(dec!(5)));
    assert_eq!(h.ratings.ratings_for(appointment.id).await.unwrap().len(), 2);

    for party in [h.buyer, h.seller] {
        let completed = h
            .sink
            .delivered_to(party)
            .into_iter()
            .filter(|n| n.title == "Appointment completed")
            .count();
        assert_eq!(completed, 1);
    }
}

#[tokio::test]
async fn test_rated_party_is_notified() {
    let h = setup().await;
    let appointment = h.confirmed().await;
    h.ratings
        .submit(rating(appointment.id, h.buyer, RatingDirection::BuyerToSeller, 1))
        .await
        .unwrap();

    let notices: Vec<_> = h
        .sink
        .delivered_to(h.seller)
        .into_iter()
        .filter(|n| n.category == NotificationCategory::Rating)
        .collect();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].title, "New rating received: 1/5");
    assert!(notices[0].body.contains("Bruno Buyer rated you 1 star as seller"));
    assert!(notices[0].body.contains("Punctual and friendly"));
    assert_eq!(notices[0].sender_id, Some(h.buyer));
}

#[tokio::test]
async fn test_duplicate_rating_conflicts() {
    let h = setup().await;
    let appointment = h.confirmed().await;
    let input = rating(appointment.id, h.buyer, RatingDirection::BuyerToSeller, 3);

    h.ratings.submit(input.clone()).await.unwrap();
    let err = h.ratings.submit(input).await.unwrap_err();
    assert_eq!(err.code(), "conflict");
    assert_eq!(h.ratings.ratings_for(appointment.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_rater_must_match_direction() {
    let h = setup().await;
    let appointment = h.confirmed().await;

    let outsider = register(&h.ledger, "Olga Outsider", Role::Buyer, 0).await;
    let err = h
        .ratings
        .submit(rating(appointment.id, outsider, RatingDirection::BuyerToSeller, 3))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "authorization_error");

    let err = h
        .ratings
        .submit(rating(appointment.id, h.seller, RatingDirection::BuyerToSeller, 3))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "authorization_error");

    assert!(h.ratings.ratings_for(appointment.id).await.unwrap().is_empty());
    assert_eq!(h.ledger.get_account(h.seller).await.unwrap().average_score, None);
}

#[tokio::test]
async fn test_only_confirmed_or_completed_appointments_can_be_rated() {
    let h = setup().await;
    let scheduled = h.scheduled().await;
    let err = h
        .ratings
        .submit(rating(scheduled.id, h.buyer, RatingDirection::BuyerToSeller, 3))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "conflict");

    h.scheduler
        .cancel(CancelAppointment {
            appointment_id: scheduled.id,
            actor_id: h.seller,
            reason: "Not available".to_string(),
        })
        .await
        .unwrap();
    let err = h
        .ratings
        .submit(rating(scheduled.id, h.buyer, RatingDirection::BuyerToSeller, 3))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "conflict");
}

#[tokio::test]
async fn test_score_out_of_range_is_rejected() {
    let h = setup().await;
    let appointment = h.confirmed().await;
    for score in [0, 6] {
        let err = h
            .ratings
            .submit(rating(appointment.id, h.buyer, RatingDirection::BuyerToSeller, score))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }
}

#[tokio::test]
async fn test_ratings_after_manual_completion_leave_state_alone() {
    let h = setup().await;
    let appointment = h.confirmed().await;
    h.scheduler
        .complete(CompleteAppointment { appointment_id: appointment.id })
        .await
        .unwrap();

    h.ratings
        .submit(rating(appointment.id, h.buyer, RatingDirection::BuyerToSeller, 5))
        .await
        .unwrap();
    let outcome = h
        .ratings
        .submit(rating(appointment.id, h.seller, RatingDirection::SellerToBuyer, 5))
        .await
        .unwrap();

    assert_eq!(outcome.appointment.status, AppointmentStatus::Completed);
    assert_eq!(outcome.appointment.completion_trigger, Some(CompletionTrigger::Manual));
    let completed_notices = h
        .sink
        .delivered_to(h.buyer)
        .into_iter()
        .filter(|n| n.title == "Appointment completed")
        .count();
    assert_eq!(completed_notices, 1);
}

#[tokio::test]
async fn test_average_spans_appointments() {
    let h = setup().await;
    let first = h.confirmed().await;
    let second = h.confirmed().await;
    let third = h.confirmed().await;

    for (appointment, score) in [(first.id, 5), (second.id, 4), (third.id, 4)] {
        h.ratings
            .submit(rating(appointment, h.buyer, RatingDirection::BuyerToSeller, score))
            .await
            .unwrap();
    }
    assert_eq!(h.ledger.get_account(h.seller).await.unwrap().average_score, Some(dec!(4.33)));
}

#[tokio::test]
async fn test_can_rate_reports_reason() {
    let h = setup().await;
    let appointment = h.confirmed().await;

    let eligibility = h
        .ratings
        .can_rate(appointment.id, h.buyer, RatingDirection::BuyerToSeller)
        .await
        .unwrap();
    assert!(eligibility.allowed);
    assert!(eligibility.reason.is_none());

    h.ratings
        .submit(rating(appointment.id, h.buyer, RatingDirection::BuyerToSeller, 4))
        .await
        .unwrap();
    let eligibility = h
        .ratings
        .can_rate(appointment.id, h.buyer, RatingDirection::BuyerToSeller)
        .await
        .unwrap();
    assert!(!eligibility.allowed);
    assert!(eligibility.reason.unwrap().contains("already rated"));

    let eligibility = h
        .ratings
        .can_rate(appointment.id, h.buyer, RatingDirection::SellerToBuyer)
        .await
        .unwrap();
    assert!(!eligibility.allowed);

    assert_eq!(
        h.ratings
            .can_rate(Uuid::new_v4(), h.buyer, RatingDirection::BuyerToSeller)
            .await
            .unwrap_err()
            .code(),
        "not_found"
    );
}

#[tokio::test]
async fn test_rating_delay_after_meeting() {
    let h = setup_with_ratings(|store, sink| {
        RatingService::with_sink(store, sink).with_delay(Duration::minutes(30))
    })
    .await;

    // A Tuesday far in the future
    let future = NaiveDate::from_ymd_opt(2099, 6, 2).unwrap();
    let booked = h
        .scheduler
        .create(CreateAppointment {
            listing_id: h.listing_id,
            buyer_id: h.buyer,
            date: future,
            time: time(10, 0),
        })
        .await
        .unwrap();
    h.scheduler
        .confirm(booking_service::ConfirmAppointment {
            appointment_id: booked.id,
            actor_id: h.seller,
        })
        .await
        .unwrap();

    let err = h
        .ratings
        .submit(rating(booked.id, h.buyer, RatingDirection::BuyerToSeller, 5))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "conflict");
    assert!(err.to_string().contains("open at 02/06/2099 10:30"));

    // Past meetings are open
    let past = h.confirmed().await;
    h.ratings
        .submit(rating(past.id, h.buyer, RatingDirection::BuyerToSeller, 5))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_ratings_store_one() {
    let h = setup().await;
    let appointment = h.confirmed().await;

    let handles = (0..4).map(|_| {
        let ratings = h.ratings.clone();
        let input = rating(appointment.id, h.buyer, RatingDirection::BuyerToSeller, 5);
        tokio::spawn(async move { ratings.submit(input).await })
    });
    let results: Vec<_> = join_all(handles).await.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(h.ratings.ratings_for(appointment.id).await.unwrap().len(), 1);
}

async fn confirmed_on(h: &Harness, date: NaiveDate, at: chrono::NaiveTime) -> common::model::Appointment {
    let booked = h.scheduler.create(h.booking(date, at)).await.unwrap();
    h.scheduler
        .confirm(ConfirmAppointment { appointment_id: booked.id, actor_id: h.seller })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_future_meeting_cannot_be_rated_without_delay() {
    let h = setup().await;
    // 2099-06-02 is a Tuesday
    let future = confirmed_on(&h, NaiveDate::from_ymd_opt(2099, 6, 2).unwrap(), time(10, 0)).await;

    for (rater, direction) in [
        (h.buyer, RatingDirection::BuyerToSeller),
        (h.seller, RatingDirection::SellerToBuyer),
    ] {
        let err = h.ratings.submit(rating(future.id, rater, direction, 5)).await.unwrap_err();
        assert_eq!(err.code(), "conflict");
        assert!(err.to_string().contains("open at 02/06/2099 10:00"));

        let eligibility = h.ratings.can_rate(future.id, rater, direction).await.unwrap();
        assert!(!eligibility.allowed);
    }

    assert_eq!(
        h.scheduler.get(future.id).await.unwrap().status,
        AppointmentStatus::Confirmed
    );
    assert!(h.ratings.ratings_for(future.id).await.unwrap().is_empty());
    assert!(h.ratings.pending_for(h.buyer).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pending_ratings_per_party() {
    let h = setup().await;
    let early = confirmed_on(&h, tuesday(), time(10, 0)).await;
    let late = confirmed_on(&h, tuesday(), time(11, 0)).await;
    h.scheduled().await;
    confirmed_on(&h, NaiveDate::from_ymd_opt(2099, 6, 2).unwrap(), time(10, 0)).await;

    let pending = h.ratings.pending_for(h.buyer).await.unwrap();
    let ids: Vec<_> = pending.iter().map(|p| p.appointment.id).collect();
    assert_eq!(ids, vec![late.id, early.id]);
    assert!(pending.iter().all(|p| p.direction == RatingDirection::BuyerToSeller));
    assert!(pending[1].minutes_since_meeting > pending[0].minutes_since_meeting);

    h.ratings
        .submit(rating(early.id, h.buyer, RatingDirection::BuyerToSeller, 4))
        .await
        .unwrap();

    let pending = h.ratings.pending_for(h.buyer).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].appointment.id, late.id);

    let seller_pending = h.ratings.pending_for(h.seller).await.unwrap();
    assert_eq!(seller_pending.len(), 2);
    assert!(seller_pending.iter().all(|p| p.direction == RatingDirection::SellerToBuyer));

    let alert = h.ratings.pending_alert(h.seller).await.unwrap();
    assert!(alert.has_pending);
    assert_eq!(alert.count, 2);
    assert!(alert.oldest_minutes >= seller_pending[1].minutes_since_meeting);

    h.ratings
        .submit(rating(early.id, h.seller, RatingDirection::SellerToBuyer, 5))
        .await
        .unwrap();
    assert_eq!(h.ratings.pending_alert(h.seller).await.unwrap().count, 1);

    let stranger = register(&h.ledger, "Nadia Nobody", Role::Buyer, 0).await;
    let alert = h.ratings.pending_alert(stranger).await.unwrap();
    assert!(!alert.has_pending);
    assert_eq!(alert.count, 0);
    assert_eq!(alert.oldest_minutes, 0);
}

#[tokio::test]
async fn test_received_ratings_newest_first() {
    let h = setup().await;
    let first = h.confirmed().await;
    let second = h.confirmed().await;

    for (appointment, score) in [(first.id, 3), (second.id, 5)] {
        h.ratings
            .submit(rating(appointment, h.buyer, RatingDirection::BuyerToSeller, score))
            .await
            .unwrap();
    }

    let received = h.ratings.received_by(h.seller).await.unwrap();
    assert_eq!(received.len(), 2);
    assert!(received.iter().all(|r| r.rated_id == h.seller && r.rater_id == h.buyer));
    assert!(received[0].created_at >= received[1].created_at);

    assert!(h.ratings.received_by(h.buyer).await.unwrap().is_empty());
}
