//! End-to-end demo flow over a wired marketplace

use booking_service::{AddWindow, ConfirmAppointment, CreateAppointment, SubmitRating};
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Utc};
use common::error::{Error, Result};
use common::model::{
    Category, CreditPack, DayOfWeek, MeetingPoint, NewListing, RatingDirection, ReviewDecision,
    Role,
};
use ledger_service::{RegisterAccount, ReviewCreditTransaction, SubmitCreditTransaction};
use listing_service::PublishListing;
use rust_decimal_macros::dec;
use tracing::info;
use uuid::Uuid;

use crate::Marketplace;

fn at(hour: u32, minute: u32) -> Result<NaiveTime> {
    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| Error::Internal(format!("invalid time {}:{}", hour, minute)))
}

/// A Tuesday at least a week in the past, so ratings are open
fn past_tuesday(today: NaiveDate) -> NaiveDate {
    let since_tuesday = (today.weekday().num_days_from_sunday() + 5) % 7;
    today - Duration::days(i64::from(since_tuesday) + 7)
}

async fn register(market: &Marketplace, name: &str, role: Role) -> Result<Uuid> {
    let account = market
        .ledger
        .register_account(RegisterAccount {
            name: name.to_string(),
            role,
            opening_balance: None,
        })
        .await?;
    Ok(account.id)
}

/// Run one full cycle: buy credits, publish, book, confirm and rate
pub async fn run(market: &Marketplace) -> Result<()> {
    info!("Creating demo data...");
    let store = market.store();

    let category = Category::new("Books".to_string());
    store.insert_category(&category).await?;
    let meeting_point = MeetingPoint::new(
        "Central library".to_string(),
        Some("Main campus, north entrance".to_string()),
    );
    store.insert_meeting_point(&meeting_point).await?;
    let pack = CreditPack::new("Starter pack".to_string(), 10, dec!(10000));
    store.insert_pack(&pack).await?;

    let admin = register(market, "Marketplace admin", Role::Admin).await?;
    let seller = register(market, "Sofia", Role::Seller).await?;
    let buyer = register(market, "Bruno", Role::Buyer).await?;

    let purchase = market
        .credits
        .submit(SubmitCreditTransaction {
            account_id: seller,
            pack_id: pack.id,
            proof_ref: "transfer-0001.png".to_string(),
            credits: None,
            amount_paid: Some(pack.price),
        })
        .await?;
    market
        .credits
        .review(ReviewCreditTransaction {
            transaction_id: purchase.id,
            decision: ReviewDecision::Approve,
            reviewer_id: admin,
            comment: None,
        })
        .await?;

    let publication = market
        .listings
        .publish(PublishListing {
            seller_id: seller,
            listing: NewListing {
                name: "Introduction to Algorithms".to_string(),
                description: "Third edition, hardcover, like new".to_string(),
                price: dec!(60000),
                category_id: category.id,
                meeting_point_id: meeting_point.id,
            },
            stock: 3,
        })
        .await?;
    info!(
        "Seller balance after publishing: {} credits",
        publication.remaining_balance
    );

    market
        .calendar
        .add_window(AddWindow {
            seller_id: seller,
            day: DayOfWeek::Tuesday,
            start: at(9, 0)?,
            end: at(12, 0)?,
        })
        .await?;

    let appointment = market
        .appointments
        .create(CreateAppointment {
            listing_id: publication.listing.id,
            buyer_id: buyer,
            date: past_tuesday(Utc::now().date_naive()),
            time: at(10, 30)?,
        })
        .await?;
    market
        .appointments
        .confirm(ConfirmAppointment { appointment_id: appointment.id, actor_id: seller })
        .await?;

    for (rater, direction, score) in [
        (buyer, RatingDirection::BuyerToSeller, 5),
        (seller, RatingDirection::SellerToBuyer, 4),
    ] {
        market
            .ratings
            .submit(SubmitRating {
                appointment_id: appointment.id,
                rater_id: rater,
                direction,
                score,
                comment: None,
            })
            .await?;
    }

    let appointment = market.appointments.get(appointment.id).await?;
    info!("Appointment {} ended as {}", appointment.id, appointment.status);

    for (name, id) in [("seller", seller), ("buyer", buyer)] {
        let account = market.ledger.get_account(id).await?;
        let inbox = market.inbox.notifications_for(id).await?;
        info!(
            "{}: balance {}, average score {:?}, {} notifications",
            name,
            account.credit_balance,
            account.average_score,
            inbox.len()
        );
    }
    Ok(())
}
