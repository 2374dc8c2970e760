#![allow(dead_code)]

use std::sync::Arc;

use booking_service::{
    AddWindow, AppointmentScheduler, AvailabilityCalendar, ConfirmAppointment, CreateAppointment,
    RatingService,
};
use chrono::{NaiveDate, NaiveTime};
use common::db::InMemoryStore;
use common::model::{Appointment, Category, DayOfWeek, MeetingPoint, NewListing, Role};
use common::notify::RecordingSink;
use common::Store;
use ledger_service::{LedgerService, RegisterAccount};
use listing_service::{ListingPublisher, PublishListing};
use rust_decimal_macros::dec;
use uuid::Uuid;

pub struct Harness {
    pub store: Arc<dyn Store>,
    pub sink: RecordingSink,
    pub ledger: LedgerService,
    pub publisher: ListingPublisher,
    pub calendar: AvailabilityCalendar,
    pub scheduler: Arc<AppointmentScheduler>,
    pub ratings: Arc<RatingService>,
    pub seller: Uuid,
    pub buyer: Uuid,
    pub listing_id: Uuid,
    pub meeting_point: MeetingPoint,
}

pub fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

/// 2024-06-04 is a Tuesday
pub fn tuesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 4).unwrap()
}

pub fn wednesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 5).unwrap()
}

pub async fn register(ledger: &LedgerService, name: &str, role: Role, balance: i64) -> Uuid {
    ledger
        .register_account(RegisterAccount {
            name: name.to_string(),
            role,
            opening_balance: Some(balance),
        })
        .await
        .unwrap()
        .id
}

/// Seller with a published listing and a Tuesday 09:00-12:00 window, plus a buyer
pub async fn setup() -> Harness {
    setup_with_ratings(|store, sink| RatingService::with_sink(store, sink)).await
}

pub async fn setup_with_ratings(
    build: impl FnOnce(Arc<dyn Store>, Arc<RecordingSink>) -> RatingService,
) -> Harness {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let sink = RecordingSink::new();
    let ledger = LedgerService::new(store.clone());
    let publisher = ListingPublisher::with_sink(store.clone(), Arc::new(sink.clone()));
    let calendar = AvailabilityCalendar::new(store.clone());
    let scheduler = Arc::new(AppointmentScheduler::with_sink(store.clone(), Arc::new(sink.clone())));
    let ratings = Arc::new(build(store.clone(), Arc::new(sink.clone())));

    let category = Category::new("Electronics".to_string());
    store.insert_category(&category).await.unwrap();
    let meeting_point = MeetingPoint::new("Main square".to_string(), Some("Plaza 1".to_string()));
    store.insert_meeting_point(&meeting_point).await.unwrap();

    let seller = register(&ledger, "Sofia Seller", Role::Seller, 10).await;
    let buyer = register(&ledger, "Bruno Buyer", Role::Buyer, 0).await;

    let listing_id = publisher
        .publish(PublishListing {
            seller_id: seller,
            listing: NewListing {
                name: "Used headphones".to_string(),
                description: "Wireless, with charging case".to_string(),
                price: dec!(45000),
                category_id: category.id,
                meeting_point_id: meeting_point.id,
            },
            stock: 2,
        })
        .await
        .unwrap()
        .listing
        .id;

    calendar
        .add_window(AddWindow {
            seller_id: seller,
            day: DayOfWeek::Tuesday,
            start: time(9, 0),
            end: time(12, 0),
        })
        .await
        .unwrap();

    Harness {
        store,
        sink,
        ledger,
        publisher,
        calendar,
        scheduler,
        ratings,
        seller,
        buyer,
        listing_id,
        meeting_point,
    }
}

impl Harness {
    pub fn booking(&self, date: NaiveDate, at: NaiveTime) -> CreateAppointment {
        CreateAppointment {
            listing_id: self.listing_id,
            buyer_id: self.buyer,
            date,
            time: at,
        }
    }

    pub async fn scheduled(&self) -> Appointment {
        self.scheduler.create(self.booking(tuesday(), time(10, 30))).await.unwrap()
    }

    pub async fn confirmed(&self) -> Appointment {
        let appointment = self.scheduled().await;
        self.scheduler
            .confirm(ConfirmAppointment {
                appointment_id: appointment.id,
                actor_id: self.seller,
            })
            .await
            .unwrap()
    }
}
