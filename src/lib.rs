//! Shared fixtures for the cross-service scenario tests

pub mod fixtures {
    use std::sync::Arc;

    use common::db::InMemoryStore;
    use common::error::Result;
    use common::model::{
        Account, AvailabilityWindow, Category, CreditPack, DayOfWeek, Listing, MeetingPoint,
        NewListing, Notification, NotificationCategory, Role,
    };
    use common::notify::RecordingSink;
    use booking_service::AddWindow;
    use chrono::NaiveTime;
    use ledger_service::RegisterAccount;
    use listing_service::PublishListing;
    use marketplace_server::Marketplace;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    /// An in-memory marketplace that records every delivered notification,
    /// seeded with one category, one meeting point and one credit pack
    pub struct TestMarketplace {
        pub market: Marketplace,
        pub sink: RecordingSink,
        pub category: Category,
        pub meeting_point: MeetingPoint,
        pub pack: CreditPack,
    }

    pub async fn marketplace() -> Result<TestMarketplace> {
        let sink = RecordingSink::new();
        let market = Marketplace::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(sink.clone()),
            chrono::Duration::zero(),
        );

        let store = market.store();
        let category = Category::new("Clothing".to_string());
        store.insert_category(&category).await?;
        let meeting_point =
            MeetingPoint::new("Station clock".to_string(), Some("Central station".to_string()));
        store.insert_meeting_point(&meeting_point).await?;
        let pack = CreditPack::new("Basic".to_string(), 10, Decimal::new(5000, 0));
        store.insert_pack(&pack).await?;

        Ok(TestMarketplace { market, sink, category, meeting_point, pack })
    }

    impl TestMarketplace {
        pub async fn account(&self, name: &str, role: Role, balance: i64) -> Result<Account> {
            self.market
                .ledger
                .register_account(RegisterAccount {
                    name: name.to_string(),
                    role,
                    opening_balance: Some(balance),
                })
                .await
        }

        /// Publish a listing priced at 20000 with the given stock
        pub async fn listing(&self, seller_id: Uuid, stock: i32) -> Result<Listing> {
            let publication = self
                .market
                .listings
                .publish(PublishListing {
                    seller_id,
                    listing: NewListing {
                        name: "Denim jacket".to_string(),
                        description: "Size M, barely worn".to_string(),
                        price: Decimal::new(20000, 0),
                        category_id: self.category.id,
                        meeting_point_id: self.meeting_point.id,
                    },
                    stock,
                })
                .await?;
            Ok(publication.listing)
        }

        pub async fn window(
            &self,
            seller_id: Uuid,
            day: DayOfWeek,
            start: NaiveTime,
            end: NaiveTime,
        ) -> Result<AvailabilityWindow> {
            self.market
                .calendar
                .add_window(AddWindow { seller_id, day, start, end })
                .await
        }

        /// Delivered notifications of one category for one recipient
        pub fn notices(&self, recipient_id: Uuid, category: NotificationCategory) -> Vec<Notification> {
            self.sink
                .delivered_to(recipient_id)
                .into_iter()
                .filter(|n| n.category == category)
                .collect()
        }
    }
}
