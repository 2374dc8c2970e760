//! Service wiring

use std::sync::Arc;

use booking_service::{AppointmentScheduler, AvailabilityCalendar, RatingService};
use common::db::open_store;
use common::error::Result;
use common::notify::{Inbox, LogSink, NotificationSink};
use common::Store;
use ledger_service::{CreditTransactionWorkflow, LedgerService};
use listing_service::ListingPublisher;
use tracing::info;

use crate::config::MarketplaceConfig;

/// Every marketplace service over one store and one notification sink
pub struct Marketplace {
    pub ledger: LedgerService,
    pub credits: CreditTransactionWorkflow,
    pub listings: ListingPublisher,
    pub calendar: AvailabilityCalendar,
    pub appointments: AppointmentScheduler,
    pub ratings: RatingService,
    pub inbox: Inbox,
    store: Arc<dyn Store>,
}

impl Marketplace {
    pub fn new(
        store: Arc<dyn Store>,
        sink: Arc<dyn NotificationSink>,
        rating_delay: chrono::Duration,
    ) -> Self {
        Self {
            ledger: LedgerService::with_sink(store.clone(), sink.clone()),
            credits: CreditTransactionWorkflow::with_sink(store.clone(), sink.clone()),
            listings: ListingPublisher::with_sink(store.clone(), sink.clone()),
            calendar: AvailabilityCalendar::new(store.clone()),
            appointments: AppointmentScheduler::with_sink(store.clone(), sink.clone()),
            ratings: RatingService::with_sink(store.clone(), sink).with_delay(rating_delay),
            inbox: Inbox::new(store.clone()),
            store,
        }
    }

    /// Open the configured store and log notifications
    pub async fn with_config(config: &MarketplaceConfig) -> Result<Self> {
        let store = open_store(config.store_type(), &config.store_options()).await?;
        info!(
            "Marketplace wired (rating delay: {} minutes)",
            config.rating_delay_minutes
        );
        Ok(Self::new(store, Arc::new(LogSink), config.rating_delay()))
    }

    /// Shared store, for reference data seeding
    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }
}
