//! Listing publisher
//!
//! Publishing spends one credit per unit of stock. The seller's debit and the
//! listing insert share one unit of work: either both happen or neither does.

use std::sync::Arc;

use chrono::Utc;
use common::db::finish;
use common::decimal::Credits;
use common::error::{Error, ErrorExt, Result};
use common::model::{EntityRef, LedgerMovement, Listing, ListingStatus, NewListing, ReasonCode, Role};
use common::notify::{self, LogSink, NotificationSink};
use common::{Store, UnitOfWork};
use ledger_service::ledger::{self, LedgerEntry};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

/// Input for `PublishListing`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishListing {
    pub seller_id: Uuid,
    pub listing: NewListing,
    /// Units on offer; also the number of credits charged
    pub stock: i32,
}

impl PublishListing {
    fn validate(&self) -> Result<()> {
        self.listing.validate()?;
        if self.stock <= 0 {
            return Err(Error::ValidationError(format!(
                "stock must be positive, got {}",
                self.stock
            )));
        }
        Ok(())
    }
}

/// Input for changing a listing's status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetListingStatus {
    pub listing_id: Uuid,
    /// Must own the listing
    pub actor_id: Uuid,
    pub status: ListingStatus,
}

/// Outcome of a publication
#[derive(Debug, Clone)]
pub struct Publication {
    pub listing: Listing,
    pub credits_charged: Credits,
    pub remaining_balance: Credits,
    pub movement: LedgerMovement,
}

/// Listing publication service
pub struct ListingPublisher {
    store: Arc<dyn Store>,
    sink: Arc<dyn NotificationSink>,
}

impl ListingPublisher {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_sink(store, Arc::new(LogSink))
    }

    pub fn with_sink(store: Arc<dyn Store>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    /// Publish a listing, charging the seller `stock` credits
    pub async fn publish(&self, input: PublishListing) -> Result<Publication> {
        input.validate()?;
        info!(
            "Publishing listing '{}' for seller {} with stock {}",
            input.listing.name.trim(),
            input.seller_id,
            input.stock
        );

        let mut tx = self.store.begin_transaction().await?;
        let result = publish_in(tx.as_mut(), input).await;
        let (publication, notifications) = finish(tx, result).await?;
        self.sink.deliver_all(&notifications);

        info!(
            "Listing {} published, {} credits charged, {} remaining",
            publication.listing.id, publication.credits_charged, publication.remaining_balance
        );
        Ok(publication)
    }

    pub async fn get(&self, id: Uuid) -> Result<Listing> {
        self.store
            .get_listing(id)
            .await
            .with_context(|| format!("Failed to retrieve listing {}", id))?
            .ok_or_else(|| Error::NotFound(format!("listing {}", id)))
    }

    /// Listings of a seller, newest first
    pub async fn for_seller(&self, seller_id: Uuid) -> Result<Vec<Listing>> {
        self.store.listings_for_seller(seller_id).await
    }

    /// Change the status of a listing owned by the actor
    pub async fn set_status(&self, input: SetListingStatus) -> Result<Listing> {
        let mut tx = self.store.begin_transaction().await?;
        let result = set_status_in(tx.as_mut(), &input).await;
        let (listing, _) = finish(tx, result).await?;
        info!("Listing {} is now {}", listing.id, listing.status);
        Ok(listing)
    }
}

async fn publish_in(tx: &mut dyn UnitOfWork, input: PublishListing) -> Result<Publication> {
    let seller = tx
        .lock_account(input.seller_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("seller {}", input.seller_id)))?;
    if seller.role != Role::Seller {
        return Err(Error::AuthorizationError(format!(
            "account {} is not a seller",
            seller.id
        )));
    }
    if !seller.is_active() {
        return Err(Error::AccountInactive(format!(
            "seller {} is {}",
            seller.id, seller.status
        )));
    }

    let category_id = input.listing.category_id;
    match tx.get_category(category_id).await? {
        Some(category) if category.active => {}
        Some(_) => {
            return Err(Error::InvalidCategory(format!("category {} is inactive", category_id)))
        }
        None => {
            return Err(Error::InvalidCategory(format!("category {} does not exist", category_id)))
        }
    }

    let meeting_point_id = input.listing.meeting_point_id;
    if tx.get_meeting_point(meeting_point_id).await?.is_none() {
        return Err(Error::InvalidMeetingPoint(format!(
            "meeting point {} does not exist",
            meeting_point_id
        )));
    }

    let credits = Credits::from(input.stock);
    let listing = Listing::new(seller.id, input.listing, input.stock, credits);
    debug!("Charging {} credits for listing {}", credits, listing.id);

    let entry = LedgerEntry::new(
        seller.id,
        credits,
        ReasonCode::ListingPublication,
        EntityRef::Listing(listing.id),
    );
    let movement = ledger::debit(tx, &entry).await?;
    tx.insert_listing(&listing).await?;
    tx.emit(notify::listing_published(&listing, movement.balance_after));

    Ok(Publication {
        credits_charged: credits,
        remaining_balance: movement.balance_after,
        listing,
        movement,
    })
}

async fn set_status_in(tx: &mut dyn UnitOfWork, input: &SetListingStatus) -> Result<Listing> {
    let mut listing = tx
        .get_listing(input.listing_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("listing {}", input.listing_id)))?;
    if listing.seller_id != input.actor_id {
        return Err(Error::AuthorizationError(format!(
            "account {} does not own listing {}",
            input.actor_id, listing.id
        )));
    }
    listing.status = input.status;
    listing.updated_at = Utc::now();
    tx.save_listing(&listing).await?;
    Ok(listing)
}
