//! Listing publication: the debit path of the credit ledger

pub mod publisher;

pub use publisher::{ListingPublisher, Publication, PublishListing, SetListingStatus};
