//! Domain models for the marketplace

/// Declares a fieldless enum persisted as a lowercase text column.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Text form used in storage and messages
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::error::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(crate::error::Error::ValidationError(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

pub mod account;
pub mod ledger;
pub mod credit;
pub mod listing;
pub mod availability;
pub mod appointment;
pub mod rating;
pub mod notification;

pub use account::{Account, AccountStatus, Role};
pub use appointment::{Appointment, AppointmentStatus, CompletionTrigger};
pub use availability::{AvailabilityWindow, DayOfWeek, WindowStatus};
pub use credit::{CreditPack, CreditTransaction, PackStatus, ReviewDecision, TransactionStatus};
pub use ledger::{Direction, EntityRef, LedgerMovement, ReasonCode};
pub use listing::{Category, Listing, ListingStatus, MeetingPoint, NewListing};
pub use notification::{Notification, NotificationCategory, NotificationEvent};
pub use rating::{Rating, RatingDirection, RatingStatus, Score};
