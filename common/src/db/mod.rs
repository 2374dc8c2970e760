use std::env;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Pool, Postgres};
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{
    Account, Appointment, AvailabilityWindow, Category, CreditPack, CreditTransaction,
    LedgerMovement, Listing, MeetingPoint, Notification, Rating, TransactionStatus, WindowStatus,
};

pub mod memory;
pub mod models;
pub mod postgres;
pub mod transaction;

pub use memory::InMemoryStore;
pub use postgres::PgStore;
pub use transaction::{finish, DBTransaction, TransactionManager, UnitOfWork};

/// Database pool type
pub type DbPool = Pool<Postgres>;

/// Read queries and reference data outside of a unit of work
#[async_trait]
pub trait Store: TransactionManager {
    async fn insert_category(&self, category: &Category) -> Result<()>;

    async fn insert_meeting_point(&self, meeting_point: &MeetingPoint) -> Result<()>;

    async fn insert_pack(&self, pack: &CreditPack) -> Result<()>;

    async fn insert_window(&self, window: &AvailabilityWindow) -> Result<()>;

    async fn get_window(&self, id: Uuid) -> Result<Option<AvailabilityWindow>>;

    async fn set_window_status(&self, id: Uuid, status: WindowStatus) -> Result<()>;

    /// Windows of a seller, ordered by weekday then start
    async fn windows_for_seller(&self, seller_id: Uuid) -> Result<Vec<AvailabilityWindow>>;

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>>;

    /// Movements of an account, oldest first
    async fn movements_for(&self, account_id: Uuid) -> Result<Vec<LedgerMovement>>;

    async fn get_credit_transaction(&self, id: Uuid) -> Result<Option<CreditTransaction>>;

    /// Credit transactions, newest first
    async fn credit_transactions(
        &self,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<CreditTransaction>>;

    async fn get_listing(&self, id: Uuid) -> Result<Option<Listing>>;

    /// Listings of a seller, newest first
    async fn listings_for_seller(&self, seller_id: Uuid) -> Result<Vec<Listing>>;

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>>;

    /// Newest first
    async fn appointments_for_seller(&self, seller_id: Uuid) -> Result<Vec<Appointment>>;

    /// Newest first
    async fn appointments_for_buyer(&self, buyer_id: Uuid) -> Result<Vec<Appointment>>;

    /// Ratings of an appointment, oldest first
    async fn ratings_for_appointment(&self, appointment_id: Uuid) -> Result<Vec<Rating>>;

    /// Confirmed or completed appointments of a participant without a rating
    /// from them in their own direction, latest meeting first
    async fn unrated_appointments_for(&self, user_id: Uuid) -> Result<Vec<Appointment>>;

    /// Active ratings an account has received, newest first
    async fn ratings_received(&self, rated_id: Uuid) -> Result<Vec<Rating>>;

    /// Notifications of a recipient, newest first
    async fn notifications_for(&self, recipient_id: Uuid) -> Result<Vec<Notification>>;

    /// Returns false when no notification matches both id and recipient
    async fn mark_notification_read(&self, id: Uuid, recipient_id: Uuid) -> Result<bool>;

    async fn unread_notification_count(&self, recipient_id: Uuid) -> Result<u64>;

    /// Returns how many notifications changed
    async fn mark_all_notifications_read(&self, recipient_id: Uuid) -> Result<u64>;
}

/// Store backend selection
#[derive(Debug, Clone)]
pub enum StoreType {
    /// In-memory store
    InMemory,
    /// PostgreSQL store; `None` reads `DATABASE_URL`
    Postgres(Option<String>),
}

/// Tuning shared by the store backends
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Postgres pool size
    pub max_connections: u32,
    /// Apply pending migrations on connect
    pub run_migrations: bool,
    /// How long a unit waits for a row lock before failing as transient
    pub lock_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            run_migrations: true,
            lock_timeout: Duration::from_millis(5000),
        }
    }
}

/// Open the selected store
pub async fn open_store(store_type: StoreType, options: &StoreOptions) -> Result<Arc<dyn Store>> {
    match store_type {
        StoreType::InMemory => {
            info!("Using in-memory store");
            Ok(Arc::new(InMemoryStore::with_lock_timeout(options.lock_timeout)))
        }
        StoreType::Postgres(url) => {
            let database_url = match url {
                Some(url) => url,
                None => env::var("DATABASE_URL").map_err(|_| {
                    Error::ConfigurationError("DATABASE_URL must be set".to_string())
                })?,
            };
            let pool = init_db_pool(&database_url, options.max_connections).await?;
            if options.run_migrations {
                run_migrations(&pool).await?;
            }
            info!("Using PostgreSQL store");
            Ok(Arc::new(PgStore::with_lock_timeout(pool, options.lock_timeout)))
        }
    }
}

/// Initialize the database connection pool
pub async fn init_db_pool(database_url: &str, max_connections: u32) -> Result<DbPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Run migrations on the database
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrations_path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .ok_or_else(|| Error::ConfigurationError("cannot locate migrations directory".to_string()))?
        .join("migrations");

    sqlx::migrate::Migrator::new(migrations_path)
        .await?
        .run(pool)
        .await?;

    info!("Database migrations applied");
    Ok(())
}
