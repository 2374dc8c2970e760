//! Ledger service implementation

use std::sync::Arc;

use common::db::{finish, open_store, InMemoryStore, StoreOptions};
use common::decimal::Credits;
use common::error::{Error, ErrorExt, Result};
use common::model::{Account, AccountStatus, EntityRef, LedgerMovement, ReasonCode, Role};
use common::notify::{LogSink, NotificationSink};
use common::{Store, StoreType, UnitOfWork};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::ledger::{self, LedgerEntry};

/// Input for account registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterAccount {
    pub name: String,
    pub role: Role,
    /// Credited through the ledger as a manual adjustment
    pub opening_balance: Option<Credits>,
}

/// Ledger service for account balances and their history
pub struct LedgerService {
    store: Arc<dyn Store>,
    sink: Arc<dyn NotificationSink>,
}

impl LedgerService {
    /// Create a new ledger service over a shared store
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_sink(store, Arc::new(LogSink))
    }

    /// Create a new ledger service delivering notifications to `sink`
    pub fn with_sink(store: Arc<dyn Store>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    /// Create a new ledger service with a specific store type
    pub async fn with_store(store_type: StoreType) -> Result<Self> {
        let store: Arc<dyn Store> = match store_type {
            StoreType::InMemory => Arc::new(InMemoryStore::new()),
            other => open_store(other, &StoreOptions::default()).await?,
        };
        Ok(Self::new(store))
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    /// Register a new active account
    pub async fn register_account(&self, input: RegisterAccount) -> Result<Account> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(Error::ValidationError("account name is required".to_string()));
        }
        let opening_balance = input.opening_balance.unwrap_or(0);
        if opening_balance < 0 {
            return Err(Error::ValidationError(format!(
                "opening balance must not be negative, got {}",
                opening_balance
            )));
        }

        let account = Account::new(name.to_string(), input.role, 0);
        info!("Registering {} account {}", account.role, account.id);

        let mut tx = self.store.begin_transaction().await?;
        let result = async {
            tx.insert_account(&account).await?;
            if opening_balance > 0 {
                let entry = LedgerEntry::new(
                    account.id,
                    opening_balance,
                    ReasonCode::ManualAdjustment,
                    EntityRef::None,
                );
                ledger::credit(tx.as_mut(), &entry).await?;
            }
            Ok::<(), Error>(())
        }
        .await;
        let ((), notifications) = finish(tx, result).await?;
        self.sink.deliver_all(&notifications);

        self.get_account(account.id).await
    }

    /// Get an account by ID
    pub async fn get_account(&self, id: Uuid) -> Result<Account> {
        self.store
            .get_account(id)
            .await
            .with_context(|| format!("Failed to retrieve account {}", id))?
            .ok_or_else(|| Error::NotFound(format!("account {}", id)))
    }

    /// Current spendable balance
    pub async fn get_balance(&self, id: Uuid) -> Result<Credits> {
        Ok(self.get_account(id).await?.credit_balance)
    }

    /// Movement history of an account, oldest first
    pub async fn movements(&self, account_id: Uuid) -> Result<Vec<LedgerMovement>> {
        self.get_account(account_id).await?;
        self.store.movements_for(account_id).await
    }

    /// Debit as a standalone unit of work
    pub async fn debit(&self, entry: LedgerEntry) -> Result<LedgerMovement> {
        let mut tx = self.store.begin_transaction().await?;
        let result = ledger::debit(tx.as_mut(), &entry).await;
        let (movement, notifications) = finish(tx, result).await?;
        self.sink.deliver_all(&notifications);
        Ok(movement)
    }

    /// Credit as a standalone unit of work
    pub async fn credit(&self, entry: LedgerEntry) -> Result<LedgerMovement> {
        let mut tx = self.store.begin_transaction().await?;
        let result = ledger::credit(tx.as_mut(), &entry).await;
        let (movement, notifications) = finish(tx, result).await?;
        self.sink.deliver_all(&notifications);
        Ok(movement)
    }

    /// Deactivate, suspend or reactivate an account
    pub async fn set_status(&self, account_id: Uuid, status: AccountStatus) -> Result<Account> {
        let mut tx = self.store.begin_transaction().await?;
        let result = set_status_in(tx.as_mut(), account_id, status).await;
        let (account, _) = finish(tx, result).await?;
        info!("Account {} is now {}", account_id, status);
        Ok(account)
    }
}

async fn set_status_in(
    tx: &mut dyn UnitOfWork,
    account_id: Uuid,
    status: AccountStatus,
) -> Result<Account> {
    let mut account = tx
        .lock_account(account_id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("account {}", account_id)))?;
    tx.set_account_status(account_id, status).await?;
    account.status = status;
    Ok(account)
}
