//! In-memory store
//!
//! Tables are `DashMap`s. Row locks are per-row `tokio::sync::Mutex`es kept in
//! a lock table; a unit waits at most `lock_timeout` for one and reports a
//! transient failure otherwise. Writes are staged inside the unit and applied
//! on commit; rollback drops them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::decimal::{Credits, Decimal};
use crate::error::{Error, Result};
use crate::model::{
    Account, AccountStatus, Appointment, AppointmentStatus, AvailabilityWindow, Category, CreditPack,
    CreditTransaction, DayOfWeek, LedgerMovement, Listing, MeetingPoint, Notification,
    NotificationEvent, Rating, RatingDirection, Score, TransactionStatus, WindowStatus,
};

use super::transaction::{DBTransaction, TransactionManager, UnitOfWork};
use super::Store;

/// Rows that can be locked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Account(Uuid),
    CreditTransaction(Uuid),
    Appointment(Uuid),
}

type RatingKey = (Uuid, Uuid, RatingDirection);

#[derive(Default)]
struct Tables {
    accounts: DashMap<Uuid, Account>,
    movements: DashMap<Uuid, Vec<LedgerMovement>>,
    packs: DashMap<Uuid, CreditPack>,
    credit_transactions: DashMap<Uuid, CreditTransaction>,
    categories: DashMap<Uuid, Category>,
    meeting_points: DashMap<Uuid, MeetingPoint>,
    listings: DashMap<Uuid, Listing>,
    windows: DashMap<Uuid, AvailabilityWindow>,
    appointments: DashMap<Uuid, Appointment>,
    ratings: DashMap<Uuid, Rating>,
    rating_keys: DashMap<RatingKey, Uuid>,
    notifications: DashMap<Uuid, Notification>,
    locks: DashMap<RowKey, Arc<Mutex<()>>>,
}

/// In-memory store implementation
#[derive(Clone)]
pub struct InMemoryStore {
    tables: Arc<Tables>,
    lock_timeout: Duration,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create an empty store with the default lock timeout
    pub fn new() -> Self {
        Self::with_lock_timeout(Duration::from_millis(5000))
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            tables: Arc::new(Tables::default()),
            lock_timeout,
        }
    }

    /// Open a concrete unit, for callers that need more than the trait object
    pub fn begin(&self) -> InMemoryTransaction {
        InMemoryTransaction::new(self.tables.clone(), self.lock_timeout)
    }
}

#[async_trait]
impl TransactionManager for InMemoryStore {
    async fn begin_transaction(&self) -> Result<DBTransaction> {
        Ok(Box::new(self.begin()))
    }
}

fn newest_first<T, F>(mut rows: Vec<T>, key: F) -> Vec<T>
where
    F: Fn(&T) -> chrono::DateTime<Utc>,
{
    rows.sort_by(|a, b| key(b).cmp(&key(a)));
    rows
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_category(&self, category: &Category) -> Result<()> {
        self.tables.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn insert_meeting_point(&self, meeting_point: &MeetingPoint) -> Result<()> {
        self.tables.meeting_points.insert(meeting_point.id, meeting_point.clone());
        Ok(())
    }

    async fn insert_pack(&self, pack: &CreditPack) -> Result<()> {
        self.tables.packs.insert(pack.id, pack.clone());
        Ok(())
    }

    async fn insert_window(&self, window: &AvailabilityWindow) -> Result<()> {
        self.tables.windows.insert(window.id, window.clone());
        Ok(())
    }

    async fn get_window(&self, id: Uuid) -> Result<Option<AvailabilityWindow>> {
        Ok(self.tables.windows.get(&id).map(|w| w.clone()))
    }

    async fn set_window_status(&self, id: Uuid, status: WindowStatus) -> Result<()> {
        match self.tables.windows.get_mut(&id) {
            Some(mut window) => {
                window.status = status;
                Ok(())
            }
            None => Err(Error::NotFound(format!("availability window {}", id))),
        }
    }

    async fn windows_for_seller(&self, seller_id: Uuid) -> Result<Vec<AvailabilityWindow>> {
        let mut windows: Vec<AvailabilityWindow> = self
            .tables
            .windows
            .iter()
            .filter(|w| w.seller_id == seller_id)
            .map(|w| w.clone())
            .collect();
        windows.sort_by_key(|w| (w.day, w.start));
        Ok(windows)
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.tables.accounts.get(&id).map(|a| a.clone()))
    }

    async fn movements_for(&self, account_id: Uuid) -> Result<Vec<LedgerMovement>> {
        Ok(self
            .tables
            .movements
            .get(&account_id)
            .map(|m| m.clone())
            .unwrap_or_default())
    }

    async fn get_credit_transaction(&self, id: Uuid) -> Result<Option<CreditTransaction>> {
        Ok(self.tables.credit_transactions.get(&id).map(|t| t.clone()))
    }

    async fn credit_transactions(
        &self,
        status: Option<TransactionStatus>,
    ) -> Result<Vec<CreditTransaction>> {
        let rows: Vec<CreditTransaction> = self
            .tables
            .credit_transactions
            .iter()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .map(|t| t.clone())
            .collect();
        Ok(newest_first(rows, |t| t.submitted_at))
    }

    async fn get_listing(&self, id: Uuid) -> Result<Option<Listing>> {
        Ok(self.tables.listings.get(&id).map(|l| l.clone()))
    }

    async fn listings_for_seller(&self, seller_id: Uuid) -> Result<Vec<Listing>> {
        let rows: Vec<Listing> = self
            .tables
            .listings
            .iter()
            .filter(|l| l.seller_id == seller_id)
            .map(|l| l.clone())
            .collect();
        Ok(newest_first(rows, |l| l.created_at))
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>> {
        Ok(self.tables.appointments.get(&id).map(|a| a.clone()))
    }

    async fn appointments_for_seller(&self, seller_id: Uuid) -> Result<Vec<Appointment>> {
        let rows: Vec<Appointment> = self
            .tables
            .appointments
            .iter()
            .filter(|a| a.seller_id == seller_id)
            .map(|a| a.clone())
            .collect();
        Ok(newest_first(rows, |a| a.scheduled_at))
    }

    async fn appointments_for_buyer(&self, buyer_id: Uuid) -> Result<Vec<Appointment>> {
        let rows: Vec<Appointment> = self
            .tables
            .appointments
            .iter()
            .filter(|a| a.buyer_id == buyer_id)
            .map(|a| a.clone())
            .collect();
        Ok(newest_first(rows, |a| a.scheduled_at))
    }

    async fn ratings_for_appointment(&self, appointment_id: Uuid) -> Result<Vec<Rating>> {
        let mut ratings: Vec<Rating> = self
            .tables
            .ratings
            .iter()
            .filter(|r| r.appointment_id == appointment_id)
            .map(|r| r.clone())
            .collect();
        ratings.sort_by_key(|r| r.created_at);
        Ok(ratings)
    }

    async fn unrated_appointments_for(&self, user_id: Uuid) -> Result<Vec<Appointment>> {
        let mut rows: Vec<Appointment> = self
            .tables
            .appointments
            .iter()
            .filter(|a| {
                a.is_participant(user_id)
                    && matches!(a.status, AppointmentStatus::Confirmed | AppointmentStatus::Completed)
            })
            .filter(|a| {
                let direction = if a.buyer_id == user_id {
                    RatingDirection::BuyerToSeller
                } else {
                    RatingDirection::SellerToBuyer
                };
                !self.tables.rating_keys.contains_key(&(a.id, user_id, direction))
            })
            .map(|a| a.clone())
            .collect();
        rows.sort_by(|a, b| b.meeting_at().cmp(&a.meeting_at()));
        Ok(rows)
    }

    async fn ratings_received(&self, rated_id: Uuid) -> Result<Vec<Rating>> {
        let rows: Vec<Rating> = self
            .tables
            .ratings
            .iter()
            .filter(|r| r.rated_id == rated_id && r.is_active())
            .map(|r| r.clone())
            .collect();
        Ok(newest_first(rows, |r| r.created_at))
    }

    async fn notifications_for(&self, recipient_id: Uuid) -> Result<Vec<Notification>> {
        let rows: Vec<Notification> = self
            .tables
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .map(|n| n.clone())
            .collect();
        Ok(newest_first(rows, |n| n.created_at))
    }

    async fn mark_notification_read(&self, id: Uuid, recipient_id: Uuid) -> Result<bool> {
        match self.tables.notifications.get_mut(&id) {
            Some(mut notification) if notification.recipient_id == recipient_id => {
                notification.read = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn unread_notification_count(&self, recipient_id: Uuid) -> Result<u64> {
        Ok(self
            .tables
            .notifications
            .iter()
            .filter(|n| n.recipient_id == recipient_id && !n.read)
            .count() as u64)
    }

    async fn mark_all_notifications_read(&self, recipient_id: Uuid) -> Result<u64> {
        let mut marked = 0;
        for mut notification in self.tables.notifications.iter_mut() {
            if notification.recipient_id == recipient_id && !notification.read {
                notification.read = true;
                marked += 1;
            }
        }
        Ok(marked)
    }
}

/// Field-level account changes; applied on commit without clobbering other fields
#[derive(Debug, Default, Clone)]
struct AccountPatch {
    balance: Option<Credits>,
    average_score: Option<Option<Decimal>>,
    status: Option<AccountStatus>,
}

impl AccountPatch {
    fn apply(&self, account: &mut Account) {
        if let Some(balance) = self.balance {
            account.credit_balance = balance;
        }
        if let Some(score) = self.average_score {
            account.average_score = score;
        }
        if let Some(status) = self.status {
            account.status = status;
        }
        account.updated_at = Utc::now();
    }
}

/// Unit of work over the in-memory tables
pub struct InMemoryTransaction {
    tables: Arc<Tables>,
    lock_timeout: Duration,
    guards: HashMap<RowKey, OwnedMutexGuard<()>>,
    new_accounts: HashMap<Uuid, Account>,
    account_patches: HashMap<Uuid, AccountPatch>,
    movements: Vec<LedgerMovement>,
    credit_transactions: HashMap<Uuid, CreditTransaction>,
    listings: HashMap<Uuid, Listing>,
    appointments: HashMap<Uuid, Appointment>,
    ratings: Vec<Rating>,
    notifications: Vec<NotificationEvent>,
    finished: bool,
}

impl InMemoryTransaction {
    fn new(tables: Arc<Tables>, lock_timeout: Duration) -> Self {
        Self {
            tables,
            lock_timeout,
            guards: HashMap::new(),
            new_accounts: HashMap::new(),
            account_patches: HashMap::new(),
            movements: Vec::new(),
            credit_transactions: HashMap::new(),
            listings: HashMap::new(),
            appointments: HashMap::new(),
            ratings: Vec::new(),
            notifications: Vec::new(),
            finished: false,
        }
    }

    #[cfg(test)]
    fn held_locks(&self) -> usize {
        self.guards.len()
    }

    async fn lock_row(&mut self, key: RowKey) -> Result<()> {
        if self.guards.contains_key(&key) {
            return Ok(());
        }

        // The map guard must be gone before awaiting
        let mutex = {
            let entry = self
                .tables
                .locks
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(entry.value())
        };

        let guard = tokio::time::timeout(self.lock_timeout, mutex.lock_owned())
            .await
            .map_err(|_| {
                Error::TransientStore(format!(
                    "timed out after {:?} waiting for lock on {:?}",
                    self.lock_timeout, key
                ))
            })?;
        debug!("Locked {:?}", key);
        self.guards.insert(key, guard);
        Ok(())
    }

    fn read_account(&self, id: Uuid) -> Option<Account> {
        let mut account = match self.new_accounts.get(&id) {
            Some(account) => account.clone(),
            None => self.tables.accounts.get(&id).map(|a| a.clone())?,
        };
        if let Some(patch) = self.account_patches.get(&id) {
            patch.apply(&mut account);
        }
        Some(account)
    }

    fn require_account(&self, id: Uuid) -> Result<()> {
        if self.new_accounts.contains_key(&id) || self.tables.accounts.contains_key(&id) {
            Ok(())
        } else {
            Err(Error::NotFound(format!("account {}", id)))
        }
    }

    fn patch(&mut self, id: Uuid) -> &mut AccountPatch {
        self.account_patches.entry(id).or_default()
    }

    fn staged_rating_keys(&self) -> Result<()> {
        for rating in &self.ratings {
            let key = (rating.appointment_id, rating.rater_id, rating.direction);
            if self.tables.rating_keys.contains_key(&key) {
                return Err(Error::Conflict(format!(
                    "rating already exists for appointment {} by {} ({})",
                    rating.appointment_id, rating.rater_id, rating.direction
                )));
            }
        }
        Ok(())
    }

    fn apply(&mut self) -> Vec<Notification> {
        for (id, account) in self.new_accounts.drain() {
            self.tables.accounts.insert(id, account);
        }
        for (id, patch) in self.account_patches.drain() {
            if let Some(mut account) = self.tables.accounts.get_mut(&id) {
                patch.apply(&mut account);
            }
        }
        for movement in self.movements.drain(..) {
            self.tables
                .movements
                .entry(movement.account_id)
                .or_default()
                .push(movement);
        }
        for (id, transaction) in self.credit_transactions.drain() {
            self.tables.credit_transactions.insert(id, transaction);
        }
        for (id, listing) in self.listings.drain() {
            self.tables.listings.insert(id, listing);
        }
        for (id, appointment) in self.appointments.drain() {
            self.tables.appointments.insert(id, appointment);
        }
        for rating in self.ratings.drain(..) {
            self.tables
                .rating_keys
                .insert((rating.appointment_id, rating.rater_id, rating.direction), rating.id);
            self.tables.ratings.insert(rating.id, rating);
        }

        let notifications: Vec<Notification> = self
            .notifications
            .drain(..)
            .map(Notification::from_event)
            .collect();
        for notification in &notifications {
            self.tables.notifications.insert(notification.id, notification.clone());
        }
        notifications
    }

    fn discard(&mut self) {
        self.new_accounts.clear();
        self.account_patches.clear();
        self.movements.clear();
        self.credit_transactions.clear();
        self.listings.clear();
        self.appointments.clear();
        self.ratings.clear();
        self.notifications.clear();
    }

    fn release(&mut self) {
        self.release_locks();
        self.finished = true;
    }

    /// Drop held guards and forget lock entries nobody else is waiting on
    fn release_locks(&mut self) {
        let keys: Vec<RowKey> = self.guards.keys().copied().collect();
        self.guards.clear();
        for key in keys {
            self.tables
                .locks
                .remove_if(&key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            return Err(Error::Internal("transaction already finished".to_string()));
        }
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.guards.is_empty() {
            self.release_locks();
        }
    }
}

#[async_trait]
impl UnitOfWork for InMemoryTransaction {
    async fn lock_account(&mut self, id: Uuid) -> Result<Option<Account>> {
        self.ensure_open()?;
        if self.read_account(id).is_none() {
            return Ok(None);
        }
        self.lock_row(RowKey::Account(id)).await?;
        Ok(self.read_account(id))
    }

    async fn get_account(&mut self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.read_account(id))
    }

    async fn insert_account(&mut self, account: &Account) -> Result<()> {
        self.ensure_open()?;
        if self.read_account(account.id).is_some() {
            return Err(Error::Conflict(format!("account {} already exists", account.id)));
        }
        self.new_accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn set_balance(&mut self, id: Uuid, balance: Credits) -> Result<()> {
        self.require_account(id)?;
        if !self.guards.contains_key(&RowKey::Account(id)) && !self.new_accounts.contains_key(&id) {
            return Err(Error::Internal(format!(
                "balance of account {} written without its lock",
                id
            )));
        }
        if balance < 0 {
            return Err(Error::Internal(format!("negative balance for account {}", id)));
        }
        self.patch(id).balance = Some(balance);
        Ok(())
    }

    async fn set_average_score(&mut self, id: Uuid, score: Option<Decimal>) -> Result<()> {
        self.require_account(id)?;
        self.patch(id).average_score = Some(score);
        Ok(())
    }

    async fn set_account_status(&mut self, id: Uuid, status: AccountStatus) -> Result<()> {
        self.require_account(id)?;
        self.patch(id).status = Some(status);
        Ok(())
    }

    async fn append_movement(&mut self, movement: &LedgerMovement) -> Result<()> {
        self.require_account(movement.account_id)?;
        self.movements.push(movement.clone());
        Ok(())
    }

    async fn get_pack(&mut self, id: Uuid) -> Result<Option<CreditPack>> {
        Ok(self.tables.packs.get(&id).map(|p| p.clone()))
    }

    async fn insert_credit_transaction(&mut self, transaction: &CreditTransaction) -> Result<()> {
        self.ensure_open()?;
        self.credit_transactions.insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn lock_credit_transaction(&mut self, id: Uuid) -> Result<Option<CreditTransaction>> {
        self.ensure_open()?;
        if !self.tables.credit_transactions.contains_key(&id) {
            return Ok(self.credit_transactions.get(&id).cloned());
        }
        self.lock_row(RowKey::CreditTransaction(id)).await?;
        Ok(match self.credit_transactions.get(&id) {
            Some(staged) => Some(staged.clone()),
            None => self.tables.credit_transactions.get(&id).map(|t| t.clone()),
        })
    }

    async fn save_credit_transaction(&mut self, transaction: &CreditTransaction) -> Result<()> {
        self.credit_transactions.insert(transaction.id, transaction.clone());
        Ok(())
    }

    async fn get_category(&mut self, id: Uuid) -> Result<Option<Category>> {
        Ok(self.tables.categories.get(&id).map(|c| c.clone()))
    }

    async fn get_meeting_point(&mut self, id: Uuid) -> Result<Option<MeetingPoint>> {
        Ok(self.tables.meeting_points.get(&id).map(|m| m.clone()))
    }

    async fn get_listing(&mut self, id: Uuid) -> Result<Option<Listing>> {
        Ok(match self.listings.get(&id) {
            Some(staged) => Some(staged.clone()),
            None => self.tables.listings.get(&id).map(|l| l.clone()),
        })
    }

    async fn insert_listing(&mut self, listing: &Listing) -> Result<()> {
        self.ensure_open()?;
        self.listings.insert(listing.id, listing.clone());
        Ok(())
    }

    async fn save_listing(&mut self, listing: &Listing) -> Result<()> {
        self.listings.insert(listing.id, listing.clone());
        Ok(())
    }

    async fn find_window(
        &mut self,
        seller_id: Uuid,
        day: DayOfWeek,
        time: NaiveTime,
    ) -> Result<Option<AvailabilityWindow>> {
        Ok(self
            .tables
            .windows
            .iter()
            .find(|w| w.seller_id == seller_id && w.contains(day, time))
            .map(|w| w.clone()))
    }

    async fn insert_appointment(&mut self, appointment: &Appointment) -> Result<()> {
        self.ensure_open()?;
        self.appointments.insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn lock_appointment(&mut self, id: Uuid) -> Result<Option<Appointment>> {
        self.ensure_open()?;
        if !self.tables.appointments.contains_key(&id) {
            return Ok(self.appointments.get(&id).cloned());
        }
        self.lock_row(RowKey::Appointment(id)).await?;
        Ok(match self.appointments.get(&id) {
            Some(staged) => Some(staged.clone()),
            None => self.tables.appointments.get(&id).map(|a| a.clone()),
        })
    }

    async fn save_appointment(&mut self, appointment: &Appointment) -> Result<()> {
        self.appointments.insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn find_rating(
        &mut self,
        appointment_id: Uuid,
        rater_id: Uuid,
        direction: RatingDirection,
    ) -> Result<Option<Rating>> {
        if let Some(staged) = self.ratings.iter().find(|r| {
            r.appointment_id == appointment_id && r.rater_id == rater_id && r.direction == direction
        }) {
            return Ok(Some(staged.clone()));
        }
        let id = self
            .tables
            .rating_keys
            .get(&(appointment_id, rater_id, direction))
            .map(|id| *id);
        Ok(id.and_then(|id| self.tables.ratings.get(&id).map(|r| r.clone())))
    }

    async fn insert_rating(&mut self, rating: &Rating) -> Result<()> {
        self.ensure_open()?;
        if self
            .find_rating(rating.appointment_id, rating.rater_id, rating.direction)
            .await?
            .is_some()
        {
            return Err(Error::Conflict(format!(
                "rating already exists for appointment {} by {} ({})",
                rating.appointment_id, rating.rater_id, rating.direction
            )));
        }
        self.ratings.push(rating.clone());
        Ok(())
    }

    async fn ratings_for_appointment(&mut self, appointment_id: Uuid) -> Result<Vec<Rating>> {
        let mut ratings: Vec<Rating> = self
            .tables
            .ratings
            .iter()
            .filter(|r| r.appointment_id == appointment_id)
            .map(|r| r.clone())
            .collect();
        ratings.extend(
            self.ratings
                .iter()
                .filter(|r| r.appointment_id == appointment_id)
                .cloned(),
        );
        ratings.sort_by_key(|r| r.created_at);
        Ok(ratings)
    }

    async fn active_scores_for(&mut self, rated_id: Uuid) -> Result<Vec<Score>> {
        let mut scores: Vec<Score> = self
            .tables
            .ratings
            .iter()
            .filter(|r| r.rated_id == rated_id && r.is_active())
            .map(|r| r.score)
            .collect();
        scores.extend(
            self.ratings
                .iter()
                .filter(|r| r.rated_id == rated_id && r.is_active())
                .map(|r| r.score),
        );
        Ok(scores)
    }

    fn emit(&mut self, event: NotificationEvent) {
        self.notifications.push(event);
    }

    async fn commit(&mut self) -> Result<Vec<Notification>> {
        self.ensure_open()?;
        if let Err(e) = self.staged_rating_keys() {
            self.discard();
            self.release();
            return Err(e);
        }
        let notifications = self.apply();
        self.release();
        debug!("In-memory transaction committed");
        Ok(notifications)
    }

    async fn rollback(&mut self) -> Result<()> {
        self.discard();
        self.release();
        debug!("In-memory transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;

    async fn store_with_account(lock_timeout: Duration) -> (InMemoryStore, Uuid) {
        let store = InMemoryStore::with_lock_timeout(lock_timeout);
        let account = Account::new("Ana Seller".to_string(), Role::Seller, 5);
        let mut tx = store.begin();
        tx.insert_account(&account).await.unwrap();
        tx.commit().await.unwrap();
        (store, account.id)
    }

    #[tokio::test]
    async fn test_lock_wait_timeout_is_retryable() {
        let (store, account_id) = store_with_account(Duration::from_millis(50)).await;

        let mut holder = store.begin();
        assert!(holder.lock_account(account_id).await.unwrap().is_some());
        assert_eq!(holder.held_locks(), 1);

        let mut waiter = store.begin();
        let err = waiter.lock_account(account_id).await.unwrap_err();
        assert_eq!(err.code(), "transient_store_error");
        assert!(err.is_retryable());
        assert_eq!(waiter.held_locks(), 0);

        holder.rollback().await.unwrap();
        assert!(waiter.lock_account(account_id).await.unwrap().is_some());
        waiter.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_entries_are_pruned_on_release() {
        let (store, account_id) = store_with_account(Duration::from_millis(50)).await;

        let mut tx = store.begin();
        tx.lock_account(account_id).await.unwrap();
        assert_eq!(store.tables.locks.len(), 1);
        tx.commit().await.unwrap();
        assert!(store.tables.locks.is_empty());

        {
            let mut dropped = store.begin();
            dropped.lock_account(account_id).await.unwrap();
        }
        assert!(store.tables.locks.is_empty());
    }

    #[tokio::test]
    async fn test_lock_entry_survives_while_another_unit_waits() {
        let (store, account_id) = store_with_account(Duration::from_secs(5)).await;

        let mut holder = store.begin();
        holder.lock_account(account_id).await.unwrap();

        let waiting = {
            let store = store.clone();
            tokio::spawn(async move {
                let mut waiter = store.begin();
                let account = waiter.lock_account(account_id).await?;
                waiter.rollback().await?;
                Ok::<_, Error>(account.is_some())
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        holder.rollback().await.unwrap();

        assert!(waiting.await.unwrap().unwrap());
        assert!(store.tables.locks.is_empty());
    }
}
