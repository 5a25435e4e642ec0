use std::{
    collections::{BTreeMap, HashMap},
    sync::atomic::{AtomicI64, Ordering},
};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::{
    error::AppError,
    models::{Sweet, SweetPayload, SweetSearch, User, check_amount},
    repository::Repository,
};

/// InMemoryRepository
///
/// A process-local `Repository`. The sweet map sits behind a read/write lock and every
/// item behind its own mutex:
/// - stock changes take the map's read lock, then the item's mutex, so purchases of
///   different sweets proceed in parallel while purchases of the same sweet serialize;
/// - create and delete take the write lock, so an item can't be removed while a stock
///   change on it is in flight.
#[derive(Default)]
pub struct InMemoryRepository {
    users: RwLock<HashMap<String, User>>,
    sweets: RwLock<BTreeMap<i64, Mutex<Sweet>>>,
    next_user_id: AtomicI64,
    next_sweet_id: AtomicI64,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops an account, as an out-of-band account deletion would.
    pub async fn remove_user(&self, email: &str) -> Option<User> {
        self.users.write().await.remove(email)
    }

    async fn adjust<F>(&self, id: i64, apply: F) -> Result<Sweet, AppError>
    where
        F: FnOnce(&mut Sweet) -> Result<(), AppError> + Send,
    {
        let sweets = self.sweets.read().await;
        let slot = sweets.get(&id).ok_or_else(|| AppError::sweet_not_found(id))?;
        let mut sweet = slot.lock().await;

        // Work on a copy so a rejected change leaves the stored row untouched.
        let mut next = sweet.clone();
        apply(&mut next)?;
        *sweet = next;
        Ok(sweet.clone())
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(email).cloned())
    }

    async fn create_user(
        &self,
        email: &str,
        hashed_password: &str,
        is_admin: bool,
    ) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        if users.contains_key(email) {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }
        let user = User {
            id: self.next_user_id.fetch_add(1, Ordering::Relaxed) + 1,
            email: email.to_string(),
            hashed_password: hashed_password.to_string(),
            is_admin,
        };
        users.insert(email.to_string(), user.clone());
        Ok(user)
    }

    async fn list_sweets(&self) -> Result<Vec<Sweet>, AppError> {
        self.search_sweets(&SweetSearch::default()).await
    }

    async fn search_sweets(&self, filter: &SweetSearch) -> Result<Vec<Sweet>, AppError> {
        let sweets = self.sweets.read().await;
        let mut found = Vec::new();
        for slot in sweets.values() {
            let sweet = slot.lock().await;
            if filter.matches(&sweet) {
                found.push(sweet.clone());
            }
        }
        Ok(found)
    }

    async fn create_sweet(&self, payload: &SweetPayload) -> Result<Sweet, AppError> {
        let sweet = Sweet {
            id: self.next_sweet_id.fetch_add(1, Ordering::Relaxed) + 1,
            name: payload.name.clone(),
            category: payload.category.clone(),
            price: payload.price,
            quantity: payload.quantity,
        };
        self.sweets
            .write()
            .await
            .insert(sweet.id, Mutex::new(sweet.clone()));
        Ok(sweet)
    }

    async fn update_sweet(&self, id: i64, payload: &SweetPayload) -> Result<Sweet, AppError> {
        self.adjust(id, |sweet| {
            sweet.name = payload.name.clone();
            sweet.category = payload.category.clone();
            sweet.price = payload.price;
            sweet.quantity = payload.quantity;
            Ok(())
        })
        .await
    }

    async fn delete_sweet(&self, id: i64) -> Result<(), AppError> {
        self.sweets
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::sweet_not_found(id))
    }

    async fn purchase_sweet(&self, id: i64, amount: i64) -> Result<Sweet, AppError> {
        check_amount(amount)?;
        self.adjust(id, |sweet| {
            if amount > sweet.quantity {
                return Err(AppError::InsufficientStock {
                    requested: amount,
                    available: sweet.quantity,
                });
            }
            sweet.quantity -= amount;
            Ok(())
        })
        .await
    }

    async fn restock_sweet(&self, id: i64, amount: i64) -> Result<Sweet, AppError> {
        check_amount(amount)?;
        self.adjust(id, |sweet| {
            sweet.quantity = sweet
                .quantity
                .checked_add(amount)
                .ok_or_else(|| AppError::Validation("value out of range".to_string()))?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(quantity: i64) -> SweetPayload {
        SweetPayload {
            name: "Ladoo".into(),
            category: "Indian".into(),
            price: 10.0,
            quantity,
        }
    }

    #[tokio::test]
    async fn ids_are_assigned_in_order() {
        let repo = InMemoryRepository::new();
        let a = repo.create_sweet(&payload(1)).await.unwrap();
        let b = repo.create_sweet(&payload(1)).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        let listed: Vec<i64> = repo.list_sweets().await.unwrap().iter().map(|s| s.id).collect();
        assert_eq!(listed, vec![1, 2]);
    }

    #[tokio::test]
    async fn restock_overflow_is_rejected_without_change() {
        let repo = InMemoryRepository::new();
        let sweet = repo.create_sweet(&payload(i64::MAX - 1)).await.unwrap();

        let err = repo.restock_sweet(sweet.id, 2).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let after = repo.list_sweets().await.unwrap();
        assert_eq!(after[0].quantity, i64::MAX - 1);
    }

    #[tokio::test]
    async fn removed_user_no_longer_resolves() {
        let repo = InMemoryRepository::new();
        repo.create_user("a@b.c", "hash", false).await.unwrap();
        assert!(repo.remove_user("a@b.c").await.is_some());
        assert!(repo.find_user_by_email("a@b.c").await.unwrap().is_none());
    }
}
