//! In-memory stores for tests/dev.
//!
//! Each store wraps a [`Collection`]: a write lock around a map gives every
//! conditional update the same single-record atomicity the database offers.

mod accounts;
mod actions;
mod tasks;
mod transactions;

pub use accounts::InMemoryAccountStore;
pub use actions::InMemoryActionStore;
pub use tasks::InMemoryTaskStore;
pub use transactions::InMemoryTransactionStore;

use std::collections::HashMap;
use std::sync::RwLock;

use forgepay_core::{Entity, WriteOutcome};

use super::{StoreError, StoreResult};

fn poisoned() -> StoreError {
    StoreError::Storage("lock poisoned".to_string())
}

/// Keyed records with find-and-modify semantics.
#[derive(Debug)]
pub struct Collection<E: Entity> {
    records: RwLock<HashMap<E::Id, E>>,
}

impl<E: Entity> Default for Collection<E> {
    fn default() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl<E: Entity + Clone> Collection<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: E) -> StoreResult<E> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let key = record.id().clone();
        if records.contains_key(&key) {
            return Err(StoreError::Duplicate(format!("{:?}", key)));
        }
        records.insert(key, record.clone());
        Ok(record)
    }

    pub fn get(&self, key: &E::Id) -> StoreResult<Option<E>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(key).cloned())
    }

    /// Applies `update` to the record at `key` if `filter` accepts it.
    pub fn find_one_and_update<P, U>(
        &self,
        key: &E::Id,
        filter: P,
        update: U,
    ) -> StoreResult<WriteOutcome<E>>
    where
        P: FnOnce(&E) -> bool,
        U: FnOnce(&mut E),
    {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        match records.get_mut(key) {
            Some(record) if filter(record) => {
                update(record);
                Ok(WriteOutcome::Applied(record.clone()))
            }
            _ => Ok(WriteOutcome::NoMatch),
        }
    }

    /// Applies `update` to the accepted record with the smallest `sort_key`.
    pub fn find_first_and_update<P, K, O, U>(
        &self,
        filter: P,
        sort_key: K,
        update: U,
    ) -> StoreResult<Option<E>>
    where
        P: Fn(&E) -> bool,
        K: Fn(&E) -> O,
        O: Ord,
        U: FnOnce(&mut E),
    {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let key = records
            .values()
            .filter(|record| filter(record))
            .min_by_key(|record| sort_key(record))
            .map(|record| record.id().clone());

        let Some(key) = key else {
            return Ok(None);
        };
        Ok(records.get_mut(&key).map(|record| {
            update(record);
            record.clone()
        }))
    }

    /// Applies `update` to every accepted record; returns how many changed.
    pub fn update_many<P, U>(&self, filter: P, mut update: U) -> StoreResult<u64>
    where
        P: Fn(&E) -> bool,
        U: FnMut(&mut E),
    {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let mut modified = 0;
        for record in records.values_mut().filter(|record| filter(record)) {
            update(record);
            modified += 1;
        }
        Ok(modified)
    }

    /// Accepted records sorted by `sort_key`, truncated to `limit`.
    pub fn query<P, K, O>(&self, filter: P, sort_key: K, limit: Option<usize>) -> StoreResult<Vec<E>>
    where
        P: Fn(&E) -> bool,
        K: Fn(&E) -> O,
        O: Ord,
    {
        let records = self.records.read().map_err(|_| poisoned())?;
        let mut result: Vec<E> = records
            .values()
            .filter(|record| filter(record))
            .cloned()
            .collect();
        result.sort_by_key(|record| sort_key(record));
        if let Some(limit) = limit {
            result.truncate(limit);
        }
        Ok(result)
    }
}
