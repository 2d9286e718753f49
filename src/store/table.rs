//! Item table
//!
//! HashMap-based table with RwLock for concurrency.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rand::seq::IteratorRandom;

use super::{Item, StoreError};

type StoreResult<T> = std::result::Result<T, StoreError>;

/// In-memory item table
pub struct ItemTable {
    items: RwLock<HashMap<Vec<u8>, Item>>,

    /// Last CAS handed out
    cas_counter: AtomicU64,
}

impl ItemTable {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            cas_counter: AtomicU64::new(0),
        }
    }

    fn next_cas(&self) -> u64 {
        self.cas_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Get a copy of an item (read lock)
    pub fn get(&self, key: &[u8]) -> Option<Item> {
        self.items.read().get(key).cloned()
    }

    /// Store unconditionally, or only over `cas` when it is non-zero
    ///
    /// A locked item is only overwritten by its lock holder.
    pub fn set(&self, key: &[u8], item: Item, cas: u64) -> StoreResult<u64> {
        let mut items = self.items.write();
        if cas != 0 {
            check_cas(items.get(key), cas)?;
        } else if items.get(key).is_some_and(Item::is_locked) {
            return Err(StoreError::Exists);
        }
        Ok(self.store(&mut items, key, item))
    }

    /// Store only if the key is absent
    pub fn add(&self, key: &[u8], item: Item) -> StoreResult<u64> {
        let mut items = self.items.write();
        if items.contains_key(key) {
            return Err(StoreError::Exists);
        }
        Ok(self.store(&mut items, key, item))
    }

    /// Store only if the key is present, and over `cas` when it is non-zero
    pub fn replace(&self, key: &[u8], item: Item, cas: u64) -> StoreResult<u64> {
        let mut items = self.items.write();
        match items.get(key) {
            None => return Err(StoreError::NotFound),
            Some(existing) if cas != 0 && existing.cas != cas => return Err(StoreError::Exists),
            Some(existing) if !existing.admits(cas) => return Err(StoreError::Exists),
            Some(_) => {}
        }
        Ok(self.store(&mut items, key, item))
    }

    /// Replace an item only if its CAS is still `expected`
    ///
    /// A zero `expected` never matches.
    pub fn compare_and_swap(&self, key: &[u8], expected: u64, item: Item) -> StoreResult<u64> {
        let mut items = self.items.write();
        check_cas(items.get(key), expected)?;
        Ok(self.store(&mut items, key, item))
    }

    /// Remove an item, only if its CAS matches when `cas` is non-zero
    pub fn delete(&self, key: &[u8], cas: u64) -> StoreResult<Item> {
        let mut items = self.items.write();
        match items.get(key) {
            None => return Err(StoreError::NotFound),
            Some(existing) if !existing.admits(cas) => return Err(StoreError::Locked),
            Some(existing) if cas != 0 && existing.cas != cas => return Err(StoreError::Exists),
            Some(_) => {}
        }
        items.remove(key).ok_or(StoreError::NotFound)
    }

    /// Read-modify-write under the write lock
    ///
    /// `f` sees the current item, if any, and returns the replacement.
    pub fn modify<F>(&self, key: &[u8], cas: u64, f: F) -> StoreResult<Item>
    where
        F: FnOnce(Option<&Item>) -> StoreResult<Item>,
    {
        let mut items = self.items.write();
        let existing = items.get(key);
        if existing.is_some_and(|item| !item.admits(cas)) {
            return Err(StoreError::Exists);
        }
        if cas != 0 {
            check_cas(existing, cas)?;
        }
        let mut item = f(existing)?;
        item.cas = self.next_cas();
        item.locked_until = None;
        items.insert(key.to_vec(), item.clone());
        Ok(item)
    }

    /// Lock an item for `duration` and give it a fresh CAS
    ///
    /// Only the holder of the returned CAS may write or unlock the item
    /// until the lock runs out.
    pub fn lock(&self, key: &[u8], duration: Duration) -> StoreResult<Item> {
        let mut items = self.items.write();
        let item = items.get_mut(key).ok_or(StoreError::NotFound)?;
        if item.is_locked() {
            return Err(StoreError::Locked);
        }
        item.locked_until = Some(Instant::now() + duration);
        item.cas = self.next_cas();
        Ok(item.clone())
    }

    /// Release a lock held under `cas`
    pub fn unlock(&self, key: &[u8], cas: u64) -> StoreResult<()> {
        let mut items = self.items.write();
        let item = items.get_mut(key).ok_or(StoreError::NotFound)?;
        if !item.is_locked() || item.cas != cas {
            return Err(StoreError::Locked);
        }
        item.locked_until = None;
        Ok(())
    }

    /// Set a new expiry, leaving value and CAS alone
    pub fn touch(&self, key: &[u8], expiry: u32) -> StoreResult<Item> {
        let mut items = self.items.write();
        let item = items.get_mut(key).ok_or(StoreError::NotFound)?;
        item.expiry = expiry;
        Ok(item.clone())
    }

    /// Any one item with its key, `None` when the table is empty
    pub fn random(&self) -> Option<(Vec<u8>, Item)> {
        let items = self.items.read();
        items
            .iter()
            .choose(&mut rand::thread_rng())
            .map(|(key, item)| (key.clone(), item.clone()))
    }

    /// Drop every item
    pub fn flush(&self) {
        self.items.write().clear();
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    fn store(&self, items: &mut HashMap<Vec<u8>, Item>, key: &[u8], mut item: Item) -> u64 {
        item.cas = self.next_cas();
        item.locked_until = None;
        let cas = item.cas;
        items.insert(key.to_vec(), item);
        cas
    }
}

impl Default for ItemTable {
    fn default() -> Self {
        Self::new()
    }
}

fn check_cas(existing: Option<&Item>, expected: u64) -> StoreResult<()> {
    match existing {
        None => Err(StoreError::NotFound),
        Some(item) if item.cas != expected => Err(StoreError::Exists),
        Some(_) => Ok(()),
    }
}
