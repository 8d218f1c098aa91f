use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::error::Error;
use crate::error::Result;

/// A string map guarded by its own lock.
/// Operations that have to look at several keys at once run under a single
/// acquisition, so no key is lost or duplicated between two concurrent calls.
#[derive(Debug, Default)]
pub struct MemStorage {
    table: Mutex<HashMap<String, String>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<HashMap<String, String>>> {
        self.table.lock().map_err(|_| Error::StorageLockError)
    }

    /// Get a value by `key`.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    /// Insert or overwrite `key`.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Remove `key`, returns whether it was present.
    pub fn remove(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.remove(key).is_some())
    }

    /// Copy of the whole table.
    pub fn snapshot(&self) -> Result<HashMap<String, String>> {
        Ok(self.lock()?.clone())
    }

    /// Remove and return every entry whose key matches `pred`.
    pub fn snapshot_and_clear<F>(&self, pred: F) -> Result<HashMap<String, String>>
    where F: Fn(&str) -> bool {
        let mut table = self.lock()?;
        let keys: Vec<String> = table.keys().filter(|k| pred(k)).cloned().collect();
        Ok(keys
            .into_iter()
            .filter_map(|k| table.remove_entry(&k))
            .collect())
    }

    /// Upsert every entry of `entries`.
    pub fn extend(&self, entries: HashMap<String, String>) -> Result<()> {
        self.lock()?.extend(entries);
        Ok(())
    }

    /// Replace the whole table with `entries`.
    pub fn replace(&self, entries: HashMap<String, String>) -> Result<()> {
        *self.lock()? = entries;
        Ok(())
    }

    /// Delete all values.
    pub fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Drain this table into `primary`. The primary lock is taken first.
    pub fn merge_into(&self, primary: &MemStorage) -> Result<usize> {
        let mut dst = primary.lock()?;
        let mut src = self.lock()?;
        let n = src.len();
        dst.extend(src.drain());
        Ok(n)
    }
}
