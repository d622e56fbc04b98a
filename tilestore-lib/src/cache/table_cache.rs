use crate::Result;
use crate::io::absolute_name;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

/// Log target for the table cache
const LOG_TARGET: &str = "     cache";

/// The tables open in this process, keyed by normalized absolute path.
///
/// Entries do not keep a table alive: when the last handle to a table is
/// dropped its entry reads as absent. Every name is normalized with
/// [`absolute_name`] so that different spellings of the same directory
/// share one entry.
#[derive(Debug)]
pub struct TableCache<T> {
    tables: Mutex<HashMap<PathBuf, Weak<T>>>,
}

impl<T> Default for TableCache<T> {
    fn default() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> TableCache<T> {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The live table registered under `name`, if any.
    pub fn get(&self, name: impl AsRef<Path>) -> Result<Option<Arc<T>>> {
        let key = absolute_name(name)?;
        let mut tables = self.tables.lock().expect("lock poisoned");
        let table = tables.get(&key).and_then(Weak::upgrade);
        if table.is_none() && tables.remove(&key).is_some() {
            log::debug!(target: LOG_TARGET, "Dropped stale entry for '{}'", key.display());
        }
        Ok(table)
    }

    /// Register `table` under `name`, replacing any previous entry.
    pub fn define(&self, name: impl AsRef<Path>, table: &Arc<T>) -> Result<()> {
        let key = absolute_name(name)?;
        log::debug!(target: LOG_TARGET, "Caching table '{}'", key.display());
        let _ = self.tables.lock().expect("lock poisoned").insert(key, Arc::downgrade(table));
        Ok(())
    }

    /// Forget the entry for `name`; absent names are ignored.
    pub fn remove(&self, name: impl AsRef<Path>) -> Result<()> {
        let key = absolute_name(name)?;
        let mut tables = self.tables.lock().expect("lock poisoned");
        if tables.is_empty() {
            return Ok(());
        }
        if tables.remove(&key).is_some() {
            log::debug!(target: LOG_TARGET, "Removed table '{}' from the cache", key.display());
        }
        Ok(())
    }

    /// Move the entry for `old_name` to `new_name`, but only when `old_name` is registered.
    pub fn rename(&self, new_name: impl AsRef<Path>, old_name: impl AsRef<Path>) -> Result<()> {
        let new_key = absolute_name(new_name)?;
        let old_key = absolute_name(old_name)?;
        let mut tables = self.tables.lock().expect("lock poisoned");
        if let Some(table) = tables.remove(&old_key) {
            log::debug!(
                target: LOG_TARGET,
                "Renamed cached table '{}' to '{}'",
                old_key.display(),
                new_key.display()
            );
            let _ = tables.insert(new_key, table);
        }
        Ok(())
    }

    /// Number of live tables.
    #[must_use]
    pub fn ntable(&self) -> usize {
        self.tables
            .lock()
            .expect("lock poisoned")
            .values()
            .filter(|t| t.strong_count() > 0)
            .count()
    }

    /// Paths of the live tables, sorted.
    #[must_use]
    pub fn table_names(&self) -> Vec<PathBuf> {
        let mut names: Vec<PathBuf> = self
            .tables
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|(_, t)| t.strong_count() > 0)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}
