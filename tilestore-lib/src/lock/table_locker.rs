use super::table_lock::LockMode;
use crate::Result;
use crate::table::PlainTable;
use ohno::bail;
use std::sync::Arc;

/// Log target for locking
const LOG_TARGET: &str = "      lock";

/// Guard that holds a table lock and releases it when dropped.
#[derive(Debug)]
pub struct TableLocker {
    table: Arc<PlainTable>,
    mode: LockMode,
}

impl TableLocker {
    /// Lock `table` in `mode`, making at most `nattempts` attempts (0 waits forever).
    pub fn new(table: &Arc<PlainTable>, mode: LockMode, nattempts: u32) -> Result<Self> {
        if !table.lock(mode, nattempts)? {
            bail!(
                "unable to acquire {mode} lock on table '{}' after {nattempts} attempts ({})",
                table.name().display(),
                table.last_lock_message()
            );
        }
        Ok(Self {
            table: Arc::clone(table),
            mode,
        })
    }

    #[must_use]
    pub const fn table(&self) -> &Arc<PlainTable> {
        &self.table
    }

    #[must_use]
    pub const fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for TableLocker {
    fn drop(&mut self) {
        if let Err(e) = self.table.unlock() {
            log::warn!(target: LOG_TARGET, "Could not unlock table '{}': {e:#}", self.table.name().display());
        }
    }
}
