use super::file_locker::RetryPolicy;
use super::lock_file::LockFile;
use super::table_lock::{LockMode, LockOption, TableLock};
use crate::Result;
use core::fmt::{Debug, Formatter};
use ohno::bail;
use std::path::Path;

/// Log target for locking
const LOG_TARGET: &str = "      lock";

/// Attempts made silently before a waiting message is logged.
const SILENT_ATTEMPTS: u32 = 30;

/// Name of the lock file inside a table directory.
pub const LOCK_FILE_NAME: &str = "table.lock";

/// Produces the info block to store in the lock file when a write lock is released.
///
/// The argument tells whether the release is forced (table closing).
pub type ReleaseCallback = Box<dyn FnMut(bool) -> Result<Vec<u8>> + Send>;

/// The lock state of one table in this process.
///
/// Translates the table's [`LockOption`] into acquire and release calls on
/// its lock file.
pub struct TableLockData {
    lock: TableLock,
    policy: RetryPolicy,
    lock_file: Option<LockFile>,
    read_locked: bool,
    write_locked: bool,
    release_callback: Option<ReleaseCallback>,
}

impl Debug for TableLockData {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TableLockData")
            .field("lock", &self.lock)
            .field("policy", &self.policy)
            .field("lock_file", &self.lock_file)
            .field("read_locked", &self.read_locked)
            .field("write_locked", &self.write_locked)
            .field("release_callback", &self.release_callback.is_some())
            .finish()
    }
}

impl TableLockData {
    #[must_use]
    pub const fn new(lock: TableLock, policy: RetryPolicy) -> Self {
        Self {
            lock,
            policy,
            lock_file: None,
            read_locked: false,
            write_locked: false,
            release_callback: None,
        }
    }

    /// Open the lock file of the table in directory `name`.
    ///
    /// The lock file is only opened once. With permanent locking the lock is
    /// acquired right away: one attempt for [`LockOption::PermanentLocking`],
    /// waiting forever for [`LockOption::PermanentLockingWait`].
    pub fn make_lock(&mut self, name: &Path, create: bool, mode: LockMode) -> Result<()> {
        if self.lock.option() == LockOption::NoLocking {
            return Ok(());
        }

        if self.lock_file.is_none() {
            // a read-only table without a lock file can still be read
            self.lock_file = Some(LockFile::new(name.join(LOCK_FILE_NAME), self.lock.interval(), create, true, false)?);
        }

        if self.is_permanent() {
            let nattempts = if self.lock.option() == LockOption::PermanentLockingWait { 0 } else { 1 };
            let mut info = Vec::new();
            if !self.lock_file_acquire(&mut info, mode, nattempts)? {
                let message = self.lock_file.as_ref().map_or("", LockFile::last_message);
                bail!("permanent lock on table '{}' could not be acquired ({message})", name.display());
            }
            self.set_locked(mode);
        }

        Ok(())
    }

    /// Try to acquire the lock, reading the lock file's info block into `info`.
    ///
    /// Makes a silent burst of up to 30 attempts; if more are allowed, logs
    /// that the process is waiting and continues. `nattempts == 0` waits
    /// forever. Returns `Ok(false)` when a finite budget is exhausted; only
    /// errors from the lock file itself are returned as `Err`.
    pub fn acquire(&mut self, info: &mut Vec<u8>, mode: LockMode, nattempts: u32) -> Result<bool> {
        let Some(lock_file) = self.lock_file.as_ref() else {
            info.clear();
            self.set_locked(mode);
            return Ok(true);
        };
        let name = lock_file.name().to_path_buf();

        let burst = if nattempts > 0 { nattempts.min(SILENT_ATTEMPTS) } else { SILENT_ATTEMPTS };
        let mut acquired = self.lock_file_acquire(info, mode, burst)?;

        if !acquired && burst != nattempts {
            let pid = std::process::id();
            log::info!(target: LOG_TARGET, "Process {pid}: waiting for {mode}-lock on file '{}'", name.display());

            let remaining = if nattempts > 0 { nattempts - burst } else { 0 };
            acquired = self.lock_file_acquire(info, mode, remaining)?;
            if acquired {
                log::info!(target: LOG_TARGET, "Process {pid}: acquired {mode}-lock on file '{}'", name.display());
            } else {
                log::warn!(
                    target: LOG_TARGET,
                    "Process {pid}: gave up acquiring {mode}-lock on file '{}' after {nattempts} attempts",
                    name.display()
                );
            }
        }

        if acquired {
            self.set_locked(mode);
        }
        Ok(acquired)
    }

    /// Message of the last failed locking attempt, empty when there is none.
    #[must_use]
    pub fn last_message(&self) -> &str {
        self.lock_file.as_ref().map_or("", LockFile::last_message)
    }

    /// Like [`Self::acquire`], but failing to get the lock is an error.
    pub fn acquire_or_fail(&mut self, info: &mut Vec<u8>, mode: LockMode, nattempts: u32) -> Result<()> {
        if self.acquire(info, mode, nattempts)? {
            return Ok(());
        }

        let (name, message) = self
            .lock_file
            .as_ref()
            .map_or_else(Default::default, |l| (l.name().display().to_string(), l.last_message().to_string()));
        bail!("unable to acquire {mode} lock on '{name}' after {nattempts} attempts ({message})")
    }

    /// Release the lock.
    ///
    /// A permanent lock is only released when `always` is set. When a write
    /// lock is held, the release callback provides the info block that is
    /// stored in the lock file before unlocking.
    pub fn release(&mut self, always: bool) -> Result<()> {
        if !always && self.is_permanent() {
            return Ok(());
        }

        let mut info = Vec::new();
        if self.write_locked
            && let Some(callback) = self.release_callback.as_mut()
        {
            info = callback(always)?;
        }

        if let Some(lock_file) = self.lock_file.as_mut() {
            if let Err(e) = lock_file.release(&info) {
                bail!("unable to release lock on '{}': {e}", lock_file.name().display());
            }
            log::debug!(target: LOG_TARGET, "Released lock on '{}'", lock_file.name().display());
        }

        self.read_locked = false;
        self.write_locked = false;
        Ok(())
    }

    /// Release an auto lock when another process is waiting for it.
    ///
    /// With `always` set the lock is released regardless of waiting
    /// processes. Returns whether the lock was released.
    pub fn auto_release(&mut self, always: bool) -> Result<bool> {
        if self.lock.option() != LockOption::AutoLocking || !self.read_locked {
            return Ok(false);
        }

        let wanted = match self.lock_file.as_mut() {
            Some(lock_file) => always || lock_file.inspect()?,
            None => always,
        };
        if wanted {
            self.release(false)?;
        }
        Ok(wanted)
    }

    /// Whether the lock is held in the given mode; a write lock implies a read lock.
    #[must_use]
    pub const fn has_lock(&self, mode: LockMode) -> bool {
        match self.lock.option() {
            LockOption::NoLocking => true,
            _ => match mode {
                LockMode::Read => self.read_locked,
                LockMode::Write => self.write_locked,
            },
        }
    }

    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        self.lock.is_permanent()
    }

    #[must_use]
    pub const fn option(&self) -> LockOption {
        self.lock.option()
    }

    #[must_use]
    pub const fn table_lock(&self) -> &TableLock {
        &self.lock
    }

    /// Number of attempts that fit in the configured maximum wait; zero waits forever.
    #[must_use]
    pub fn nattempts(&self) -> u32 {
        self.policy.attempts_for(self.lock.max_wait())
    }

    pub fn set_release_callback(&mut self, callback: ReleaseCallback) {
        self.release_callback = Some(callback);
    }

    /// Merge the settings of another opener of the same table.
    pub fn merge_options(&mut self, other: &TableLock) {
        self.lock.merge(other);
    }

    fn lock_file_acquire(&mut self, info: &mut Vec<u8>, mode: LockMode, nattempts: u32) -> Result<bool> {
        match self.lock_file.as_mut() {
            Some(lock_file) => lock_file.acquire(info, mode, nattempts, &self.policy),
            None => Ok(true),
        }
    }

    const fn set_locked(&mut self, mode: LockMode) {
        self.read_locked = true;
        if matches!(mode, LockMode::Write) {
            self.write_locked = true;
        }
    }
}
