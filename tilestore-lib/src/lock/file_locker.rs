use super::table_lock::LockMode;
use crate::Result;
use core::fmt::Debug;
use core::time::Duration;
use fs4::fs_std::FileExt;
use ohno::IntoAppError;
use std::fs::{File, TryLockError};
use std::path::{Path, PathBuf};

/// A lock that can be attempted without blocking.
///
/// Contention is reported as `Ok(false)`; only genuine failures are errors.
pub trait LockPrimitive: Debug + Send {
    /// Try once to take the lock in the given mode.
    fn try_lock(&mut self, mode: LockMode) -> Result<bool>;

    /// Wait in the OS until the lock is granted.
    fn lock_blocking(&mut self, mode: LockMode) -> Result<()>;

    fn unlock(&mut self) -> Result<()>;

    /// Why the last attempt failed, empty if it did not.
    fn last_message(&self) -> &str;
}

/// Advisory whole-file lock on an open file.
///
/// The lock belongs to this open file handle; another handle on the same
/// file, even in the same process, competes for it.
#[derive(Debug)]
pub struct FileLocker {
    file: File,
    name: PathBuf,
    read_locked: bool,
    write_locked: bool,
    last_message: String,
}

impl FileLocker {
    #[must_use]
    pub fn new(file: File, name: impl AsRef<Path>) -> Self {
        Self {
            file,
            name: name.as_ref().to_path_buf(),
            read_locked: false,
            write_locked: false,
            last_message: String::new(),
        }
    }

    #[must_use]
    pub const fn file(&self) -> &File {
        &self.file
    }

    #[must_use]
    pub const fn is_locked(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::Read => self.read_locked || self.write_locked,
            LockMode::Write => self.write_locked,
        }
    }

    fn set_locked(&mut self, mode: LockMode) {
        self.read_locked = mode == LockMode::Read;
        self.write_locked = mode == LockMode::Write;
        self.last_message.clear();
    }
}

impl LockPrimitive for FileLocker {
    fn try_lock(&mut self, mode: LockMode) -> Result<bool> {
        if self.is_locked(mode) {
            return Ok(true);
        }

        let result = match mode {
            LockMode::Read => self.file.try_lock_shared(),
            LockMode::Write => self.file.try_lock(),
        };

        match result {
            Ok(()) => {
                self.set_locked(mode);
                Ok(true)
            }
            Err(TryLockError::WouldBlock) => {
                self.last_message = format!("{mode}-lock on '{}' is held by another process", self.name.display());

                // Upgrading a shared lock can drop it when the exclusive lock is refused.
                if self.read_locked {
                    self.read_locked = matches!(self.file.try_lock_shared(), Ok(()));
                }
                Ok(false)
            }
            Err(TryLockError::Error(e)) => {
                self.last_message = e.to_string();
                Err(e).into_app_err_with(|| format!("unable to acquire {mode} lock on '{}'", self.name.display()))
            }
        }
    }

    fn lock_blocking(&mut self, mode: LockMode) -> Result<()> {
        if self.is_locked(mode) {
            return Ok(());
        }

        match mode {
            LockMode::Read => FileExt::lock_shared(&self.file),
            LockMode::Write => FileExt::lock_exclusive(&self.file),
        }
        .into_app_err_with(|| format!("unable to acquire {mode} lock on '{}'", self.name.display()))?;

        self.set_locked(mode);
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        if !self.read_locked && !self.write_locked {
            return Ok(());
        }

        FileExt::unlock(&self.file).into_app_err_with(|| format!("unable to release lock on '{}'", self.name.display()))?;
        self.read_locked = false;
        self.write_locked = false;
        Ok(())
    }

    fn last_message(&self) -> &str {
        &self.last_message
    }
}

/// Repeats lock attempts at a fixed interval, for any [`LockPrimitive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Number of attempts that fit in `max_wait`, at least 1; zero (wait forever) stays zero.
    #[must_use]
    pub fn attempts_for(&self, max_wait: Duration) -> u32 {
        if max_wait.is_zero() {
            return 0;
        }
        if self.interval.is_zero() {
            return 1;
        }
        let n = max_wait.as_nanos().div_ceil(self.interval.as_nanos()).max(1);
        u32::try_from(n).unwrap_or(u32::MAX)
    }

    /// Try up to `nattempts` times, sleeping `interval` in between.
    ///
    /// With `nattempts == 0` one attempt is made and then the call blocks
    /// until the lock is granted. Returns whether the lock was obtained.
    pub fn acquire(&self, primitive: &mut dyn LockPrimitive, mode: LockMode, nattempts: u32) -> Result<bool> {
        if nattempts == 0 {
            if !primitive.try_lock(mode)? {
                primitive.lock_blocking(mode)?;
            }
            return Ok(true);
        }

        for attempt in 1..=nattempts {
            if primitive.try_lock(mode)? {
                return Ok(true);
            }
            if attempt < nattempts {
                std::thread::sleep(self.interval);
            }
        }

        Ok(false)
    }
}
