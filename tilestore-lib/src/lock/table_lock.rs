use core::time::Duration;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Default interval between checks whether another process wants the lock.
pub const DEFAULT_INSPECTION_INTERVAL: Duration = Duration::from_secs(5);

/// How a table is locked.
///
/// Variants are ordered ascending by strength; merging two options keeps the
/// stronger one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LockOption {
    /// No lock file is used at all.
    #[strum(serialize = "none")]
    #[serde(rename = "none")]
    NoLocking,

    /// The user locks and unlocks explicitly, e.g. to form a transaction.
    #[strum(serialize = "user")]
    #[serde(rename = "user")]
    UserLocking,

    /// Locks are acquired around each access and kept until another process
    /// asks for them.
    #[strum(serialize = "auto")]
    #[serde(rename = "auto")]
    AutoLocking,

    /// Locked when the table is opened and released when it is closed;
    /// opening fails if the lock is not available.
    #[strum(serialize = "permanent")]
    #[serde(rename = "permanent")]
    PermanentLocking,

    /// Like [`Self::PermanentLocking`] but opening waits for the lock.
    #[strum(serialize = "permanent_wait")]
    #[serde(rename = "permanent_wait")]
    PermanentLockingWait,
}

/// Whether a lock is taken for reading or writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum LockMode {
    Read,
    Write,
}

/// The locking settings of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLock {
    option: LockOption,
    interval: Duration,
    max_wait: Duration,
    is_default_interval: bool,
}

impl Default for TableLock {
    fn default() -> Self {
        Self::new(LockOption::AutoLocking)
    }
}

impl TableLock {
    /// Settings with the default inspection interval and no wait limit.
    #[must_use]
    pub const fn new(option: LockOption) -> Self {
        Self {
            option,
            interval: DEFAULT_INSPECTION_INTERVAL,
            max_wait: Duration::ZERO,
            is_default_interval: true,
        }
    }

    /// Settings with an explicit inspection interval; a zero `max_wait` waits forever.
    #[must_use]
    pub const fn with_interval(option: LockOption, interval: Duration, max_wait: Duration) -> Self {
        Self {
            option,
            interval,
            max_wait,
            is_default_interval: false,
        }
    }

    #[must_use]
    pub const fn option(&self) -> LockOption {
        self.option
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub const fn max_wait(&self) -> Duration {
        self.max_wait
    }

    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self.option, LockOption::PermanentLocking | LockOption::PermanentLockingWait)
    }

    /// Combine with the settings of another user of the same table.
    ///
    /// Keeps the stronger option, the shorter inspection interval (intervals
    /// that were defaulted do not count) and the longer wait, where zero
    /// means forever.
    pub fn merge(&mut self, other: &Self) {
        self.option = self.option.max(other.option);

        if !other.is_default_interval && (self.is_default_interval || other.interval < self.interval) {
            self.interval = other.interval;
            self.is_default_interval = false;
        }

        if self.max_wait.is_zero() || other.max_wait.is_zero() {
            self.max_wait = Duration::ZERO;
        } else {
            self.max_wait = self.max_wait.max(other.max_wait);
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_option_order() {
        assert!(LockOption::NoLocking < LockOption::UserLocking);
        assert!(LockOption::UserLocking < LockOption::AutoLocking);
        assert!(LockOption::AutoLocking < LockOption::PermanentLocking);
        assert!(LockOption::PermanentLocking < LockOption::PermanentLockingWait);
    }

    #[test]
    fn test_option_names() {
        assert_eq!("permanent_wait".parse::<LockOption>().unwrap(), LockOption::PermanentLockingWait);
        assert_eq!("none".parse::<LockOption>().unwrap(), LockOption::NoLocking);
        assert_eq!(LockOption::AutoLocking.to_string(), "auto");
        assert_eq!(LockMode::Write.to_string(), "write");
    }

    #[test]
    fn test_merge_takes_stronger_option() {
        let mut lock = TableLock::new(LockOption::UserLocking);
        lock.merge(&TableLock::new(LockOption::PermanentLocking));
        assert_eq!(lock.option(), LockOption::PermanentLocking);
        assert!(lock.is_permanent());

        lock.merge(&TableLock::new(LockOption::AutoLocking));
        assert_eq!(lock.option(), LockOption::PermanentLocking);
    }

    #[test]
    fn test_merge_ignores_default_interval() {
        let mut lock = TableLock::with_interval(LockOption::AutoLocking, Duration::from_secs(20), Duration::from_secs(3));
        lock.merge(&TableLock::new(LockOption::AutoLocking));
        assert_eq!(lock.interval(), Duration::from_secs(20));
        assert_eq!(lock.max_wait(), Duration::ZERO);

        let mut lock = TableLock::new(LockOption::AutoLocking);
        lock.merge(&TableLock::with_interval(LockOption::AutoLocking, Duration::from_secs(20), Duration::ZERO));
        assert_eq!(lock.interval(), Duration::from_secs(20));

        lock.merge(&TableLock::with_interval(LockOption::AutoLocking, Duration::from_secs(2), Duration::ZERO));
        assert_eq!(lock.interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_merge_keeps_longer_wait() {
        let mut lock = TableLock::with_interval(LockOption::AutoLocking, Duration::from_secs(5), Duration::from_secs(3));
        lock.merge(&TableLock::with_interval(LockOption::AutoLocking, Duration::from_secs(5), Duration::from_secs(10)));
        assert_eq!(lock.max_wait(), Duration::from_secs(10));
    }
}
