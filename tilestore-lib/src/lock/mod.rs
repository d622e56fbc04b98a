//! Advisory locking of table directories shared between processes.
//!
//! - [`TableLock`]: the locking option of a table and its timing settings
//! - [`FileLocker`] and [`RetryPolicy`]: an OS file lock and the loop retrying it
//! - [`LockFile`]: the `table.lock` file with its request list and info block
//! - [`TableLockData`]: the lock state of an open table
//! - [`TableLocker`]: a guard holding a table lock for a scope

mod file_locker;
mod lock_data;
mod lock_file;
mod table_lock;
mod table_locker;

pub use file_locker::{FileLocker, LockPrimitive, RetryPolicy};
pub use lock_data::{LOCK_FILE_NAME, ReleaseCallback, TableLockData};
pub use lock_file::{LockFile, MAX_REQUEST_IDS};
pub use table_lock::{DEFAULT_INSPECTION_INTERVAL, LockMode, LockOption, TableLock};
pub use table_locker::TableLocker;
