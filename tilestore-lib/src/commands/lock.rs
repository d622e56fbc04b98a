use super::Host;
use super::common::{Common, CommonArgs};
use crate::Result;
use crate::lock::{LockMode, LockOption, TableLock, TableLocker};
use crate::table::PlainTable;
use camino::Utf8PathBuf;
use clap::Parser;
use core::time::Duration;
use std::io::Write;

/// Exit code used when the lock could not be acquired
const EXIT_LOCK_UNAVAILABLE: i32 = 2;

#[derive(Parser, Debug)]
pub struct LockArgs {
    /// Directory of the table
    #[arg(value_name = "TABLE")]
    pub table: Utf8PathBuf,

    /// Take a write lock instead of a read lock
    #[arg(long)]
    pub write: bool,

    /// Number of attempts before giving up; 0 waits forever (default follows `max_wait` in the configuration)
    #[arg(long, value_name = "N")]
    pub attempts: Option<u32>,

    /// Seconds to keep the lock before releasing it
    #[arg(long, value_name = "SECONDS", default_value_t = 0)]
    pub hold: u64,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Lock a table explicitly, hold the lock for a while and release it.
pub fn lock_table<H: Host>(host: &mut H, args: &LockArgs) -> Result<()> {
    let common = Common::new(host, &args.common)?;

    let mut options = common.config.table_options();
    options.lock = TableLock::with_interval(LockOption::UserLocking, options.lock.interval(), options.lock.max_wait());
    let nattempts = args
        .attempts
        .unwrap_or_else(|| options.retry.attempts_for(options.lock.max_wait()));
    let mode = if args.write { LockMode::Write } else { LockMode::Read };

    let table = PlainTable::open(&common.cache, &args.table, args.write, &options)?;
    let locker = match TableLocker::new(&table, mode, nattempts) {
        Ok(locker) => locker,
        Err(e) => {
            let _ = writeln!(common.host.error(), "{e:#}");
            common.host.exit(EXIT_LOCK_UNAVAILABLE);
            return Ok(());
        }
    };

    let _ = writeln!(common.host.output(), "Acquired {mode} lock on table {}", args.table);
    if args.hold > 0 {
        std::thread::sleep(Duration::from_secs(args.hold));
    }
    drop(locker);
    let _ = writeln!(common.host.output(), "Released {mode} lock on table {}", args.table);
    Ok(())
}
