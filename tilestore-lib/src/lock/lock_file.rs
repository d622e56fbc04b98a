use super::file_locker::{FileLocker, LockPrimitive, RetryPolicy};
use super::table_lock::LockMode;
use crate::Result;
use core::time::Duration;
use ohno::IntoAppError;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Log target for locking
const LOG_TARGET: &str = "      lock";

/// Number of processes that can register as waiting for the lock.
pub const MAX_REQUEST_IDS: usize = 32;

/// Bytes taken by the request list: a count and a (pid, host) pair per slot.
const REQUEST_AREA_LEN: usize = (1 + 2 * MAX_REQUEST_IDS) * 4;
const REQUEST_AREA_SIZE: u64 = REQUEST_AREA_LEN as u64;

/// A lock file with a list of waiting processes and an info block.
///
/// Layout, all integers big-endian `u32`:
///
/// ```text
/// count | 32 x (pid, host) | info length | info bytes
/// ```
///
/// A process that has to wait for the lock registers in the request list so
/// that the holder can see (through [`Self::inspect`]) that it should give
/// the lock up. The holder leaves an info block behind when it releases a
/// write lock; the next process to get the lock reads it.
#[derive(Debug)]
pub struct LockFile {
    name: PathBuf,
    locker: Option<FileLocker>,
    writable: bool,
    add_to_list: bool,
    interval: Duration,
    last_inspection: Option<Instant>,
    pid: u32,
    host_id: u32,
}

impl LockFile {
    /// Open (or create) the lock file.
    ///
    /// When the file does not exist and cannot be created, and `must_exist`
    /// is false, the lock file is inert: every request succeeds without
    /// locking anything. A file that can only be opened read-only is used
    /// for locking but never written to.
    pub fn new(name: impl AsRef<Path>, inspect_interval: Duration, create: bool, add_to_request_list: bool, must_exist: bool) -> Result<Self> {
        let name = name.as_ref().to_path_buf();
        let mut lock_file = Self {
            name,
            locker: None,
            writable: true,
            add_to_list: add_to_request_list,
            interval: inspect_interval,
            last_inspection: None,
            pid: std::process::id(),
            host_id: 0,
        };

        let exists = lock_file.name.exists();
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(create || !exists)
            .truncate(false)
            .open(&lock_file.name)
        {
            Ok(file) => file,
            Err(e) if exists => {
                log::debug!(target: LOG_TARGET, "Opening '{}' read-only: {e}", lock_file.name.display());
                lock_file.writable = false;
                lock_file.add_to_list = false;
                File::open(&lock_file.name).into_app_err_with(|| format!("unable to open lock file '{}'", lock_file.name.display()))?
            }
            Err(e) => {
                if must_exist {
                    return Err(e).into_app_err_with(|| format!("unable to create lock file '{}'", lock_file.name.display()));
                }
                log::debug!(
                    target: LOG_TARGET,
                    "Lock file '{}' cannot be created ({e}); locking is disabled",
                    lock_file.name.display()
                );
                return Ok(lock_file);
            }
        };

        let len = file
            .metadata()
            .into_app_err_with(|| format!("unable to inspect lock file '{}'", lock_file.name.display()))?
            .len();
        lock_file.locker = Some(FileLocker::new(file, &lock_file.name));
        if len < REQUEST_AREA_SIZE && lock_file.writable {
            lock_file.write_request_ids(&[])?;
            lock_file.write_info(&[])?;
        }

        Ok(lock_file)
    }

    #[must_use]
    pub fn name(&self) -> &Path {
        &self.name
    }

    /// Whether an actual lock file is in use.
    #[must_use]
    pub const fn has_locker(&self) -> bool {
        self.locker.is_some()
    }

    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.writable
    }

    /// Whether the lock is held in the given mode; always true without a lock file.
    #[must_use]
    pub fn is_locked(&self, mode: LockMode) -> bool {
        self.locker.as_ref().is_none_or(|l| l.is_locked(mode))
    }

    #[must_use]
    pub fn last_message(&self) -> &str {
        self.locker.as_ref().map_or("", FileLocker::last_message)
    }

    /// Acquire the lock and read the info block into `info`.
    ///
    /// One attempt is made right away. If that fails and more attempts are
    /// allowed, this process registers as waiting and the policy makes the
    /// remaining attempts (waiting forever when `nattempts` is zero). `info` is only touched when
    /// the lock was obtained.
    pub fn acquire(&mut self, info: &mut Vec<u8>, mode: LockMode, nattempts: u32, policy: &RetryPolicy) -> Result<bool> {
        let Some(locker) = self.locker.as_mut() else {
            info.clear();
            return Ok(true);
        };

        let mut acquired = locker.try_lock(mode)?;
        let mut added = false;
        if !acquired && nattempts != 1 {
            if self.add_to_list {
                self.add_request_id()?;
                added = true;
            }
            let remaining = nattempts.saturating_sub(1);
            if remaining > 0 {
                std::thread::sleep(policy.interval);
            }
            let locker = self.locker_mut()?;
            acquired = policy.acquire(locker, mode, remaining)?;
        }

        if added {
            self.remove_request_id()?;
        }

        if acquired {
            *info = self.read_info()?;
        }

        Ok(acquired)
    }

    /// Release the lock, first storing `info` when it is not empty.
    pub fn release(&mut self, info: &[u8]) -> Result<()> {
        if self.locker.is_none() {
            return Ok(());
        }

        if !info.is_empty() && self.writable && self.is_locked(LockMode::Write) {
            self.write_info(info)?;
        }

        self.locker_mut()?.unlock()
    }

    /// Whether another process is waiting for the lock.
    ///
    /// The request list is only read once per inspection interval; in
    /// between this returns false.
    pub fn inspect(&mut self) -> Result<bool> {
        if self.locker.is_none() {
            return Ok(false);
        }

        let now = Instant::now();
        if let Some(last) = self.last_inspection
            && now.duration_since(last) < self.interval
        {
            return Ok(false);
        }
        self.last_inspection = Some(now);

        let ids = self.read_request_ids()?;
        Ok(ids.iter().any(|&(pid, _)| pid != self.pid))
    }

    /// Number of processes registered as waiting.
    pub fn nr_request_ids(&mut self) -> Result<usize> {
        Ok(self.read_request_ids()?.len())
    }

    fn locker_mut(&mut self) -> Result<&mut FileLocker> {
        self.locker
            .as_mut()
            .into_app_err_with(|| format!("internal error: lock file '{}' is not open", self.name.display()))
    }

    fn file(&self) -> Result<&File> {
        self.locker
            .as_ref()
            .map(FileLocker::file)
            .into_app_err_with(|| format!("internal error: lock file '{}' is not open", self.name.display()))
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<bool> {
        let mut file = self.file()?;
        let _ = file
            .seek(SeekFrom::Start(offset))
            .into_app_err_with(|| format!("unable to seek in lock file '{}'", self.name.display()))?;
        match file.read_exact(buf) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e).into_app_err_with(|| format!("unable to read lock file '{}'", self.name.display())),
        }
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut file = self.file()?;
        let _ = file
            .seek(SeekFrom::Start(offset))
            .into_app_err_with(|| format!("unable to seek in lock file '{}'", self.name.display()))?;
        file.write_all(buf)
            .into_app_err_with(|| format!("unable to write lock file '{}'", self.name.display()))
    }

    fn read_request_ids(&self) -> Result<Vec<(u32, u32)>> {
        let mut area = vec![0u8; REQUEST_AREA_LEN];
        if !self.read_exact_at(0, &mut area)? {
            return Ok(Vec::new());
        }

        let words: Vec<u32> = area
            .chunks_exact(4)
            .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let count = (words[0] as usize).min(MAX_REQUEST_IDS);
        Ok((0..count).map(|i| (words[1 + 2 * i], words[2 + 2 * i])).collect())
    }

    fn write_request_ids(&self, ids: &[(u32, u32)]) -> Result<()> {
        let mut area = Vec::with_capacity(REQUEST_AREA_LEN);
        #[expect(clippy::cast_possible_truncation, reason = "at most MAX_REQUEST_IDS entries")]
        area.extend_from_slice(&(ids.len() as u32).to_be_bytes());
        for i in 0..MAX_REQUEST_IDS {
            let (pid, host) = ids.get(i).copied().unwrap_or_default();
            area.extend_from_slice(&pid.to_be_bytes());
            area.extend_from_slice(&host.to_be_bytes());
        }
        self.write_all_at(0, &area)
    }

    fn add_request_id(&mut self) -> Result<()> {
        let mut ids = self.read_request_ids()?;
        if ids.len() < MAX_REQUEST_IDS {
            ids.push((self.pid, self.host_id));
            self.write_request_ids(&ids)?;
        }
        Ok(())
    }

    fn remove_request_id(&mut self) -> Result<()> {
        let mut ids = self.read_request_ids()?;
        if let Some(pos) = ids.iter().position(|&(pid, host)| pid == self.pid && host == self.host_id) {
            let _ = ids.remove(pos);
            self.write_request_ids(&ids)?;
        }
        Ok(())
    }

    fn read_info(&self) -> Result<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        if !self.read_exact_at(REQUEST_AREA_SIZE, &mut len_buf)? {
            return Ok(Vec::new());
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        let mut info = vec![0u8; len];
        if !self.read_exact_at(REQUEST_AREA_SIZE + 4, &mut info)? {
            log::warn!(target: LOG_TARGET, "Info block in '{}' is truncated; ignoring it", self.name.display());
            return Ok(Vec::new());
        }
        Ok(info)
    }

    fn write_info(&self, info: &[u8]) -> Result<()> {
        let len = u32::try_from(info.len()).into_app_err("lock info block is too large")?;
        let mut block = Vec::with_capacity(4 + info.len());
        block.extend_from_slice(&len.to_be_bytes());
        block.extend_from_slice(info);
        self.write_all_at(REQUEST_AREA_SIZE, &block)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(1))
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri does not support file locking")]
    fn test_create_initializes_layout() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("table.lock");

        let mut lock = LockFile::new(&path, Duration::ZERO, true, true, false).unwrap();
        assert!(lock.has_locker());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), REQUEST_AREA_SIZE + 4);
        assert_eq!(lock.nr_request_ids().unwrap(), 0);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri does not support file locking")]
    fn test_info_passes_between_holders() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("table.lock");

        let mut first = LockFile::new(&path, Duration::ZERO, true, true, false).unwrap();
        let mut second = LockFile::new(&path, Duration::ZERO, false, true, false).unwrap();

        let mut info = Vec::new();
        assert!(first.acquire(&mut info, LockMode::Write, 1, &policy()).unwrap());
        assert!(info.is_empty());

        let mut other = vec![9];
        assert!(!second.acquire(&mut other, LockMode::Read, 1, &policy()).unwrap());
        assert_eq!(other, vec![9]);

        first.release(b"nrow=10").unwrap();
        assert!(second.acquire(&mut other, LockMode::Read, 1, &policy()).unwrap());
        assert_eq!(other, b"nrow=10");
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri does not support file locking")]
    fn test_waiting_process_is_registered_and_removed() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("table.lock");

        let mut holder = LockFile::new(&path, Duration::ZERO, true, true, false).unwrap();
        let mut waiter = LockFile::new(&path, Duration::ZERO, false, true, false).unwrap();

        let mut info = Vec::new();
        assert!(holder.acquire(&mut info, LockMode::Write, 1, &policy()).unwrap());
        assert!(!waiter.acquire(&mut info, LockMode::Write, 3, &policy()).unwrap());
        // deregistered after giving up
        assert_eq!(holder.nr_request_ids().unwrap(), 0);

        // simulate another process waiting
        waiter.pid += 1;
        waiter.add_request_id().unwrap();
        assert!(holder.inspect().unwrap());
        waiter.remove_request_id().unwrap();
        assert!(!holder.inspect().unwrap());
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri does not support file locking")]
    fn test_inspect_respects_interval() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("table.lock");

        let mut holder = LockFile::new(&path, Duration::from_secs(3600), true, true, false).unwrap();
        let mut waiter = LockFile::new(&path, Duration::ZERO, false, true, false).unwrap();
        waiter.pid += 1;

        assert!(!holder.inspect().unwrap());
        waiter.add_request_id().unwrap();
        // within the interval the list is not read again
        assert!(!holder.inspect().unwrap());
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_uncreatable_file_disables_locking() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("missing_dir").join("table.lock");

        let mut lock = LockFile::new(&path, Duration::ZERO, false, true, false).unwrap();
        assert!(!lock.has_locker());
        assert!(lock.is_locked(LockMode::Write));

        let mut info = vec![1, 2];
        assert!(lock.acquire(&mut info, LockMode::Write, 1, &policy()).unwrap());
        assert!(info.is_empty());
        lock.release(b"ignored").unwrap();

        let _ = LockFile::new(&path, Duration::ZERO, false, true, true).unwrap_err();
    }
}
