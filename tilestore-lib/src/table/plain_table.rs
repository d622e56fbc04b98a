use super::column::TableColumn;
use super::table_desc::TableDesc;
use super::value::ValueRecord;
use crate::Result;
use crate::cache::TableCache;
use crate::io::{ObjectReader, ObjectWriter, absolute_name};
use crate::lock::{LockMode, LockOption, RetryPolicy, TableLock, TableLockData};
use crate::tsm::{CacheConfig, Shape, TiledStMan, TsmCube};
use chrono::{DateTime, Utc};
use ohno::{IntoAppError, bail};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Log target for tables
const LOG_TARGET: &str = "     table";

/// File in a table directory holding the description and bookkeeping.
pub const TABLE_FILE_NAME: &str = "table.dat";

const TYPE_NAME: &str = "Table";
const VERSION: u32 = 1;
const SYNC_TYPE_NAME: &str = "TableSync";

/// The storage manager of a table; a table has exactly one.
const STMAN_SEQNR: u32 = 0;

/// Settings used when a table is created or opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableOptions {
    pub lock: TableLock,
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
}

/// Summary of one hypercube, for display.
#[derive(Debug, Clone, PartialEq)]
pub struct HypercubeInfo {
    pub values: ValueRecord,
    pub cube_shape: Shape,
    pub tile_shape: Shape,
    pub file_seqnr: u32,
    pub file_length: u64,
}

/// Summary of a table, for display.
#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub name: PathBuf,
    pub created: DateTime<Utc>,
    pub change_count: u64,
    pub nrow: u64,
    pub lock_option: LockOption,
    pub desc: TableDesc,
    pub hypercubes: Vec<HypercubeInfo>,
}

/// What is shared between the table and its release callback.
#[derive(Debug)]
pub(crate) struct TableStore {
    dir: PathBuf,
    writable: bool,
    cache: CacheConfig,
    desc: TableDesc,
    stman: TiledStMan,
    created: DateTime<Utc>,
    change_count: u64,
    changed: bool,
}

impl TableStore {
    fn load(dir: &Path, writable: bool, cache: CacheConfig) -> Result<Self> {
        let file_name = dir.join(TABLE_FILE_NAME);
        let bytes = std::fs::read(&file_name).into_app_err_with(|| format!("table '{}' does not exist", dir.display()))?;
        let mut reader = ObjectReader::new(&bytes);

        let version = reader.get_start(TYPE_NAME)?;
        if version != VERSION {
            bail!("internal error: unsupported table version {version} in '{}'", file_name.display());
        }
        let millis = reader.get_i64()?;
        let created = DateTime::<Utc>::from_timestamp_millis(millis)
            .into_app_err_with(|| format!("internal error: invalid creation time in '{}'", file_name.display()))?;
        let change_count = reader.get_u64()?;
        let nrow = reader.get_u64()?;
        let desc = TableDesc::get_object(&mut reader)?;

        let stman = TiledStMan::open(dir, STMAN_SEQNR, &desc, writable, cache)?;
        if stman.nrow() != nrow {
            bail!(
                "internal error: table '{}' has {nrow} rows but its storage has {}",
                dir.display(),
                stman.nrow()
            );
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            writable,
            cache,
            desc,
            stman,
            created,
            change_count,
            changed: false,
        })
    }

    fn write_table_file(&self) -> Result<()> {
        let mut writer = ObjectWriter::new();
        writer.put_start(TYPE_NAME, VERSION)?;
        writer.put_i64(self.created.timestamp_millis());
        writer.put_u64(self.change_count);
        writer.put_u64(self.stman.nrow());
        self.desc.put_object(&mut writer)?;

        let file_name = self.dir.join(TABLE_FILE_NAME);
        std::fs::write(&file_name, writer.into_bytes()).into_app_err_with(|| format!("unable to write file '{}'", file_name.display()))
    }

    /// Write pending changes; each flush that writes counts as one change.
    fn flush(&mut self) -> Result<()> {
        if !self.changed || !self.writable {
            return Ok(());
        }

        self.change_count += 1;
        self.stman.flush()?;
        self.write_table_file()?;
        self.changed = false;
        log::debug!(
            target: LOG_TARGET,
            "Flushed table '{}' (change {})",
            self.dir.display(),
            self.change_count
        );
        Ok(())
    }

    /// The info block left in the lock file for the next holder.
    fn sync_info(&self) -> Result<Vec<u8>> {
        let mut writer = ObjectWriter::new();
        writer.put_start(SYNC_TYPE_NAME, VERSION)?;
        writer.put_u64(self.change_count);
        writer.put_u64(self.stman.nrow());
        Ok(writer.into_bytes())
    }

    /// Reload from disk when the info block shows another process changed the table.
    fn resync(&mut self, info: &[u8]) -> Result<()> {
        if info.is_empty() {
            return Ok(());
        }

        let mut reader = ObjectReader::new(info);
        let _ = reader.get_start(SYNC_TYPE_NAME)?;
        let change_count = reader.get_u64()?;
        let nrow = reader.get_u64()?;
        if change_count == self.change_count {
            return Ok(());
        }

        log::info!(
            target: LOG_TARGET,
            "Table '{}' was changed by another process (change {change_count}, {nrow} rows); reloading",
            self.dir.display()
        );
        *self = Self::load(&self.dir, self.writable, self.cache)?;
        Ok(())
    }

    pub(crate) fn mark_changed(&mut self) {
        self.changed = true;
    }

    pub(crate) const fn desc(&self) -> &TableDesc {
        &self.desc
    }

    pub(crate) const fn desc_mut(&mut self) -> &mut TableDesc {
        &mut self.desc
    }

    pub(crate) const fn stman(&self) -> &TiledStMan {
        &self.stman
    }

    pub(crate) const fn stman_mut(&mut self) -> &mut TiledStMan {
        &mut self.stman
    }
}

/// A table stored in its own directory with a tiled storage manager.
///
/// Every access takes the table lock according to the table's
/// [`LockOption`]. With auto-locking the lock is acquired on demand and
/// given up as soon as another process asks for it; before a write lock is
/// given up the table is flushed, and the next holder reloads it.
#[derive(Debug)]
pub struct PlainTable {
    writable: bool,
    cache: Arc<TableCache<Self>>,
    lock: Mutex<TableLockData>,
    store: Arc<Mutex<TableStore>>,
}

impl PlainTable {
    /// Create a new table in directory `name`.
    ///
    /// Fails when a table already exists there, unless `overwrite` is set
    /// and the table is not open in this process.
    pub fn create(
        cache: &Arc<TableCache<Self>>,
        name: impl AsRef<Path>,
        desc: TableDesc,
        tile_shape: &Shape,
        options: &TableOptions,
        overwrite: bool,
    ) -> Result<Arc<Self>> {
        let dir = absolute_name(name)?;
        if cache.get(&dir)?.is_some() {
            bail!("table '{}' is open in this process", dir.display());
        }
        if dir.join(TABLE_FILE_NAME).exists() {
            if !overwrite {
                bail!("table '{}' already exists", dir.display());
            }
            std::fs::remove_dir_all(&dir).into_app_err_with(|| format!("unable to remove table '{}'", dir.display()))?;
        }
        std::fs::create_dir_all(&dir).into_app_err_with(|| format!("unable to create directory '{}'", dir.display()))?;

        let mut lock = TableLockData::new(options.lock, options.retry);
        lock.make_lock(&dir, true, LockMode::Write)?;
        if !lock.has_lock(LockMode::Write) {
            let nattempts = lock.nattempts();
            lock.acquire_or_fail(&mut Vec::new(), LockMode::Write, nattempts)?;
        }

        let stman = TiledStMan::create(&dir, STMAN_SEQNR, &desc, tile_shape, options.cache)?;
        let mut store = TableStore {
            dir: dir.clone(),
            writable: true,
            cache: options.cache,
            desc,
            stman,
            created: Utc::now(),
            change_count: 0,
            changed: true,
        };
        store.flush()?;
        log::info!(target: LOG_TARGET, "Created table '{}'", dir.display());

        let table = Self::register(cache, &dir, true, lock, store)?;
        if options.lock.option() == LockOption::UserLocking {
            table.unlock()?;
        }
        Ok(table)
    }

    /// Open the table in directory `name`.
    ///
    /// A table already open in this process is shared; its lock settings are
    /// merged with `options`.
    pub fn open(cache: &Arc<TableCache<Self>>, name: impl AsRef<Path>, writable: bool, options: &TableOptions) -> Result<Arc<Self>> {
        let dir = absolute_name(name)?;
        if let Some(table) = cache.get(&dir)? {
            if writable && !table.writable {
                bail!("table '{}' is already open read-only in this process", dir.display());
            }
            table.lock_data().merge_options(&options.lock);
            log::debug!(target: LOG_TARGET, "Reusing open table '{}'", dir.display());
            return Ok(table);
        }

        if !dir.join(TABLE_FILE_NAME).exists() {
            bail!("table '{}' does not exist", dir.display());
        }

        let mode = if writable { LockMode::Write } else { LockMode::Read };
        let mut lock = TableLockData::new(options.lock, options.retry);
        lock.make_lock(&dir, false, mode)?;
        if !lock.has_lock(LockMode::Read) {
            let nattempts = lock.nattempts();
            lock.acquire_or_fail(&mut Vec::new(), LockMode::Read, nattempts)?;
        }

        let store = TableStore::load(&dir, writable, options.cache)?;
        log::debug!(
            target: LOG_TARGET,
            "Opened table '{}' with {} rows",
            dir.display(),
            store.stman.nrow()
        );

        let table = Self::register(cache, &dir, writable, lock, store)?;
        if options.lock.option() == LockOption::UserLocking {
            table.unlock()?;
        }
        Ok(table)
    }

    fn register(cache: &Arc<TableCache<Self>>, dir: &Path, writable: bool, mut lock: TableLockData, store: TableStore) -> Result<Arc<Self>> {
        let store = Arc::new(Mutex::new(store));
        let shared = Arc::clone(&store);
        lock.set_release_callback(Box::new(move |_always| {
            let mut store = shared.lock().expect("lock poisoned");
            store.flush()?;
            store.sync_info()
        }));

        let table = Arc::new(Self {
            writable,
            cache: Arc::clone(cache),
            lock: Mutex::new(lock),
            store,
        });
        cache.define(dir, &table)?;
        Ok(table)
    }

    /// Absolute path of the table directory.
    #[must_use]
    pub fn name(&self) -> PathBuf {
        self.store().dir.clone()
    }

    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn nrow(&self) -> Result<u64> {
        self.with_store(LockMode::Read, |store| Ok(store.stman.nrow()))
    }

    pub fn desc(&self) -> Result<TableDesc> {
        self.with_store(LockMode::Read, |store| Ok(store.desc.clone()))
    }

    /// Add `n` rows to the last hypercube.
    pub fn add_rows(&self, n: u64) -> Result<()> {
        self.with_store(LockMode::Write, |store| {
            store.stman.add_rows(n)?;
            store.mark_changed();
            Ok(())
        })
    }

    /// Add a hypercube with the given id and coordinate values; returns its index.
    pub fn add_hypercube(&self, values: ValueRecord) -> Result<usize> {
        self.with_store(LockMode::Write, |store| {
            let index = store.stman.add_hypercube(values)?;
            store.mark_changed();
            Ok(index)
        })
    }

    /// Access to the named column.
    pub fn column(self: &Arc<Self>, name: &str) -> Result<TableColumn> {
        let (index, desc, row_axis) = self.with_store(LockMode::Read, |store| {
            let index = store.stman.column_index(name)?;
            let desc = store
                .desc
                .column(name)
                .cloned()
                .into_app_err_with(|| format!("internal error: column '{name}' has no description"))?;
            Ok((index, desc, store.desc.cell_shape().ndim()))
        })?;
        Ok(TableColumn::new(Arc::clone(self), index, desc, row_axis))
    }

    /// Limit the tile cache of every hypercube to `nbytes` (0 means no limit).
    pub fn set_maximum_cache_size(&self, nbytes: u64) -> Result<()> {
        self.with_store(LockMode::Read, |store| store.stman.set_maximum_cache_size(nbytes))
    }

    /// Write all pending changes to disk.
    pub fn flush(&self) -> Result<()> {
        if !self.writable {
            return Ok(());
        }
        self.with_store(LockMode::Write, TableStore::flush)
    }

    /// Move the table to directory `new_name`.
    pub fn rename(&self, new_name: impl AsRef<Path>) -> Result<()> {
        let new_dir = absolute_name(new_name)?;
        self.with_store(LockMode::Write, |store| {
            if new_dir.exists() {
                bail!("cannot rename table '{}': '{}' already exists", store.dir.display(), new_dir.display());
            }
            store.flush()?;

            let old_dir = store.dir.clone();
            std::fs::rename(&old_dir, &new_dir).into_app_err_with(|| {
                format!("unable to rename table '{}' to '{}'", old_dir.display(), new_dir.display())
            })?;
            store.stman.set_dir(&new_dir)?;
            store.dir.clone_from(&new_dir);
            self.cache.rename(&new_dir, &old_dir)?;
            log::info!(target: LOG_TARGET, "Renamed table '{}' to '{}'", old_dir.display(), new_dir.display());
            Ok(())
        })
    }

    /// Acquire the table lock explicitly, reloading the table if another process changed it.
    pub fn lock(&self, mode: LockMode, nattempts: u32) -> Result<bool> {
        if mode == LockMode::Write && !self.writable {
            bail!("table '{}' is not writable", self.name().display());
        }

        let mut lock = self.lock_data();
        let mut info = Vec::new();
        if !lock.acquire(&mut info, mode, nattempts)? {
            return Ok(false);
        }
        self.store().resync(&info)?;
        Ok(true)
    }

    /// Release the table lock; a permanent lock is kept.
    pub fn unlock(&self) -> Result<()> {
        let mut lock = self.lock_data();
        if lock.option() == LockOption::NoLocking {
            return self.store().flush();
        }
        lock.release(false)
    }

    #[must_use]
    pub fn has_lock(&self, mode: LockMode) -> bool {
        self.lock_data().has_lock(mode)
    }

    /// Why the last attempt to lock the table failed, empty when it did not.
    #[must_use]
    pub fn last_lock_message(&self) -> String {
        self.lock_data().last_message().to_string()
    }

    #[must_use]
    pub fn lock_option(&self) -> LockOption {
        self.lock_data().option()
    }

    /// A summary of the table and its hypercubes.
    pub fn info(&self) -> Result<TableInfo> {
        let lock_option = self.lock_option();
        self.with_store(LockMode::Read, |store| {
            let files = store.stman.files();
            let hypercubes = store
                .stman
                .hypercubes()
                .iter()
                .map(|cube: &TsmCube| HypercubeInfo {
                    values: cube.values().clone(),
                    cube_shape: cube.cube_shape().clone(),
                    tile_shape: cube.tile_shape().clone(),
                    file_seqnr: cube.file_seqnr(),
                    file_length: files.get(cube.file_seqnr() as usize).map_or(0, |f| f.length()),
                })
                .collect();

            Ok(TableInfo {
                name: store.dir.clone(),
                created: store.created,
                change_count: store.change_count,
                nrow: store.stman.nrow(),
                lock_option,
                desc: store.desc.clone(),
                hypercubes,
            })
        })
    }

    /// Run `f` on the table contents while holding the lock in `mode`.
    ///
    /// With auto-locking the lock is acquired when needed and released
    /// afterwards if another process is waiting for it.
    pub(crate) fn with_store<R>(&self, mode: LockMode, f: impl FnOnce(&mut TableStore) -> Result<R>) -> Result<R> {
        if mode == LockMode::Write && !self.writable {
            bail!("table '{}' is not writable", self.name().display());
        }

        let mut lock = self.lock_data();
        if !lock.has_lock(mode) {
            match lock.option() {
                LockOption::AutoLocking => {
                    let mut info = Vec::new();
                    let nattempts = lock.nattempts();
                    lock.acquire_or_fail(&mut info, mode, nattempts)?;
                    self.store().resync(&info)?;
                }
                LockOption::UserLocking if mode == LockMode::Write => {
                    bail!("table '{}' must be write-locked before it is changed", self.name().display());
                }
                _ => {}
            }
        }

        let result = f(&mut self.store());
        let _ = lock.auto_release(false)?;
        result
    }

    fn lock_data(&self) -> MutexGuard<'_, TableLockData> {
        self.lock.lock().expect("lock poisoned")
    }

    fn store(&self) -> MutexGuard<'_, TableStore> {
        self.store.lock().expect("lock poisoned")
    }
}

impl Drop for PlainTable {
    fn drop(&mut self) {
        let name = match self.store.lock() {
            Ok(mut store) => {
                if let Err(e) = store.flush() {
                    log::warn!(target: LOG_TARGET, "Could not flush table '{}': {e:#}", store.dir.display());
                }
                store.dir.clone()
            }
            Err(_) => return,
        };

        if let Ok(lock) = self.lock.get_mut()
            && let Err(e) = lock.release(true)
        {
            log::warn!(target: LOG_TARGET, "Could not release the lock on table '{}': {e:#}", name.display());
        }

        if let Err(e) = self.cache.remove(&name) {
            log::warn!(target: LOG_TARGET, "Could not remove table '{}' from the cache: {e:#}", name.display());
        }
        log::debug!(target: LOG_TARGET, "Closed table '{}'", name.display());
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::table::{ArrayValue, Cell, ColumnAccess, ColumnDesc, Value};
    use crate::tsm::DataType;
    use core::time::Duration;

    fn desc() -> TableDesc {
        TableDesc::new()
            .with_column(ColumnDesc::data("DATA", DataType::Float, Shape::from([2, 3])))
            .unwrap()
            .with_column(ColumnDesc::coordinate("TIME", 2))
            .unwrap()
    }

    fn options(option: LockOption) -> TableOptions {
        TableOptions {
            lock: TableLock::with_interval(option, Duration::ZERO, Duration::from_millis(5)),
            retry: RetryPolicy::new(Duration::from_millis(1)),
            cache: CacheConfig::default(),
        }
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri does not support file locking")]
    fn test_create_and_reopen() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dir = temp_dir.path().join("tab");
        let cache = TableCache::new();

        {
            let table = PlainTable::create(&cache, &dir, desc(), &Shape::default(), &options(LockOption::AutoLocking), false).unwrap();
            table.add_rows(3).unwrap();
            let column = table.column("DATA").unwrap();
            let cell = ArrayValue::from_vec(Shape::from([2, 3]), &[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
            column.put(1, &Cell::from(cell)).unwrap();
            assert_eq!(cache.ntable(), 1);
        }
        assert_eq!(cache.ntable(), 0);

        let table = PlainTable::open(&cache, &dir, false, &options(LockOption::AutoLocking)).unwrap();
        assert_eq!(table.nrow().unwrap(), 3);
        let cell = table.column("DATA").unwrap().get(1).unwrap().into_array().unwrap();
        assert_eq!(cell.to_vec::<f32>().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let info = table.info().unwrap();
        assert_eq!(info.nrow, 3);
        assert_eq!(info.hypercubes.len(), 1);
        assert!(info.change_count >= 1);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri does not support file locking")]
    fn test_open_reuses_live_table() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dir = temp_dir.path().join("tab");
        let cache = TableCache::new();

        let table = PlainTable::create(&cache, &dir, desc(), &Shape::default(), &options(LockOption::AutoLocking), false).unwrap();
        let again = PlainTable::open(&cache, dir.join("..").join("tab"), true, &options(LockOption::AutoLocking)).unwrap();
        assert!(Arc::ptr_eq(&table, &again));

        let err = PlainTable::create(&cache, &dir, desc(), &Shape::default(), &options(LockOption::AutoLocking), true).unwrap_err();
        assert!(err.to_string().contains("open in this process"));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri does not support file locking")]
    fn test_create_refuses_existing_table() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dir = temp_dir.path().join("tab");
        let cache = TableCache::new();

        drop(PlainTable::create(&cache, &dir, desc(), &Shape::default(), &options(LockOption::AutoLocking), false).unwrap());
        let err = PlainTable::create(&cache, &dir, desc(), &Shape::default(), &options(LockOption::AutoLocking), false).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        let table = PlainTable::create(&cache, &dir, desc(), &Shape::default(), &options(LockOption::AutoLocking), true).unwrap();
        assert_eq!(table.nrow().unwrap(), 0);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri does not support file locking")]
    fn test_user_locking_requires_explicit_lock() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dir = temp_dir.path().join("tab");
        let cache = TableCache::new();

        let table = PlainTable::create(&cache, &dir, desc(), &Shape::default(), &options(LockOption::UserLocking), false).unwrap();
        assert!(!table.has_lock(LockMode::Read));

        let err = table.add_rows(1).unwrap_err();
        assert!(err.to_string().contains("must be write-locked"));

        assert!(table.lock(LockMode::Write, 1).unwrap());
        table.add_rows(2).unwrap();
        table.unlock().unwrap();
        assert_eq!(table.nrow().unwrap(), 2);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri does not support file locking")]
    fn test_changes_reach_other_opener() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dir = temp_dir.path().join("tab");
        let writer_cache = TableCache::new();
        let reader_cache = TableCache::new();

        let writer = PlainTable::create(&writer_cache, &dir, desc(), &Shape::default(), &options(LockOption::UserLocking), false).unwrap();
        let reader = PlainTable::open(&reader_cache, &dir, false, &options(LockOption::UserLocking)).unwrap();

        assert!(writer.lock(LockMode::Write, 1).unwrap());
        writer.add_rows(4).unwrap();
        // held by the writer
        assert!(!reader.lock(LockMode::Read, 1).unwrap());
        writer.unlock().unwrap();

        assert!(reader.lock(LockMode::Read, 1).unwrap());
        assert_eq!(reader.nrow().unwrap(), 4);
        reader.unlock().unwrap();
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri does not support file locking")]
    fn test_rename_moves_cache_entry() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dir = temp_dir.path().join("tab");
        let new_dir = temp_dir.path().join("renamed");
        let cache = TableCache::new();

        let table = PlainTable::create(&cache, &dir, desc(), &Shape::default(), &options(LockOption::AutoLocking), false).unwrap();
        table.add_rows(1).unwrap();
        table.rename(&new_dir).unwrap();

        assert!(cache.get(&dir).unwrap().is_none());
        assert!(cache.get(&new_dir).unwrap().is_some());
        assert_eq!(table.name(), new_dir);
        assert!(new_dir.join(TABLE_FILE_NAME).exists());
        table.column("TIME").unwrap().put(0, &Cell::Scalar(Value::Double(1.5))).unwrap();
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri does not support file locking")]
    fn test_read_only_table_refuses_changes() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dir = temp_dir.path().join("tab");

        drop(PlainTable::create(&TableCache::new(), &dir, desc(), &Shape::default(), &options(LockOption::AutoLocking), false).unwrap());

        let table = PlainTable::open(&TableCache::new(), &dir, false, &options(LockOption::AutoLocking)).unwrap();
        let err = table.add_rows(1).unwrap_err();
        assert!(err.to_string().contains("not writable"));
    }
}
