use super::column::ColumnAccess;
use super::plain_table::PlainTable;
use super::ref_column::RefColumn;
use super::value::Cell;
use crate::Result;
use core::fmt::Debug;
use ohno::bail;
use std::sync::{Arc, Mutex};

/// Log target for tables
const LOG_TARGET: &str = "     table";

/// Translates the row numbers of a view into row numbers of its root table.
pub trait RowMapping: Debug + Send + Sync {
    fn nrow(&self) -> u64;

    fn root_rownr(&self, rownr: u64) -> Result<u64>;
}

/// A fixed list of root row numbers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowMap(Vec<u64>);

impl RowMap {
    #[must_use]
    pub const fn new(rows: Vec<u64>) -> Self {
        Self(rows)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }
}

impl RowMapping for RowMap {
    fn nrow(&self) -> u64 {
        self.0.len() as u64
    }

    fn root_rownr(&self, rownr: u64) -> Result<u64> {
        match usize::try_from(rownr).ok().and_then(|i| self.0.get(i)) {
            Some(&root) => Ok(root),
            None => bail!("row {rownr} is out of range (view has {} rows)", self.0.len()),
        }
    }
}

/// Direction of a sort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// A view of selected and reordered rows of a [`PlainTable`].
///
/// The view holds root row numbers only; cells are read from and written to
/// the root table.
#[derive(Debug)]
pub struct RefTable {
    root: Arc<PlainTable>,
    rows: Mutex<RowMap>,
}

impl RefTable {
    /// A view of the given root rows, in the given order.
    pub fn new(root: &Arc<PlainTable>, rows: Vec<u64>) -> Result<Arc<Self>> {
        let nrow = root.nrow()?;
        if let Some(bad) = rows.iter().find(|&&r| r >= nrow) {
            bail!("row {bad} is out of range (table '{}' has {nrow} rows)", root.name().display());
        }
        Ok(Arc::new(Self {
            root: Arc::clone(root),
            rows: Mutex::new(RowMap::new(rows)),
        }))
    }

    /// A view of all rows of `root`.
    pub fn all(root: &Arc<PlainTable>) -> Result<Arc<Self>> {
        let nrow = root.nrow()?;
        Self::new(root, (0..nrow).collect())
    }

    #[must_use]
    pub const fn root(&self) -> &Arc<PlainTable> {
        &self.root
    }

    /// The root row numbers, in view order.
    #[must_use]
    pub fn row_numbers(&self) -> Vec<u64> {
        self.rows.lock().expect("lock poisoned").as_slice().to_vec()
    }

    /// A view of some rows of this view, given as row numbers of this view.
    pub fn select(&self, rows: &[u64]) -> Result<Arc<Self>> {
        let root_rows = rows.iter().map(|&r| self.root_rownr(r)).collect::<Result<Vec<_>>>()?;
        Ok(Arc::new(Self {
            root: Arc::clone(&self.root),
            rows: Mutex::new(RowMap::new(root_rows)),
        }))
    }

    /// A view with the rows of this view ordered on `column`; equal keys keep their order.
    pub fn sort_by(self: &Arc<Self>, column: &str, order: SortOrder) -> Result<Arc<Self>> {
        let column = self.column(column)?;
        let positions: Vec<u64> = (0..self.nrow()).collect();
        let keys = column.make_sort_key(&positions)?;

        let mut order_of: Vec<usize> = (0..keys.len()).collect();
        order_of.sort_by(|&a, &b| {
            let ord = keys[a].compare(&keys[b]);
            match order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            }
        });

        let rows: Vec<u64> = order_of.into_iter().map(|i| positions[i]).collect();
        log::debug!(target: LOG_TARGET, "Sorted {} rows on column '{}'", rows.len(), column.name());
        self.select(&rows)
    }

    /// A view with the rows of this view whose cell in `column` satisfies `predicate`.
    pub fn filter(self: &Arc<Self>, column: &str, mut predicate: impl FnMut(&Cell) -> bool) -> Result<Arc<Self>> {
        let column = self.column(column)?;
        let mut rows = Vec::new();
        for row in 0..self.nrow() {
            if predicate(&column.get(row)?) {
                rows.push(row);
            }
        }
        self.select(&rows)
    }

    /// Drop a row from the view; the root table is not changed.
    pub fn remove_row(&self, rownr: u64) -> Result<()> {
        let mut rows = self.rows.lock().expect("lock poisoned");
        let nrow = rows.0.len();
        match usize::try_from(rownr).ok().filter(|&i| i < nrow) {
            Some(i) => {
                let _ = rows.0.remove(i);
                Ok(())
            }
            None => bail!("row {rownr} is out of range (view has {nrow} rows)"),
        }
    }

    /// A column of the view, reading and writing through to the root table.
    pub fn column(self: &Arc<Self>, name: &str) -> Result<RefColumn> {
        let column: Arc<dyn ColumnAccess> = Arc::new(self.root.column(name)?);
        let rows: Arc<dyn RowMapping> = Arc::clone(self) as Arc<dyn RowMapping>;
        Ok(RefColumn::new(column, rows))
    }
}

impl RowMapping for RefTable {
    fn nrow(&self) -> u64 {
        self.rows.lock().expect("lock poisoned").nrow()
    }

    fn root_rownr(&self, rownr: u64) -> Result<u64> {
        self.rows.lock().expect("lock poisoned").root_rownr(rownr)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::cache::TableCache;
    use crate::lock::{LockOption, RetryPolicy, TableLock};
    use crate::table::{ColumnDesc, TableDesc, TableOptions, Value};
    use crate::tsm::{DataType, Shape};
    use core::time::Duration;

    fn table(dir: &std::path::Path, times: &[f64]) -> Arc<PlainTable> {
        let desc = TableDesc::new()
            .with_column(ColumnDesc::data("DATA", DataType::Double, Shape::from([2])))
            .unwrap()
            .with_column(ColumnDesc::coordinate("TIME", 1))
            .unwrap();
        let options = TableOptions {
            lock: TableLock::new(LockOption::AutoLocking),
            retry: RetryPolicy::new(Duration::from_millis(1)),
            ..TableOptions::default()
        };
        let table = PlainTable::create(&TableCache::new(), dir, desc, &Shape::default(), &options, false).unwrap();
        table.add_rows(times.len() as u64).unwrap();
        let time = table.column("TIME").unwrap();
        for (row, &t) in times.iter().enumerate() {
            time.put(row as u64, &Cell::Scalar(Value::Double(t))).unwrap();
        }
        table
    }

    #[test]
    fn test_row_map_bounds() {
        let map = RowMap::new(vec![4, 2]);
        assert_eq!(map.nrow(), 2);
        assert_eq!(map.root_rownr(1).unwrap(), 2);
        let _ = map.root_rownr(2).unwrap_err();
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri does not support file locking")]
    fn test_sort_and_select() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = table(&temp_dir.path().join("tab"), &[3.0, 1.0, 2.0, 1.0]);
        let all = RefTable::all(&root).unwrap();

        let sorted = all.sort_by("TIME", SortOrder::Ascending).unwrap();
        assert_eq!(sorted.row_numbers(), vec![1, 3, 2, 0]);

        let descending = all.sort_by("TIME", SortOrder::Descending).unwrap();
        assert_eq!(descending.row_numbers(), vec![0, 2, 1, 3]);

        let picked = sorted.select(&[3, 0]).unwrap();
        assert_eq!(picked.row_numbers(), vec![0, 1]);
        let _ = sorted.select(&[4]).unwrap_err();
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri does not support file locking")]
    fn test_filter_and_remove() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = table(&temp_dir.path().join("tab"), &[3.0, 1.0, 2.0, 1.0]);
        let all = RefTable::all(&root).unwrap();

        let ones = all
            .filter("TIME", |cell| matches!(cell, Cell::Scalar(Value::Double(t)) if *t == 1.0))
            .unwrap();
        assert_eq!(ones.row_numbers(), vec![1, 3]);

        ones.remove_row(0).unwrap();
        assert_eq!(ones.row_numbers(), vec![3]);
        let _ = ones.remove_row(1).unwrap_err();
        assert_eq!(root.nrow().unwrap(), 4);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri does not support file locking")]
    fn test_new_checks_rows() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = table(&temp_dir.path().join("tab"), &[1.0]);
        let _ = RefTable::new(&root, vec![1]).unwrap_err();
        assert_eq!(RefTable::new(&root, vec![0, 0]).unwrap().nrow(), 2);
    }
}
