use super::plain_table::PlainTable;
use super::table_desc::{ColumnDesc, ColumnKind};
use super::value::{Cell, Slicer, Value, ValueRecord};
use crate::Result;
use crate::lock::LockMode;
use crate::tsm::{DataType, Shape};
use core::fmt::Debug;
use ohno::{IntoAppError, bail};
use std::sync::Arc;

/// Row-level and table-level access to one column of a table.
///
/// Implemented by stored columns and by views that map rows onto them.
pub trait ColumnAccess: Debug + Send + Sync {
    fn name(&self) -> &str;

    fn data_type(&self) -> DataType;

    fn nrow(&self) -> Result<u64>;

    fn is_writable(&self) -> bool;

    /// Whether the cells are stored, as opposed to computed on the fly.
    fn is_stored(&self) -> bool;

    fn keywords(&self) -> Result<ValueRecord>;

    fn set_keyword(&self, name: &str, value: Value) -> Result<()>;

    /// Number of axes of every cell; 0 for scalar columns.
    fn ndim_column(&self) -> usize;

    /// Shape of every cell; empty when cells are scalars or vary per hypercube.
    fn shape_column(&self) -> Shape;

    fn ndim(&self, row: u64) -> Result<usize> {
        Ok(self.shape(row)?.ndim())
    }

    fn shape(&self, row: u64) -> Result<Shape>;

    fn is_defined(&self, row: u64) -> Result<bool>;

    fn get(&self, row: u64) -> Result<Cell>;

    fn put(&self, row: u64, cell: &Cell) -> Result<()>;

    fn get_slice(&self, row: u64, slicer: &Slicer) -> Result<Cell>;

    fn put_slice(&self, row: u64, slicer: &Slicer, cell: &Cell) -> Result<()>;

    /// The values that `rows` are sorted or grouped on, one per row.
    fn make_sort_key(&self, rows: &[u64]) -> Result<Vec<Value>> {
        rows.iter()
            .map(|&row| {
                self.get(row)?
                    .sort_value()
                    .into_app_err_with(|| format!("column '{}' cannot be sorted on", self.name()))
            })
            .collect()
    }

    /// A buffer for iterating over groups of equal values in this column.
    fn alloc_iter_buf(&self) -> IterBuf {
        IterBuf::new(self.name(), self.data_type())
    }
}

/// Holds the key of the current group while iterating over a column.
#[derive(Debug, Clone, PartialEq)]
pub struct IterBuf {
    column: String,
    dtype: DataType,
    key: Option<Value>,
}

impl IterBuf {
    #[must_use]
    pub fn new(column: impl Into<String>, dtype: DataType) -> Self {
        Self {
            column: column.into(),
            dtype,
            key: None,
        }
    }

    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.dtype
    }

    #[must_use]
    pub const fn key(&self) -> Option<&Value> {
        self.key.as_ref()
    }

    /// Store `value` as the current key; returns whether it starts a new group.
    pub fn update(&mut self, value: &Value) -> bool {
        if self.key.as_ref().is_some_and(|k| k.compare(value).is_eq()) {
            return false;
        }
        self.key = Some(value.clone());
        true
    }
}

/// A stored column of a [`PlainTable`].
#[derive(Debug, Clone)]
pub struct TableColumn {
    table: Arc<PlainTable>,
    index: usize,
    desc: ColumnDesc,
    row_axis: usize,
}

impl TableColumn {
    pub(crate) const fn new(table: Arc<PlainTable>, index: usize, desc: ColumnDesc, row_axis: usize) -> Self {
        Self {
            table,
            index,
            desc,
            row_axis,
        }
    }

    #[must_use]
    pub const fn table(&self) -> &Arc<PlainTable> {
        &self.table
    }

    #[must_use]
    pub const fn desc(&self) -> &ColumnDesc {
        &self.desc
    }
}

impl ColumnAccess for TableColumn {
    fn name(&self) -> &str {
        &self.desc.name
    }

    fn data_type(&self) -> DataType {
        self.desc.dtype
    }

    fn nrow(&self) -> Result<u64> {
        self.table.nrow()
    }

    fn is_writable(&self) -> bool {
        self.table.is_writable() && self.desc.kind != ColumnKind::Id
    }

    fn is_stored(&self) -> bool {
        true
    }

    fn keywords(&self) -> Result<ValueRecord> {
        self.table.with_store(LockMode::Read, |store| {
            Ok(store.desc().column(&self.desc.name).map(|c| c.keywords.clone()).unwrap_or_default())
        })
    }

    fn set_keyword(&self, name: &str, value: Value) -> Result<()> {
        self.table.with_store(LockMode::Write, |store| {
            let Some(column) = store.desc_mut().column_mut(&self.desc.name) else {
                bail!("internal error: column '{}' has no description", self.desc.name);
            };
            let _ = column.keywords.insert(name.to_string(), value);
            store.mark_changed();
            Ok(())
        })
    }

    fn ndim_column(&self) -> usize {
        match self.desc.kind {
            ColumnKind::Data => self.desc.shape.ndim(),
            ColumnKind::Coordinate(axis) if axis != self.row_axis => 1,
            ColumnKind::Coordinate(_) | ColumnKind::Id => 0,
        }
    }

    fn shape_column(&self) -> Shape {
        match self.desc.kind {
            ColumnKind::Data => self.desc.shape.clone(),
            ColumnKind::Coordinate(_) | ColumnKind::Id => Shape::default(),
        }
    }

    fn shape(&self, row: u64) -> Result<Shape> {
        self.table.with_store(LockMode::Read, |store| store.stman().shape(self.index, row))
    }

    fn is_defined(&self, row: u64) -> Result<bool> {
        self.table.with_store(LockMode::Read, |store| store.stman().is_defined(self.index, row))
    }

    fn get(&self, row: u64) -> Result<Cell> {
        self.table.with_store(LockMode::Read, |store| store.stman_mut().get(self.index, row))
    }

    fn put(&self, row: u64, cell: &Cell) -> Result<()> {
        self.table.with_store(LockMode::Write, |store| {
            store.stman_mut().put(self.index, row, cell)?;
            store.mark_changed();
            Ok(())
        })
    }

    fn get_slice(&self, row: u64, slicer: &Slicer) -> Result<Cell> {
        self.table
            .with_store(LockMode::Read, |store| store.stman_mut().get_slice(self.index, row, slicer))
    }

    fn put_slice(&self, row: u64, slicer: &Slicer, cell: &Cell) -> Result<()> {
        self.table.with_store(LockMode::Write, |store| {
            store.stman_mut().put_slice(self.index, row, slicer, cell)?;
            store.mark_changed();
            Ok(())
        })
    }

    fn make_sort_key(&self, rows: &[u64]) -> Result<Vec<Value>> {
        self.table.with_store(LockMode::Read, |store| {
            rows.iter()
                .map(|&row| {
                    store
                        .stman_mut()
                        .get(self.index, row)?
                        .sort_value()
                        .into_app_err_with(|| format!("column '{}' cannot be sorted on", self.desc.name))
                })
                .collect()
        })
    }
}
