use super::column::{ColumnAccess, IterBuf};
use super::ref_table::RowMapping;
use super::value::{Cell, Slicer, Value, ValueRecord};
use crate::Result;
use crate::tsm::{DataType, Shape};
use std::sync::Arc;

/// A column of a reference table.
///
/// Row numbers are translated to root row numbers on every call, since the
/// view can change between calls. Table-level properties come straight from
/// the underlying column.
#[derive(Debug, Clone)]
pub struct RefColumn {
    column: Arc<dyn ColumnAccess>,
    rows: Arc<dyn RowMapping>,
}

impl RefColumn {
    #[must_use]
    pub fn new(column: Arc<dyn ColumnAccess>, rows: Arc<dyn RowMapping>) -> Self {
        Self { column, rows }
    }

    /// The column of the root table.
    #[must_use]
    pub fn root_column(&self) -> &Arc<dyn ColumnAccess> {
        &self.column
    }
}

impl ColumnAccess for RefColumn {
    fn name(&self) -> &str {
        self.column.name()
    }

    fn data_type(&self) -> DataType {
        self.column.data_type()
    }

    fn nrow(&self) -> Result<u64> {
        Ok(self.rows.nrow())
    }

    fn is_writable(&self) -> bool {
        self.column.is_writable()
    }

    fn is_stored(&self) -> bool {
        self.column.is_stored()
    }

    fn keywords(&self) -> Result<ValueRecord> {
        self.column.keywords()
    }

    fn set_keyword(&self, name: &str, value: Value) -> Result<()> {
        self.column.set_keyword(name, value)
    }

    fn ndim_column(&self) -> usize {
        self.column.ndim_column()
    }

    fn shape_column(&self) -> Shape {
        self.column.shape_column()
    }

    fn ndim(&self, row: u64) -> Result<usize> {
        self.column.ndim(self.rows.root_rownr(row)?)
    }

    fn shape(&self, row: u64) -> Result<Shape> {
        self.column.shape(self.rows.root_rownr(row)?)
    }

    fn is_defined(&self, row: u64) -> Result<bool> {
        self.column.is_defined(self.rows.root_rownr(row)?)
    }

    fn get(&self, row: u64) -> Result<Cell> {
        self.column.get(self.rows.root_rownr(row)?)
    }

    fn put(&self, row: u64, cell: &Cell) -> Result<()> {
        self.column.put(self.rows.root_rownr(row)?, cell)
    }

    fn get_slice(&self, row: u64, slicer: &Slicer) -> Result<Cell> {
        self.column.get_slice(self.rows.root_rownr(row)?, slicer)
    }

    fn put_slice(&self, row: u64, slicer: &Slicer, cell: &Cell) -> Result<()> {
        self.column.put_slice(self.rows.root_rownr(row)?, slicer, cell)
    }

    fn make_sort_key(&self, rows: &[u64]) -> Result<Vec<Value>> {
        let root_rows = rows.iter().map(|&r| self.rows.root_rownr(r)).collect::<Result<Vec<_>>>()?;
        self.column.make_sort_key(&root_rows)
    }

    fn alloc_iter_buf(&self) -> IterBuf {
        self.column.alloc_iter_buf()
    }
}
