//! Tables built on the tiled storage manager, and views of them.
//!
//! - [`PlainTable`]: a table directory with locking and a tiled storage manager
//! - [`TableColumn`]: a stored column of a plain table
//! - [`RefTable`] and [`RefColumn`]: selected or reordered rows of a plain table
//! - [`TableIterator`]: groups of rows with equal values in a column

mod column;
mod plain_table;
mod ref_column;
mod ref_table;
mod table_desc;
mod table_iter;
mod value;

pub use column::{ColumnAccess, IterBuf, TableColumn};
pub use plain_table::{HypercubeInfo, PlainTable, TABLE_FILE_NAME, TableInfo, TableOptions};
pub use ref_column::RefColumn;
pub use ref_table::{RefTable, RowMap, RowMapping, SortOrder};
pub use table_desc::{ColumnDesc, ColumnKind, TableDesc};
pub use table_iter::TableIterator;
pub use value::{ArrayValue, Cell, Element, Slicer, Value, ValueRecord};
