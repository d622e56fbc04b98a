use super::column::ColumnAccess;
use super::ref_table::{RefTable, RowMapping, SortOrder};
use super::value::Value;
use crate::Result;
use std::sync::Arc;

/// Iterates over groups of rows that have equal values in a column.
///
/// The rows are sorted on the column first; each step yields a view of the
/// rows of one group, together with the group's key.
#[derive(Debug)]
pub struct TableIterator {
    sorted: Arc<RefTable>,
    groups: Vec<(Value, Vec<u64>)>,
    next: usize,
}

impl TableIterator {
    pub fn new(table: &Arc<RefTable>, column: &str, order: SortOrder) -> Result<Self> {
        let sorted = table.sort_by(column, order)?;
        let column = sorted.column(column)?;
        let positions: Vec<u64> = (0..sorted.nrow()).collect();
        let keys = column.make_sort_key(&positions)?;

        let mut buf = column.alloc_iter_buf();
        let mut groups: Vec<(Value, Vec<u64>)> = Vec::new();
        for (position, key) in positions.into_iter().zip(keys) {
            if buf.update(&key) {
                groups.push((key, vec![position]));
            } else if let Some((_, rows)) = groups.last_mut() {
                rows.push(position);
            }
        }

        Ok(Self { sorted, groups, next: 0 })
    }

    /// Number of groups.
    #[must_use]
    pub fn ngroups(&self) -> usize {
        self.groups.len()
    }
}

impl Iterator for TableIterator {
    type Item = Result<(Value, Arc<RefTable>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, rows) = self.groups.get(self.next)?;
        self.next += 1;
        Some(self.sorted.select(rows).map(|view| (key.clone(), view)))
    }
}
