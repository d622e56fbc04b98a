//! Integration tests for reference tables and their columns.

use std::sync::Arc;
use tilestore_lib::cache::TableCache;
use tilestore_lib::lock::{LockOption, RetryPolicy, TableLock};
use tilestore_lib::table::{
    ArrayValue, Cell, ColumnAccess, ColumnDesc, PlainTable, RefTable, SortOrder, TableDesc, TableIterator, TableOptions, Value,
};
use tilestore_lib::tsm::{DataType, Shape};

const NROW: u64 = 6;

fn create_table(dir: &std::path::Path) -> Arc<PlainTable> {
    let desc = TableDesc::new()
        .with_column(ColumnDesc::data("DATA", DataType::Int, Shape::from([2, 2])))
        .unwrap()
        .with_column(ColumnDesc::coordinate("TIME", 2))
        .unwrap();
    let options = TableOptions {
        lock: TableLock::new(LockOption::AutoLocking),
        retry: RetryPolicy::new(core::time::Duration::from_millis(1)),
        ..TableOptions::default()
    };
    let table = PlainTable::create(&TableCache::new(), dir, desc, &Shape::from([2, 2, 3]), &options, false).unwrap();
    table.add_rows(NROW).unwrap();
    table
}

fn cell_for(root_row: u64) -> Cell {
    let base = i32::try_from(root_row).unwrap() * 10;
    Cell::from(ArrayValue::from_vec(Shape::from([2, 2]), &[base, base + 1, base + 2, base + 3]).unwrap())
}

#[test]
#[cfg_attr(miri, ignore = "Miri does not support file locking")]
fn test_permuted_view_reads_root_rows() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let root = create_table(&temp_dir.path().join("obs"));

    let data = root.column("DATA").unwrap();
    for row in 0..NROW {
        data.put(row, &cell_for(row)).unwrap();
    }

    let permutation = vec![4, 0, 5, 2, 1, 3];
    let view = RefTable::new(&root, permutation.clone()).unwrap();
    let column = view.column("DATA").unwrap();
    assert_eq!(column.nrow().unwrap(), NROW);

    for (view_row, &root_row) in permutation.iter().enumerate() {
        let view_row = view_row as u64;
        assert_eq!(column.get(view_row).unwrap(), cell_for(root_row));
        assert_eq!(column.shape(view_row).unwrap(), Shape::from([2, 2]));
        assert!(column.is_defined(view_row).unwrap());
    }
}

#[test]
#[cfg_attr(miri, ignore = "Miri does not support file locking")]
fn test_writes_through_a_view_reach_the_root() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let root = create_table(&temp_dir.path().join("obs"));

    let view = RefTable::new(&root, vec![5, 3, 1]).unwrap();
    let column = view.column("DATA").unwrap();
    column.put(1, &cell_for(42)).unwrap();

    let data = root.column("DATA").unwrap();
    assert_eq!(data.get(3).unwrap(), cell_for(42));
    assert_eq!(data.get(1).unwrap(), Cell::from(ArrayValue::zeros(DataType::Int, Shape::from([2, 2])).unwrap()));

    view.remove_row(0).unwrap();
    assert_eq!(view.row_numbers(), vec![3, 1]);
    assert_eq!(column.get(0).unwrap(), cell_for(42));
}

#[test]
#[cfg_attr(miri, ignore = "Miri does not support file locking")]
fn test_sort_filter_and_iterate() {
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let root = create_table(&temp_dir.path().join("obs"));

    let time = root.column("TIME").unwrap();
    for (row, t) in [30.0, 10.0, 20.0, 10.0, 30.0, 20.0].into_iter().enumerate() {
        time.put(row as u64, &Cell::Scalar(Value::Double(t))).unwrap();
    }

    let all = RefTable::all(&root).unwrap();
    let sorted = all.sort_by("TIME", SortOrder::Descending).unwrap();
    assert_eq!(sorted.row_numbers(), vec![0, 4, 2, 5, 1, 3]);

    let late = sorted
        .filter("TIME", |cell| matches!(cell, Cell::Scalar(Value::Double(t)) if *t > 15.0))
        .unwrap();
    assert_eq!(late.row_numbers(), vec![0, 4, 2, 5]);

    let groups: Vec<(Value, usize)> = TableIterator::new(&all, "TIME", SortOrder::Ascending)
        .unwrap()
        .map(|group| {
            let (key, rows) = group.unwrap();
            (key, rows.row_numbers().len())
        })
        .collect();
    assert_eq!(
        groups,
        vec![(Value::Double(10.0), 2), (Value::Double(20.0), 2), (Value::Double(30.0), 2)]
    );
}
