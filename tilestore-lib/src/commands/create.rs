use super::Host;
use super::common::{Common, CommonArgs};
use crate::Result;
use crate::lock::{LockMode, TableLocker};
use crate::table::{ArrayValue, Cell, ColumnAccess, ColumnDesc, PlainTable, TableDesc};
use crate::tsm::{DataType, Shape};
use camino::Utf8PathBuf;
use clap::Parser;
use ohno::{IntoAppError, bail};
use std::io::Write;

#[derive(Parser, Debug)]
pub struct CreateArgs {
    /// Directory of the new table
    #[arg(value_name = "TABLE")]
    pub table: Utf8PathBuf,

    /// Shape of each cell, as comma-separated axis lengths
    #[arg(long, value_name = "SHAPE")]
    pub shape: String,

    /// Shape of a tile, including the row axis (default picks one from the cell shape)
    #[arg(long, value_name = "SHAPE")]
    pub tile: Option<String>,

    /// Number of rows to add
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub rows: u64,

    /// A data column as `NAME:TYPE`; may be repeated
    #[arg(long = "column", value_name = "NAME:TYPE", default_value = "DATA:float")]
    pub columns: Vec<String>,

    /// Value written into every element of every data column
    #[arg(long, value_name = "VALUE")]
    pub fill: Option<f64>,

    /// Replace an existing table
    #[arg(long)]
    pub overwrite: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub fn create_table<H: Host>(host: &mut H, args: &CreateArgs) -> Result<()> {
    let common = Common::new(host, &args.common)?;

    let cell_shape: Shape = args.shape.parse()?;
    let tile_shape: Shape = args.tile.as_deref().map(str::parse::<Shape>).transpose()?.unwrap_or_default();

    let mut desc = TableDesc::new();
    for column in &args.columns {
        desc.add_column(parse_column(column, &cell_shape)?)?;
    }

    let options = common.config.table_options();
    let table = PlainTable::create(&common.cache, &args.table, desc.clone(), &tile_shape, &options, args.overwrite)?;

    if args.rows > 0 {
        let nattempts = options.retry.attempts_for(options.lock.max_wait());
        let _locker = TableLocker::new(&table, LockMode::Write, nattempts)?;
        table.add_rows(args.rows)?;

        if let Some(fill) = args.fill {
            for column_desc in desc.data_columns() {
                let column = table.column(&column_desc.name)?;
                let cell = Cell::from(filled_array(column_desc.dtype, &cell_shape, fill)?);
                for row in 0..args.rows {
                    column.put(row, &cell)?;
                }
            }
        }
        table.flush()?;
    }

    let _ = writeln!(
        common.host.output(),
        "Created table {} with {} row(s) of shape {cell_shape}",
        args.table,
        args.rows
    );
    Ok(())
}

/// Parse `NAME:TYPE` into a data column description.
fn parse_column(arg: &str, cell_shape: &Shape) -> Result<ColumnDesc> {
    let Some((name, dtype)) = arg.split_once(':') else {
        bail!("column '{arg}' must be given as NAME:TYPE");
    };
    if name.is_empty() {
        bail!("column '{arg}' has no name");
    }
    let dtype = dtype
        .parse::<DataType>()
        .ok()
        .into_app_err_with(|| format!("unknown type in column '{arg}'"))?;
    Ok(ColumnDesc::data(name, dtype, cell_shape.clone()))
}

#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "the fill value is converted the way a numeric cast converts it"
)]
fn filled_array(dtype: DataType, shape: &Shape, fill: f64) -> Result<ArrayValue> {
    let n = usize::try_from(shape.product()).into_app_err("cell shape is too large")?;
    let shape = shape.clone();
    match dtype {
        DataType::Bool => ArrayValue::from_vec(shape, &vec![fill != 0.0; n]),
        DataType::UChar => ArrayValue::from_vec(shape, &vec![fill as u8; n]),
        DataType::Short => ArrayValue::from_vec(shape, &vec![fill as i16; n]),
        DataType::Int => ArrayValue::from_vec(shape, &vec![fill as i32; n]),
        DataType::UInt => ArrayValue::from_vec(shape, &vec![fill as u32; n]),
        DataType::Int64 => ArrayValue::from_vec(shape, &vec![fill as i64; n]),
        DataType::Float => ArrayValue::from_vec(shape, &vec![fill as f32; n]),
        DataType::Double => ArrayValue::from_vec(shape, &vec![fill; n]),
        DataType::String => bail!("columns of type {dtype} cannot be filled"),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_parse_column() {
        let shape = Shape::from([2, 3]);
        let column = parse_column("FLAGS:bool", &shape).unwrap();
        assert_eq!(column.name, "FLAGS");
        assert_eq!(column.dtype, DataType::Bool);
        assert_eq!(column.shape, shape);

        assert_eq!(parse_column("D:f64", &shape).unwrap().dtype, DataType::Double);
        let _ = parse_column("DATA", &shape).unwrap_err();
        let _ = parse_column(":int", &shape).unwrap_err();
        let err = parse_column("DATA:complex", &shape).unwrap_err();
        assert!(err.to_string().contains("unknown type in column 'DATA:complex'"), "{err}");
    }

    #[test]
    fn test_filled_array() {
        let shape = Shape::from([2, 2]);
        let array = filled_array(DataType::Short, &shape, 3.7).unwrap();
        assert_eq!(array.to_vec::<i16>().unwrap(), vec![3; 4]);

        let array = filled_array(DataType::Bool, &shape, 1.0).unwrap();
        assert_eq!(array.to_vec::<bool>().unwrap(), vec![true; 4]);

        let _ = filled_array(DataType::String, &shape, 1.0).unwrap_err();
    }
}
