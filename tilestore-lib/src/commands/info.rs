use super::Host;
use super::common::{Common, CommonArgs};
use crate::Result;
use crate::table::{ColumnKind, PlainTable, TableInfo};
use camino::Utf8PathBuf;
use clap::Parser;
use core::fmt::Write;
use owo_colors::OwoColorize;

#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Directory of the table
    #[arg(value_name = "TABLE")]
    pub table: Utf8PathBuf,

    #[command(flatten)]
    pub common: CommonArgs,
}

pub fn show_info<H: Host>(host: &mut H, args: &InfoArgs) -> Result<()> {
    let common = Common::new(host, &args.common)?;
    let table = PlainTable::open(&common.cache, &args.table, false, &common.config.table_options())?;
    let info = table.info()?;

    let mut text = String::new();
    format_info(&info, common.use_colors(), &mut text)?;
    let _ = std::io::Write::write_all(&mut common.host.output(), text.as_bytes());
    Ok(())
}

fn heading(text: &str, use_colors: bool) -> String {
    if use_colors { text.bold().to_string() } else { text.to_string() }
}

fn format_info<W: Write>(info: &TableInfo, use_colors: bool, writer: &mut W) -> Result<()> {
    writeln!(writer, "{} {}", heading("Table", use_colors), info.name.display())?;
    writeln!(writer, "  Created:      {}", info.created.format("%Y-%m-%d %H:%M:%S UTC"))?;
    writeln!(writer, "  Changes:      {}", info.change_count)?;
    writeln!(writer, "  Rows:         {}", info.nrow)?;
    writeln!(writer, "  Lock option:  {}", info.lock_option)?;

    writeln!(writer)?;
    writeln!(writer, "{}", heading("Columns", use_colors))?;
    let width = info.desc.columns().iter().map(|c| c.name.len()).max().unwrap_or(0);
    for column in info.desc.columns() {
        let kind = match column.kind {
            ColumnKind::Data => format!("data {}", column.shape),
            ColumnKind::Coordinate(axis) => format!("coordinate of axis {axis}"),
            ColumnKind::Id => "id".to_string(),
        };
        writeln!(writer, "  {:<width$}  {:<7} {kind}", column.name, column.dtype.to_string())?;
    }

    writeln!(writer)?;
    writeln!(writer, "{}", heading("Hypercubes", use_colors))?;
    if info.hypercubes.is_empty() {
        writeln!(writer, "  (none)")?;
    }
    for (index, cube) in info.hypercubes.iter().enumerate() {
        writeln!(
            writer,
            "  {index}: shape {} tiles {} in file {} ({} bytes)",
            cube.cube_shape, cube.tile_shape, cube.file_seqnr, cube.file_length
        )?;
        for (name, value) in &cube.values {
            writeln!(writer, "       {name} = {value}")?;
        }
    }

    Ok(())
}
