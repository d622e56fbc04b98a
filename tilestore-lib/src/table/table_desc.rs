use crate::Result;
use crate::io::{ObjectReader, ObjectWriter};
use crate::table::ValueRecord;
use crate::tsm::{DataType, Shape};
use ohno::bail;

const TYPE_NAME: &str = "TableDesc";
const VERSION: u32 = 1;

/// How a column relates to the hypercubes of its storage manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Array cells stored in the tiles.
    Data,
    /// Coordinate values for one hypercube axis.
    Coordinate(usize),
    /// A scalar identifying a hypercube.
    Id,
}

/// Description of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDesc {
    pub name: String,
    pub dtype: DataType,
    pub kind: ColumnKind,
    pub shape: Shape,
    pub keywords: ValueRecord,
}

impl ColumnDesc {
    /// A data column with cells of the given shape.
    #[must_use]
    pub fn data(name: impl Into<String>, dtype: DataType, shape: Shape) -> Self {
        Self {
            name: name.into(),
            dtype,
            kind: ColumnKind::Data,
            shape,
            keywords: ValueRecord::new(),
        }
    }

    /// A coordinate column for `axis` of the hypercube.
    ///
    /// The row axis is the one after the last cell axis; its coordinate is a
    /// scalar per row. Other coordinates are a vector per hypercube.
    #[must_use]
    pub fn coordinate(name: impl Into<String>, axis: usize) -> Self {
        Self {
            name: name.into(),
            dtype: DataType::Double,
            kind: ColumnKind::Coordinate(axis),
            shape: Shape::default(),
            keywords: ValueRecord::new(),
        }
    }

    #[must_use]
    pub fn id(name: impl Into<String>, dtype: DataType) -> Self {
        Self {
            name: name.into(),
            dtype,
            kind: ColumnKind::Id,
            shape: Shape::default(),
            keywords: ValueRecord::new(),
        }
    }

    fn put_object(&self, writer: &mut ObjectWriter) -> Result<()> {
        writer.put_str(&self.name)?;
        writer.put_u32(self.dtype.to_code());
        match self.kind {
            ColumnKind::Data => writer.put_u8(0),
            ColumnKind::Coordinate(axis) => {
                writer.put_u8(1);
                writer.put_len(axis)?;
            }
            ColumnKind::Id => writer.put_u8(2),
        }
        writer.put_shape(&self.shape)?;
        writer.put_record(&self.keywords)
    }

    fn get_object(reader: &mut ObjectReader<'_>) -> Result<Self> {
        let name = reader.get_str()?.to_string();
        let dtype = DataType::from_code(reader.get_u32()?)?;
        let kind = match reader.get_u8()? {
            0 => ColumnKind::Data,
            1 => ColumnKind::Coordinate(reader.get_len()?),
            2 => ColumnKind::Id,
            other => bail!("internal error: unknown column kind {other} for column '{name}'"),
        };
        let shape = reader.get_shape()?;
        let keywords = reader.get_record()?;
        Ok(Self {
            name,
            dtype,
            kind,
            shape,
            keywords,
        })
    }
}

/// Description of a table: its columns and table-level keywords.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableDesc {
    columns: Vec<ColumnDesc>,
    pub keywords: ValueRecord,
}

impl TableDesc {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            columns: Vec::new(),
            keywords: ValueRecord::new(),
        }
    }

    pub fn add_column(&mut self, column: ColumnDesc) -> Result<()> {
        if self.column(&column.name).is_some() {
            bail!("column '{}' is already defined", column.name);
        }
        self.columns.push(column);
        Ok(())
    }

    /// Builder-style [`Self::add_column`].
    pub fn with_column(mut self, column: ColumnDesc) -> Result<Self> {
        self.add_column(column)?;
        Ok(self)
    }

    #[must_use]
    pub fn columns(&self) -> &[ColumnDesc] {
        &self.columns
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDesc> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut ColumnDesc> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn data_columns(&self) -> impl Iterator<Item = &ColumnDesc> {
        self.columns.iter().filter(|c| c.kind == ColumnKind::Data)
    }

    pub fn id_columns(&self) -> impl Iterator<Item = &ColumnDesc> {
        self.columns.iter().filter(|c| c.kind == ColumnKind::Id)
    }

    /// The shape shared by all data cells; empty when there are no data columns.
    #[must_use]
    pub fn cell_shape(&self) -> Shape {
        self.data_columns().next().map(|c| c.shape.clone()).unwrap_or_default()
    }

    /// Check that the columns can be stored together in one set of hypercubes.
    pub fn validate(&self) -> Result<()> {
        let cell_shape = self.cell_shape();
        let mut ndata = 0;
        for column in &self.columns {
            match column.kind {
                ColumnKind::Data => {
                    ndata += 1;
                    if !column.dtype.is_tileable() {
                        bail!("data column '{}' has type {} which cannot be stored in tiles", column.name, column.dtype);
                    }
                    if column.shape != cell_shape {
                        bail!(
                            "data column '{}' has shape {} but other data columns have shape {cell_shape}",
                            column.name,
                            column.shape
                        );
                    }
                    if column.shape.product() == 0 {
                        bail!("data column '{}' has an empty cell shape {}", column.name, column.shape);
                    }
                }
                ColumnKind::Coordinate(axis) => {
                    if column.dtype != DataType::Double {
                        bail!("coordinate column '{}' must have type double", column.name);
                    }
                    if axis > cell_shape.ndim() {
                        bail!(
                            "coordinate column '{}' refers to axis {axis} but hypercubes have {} axes",
                            column.name,
                            cell_shape.ndim() + 1
                        );
                    }
                }
                ColumnKind::Id => {
                    if column.shape.ndim() != 0 {
                        bail!("id column '{}' must be scalar", column.name);
                    }
                }
            }
        }

        if ndata == 0 {
            bail!("a tiled table needs at least one data column");
        }
        Ok(())
    }

    pub fn put_object(&self, writer: &mut ObjectWriter) -> Result<()> {
        writer.put_start(TYPE_NAME, VERSION)?;
        writer.put_len(self.columns.len())?;
        for column in &self.columns {
            column.put_object(writer)?;
        }
        writer.put_record(&self.keywords)
    }

    pub fn get_object(reader: &mut ObjectReader<'_>) -> Result<Self> {
        let version = reader.get_start(TYPE_NAME)?;
        if version != VERSION {
            bail!("internal error: unsupported TableDesc version {version}");
        }
        let ncol = reader.get_count(1, "column")?;
        let mut columns = Vec::with_capacity(ncol);
        for _ in 0..ncol {
            columns.push(ColumnDesc::get_object(reader)?);
        }
        let keywords = reader.get_record()?;
        Ok(Self { columns, keywords })
    }
}
