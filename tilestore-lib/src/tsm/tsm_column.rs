use super::data_type::DataType;
use super::shape::Shape;
use super::tsm_cube::TsmCube;
use super::tsm_file::TsmFile;
use crate::Result;
use crate::table::{ArrayValue, Cell, Slicer, Value};
use ohno::bail;

/// Accessor for a column whose cells are stored in the tiles of a hypercube.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsmDataColumn {
    colnr: usize,
    dtype: DataType,
}

/// Accessor for a coordinate column; its values live in the cube's value record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsmCoordColumn {
    axis: usize,
}

/// Accessor for an id column: one read-only value per hypercube.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsmIdColumn;

/// The specialized accessor installed in a [`TsmColumn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsmColumnKind {
    Data(TsmDataColumn),
    Coord(TsmCoordColumn),
    Id(TsmIdColumn),
}

/// A column of a tiled storage manager.
///
/// It starts out as a plain description. One of the `make_*` operations
/// installs the accessor that does the actual work; the owner can take it
/// back out with [`Self::unlink`]. Cloning copies the description only, so a
/// copy never shares the accessor of the source column.
#[derive(Debug)]
pub struct TsmColumn {
    dtype: DataType,
    stman_seqnr: u32,
    name: String,
    shape: Shape,
    accessor: Option<Box<TsmColumnKind>>,
}

impl Clone for TsmColumn {
    fn clone(&self) -> Self {
        Self {
            dtype: self.dtype,
            stman_seqnr: self.stman_seqnr,
            name: self.name.clone(),
            shape: self.shape.clone(),
            accessor: None,
        }
    }
}

impl TsmColumn {
    #[must_use]
    pub fn new(name: impl Into<String>, dtype: DataType, shape: Shape, stman_seqnr: u32) -> Self {
        Self {
            dtype,
            stman_seqnr,
            name: name.into(),
            shape,
            accessor: None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.dtype
    }

    #[must_use]
    pub const fn stman_seqnr(&self) -> u32 {
        self.stman_seqnr
    }

    /// The fixed shape of the column's cells, empty when cells vary per hypercube.
    #[must_use]
    pub const fn shape_column(&self) -> &Shape {
        &self.shape
    }

    #[must_use]
    pub fn accessor(&self) -> Option<&TsmColumnKind> {
        self.accessor.as_deref()
    }

    /// Install a data accessor for data column number `colnr` of the hypercubes.
    pub fn make_data_column(&mut self, colnr: usize) -> Result<TsmDataColumn> {
        if !self.dtype.is_tileable() {
            bail!(
                "internal error: column '{}' of type {} cannot be stored in tiles",
                self.name,
                self.dtype
            );
        }
        let accessor = TsmDataColumn { colnr, dtype: self.dtype };
        self.accessor = Some(Box::new(TsmColumnKind::Data(accessor)));
        Ok(accessor)
    }

    /// Install a coordinate accessor for the given hypercube axis.
    pub fn make_coord_column(&mut self, axis: usize) -> TsmCoordColumn {
        let accessor = TsmCoordColumn { axis };
        self.accessor = Some(Box::new(TsmColumnKind::Coord(accessor)));
        accessor
    }

    pub fn make_id_column(&mut self) -> TsmIdColumn {
        self.accessor = Some(Box::new(TsmColumnKind::Id(TsmIdColumn)));
        TsmIdColumn
    }

    /// Take the accessor out, leaving this column without one.
    pub fn unlink(&mut self) -> Option<Box<TsmColumnKind>> {
        self.accessor.take()
    }

    /// Put back an accessor taken by [`Self::unlink`].
    pub fn attach(&mut self, accessor: Box<TsmColumnKind>) {
        self.accessor = Some(accessor);
    }

    fn bound(&self) -> Result<TsmColumnKind> {
        match self.accessor.as_deref() {
            Some(kind) => Ok(*kind),
            None => bail!("internal error: column '{}' is not bound to its storage manager", self.name),
        }
    }

    /// Shape of the cell in a row of `cube`.
    pub fn shape(&self, cube: &TsmCube) -> Result<Shape> {
        Ok(match self.bound()? {
            TsmColumnKind::Data(_) => cube.cell_shape(),
            TsmColumnKind::Coord(c) => {
                if c.axis + 1 == cube.cube_shape().ndim() {
                    Shape::default()
                } else {
                    Shape::new(vec![cube.cube_shape().as_slice()[c.axis]])
                }
            }
            TsmColumnKind::Id(_) => Shape::default(),
        })
    }

    /// Whether the cell in `cube` has a value.
    pub fn is_defined(&self, cube: &TsmCube) -> Result<bool> {
        Ok(match self.bound()? {
            TsmColumnKind::Data(_) => true,
            TsmColumnKind::Coord(_) | TsmColumnKind::Id(_) => cube.values().contains_key(&self.name),
        })
    }

    pub fn get(&self, cube: &mut TsmCube, file: &mut TsmFile, cube_row: u64, slicer: Option<&Slicer>) -> Result<Cell> {
        match self.bound()? {
            TsmColumnKind::Data(d) => Ok(Cell::Array(d.get(cube, file, cube_row, slicer)?)),
            TsmColumnKind::Coord(c) => c.get(&self.name, cube, cube_row, slicer),
            TsmColumnKind::Id(_) => {
                if slicer.is_some() {
                    bail!("column '{}' holds scalars and cannot be sliced", self.name);
                }
                match cube.values().get(&self.name) {
                    Some(value) => Ok(Cell::Scalar(value.clone())),
                    None => bail!("id column '{}' has no value in this hypercube", self.name),
                }
            }
        }
    }

    pub fn put(&self, cube: &mut TsmCube, file: &mut TsmFile, cube_row: u64, slicer: Option<&Slicer>, cell: &Cell) -> Result<()> {
        match self.bound()? {
            TsmColumnKind::Data(d) => match cell {
                Cell::Array(array) => d.put(cube, file, cube_row, slicer, array),
                Cell::Scalar(v) => bail!("column '{}' holds arrays, cannot put scalar {v}", self.name),
            },
            TsmColumnKind::Coord(c) => c.put(&self.name, cube, cube_row, slicer, cell),
            TsmColumnKind::Id(_) => bail!("id column '{}' is read-only; id values are set when a hypercube is added", self.name),
        }
    }
}

impl TsmDataColumn {
    #[must_use]
    pub const fn colnr(&self) -> usize {
        self.colnr
    }

    fn get(self, cube: &mut TsmCube, file: &mut TsmFile, cube_row: u64, slicer: Option<&Slicer>) -> Result<ArrayValue> {
        let shape = match slicer {
            Some(s) => s.section_shape(&cube.cell_shape())?,
            None => cube.cell_shape(),
        };
        let mut buf = ArrayValue::zeros(self.dtype, shape.clone())?.into_bytes();
        cube.access_cell(file, cube_row, slicer, self.colnr, &mut buf, false)?;
        ArrayValue::from_bytes(self.dtype, shape, buf)
    }

    fn put(self, cube: &mut TsmCube, file: &mut TsmFile, cube_row: u64, slicer: Option<&Slicer>, array: &ArrayValue) -> Result<()> {
        if array.data_type() != self.dtype {
            bail!("cannot put {} values into a column of type {}", array.data_type(), self.dtype);
        }
        let expected = match slicer {
            Some(s) => s.section_shape(&cube.cell_shape())?,
            None => cube.cell_shape(),
        };
        if array.shape() != &expected {
            bail!("array shape {} does not match the cell shape {expected}", array.shape());
        }
        let mut buf = array.bytes().to_vec();
        cube.access_cell(file, cube_row, slicer, self.colnr, &mut buf, true)
    }
}

impl TsmCoordColumn {
    #[must_use]
    pub const fn axis(&self) -> usize {
        self.axis
    }

    fn is_row_axis(self, cube: &TsmCube) -> bool {
        self.axis + 1 == cube.cube_shape().ndim()
    }

    fn get(self, name: &str, cube: &TsmCube, cube_row: u64, slicer: Option<&Slicer>) -> Result<Cell> {
        let values = match cube.values().get(name) {
            Some(Value::DoubleVec(v)) => v.as_slice(),
            Some(other) => bail!("internal error: coordinate '{name}' holds {other} instead of a vector"),
            None => &[],
        };

        if self.is_row_axis(cube) {
            if slicer.is_some() {
                bail!("coordinate column '{name}' holds scalars and cannot be sliced");
            }
            let index = usize::try_from(cube_row).unwrap_or(usize::MAX);
            return Ok(Cell::Scalar(Value::Double(values.get(index).copied().unwrap_or(0.0))));
        }

        let len = cube.cube_shape().as_slice()[self.axis];
        let mut full: Vec<f64> = values.to_vec();
        full.resize(usize::try_from(len).unwrap_or(usize::MAX), 0.0);

        let selected = match slicer {
            None => full,
            Some(s) => {
                s.validate(&Shape::new(vec![len]))?;
                (s.start[0]..=s.end[0])
                    .step_by(usize::try_from(s.stride[0]).unwrap_or(1))
                    .filter_map(|i| full.get(usize::try_from(i).ok()?).copied())
                    .collect()
            }
        };
        let shape = Shape::new(vec![selected.len() as u64]);
        Ok(Cell::Array(ArrayValue::from_vec(shape, &selected)?))
    }

    fn put(self, name: &str, cube: &mut TsmCube, cube_row: u64, slicer: Option<&Slicer>, cell: &Cell) -> Result<()> {
        if slicer.is_some() {
            bail!("coordinate column '{name}' must be written whole");
        }

        let row_axis = self.is_row_axis(cube);
        let len = usize::try_from(cube.cube_shape().as_slice()[self.axis]).unwrap_or(usize::MAX);
        let entry = cube
            .values_mut()
            .entry(name.to_string())
            .or_insert_with(|| Value::DoubleVec(vec![0.0; len]));
        let Value::DoubleVec(values) = entry else {
            bail!("internal error: coordinate '{name}' does not hold a vector");
        };
        values.resize(len, 0.0);

        match (row_axis, cell) {
            (true, Cell::Scalar(v)) => {
                let Some(x) = v.as_f64() else {
                    bail!("coordinate column '{name}' needs a number, got {v}");
                };
                let index = usize::try_from(cube_row).unwrap_or(usize::MAX);
                match values.get_mut(index) {
                    Some(slot) => *slot = x,
                    None => bail!("row {cube_row} is outside the hypercube"),
                }
            }
            (false, Cell::Array(array)) => {
                let new_values = array.to_vec::<f64>()?;
                if new_values.len() != len {
                    bail!("coordinate column '{name}' needs {len} values, got {}", new_values.len());
                }
                *values = new_values;
            }
            (true, Cell::Array(_)) => bail!("coordinate column '{name}' holds scalars"),
            (false, Cell::Scalar(_)) => bail!("coordinate column '{name}' holds vectors"),
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::table::ValueRecord;

    fn make_cube(dir: &std::path::Path) -> (TsmFile, TsmCube) {
        let mut file = TsmFile::create(&dir.join("table.f0"), 0).unwrap();
        let mut values = ValueRecord::new();
        let _ = values.insert("SPW".to_string(), Value::Int(2));
        let cube = TsmCube::new(
            &mut file,
            values,
            &Shape::from([4]),
            &Shape::from([4, 2]),
            vec![8],
            3,
            true,
            2,
        )
        .unwrap();
        (file, cube)
    }

    #[test]
    fn test_clone_does_not_copy_accessor() {
        let mut column = TsmColumn::new("DATA", DataType::Float, Shape::from([4]), 0);
        let _ = column.make_data_column(0).unwrap();
        assert!(column.accessor().is_some());

        let copy = column.clone();
        assert!(copy.accessor().is_none());
        assert_eq!(copy.name(), "DATA");
        assert!(column.accessor().is_some());
    }

    #[test]
    fn test_unlink_takes_accessor() {
        let mut column = TsmColumn::new("TIME", DataType::Double, Shape::default(), 0);
        let _ = column.make_coord_column(1);

        let taken = column.unlink().unwrap();
        assert_eq!(*taken, TsmColumnKind::Coord(TsmCoordColumn { axis: 1 }));
        assert!(column.accessor().is_none());
        assert!(column.unlink().is_none());

        column.attach(taken);
        assert!(column.accessor().is_some());
    }

    #[test]
    fn test_string_data_column_is_internal_error() {
        let mut column = TsmColumn::new("NAME", DataType::String, Shape::default(), 0);
        let err = column.make_data_column(0).unwrap_err();
        assert!(err.to_string().contains("internal error"));
        assert!(column.accessor().is_none());
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_unbound_column_fails() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (mut file, mut cube) = make_cube(temp_dir.path());
        let column = TsmColumn::new("DATA", DataType::Double, Shape::from([4]), 0);
        let err = column.get(&mut cube, &mut file, 0, None).unwrap_err();
        assert!(err.to_string().contains("not bound"));
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_data_column_roundtrip() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (mut file, mut cube) = make_cube(temp_dir.path());
        let mut column = TsmColumn::new("DATA", DataType::Double, Shape::from([4]), 0);
        let _ = column.make_data_column(0).unwrap();

        let cell = Cell::Array(ArrayValue::from_vec(Shape::from([4]), &[1.0, 2.0, 3.0, 4.0]).unwrap());
        column.put(&mut cube, &mut file, 2, None, &cell).unwrap();
        assert_eq!(column.get(&mut cube, &mut file, 2, None).unwrap(), cell);

        let slicer = Slicer::new(vec![1], vec![2]);
        let part = column.get(&mut cube, &mut file, 2, Some(&slicer)).unwrap().into_array().unwrap();
        assert_eq!(part.to_vec::<f64>().unwrap(), vec![2.0, 3.0]);

        let wrong = Cell::Array(ArrayValue::from_vec(Shape::from([4]), &[1i32, 2, 3, 4]).unwrap());
        let _ = column.put(&mut cube, &mut file, 2, None, &wrong).unwrap_err();
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_coordinate_columns() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (mut file, mut cube) = make_cube(temp_dir.path());

        let mut freq = TsmColumn::new("FREQ", DataType::Double, Shape::from([4]), 0);
        let _ = freq.make_coord_column(0);
        let mut time = TsmColumn::new("TIME", DataType::Double, Shape::default(), 0);
        let _ = time.make_coord_column(1);

        assert!(!freq.is_defined(&cube).unwrap());
        let axis = Cell::Array(ArrayValue::from_vec(Shape::from([4]), &[1.0, 1.5, 2.0, 2.5]).unwrap());
        freq.put(&mut cube, &mut file, 0, None, &axis).unwrap();
        assert!(freq.is_defined(&cube).unwrap());
        assert_eq!(freq.get(&mut cube, &mut file, 1, None).unwrap(), axis);
        assert_eq!(freq.shape(&cube).unwrap(), Shape::from([4]));

        time.put(&mut cube, &mut file, 1, None, &Cell::Scalar(Value::Double(60.0))).unwrap();
        assert_eq!(time.get(&mut cube, &mut file, 1, None).unwrap(), Cell::Scalar(Value::Double(60.0)));
        assert_eq!(time.get(&mut cube, &mut file, 0, None).unwrap(), Cell::Scalar(Value::Double(0.0)));
        assert_eq!(time.shape(&cube).unwrap(), Shape::default());
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_id_column_is_read_only() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let (mut file, mut cube) = make_cube(temp_dir.path());
        let mut spw = TsmColumn::new("SPW", DataType::Int, Shape::default(), 0);
        let _ = spw.make_id_column();

        assert_eq!(spw.get(&mut cube, &mut file, 0, None).unwrap(), Cell::Scalar(Value::Int(2)));
        let err = spw.put(&mut cube, &mut file, 0, None, &Cell::Scalar(Value::Int(3))).unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }
}
