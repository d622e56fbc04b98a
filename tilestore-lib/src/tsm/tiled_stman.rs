use super::bucket_cache::CacheStatistics;
use super::shape::Shape;
use super::tsm_column::{TsmColumn, TsmColumnKind};
use super::tsm_cube::TsmCube;
use super::tsm_file::TsmFile;
use crate::Result;
use crate::io::{ObjectReader, ObjectWriter};
use crate::table::{Cell, ColumnKind, Slicer, TableDesc, ValueRecord};
use ohno::{IntoAppError, bail};
use std::path::{Path, PathBuf};

/// Log target for tiled storage
const LOG_TARGET: &str = "       tsm";

const TYPE_NAME: &str = "TiledStMan";
const VERSION: u32 = 1;

/// Tile cache settings shared by all hypercubes of a storage manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Upper bound in bytes for the cache of one hypercube, 0 for no bound.
    pub max_cache_size: u64,

    /// Number of tiles cached per hypercube when no explicit size was set.
    pub default_cache_buckets: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_cache_size: 0,
            default_cache_buckets: 32,
        }
    }
}

/// A run of table rows stored in consecutive rows of one hypercube.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RowSegment {
    first_row: u64,
    nrow: u64,
    cube: usize,
    cube_row: u64,
}

/// A tiled storage manager: the hypercubes, data files and columns of a table.
///
/// Each hypercube has its own data file (`table.f<seqnr>_TSM<n>`); the
/// description of files, cubes and row layout lives in the header file
/// `table.f<seqnr>`.
#[derive(Debug)]
pub struct TiledStMan {
    seqnr: u32,
    dir: PathBuf,
    writable: bool,
    columns: Vec<TsmColumn>,
    files: Vec<TsmFile>,
    cubes: Vec<TsmCube>,
    segments: Vec<RowSegment>,
    nrrow: u64,
    cell_shape: Shape,
    tile_shape: Shape,
    data_sizes: Vec<usize>,
    id_columns: Vec<String>,
    row_coordinates: Vec<String>,
    cache: CacheConfig,
}

impl TiledStMan {
    /// Create a storage manager for the columns of `desc` in `dir`.
    pub fn create(dir: &Path, seqnr: u32, desc: &TableDesc, tile_shape: &Shape, cache: CacheConfig) -> Result<Self> {
        desc.validate()?;
        let cell_shape = desc.cell_shape();
        if tile_shape.ndim() != 0 && tile_shape.ndim() != cell_shape.ndim() + 1 {
            bail!(
                "tile shape {tile_shape} must have {} axes for cells of shape {cell_shape}",
                cell_shape.ndim() + 1
            );
        }

        let mut stman = Self::bind(dir, seqnr, desc, true, cache)?;
        stman.tile_shape = tile_shape.clone();
        stman.write_header()?;
        log::debug!(target: LOG_TARGET, "Created tiled storage manager '{}'", stman.file_name().display());
        Ok(stman)
    }

    /// Open an existing storage manager.
    pub fn open(dir: &Path, seqnr: u32, desc: &TableDesc, writable: bool, cache: CacheConfig) -> Result<Self> {
        let mut stman = Self::bind(dir, seqnr, desc, writable, cache)?;
        let file_name = stman.file_name();
        let bytes = std::fs::read(&file_name).into_app_err_with(|| format!("unable to read file '{}'", file_name.display()))?;
        stman.read_header(&mut ObjectReader::new(&bytes))?;
        log::debug!(
            target: LOG_TARGET,
            "Opened tiled storage manager '{}' with {} rows in {} hypercubes",
            file_name.display(),
            stman.nrrow,
            stman.cubes.len()
        );
        Ok(stman)
    }

    fn bind(dir: &Path, seqnr: u32, desc: &TableDesc, writable: bool, cache: CacheConfig) -> Result<Self> {
        let cell_shape = desc.cell_shape();
        let mut columns = Vec::with_capacity(desc.columns().len());
        let mut data_sizes = Vec::new();
        let mut id_columns = Vec::new();
        let mut row_coordinates = Vec::new();

        for col in desc.columns() {
            let mut column = TsmColumn::new(col.name.clone(), col.dtype, col.shape.clone(), seqnr);
            match col.kind {
                ColumnKind::Data => {
                    let _ = column.make_data_column(data_sizes.len())?;
                    data_sizes.push(col.dtype.element_size());
                }
                ColumnKind::Coordinate(axis) => {
                    let _ = column.make_coord_column(axis);
                    if axis == cell_shape.ndim() {
                        row_coordinates.push(col.name.clone());
                    }
                }
                ColumnKind::Id => {
                    let _ = column.make_id_column();
                    id_columns.push(col.name.clone());
                }
            }
            columns.push(column);
        }

        Ok(Self {
            seqnr,
            dir: dir.to_path_buf(),
            writable,
            columns,
            files: Vec::new(),
            cubes: Vec::new(),
            segments: Vec::new(),
            nrrow: 0,
            cell_shape,
            tile_shape: Shape::default(),
            data_sizes,
            id_columns,
            row_coordinates,
            cache,
        })
    }

    /// The header file name; data files append `_TSM<n>` to it.
    #[must_use]
    pub fn file_name(&self) -> PathBuf {
        self.dir.join(format!("table.f{}", self.seqnr))
    }

    /// Point the storage manager at a new table directory (after a rename).
    pub fn set_dir(&mut self, dir: &Path) -> Result<()> {
        self.dir = dir.to_path_buf();
        let stman_file_name = self.file_name();
        for file in &mut self.files {
            *file = reopen(&stman_file_name, file, self.writable)?;
        }
        Ok(())
    }

    #[must_use]
    pub const fn seqnr(&self) -> u32 {
        self.seqnr
    }

    #[must_use]
    pub const fn nrow(&self) -> u64 {
        self.nrrow
    }

    #[must_use]
    pub const fn is_writable(&self) -> bool {
        self.writable
    }

    #[must_use]
    pub fn nhypercubes(&self) -> usize {
        self.cubes.len()
    }

    #[must_use]
    pub fn hypercubes(&self) -> &[TsmCube] {
        &self.cubes
    }

    #[must_use]
    pub fn files(&self) -> &[TsmFile] {
        &self.files
    }

    #[must_use]
    pub fn columns(&self) -> &[TsmColumn] {
        &self.columns
    }

    /// Add a hypercube identified by the id values in `values`.
    ///
    /// `values` must hold a value for every id column and may hold coordinate
    /// values. New rows are added to this hypercube from now on.
    pub fn add_hypercube(&mut self, values: ValueRecord) -> Result<usize> {
        self.check_writable()?;

        for name in values.keys() {
            if self.column_index(name).is_err() || self.is_data_column(name) {
                bail!("'{name}' is not an id or coordinate column");
            }
        }

        let mut ids = ValueRecord::new();
        for name in &self.id_columns {
            let Some(value) = values.get(name) else {
                bail!("no value given for id column '{name}'");
            };
            let _ = ids.insert(name.clone(), value.clone());
        }

        if !ids.is_empty() && self.cubes.iter().any(|c| c.matches(&ids)) {
            bail!("a hypercube with id values {ids:?} already exists");
        }

        self.new_cube(values)
    }

    fn new_cube(&mut self, values: ValueRecord) -> Result<usize> {
        let seqnr = u32::try_from(self.files.len()).into_app_err("too many data files")?;
        let mut file = TsmFile::create(&self.file_name(), seqnr)?;
        let cube = TsmCube::new(
            &mut file,
            values,
            &self.cell_shape,
            &self.tile_shape,
            self.data_sizes.clone(),
            0,
            true,
            self.cache.default_cache_buckets,
        )?;

        self.files.push(file);
        self.cubes.push(cube);
        Ok(self.cubes.len() - 1)
    }

    /// Add `n` rows to the most recently added hypercube.
    ///
    /// Without id columns a hypercube is created on demand.
    pub fn add_rows(&mut self, n: u64) -> Result<()> {
        self.check_writable()?;
        if n == 0 {
            return Ok(());
        }

        if self.cubes.is_empty() {
            if !self.id_columns.is_empty() {
                bail!("a hypercube must be added before adding rows");
            }
            let _ = self.new_cube(ValueRecord::new())?;
        }

        let cube_nr = self.cubes.len() - 1;
        let cube = &mut self.cubes[cube_nr];
        let cube_row = cube.nrows();
        let file = file_of(&mut self.files, cube)?;
        cube.extend(file, n, &self.row_coordinates)?;

        match self.segments.last_mut() {
            Some(last) if last.cube == cube_nr && last.cube_row + last.nrow == cube_row => last.nrow += n,
            _ => self.segments.push(RowSegment {
                first_row: self.nrrow,
                nrow: n,
                cube: cube_nr,
                cube_row,
            }),
        }

        self.nrrow += n;
        Ok(())
    }

    /// The hypercube holding `row` and the row's position in it.
    pub fn hypercube(&self, row: u64) -> Result<(usize, u64)> {
        if row >= self.nrrow {
            bail!("row {row} is out of range (table has {} rows)", self.nrrow);
        }

        let idx = self.segments.partition_point(|s| s.first_row + s.nrow <= row);
        let Some(segment) = self.segments.get(idx) else {
            bail!("internal error: no hypercube segment holds row {row}");
        };
        Ok((segment.cube, segment.cube_row + (row - segment.first_row)))
    }

    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c.name() == name)
            .into_app_err_with(|| format!("column '{name}' does not exist"))
    }

    fn is_data_column(&self, name: &str) -> bool {
        self.columns
            .iter()
            .any(|c| c.name() == name && matches!(c.accessor(), Some(TsmColumnKind::Data(_))))
    }

    pub fn get(&mut self, column: usize, row: u64) -> Result<Cell> {
        self.get_slice_opt(column, row, None)
    }

    pub fn get_slice(&mut self, column: usize, row: u64, slicer: &Slicer) -> Result<Cell> {
        self.get_slice_opt(column, row, Some(slicer))
    }

    fn get_slice_opt(&mut self, column: usize, row: u64, slicer: Option<&Slicer>) -> Result<Cell> {
        let (cube_nr, cube_row) = self.hypercube(row)?;
        let column = column_at(&self.columns, column)?;
        let cube = &mut self.cubes[cube_nr];
        let file = file_of(&mut self.files, cube)?;
        column.get(cube, file, cube_row, slicer)
    }

    pub fn put(&mut self, column: usize, row: u64, cell: &Cell) -> Result<()> {
        self.put_slice_opt(column, row, None, cell)
    }

    pub fn put_slice(&mut self, column: usize, row: u64, slicer: &Slicer, cell: &Cell) -> Result<()> {
        self.put_slice_opt(column, row, Some(slicer), cell)
    }

    fn put_slice_opt(&mut self, column: usize, row: u64, slicer: Option<&Slicer>, cell: &Cell) -> Result<()> {
        self.check_writable()?;
        let (cube_nr, cube_row) = self.hypercube(row)?;
        let column = column_at(&self.columns, column)?;
        let cube = &mut self.cubes[cube_nr];
        let file = file_of(&mut self.files, cube)?;
        column.put(cube, file, cube_row, slicer, cell)
    }

    pub fn shape(&self, column: usize, row: u64) -> Result<Shape> {
        let (cube_nr, _) = self.hypercube(row)?;
        column_at(&self.columns, column)?.shape(&self.cubes[cube_nr])
    }

    pub fn is_defined(&self, column: usize, row: u64) -> Result<bool> {
        if row >= self.nrrow {
            return Ok(false);
        }
        let (cube_nr, _) = self.hypercube(row)?;
        column_at(&self.columns, column)?.is_defined(&self.cubes[cube_nr])
    }

    pub fn hypercube_shape(&self, row: u64) -> Result<Shape> {
        let (cube_nr, _) = self.hypercube(row)?;
        Ok(self.cubes[cube_nr].cube_shape().clone())
    }

    pub fn tile_shape(&self, row: u64) -> Result<Shape> {
        let (cube_nr, _) = self.hypercube(row)?;
        Ok(self.cubes[cube_nr].tile_shape().clone())
    }

    pub fn cache_statistics(&self, row: u64) -> Result<CacheStatistics> {
        let (cube_nr, _) = self.hypercube(row)?;
        Ok(self.cubes[cube_nr].cache_statistics())
    }

    /// Set the cache size (in tiles) of the hypercube holding `row`.
    pub fn set_cache_size(&mut self, row: u64, nbuckets: usize, force_smaller: bool) -> Result<()> {
        let (cube_nr, _) = self.hypercube(row)?;
        let cube = &mut self.cubes[cube_nr];
        let file = file_of(&mut self.files, cube)?;
        cube.set_cache_size(file, nbuckets, force_smaller, self.cache.max_cache_size)
    }

    /// Size the cache of the hypercube holding `row` for accesses of `slice_shape`.
    pub fn set_cache_size_for_slice(&mut self, row: u64, slice_shape: &Shape, force_smaller: bool) -> Result<()> {
        let (cube_nr, _) = self.hypercube(row)?;
        let cube = &mut self.cubes[cube_nr];
        let file = file_of(&mut self.files, cube)?;
        cube.size_cache_for_slice(file, slice_shape, force_smaller, self.cache.max_cache_size)
    }

    /// Limit the cache of every hypercube to `nbytes` (0 means no limit).
    pub fn set_maximum_cache_size(&mut self, nbytes: u64) -> Result<()> {
        self.cache.max_cache_size = nbytes;
        for cube in &mut self.cubes {
            let file = file_of(&mut self.files, cube)?;
            let size = cube.cache_size();
            cube.set_cache_size(file, size, true, nbytes)?;
        }
        Ok(())
    }

    #[must_use]
    pub const fn maximum_cache_size(&self) -> u64 {
        self.cache.max_cache_size
    }

    /// Flush and empty the caches of all hypercubes.
    pub fn clear_caches(&mut self) -> Result<()> {
        for cube in &mut self.cubes {
            let file = file_of(&mut self.files, cube)?;
            cube.clear_cache(file)?;
        }
        Ok(())
    }

    /// Write cached tiles and the header to disk.
    pub fn flush(&mut self) -> Result<()> {
        if !self.writable {
            return Ok(());
        }

        for cube in &mut self.cubes {
            let file = file_of(&mut self.files, cube)?;
            cube.flush_cache(file)?;
        }
        for file in &mut self.files {
            file.bucket_file_mut().flush()?;
        }

        self.write_header()
    }

    fn check_writable(&self) -> Result<()> {
        if !self.writable {
            bail!("table '{}' is not writable", self.dir.display());
        }
        Ok(())
    }

    fn write_header(&self) -> Result<()> {
        let mut writer = ObjectWriter::new();
        writer.put_start(TYPE_NAME, VERSION)?;
        writer.put_u32(self.seqnr);
        writer.put_u64(self.nrrow);
        writer.put_shape(&self.tile_shape)?;

        writer.put_len(self.files.len())?;
        for file in &self.files {
            file.put_object(&mut writer)?;
        }

        writer.put_len(self.cubes.len())?;
        for cube in &self.cubes {
            cube.put_object(&mut writer)?;
        }

        writer.put_len(self.segments.len())?;
        for segment in &self.segments {
            writer.put_u64(segment.first_row);
            writer.put_u64(segment.nrow);
            writer.put_len(segment.cube)?;
            writer.put_u64(segment.cube_row);
        }

        let file_name = self.file_name();
        std::fs::write(&file_name, writer.into_bytes()).into_app_err_with(|| format!("unable to write file '{}'", file_name.display()))
    }

    fn read_header(&mut self, reader: &mut ObjectReader<'_>) -> Result<()> {
        let version = reader.get_start(TYPE_NAME)?;
        if version != VERSION {
            bail!("internal error: unsupported TiledStMan version {version}");
        }
        let seqnr = reader.get_u32()?;
        if seqnr != self.seqnr {
            bail!("internal error: storage manager sequence number {seqnr} does not match expected {}", self.seqnr);
        }
        self.nrrow = reader.get_u64()?;
        self.tile_shape = reader.get_shape()?;

        let stman_file_name = self.file_name();
        let nfiles = reader.get_len()?;
        self.files.clear();
        for i in 0..nfiles {
            let seqnr = u32::try_from(i).into_app_err("internal error: too many data files")?;
            self.files.push(TsmFile::from_stream(&stman_file_name, reader, seqnr, self.writable)?);
        }

        let ncubes = reader.get_len()?;
        self.cubes.clear();
        for _ in 0..ncubes {
            let cube = TsmCube::from_stream(reader, self.cache.default_cache_buckets)?;
            if cube.file_seqnr() as usize >= self.files.len() {
                bail!("internal error: hypercube refers to missing data file {}", cube.file_seqnr());
            }
            self.cubes.push(cube);
        }

        let nsegments = reader.get_len()?;
        self.segments.clear();
        let mut expected_first = 0;
        for _ in 0..nsegments {
            let segment = RowSegment {
                first_row: reader.get_u64()?,
                nrow: reader.get_u64()?,
                cube: reader.get_len()?,
                cube_row: reader.get_u64()?,
            };
            if segment.first_row != expected_first || segment.cube >= self.cubes.len() {
                bail!("internal error: corrupt row layout in '{}'", stman_file_name.display());
            }
            expected_first = expected_first
                .checked_add(segment.nrow)
                .into_app_err_with(|| format!("internal error: corrupt row layout in '{}'", stman_file_name.display()))?;
            self.segments.push(segment);
        }

        if expected_first != self.nrrow {
            bail!(
                "internal error: row layout covers {expected_first} rows but the header says {}",
                self.nrrow
            );
        }
        Ok(())
    }
}

fn column_at(columns: &[TsmColumn], column: usize) -> Result<&TsmColumn> {
    columns
        .get(column)
        .into_app_err_with(|| format!("internal error: no column number {column}"))
}

fn file_of<'a>(files: &'a mut [TsmFile], cube: &TsmCube) -> Result<&'a mut TsmFile> {
    let seqnr = cube.file_seqnr();
    files
        .get_mut(seqnr as usize)
        .into_app_err_with(|| format!("internal error: missing data file {seqnr}"))
}

fn reopen(stman_file_name: &Path, file: &TsmFile, writable: bool) -> Result<TsmFile> {
    let mut writer = ObjectWriter::new();
    file.put_object(&mut writer)?;
    let bytes = writer.into_bytes();
    TsmFile::from_stream(stman_file_name, &mut ObjectReader::new(&bytes), file.seqnr(), writable)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::table::{ArrayValue, ColumnDesc, Value};
    use crate::tsm::DataType;

    fn plain_desc() -> TableDesc {
        TableDesc::new()
            .with_column(ColumnDesc::data("DATA", DataType::Float, Shape::from([4, 8])))
            .unwrap()
            .with_column(ColumnDesc::coordinate("TIME", 2))
            .unwrap()
    }

    fn id_desc() -> TableDesc {
        TableDesc::new()
            .with_column(ColumnDesc::data("DATA", DataType::Int, Shape::from([2])))
            .unwrap()
            .with_column(ColumnDesc::id("SPW", DataType::Int))
            .unwrap()
    }

    fn cell(values: &[f32]) -> Cell {
        Cell::Array(ArrayValue::from_vec(Shape::from([4, 8]), values).unwrap())
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_rows_create_default_hypercube() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut stman = TiledStMan::create(temp_dir.path(), 0, &plain_desc(), &Shape::from([4, 4, 16]), CacheConfig::default()).unwrap();

        stman.add_rows(10).unwrap();
        assert_eq!(stman.nrow(), 10);
        assert_eq!(stman.nhypercubes(), 1);
        assert_eq!(stman.hypercube_shape(0).unwrap(), Shape::from([4, 8, 10]));
        assert_eq!(stman.tile_shape(9).unwrap(), Shape::from([4, 4, 16]));
        assert!(temp_dir.path().join("table.f0_TSM0").exists());
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_data_survives_reopen() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let desc = plain_desc();
        let values: Vec<f32> = (0..32u8).map(f32::from).collect();
        {
            let mut stman = TiledStMan::create(temp_dir.path(), 0, &desc, &Shape::from([4, 4, 2]), CacheConfig::default()).unwrap();
            stman.add_rows(3).unwrap();
            let col = stman.column_index("DATA").unwrap();
            stman.put(col, 2, &cell(&values)).unwrap();
            let time = stman.column_index("TIME").unwrap();
            stman.put(time, 1, &Cell::Scalar(Value::Double(4.5))).unwrap();
            stman.flush().unwrap();
        }

        let mut stman = TiledStMan::open(temp_dir.path(), 0, &desc, false, CacheConfig::default()).unwrap();
        assert_eq!(stman.nrow(), 3);
        let col = stman.column_index("DATA").unwrap();
        assert_eq!(stman.get(col, 2).unwrap(), cell(&values));
        assert_eq!(stman.get(col, 0).unwrap(), cell(&[0.0; 32]));
        let time = stman.column_index("TIME").unwrap();
        assert_eq!(stman.get(time, 1).unwrap(), Cell::Scalar(Value::Double(4.5)));

        let _ = stman.put(col, 0, &cell(&values)).unwrap_err();
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_hypercubes_by_id() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut stman = TiledStMan::create(temp_dir.path(), 0, &id_desc(), &Shape::default(), CacheConfig::default()).unwrap();

        let _ = stman.add_rows(1).unwrap_err();

        let mut ids = ValueRecord::new();
        let _ = ids.insert("SPW".to_string(), Value::Int(0));
        assert_eq!(stman.add_hypercube(ids.clone()).unwrap(), 0);
        stman.add_rows(2).unwrap();

        let err = stman.add_hypercube(ids).unwrap_err();
        assert!(err.to_string().contains("already exists"));

        let mut ids = ValueRecord::new();
        let _ = ids.insert("SPW".to_string(), Value::Int(1));
        assert_eq!(stman.add_hypercube(ids).unwrap(), 1);
        stman.add_rows(3).unwrap();

        assert_eq!(stman.hypercube(1).unwrap(), (0, 1));
        assert_eq!(stman.hypercube(2).unwrap(), (1, 0));
        assert_eq!(stman.hypercube(4).unwrap(), (1, 2));
        let _ = stman.hypercube(5).unwrap_err();

        let spw = stman.column_index("SPW").unwrap();
        assert_eq!(stman.get(spw, 4).unwrap(), Cell::Scalar(Value::Int(1)));
        assert_eq!(stman.files().len(), 2);
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_add_hypercube_rejects_unknown_values() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut stman = TiledStMan::create(temp_dir.path(), 0, &id_desc(), &Shape::default(), CacheConfig::default()).unwrap();

        let _ = stman.add_hypercube(ValueRecord::new()).unwrap_err();

        let mut values = ValueRecord::new();
        let _ = values.insert("SPW".to_string(), Value::Int(0));
        let _ = values.insert("DATA".to_string(), Value::Int(0));
        let _ = stman.add_hypercube(values).unwrap_err();
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_cache_controls() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut stman = TiledStMan::create(temp_dir.path(), 0, &plain_desc(), &Shape::from([4, 8, 1]), CacheConfig::default()).unwrap();
        stman.add_rows(4).unwrap();

        let col = stman.column_index("DATA").unwrap();
        for row in 0..4 {
            let _ = stman.get(col, row).unwrap();
        }
        let _ = stman.get(col, 0).unwrap();
        let stats = stman.cache_statistics(0).unwrap();
        assert_eq!(stats.misses, 4);
        assert_eq!(stats.hits, 1);

        stman.set_maximum_cache_size(128 * 4).unwrap();
        assert_eq!(stman.maximum_cache_size(), 512);
        assert_eq!(stman.hypercubes()[0].cache_size(), 4);

        stman.set_cache_size(0, 1, true).unwrap();
        assert_eq!(stman.hypercubes()[0].cache_size(), 1);
        stman.clear_caches().unwrap();
    }

    #[test]
    #[cfg_attr(miri, ignore = "Miri cannot call GetTempPathW")]
    fn test_wrong_tile_shape() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let err = TiledStMan::create(temp_dir.path(), 0, &plain_desc(), &Shape::from([4, 4]), CacheConfig::default()).unwrap_err();
        assert!(err.to_string().contains("tile shape"));
    }
}
