use super::bucket_cache::{BucketCache, CacheStatistics};
use super::shape::Shape;
use super::tsm_file::TsmFile;
use crate::Result;
use crate::io::{ObjectReader, ObjectWriter};
use crate::table::{Slicer, Value, ValueRecord};
use ohno::bail;

/// Log target for tiled storage
const LOG_TARGET: &str = "       tsm";

const TYPE_NAME: &str = "TSMCube";
const VERSION: u32 = 1;

/// Number of pixels aimed for when no tile shape is given.
pub const DEFAULT_TILE_PIXELS: u64 = 32768;

/// A hypercube of tiled data.
///
/// The last axis of the cube runs over rows; the other axes form the cell
/// shape of the data columns. Tiles are numbered with the first axis
/// varying fastest, so extending the cube along the row axis appends tiles
/// to the end of its data file.
///
/// A tile (bucket) holds the same region of the cube for all data columns,
/// one after another, each element in little-endian byte order.
#[derive(Debug)]
pub struct TsmCube {
    values: ValueRecord,
    extensible: bool,
    cube_shape: Shape,
    tile_shape: Shape,
    tiles_per_dim: Vec<u64>,
    nr_tiles: u64,
    file_seqnr: u32,
    file_offset: u64,
    column_sizes: Vec<usize>,
    column_offsets: Vec<usize>,
    bucket_size: usize,
    cache_buckets: usize,
    cache: Option<BucketCache>,
}

impl TsmCube {
    /// Create a cube holding `nrows` rows of cells of `cell_shape`.
    ///
    /// `column_sizes` holds the element size of each data column. Space for
    /// the initial tiles is reserved in `file`.
    #[expect(clippy::too_many_arguments, reason = "mirrors the persisted layout")]
    pub fn new(
        file: &mut TsmFile,
        values: ValueRecord,
        cell_shape: &Shape,
        tile_shape: &Shape,
        column_sizes: Vec<usize>,
        nrows: u64,
        extensible: bool,
        cache_buckets: usize,
    ) -> Result<Self> {
        let cube_shape = cell_shape.with_axis(nrows);
        let tile_shape = if tile_shape.ndim() == 0 {
            make_tile_shape(cell_shape, DEFAULT_TILE_PIXELS)
        } else {
            tile_shape.clone()
        };

        if tile_shape.ndim() != cube_shape.ndim() {
            bail!(
                "tile shape {tile_shape} must have {} axes to match cube shape {cube_shape}",
                cube_shape.ndim()
            );
        }

        let mut cube = Self {
            values,
            extensible,
            tile_shape: adjust_tile_shape(&cube_shape, &tile_shape),
            cube_shape,
            tiles_per_dim: Vec::new(),
            nr_tiles: 0,
            file_seqnr: file.seqnr(),
            file_offset: file.length(),
            column_sizes,
            column_offsets: Vec::new(),
            bucket_size: 0,
            cache_buckets: cache_buckets.max(1),
            cache: None,
        };
        cube.setup();

        let _ = file.extend(cube.nr_tiles * cube.bucket_size as u64);
        log::debug!(
            target: LOG_TARGET,
            "Created hypercube with shape {} and tile shape {} in data file {}",
            cube.cube_shape,
            cube.tile_shape,
            cube.file_seqnr
        );

        Ok(cube)
    }

    fn setup(&mut self) {
        self.tiles_per_dim = self
            .cube_shape
            .as_slice()
            .iter()
            .zip(self.tile_shape.as_slice())
            .map(|(&c, &t)| c.div_ceil(t))
            .collect();
        self.nr_tiles = self.tiles_per_dim.iter().product();

        let tile_pixels = usize::try_from(self.tile_shape.product()).unwrap_or(usize::MAX);
        self.column_offsets.clear();
        let mut offset = 0;
        for &size in &self.column_sizes {
            self.column_offsets.push(offset);
            offset += size * tile_pixels;
        }
        self.bucket_size = offset;
    }

    /// Persist the cube description (not its data).
    pub fn put_object(&self, writer: &mut ObjectWriter) -> Result<()> {
        writer.put_start(TYPE_NAME, VERSION)?;
        writer.put_record(&self.values)?;
        writer.put_bool(self.extensible);
        writer.put_shape(&self.cube_shape)?;
        writer.put_shape(&self.tile_shape)?;
        writer.put_u32(self.file_seqnr);
        writer.put_u64(self.file_offset);
        writer.put_len(self.column_sizes.len())?;
        for &size in &self.column_sizes {
            writer.put_len(size)?;
        }
        Ok(())
    }

    pub fn from_stream(reader: &mut ObjectReader<'_>, cache_buckets: usize) -> Result<Self> {
        let version = reader.get_start(TYPE_NAME)?;
        if version != VERSION {
            bail!("internal error: unsupported TSMCube version {version}");
        }

        let values = reader.get_record()?;
        let extensible = reader.get_bool()?;
        let cube_shape = reader.get_shape()?;
        let tile_shape = reader.get_shape()?;
        if cube_shape.ndim() != tile_shape.ndim() {
            bail!("internal error: hypercube shape {cube_shape} and tile shape {tile_shape} differ in dimensionality");
        }
        let file_seqnr = reader.get_u32()?;
        let file_offset = reader.get_u64()?;
        let ncol = reader.get_count(size_of::<u32>(), "column size")?;
        let mut column_sizes = Vec::with_capacity(ncol);
        for _ in 0..ncol {
            column_sizes.push(reader.get_len()?);
        }

        let mut cube = Self {
            values,
            extensible,
            cube_shape,
            tile_shape,
            tiles_per_dim: Vec::new(),
            nr_tiles: 0,
            file_seqnr,
            file_offset,
            column_sizes,
            column_offsets: Vec::new(),
            bucket_size: 0,
            cache_buckets: cache_buckets.max(1),
            cache: None,
        };
        cube.setup();
        Ok(cube)
    }

    #[must_use]
    pub const fn cube_shape(&self) -> &Shape {
        &self.cube_shape
    }

    #[must_use]
    pub const fn tile_shape(&self) -> &Shape {
        &self.tile_shape
    }

    #[must_use]
    pub fn cell_shape(&self) -> Shape {
        self.cube_shape.without_last_axis()
    }

    #[must_use]
    pub fn nrows(&self) -> u64 {
        self.cube_shape.last().unwrap_or(0)
    }

    #[must_use]
    pub const fn nr_tiles(&self) -> u64 {
        self.nr_tiles
    }

    #[must_use]
    pub const fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    #[must_use]
    pub const fn file_seqnr(&self) -> u32 {
        self.file_seqnr
    }

    #[must_use]
    pub const fn is_extensible(&self) -> bool {
        self.extensible
    }

    #[must_use]
    pub const fn values(&self) -> &ValueRecord {
        &self.values
    }

    pub const fn values_mut(&mut self) -> &mut ValueRecord {
        &mut self.values
    }

    /// Number of values of a coordinate, 0 when it is not defined.
    #[must_use]
    pub fn coordinate_size(&self, name: &str) -> usize {
        match self.values.get(name) {
            Some(Value::DoubleVec(v)) => v.len(),
            _ => 0,
        }
    }

    /// Whether this cube carries the given id values.
    #[must_use]
    pub fn matches(&self, ids: &ValueRecord) -> bool {
        ids.iter().all(|(name, value)| self.values.get(name) == Some(value))
    }

    /// Add `nrows` rows to the cube.
    ///
    /// The coordinates named in `row_coordinates` run along the row axis and
    /// are padded with zeros to the new row count.
    pub fn extend(&mut self, file: &mut TsmFile, nrows: u64, row_coordinates: &[String]) -> Result<()> {
        if !self.extensible {
            bail!("hypercube with shape {} cannot be extended", self.cube_shape);
        }

        let new_rows = self.nrows() + nrows;
        let mut extents = self.cube_shape.clone().into_vec();
        if let Some(last) = extents.last_mut() {
            *last = new_rows;
        }
        self.cube_shape = Shape::new(extents);

        let old_tiles = self.nr_tiles;
        self.setup();
        let _ = file.extend((self.nr_tiles - old_tiles) * self.bucket_size as u64);

        let len = usize::try_from(new_rows).unwrap_or(usize::MAX);
        for name in row_coordinates {
            let entry = self
                .values
                .entry(name.clone())
                .or_insert_with(|| Value::DoubleVec(Vec::new()));
            if let Value::DoubleVec(v) = entry {
                v.resize(len, 0.0);
            }
        }

        Ok(())
    }

    /// Read or write a strided section of the cube for one data column.
    ///
    /// `start`, `end` (inclusive) and `stride` are cube coordinates; `buf`
    /// holds the section contiguously with the first axis varying fastest.
    pub fn access(&mut self, file: &mut TsmFile, section: &Slicer, colnr: usize, buf: &mut [u8], write: bool) -> Result<()> {
        let ndim = self.cube_shape.ndim();
        if section.start.len() != ndim || section.end.len() != ndim || section.stride.len() != ndim {
            bail!("internal error: section has the wrong number of axes for cube shape {}", self.cube_shape);
        }
        let Some(&elem_size) = self.column_sizes.get(colnr) else {
            bail!("internal error: hypercube has no data column {colnr}");
        };

        let section_shape = section.shape();
        let needed = usize::try_from(section_shape.product()).unwrap_or(usize::MAX).saturating_mul(elem_size);
        if buf.len() != needed {
            bail!("internal error: section buffer holds {} bytes, {needed} needed", buf.len());
        }
        for axis in 0..ndim {
            if section.end[axis] >= self.cube_shape.as_slice()[axis] {
                bail!("section end {:?} is outside hypercube shape {}", section.end, self.cube_shape);
            }
        }

        let tile = self.tile_shape.as_slice().to_vec();
        let section_strides = section_shape.strides();
        let col_offset = self.column_offsets[colnr];
        let file_offset = self.file_offset;
        let bucket_size = self.bucket_size;
        let capacity = self.cache_buckets;

        let cache = self
            .cache
            .get_or_insert_with(|| BucketCache::new(bucket_size, file_offset, capacity));
        let bucket_file = file.bucket_file_mut();

        // Visit every tile overlapping the section, then every section pixel inside it.
        let first_tile: Vec<u64> = (0..ndim).map(|i| section.start[i] / tile[i]).collect();
        let last_tile: Vec<u64> = (0..ndim).map(|i| section.end[i] / tile[i]).collect();
        let mut tile_pos = first_tile.clone();

        loop {
            let mut k_lo = Vec::with_capacity(ndim);
            let mut k_hi = Vec::with_capacity(ndim);
            let mut empty = false;
            for i in 0..ndim {
                let lo_pixel = (tile_pos[i] * tile[i]).max(section.start[i]);
                let hi_pixel = ((tile_pos[i] + 1) * tile[i] - 1).min(section.end[i]);
                let lo = (lo_pixel - section.start[i]).div_ceil(section.stride[i]);
                let hi = (hi_pixel - section.start[i]) / section.stride[i];
                if lo > hi {
                    empty = true;
                    break;
                }
                k_lo.push(lo);
                k_hi.push(hi);
            }

            if !empty {
                let bucket_nr = tile_number(&tile_pos, &self.tiles_per_dim);
                if write {
                    let bucket = cache.get_mut(bucket_file, bucket_nr)?;
                    copy_in(bucket, buf, &k_lo, &k_hi, section, &tile_pos, &tile, &section_strides, col_offset, elem_size);
                } else {
                    let bucket = cache.get(bucket_file, bucket_nr)?;
                    copy_out(bucket, buf, &k_lo, &k_hi, section, &tile_pos, &tile, &section_strides, col_offset, elem_size);
                }
            }

            if !next_position(&mut tile_pos, &first_tile, &last_tile) {
                break;
            }
        }

        Ok(())
    }

    /// Read or write one cell (or a section of it) of a data column.
    pub fn access_cell(
        &mut self,
        file: &mut TsmFile,
        cube_row: u64,
        slicer: Option<&Slicer>,
        colnr: usize,
        buf: &mut [u8],
        write: bool,
    ) -> Result<()> {
        let cell_shape = self.cell_shape();
        let mut section = match slicer {
            Some(s) => {
                s.validate(&cell_shape)?;
                s.clone()
            }
            None => Slicer::new(
                vec![0; cell_shape.ndim()],
                cell_shape.as_slice().iter().map(|&n| n.saturating_sub(1)).collect(),
            ),
        };
        section.start.push(cube_row);
        section.end.push(cube_row);
        section.stride.push(1);
        self.access(file, &section, colnr, buf, write)
    }

    /// Write dirty tiles back to the data file.
    pub fn flush_cache(&mut self, file: &mut TsmFile) -> Result<()> {
        match &mut self.cache {
            Some(cache) => cache.flush(file.bucket_file_mut()),
            None => Ok(()),
        }
    }

    /// Flush and drop all cached tiles.
    pub fn clear_cache(&mut self, file: &mut TsmFile) -> Result<()> {
        match &mut self.cache {
            Some(cache) => cache.clear(file.bucket_file_mut()),
            None => Ok(()),
        }
    }

    /// Limit a cache size in buckets to at most `max_cache_size` bytes (0 means no limit).
    ///
    /// A request exceeding the maximum by no more than 10% is still honored.
    #[must_use]
    pub fn validate_cache_size(&self, nbuckets: usize, max_cache_size: u64) -> usize {
        if max_cache_size == 0 || self.bucket_size == 0 {
            return nbuckets.max(1);
        }
        let requested = nbuckets as u64 * self.bucket_size as u64;
        if requested <= max_cache_size + max_cache_size / 10 {
            return nbuckets.max(1);
        }
        usize::try_from(max_cache_size / self.bucket_size as u64)
            .unwrap_or(usize::MAX)
            .max(1)
    }

    /// Resize the tile cache; it only shrinks when `force_smaller` is set.
    pub fn set_cache_size(&mut self, file: &mut TsmFile, nbuckets: usize, force_smaller: bool, max_cache_size: u64) -> Result<()> {
        let nbuckets = self.validate_cache_size(nbuckets, max_cache_size);
        if nbuckets >= self.cache_buckets || force_smaller {
            self.cache_buckets = nbuckets;
        }
        match &mut self.cache {
            Some(cache) => cache.resize(file.bucket_file_mut(), nbuckets, force_smaller),
            None => Ok(()),
        }
    }

    /// Size the cache to hold all tiles touched by an access of `slice_shape` cells.
    pub fn size_cache_for_slice(&mut self, file: &mut TsmFile, slice_shape: &Shape, force_smaller: bool, max_cache_size: u64) -> Result<()> {
        let tiles: u64 = slice_shape
            .as_slice()
            .iter()
            .zip(self.tile_shape.as_slice())
            .map(|(&n, &t)| n.div_ceil(t).max(1))
            .product();
        let nbuckets = usize::try_from(tiles.min(self.nr_tiles.max(1))).unwrap_or(usize::MAX);
        self.set_cache_size(file, nbuckets, force_smaller, max_cache_size)
    }

    #[must_use]
    pub const fn cache_size(&self) -> usize {
        self.cache_buckets
    }

    #[must_use]
    pub fn cache_statistics(&self) -> CacheStatistics {
        self.cache.as_ref().map(BucketCache::statistics).unwrap_or_default()
    }
}

/// A tile shape for cells of `cell_shape` holding about `target_pixels` pixels.
///
/// Cell axes are kept whole as long as they fit; the row axis takes what is left.
#[must_use]
pub fn make_tile_shape(cell_shape: &Shape, target_pixels: u64) -> Shape {
    let mut left = target_pixels.max(1);
    let mut extents = Vec::with_capacity(cell_shape.ndim() + 1);
    for &n in cell_shape.as_slice() {
        let t = n.clamp(1, left);
        extents.push(t);
        left = (left / t).max(1);
    }
    extents.push(left);
    Shape::new(extents)
}

/// 0 becomes 1 and axes longer than the cube are cut to it; the row axis is
/// left alone since the cube grows along it.
fn adjust_tile_shape(cube_shape: &Shape, tile_shape: &Shape) -> Shape {
    let last = cube_shape.ndim().saturating_sub(1);
    Shape::new(
        cube_shape
            .as_slice()
            .iter()
            .zip(tile_shape.as_slice())
            .enumerate()
            .map(|(axis, (&c, &t))| {
                let t = t.max(1);
                if axis == last || c == 0 { t } else { t.min(c) }
            })
            .collect(),
    )
}

fn tile_number(tile_pos: &[u64], tiles_per_dim: &[u64]) -> u64 {
    let mut nr = 0;
    let mut stride = 1;
    for (&pos, &count) in tile_pos.iter().zip(tiles_per_dim) {
        nr += pos * stride;
        stride *= count;
    }
    nr
}

/// Advance `pos` through the box `lo..=hi`, first axis fastest.
fn next_position(pos: &mut [u64], lo: &[u64], hi: &[u64]) -> bool {
    for i in 0..pos.len() {
        if pos[i] < hi[i] {
            pos[i] += 1;
            return true;
        }
        pos[i] = lo[i];
    }
    false
}

/// Byte offsets in the section buffer and in the bucket for every section
/// pixel inside one tile.
#[expect(clippy::too_many_arguments, reason = "inner loop helper")]
fn for_each_pixel(
    k_lo: &[u64],
    k_hi: &[u64],
    section: &Slicer,
    tile_pos: &[u64],
    tile: &[u64],
    section_strides: &[u64],
    col_offset: usize,
    elem_size: usize,
    mut f: impl FnMut(usize, usize),
) {
    let ndim = k_lo.len();
    let mut k = k_lo.to_vec();
    loop {
        let mut buf_index = 0;
        let mut tile_index = 0;
        let mut tile_stride = 1;
        for i in 0..ndim {
            buf_index += k[i] * section_strides[i];
            let pixel = section.start[i] + k[i] * section.stride[i];
            tile_index += (pixel - tile_pos[i] * tile[i]) * tile_stride;
            tile_stride *= tile[i];
        }

        #[expect(clippy::cast_possible_truncation, reason = "offsets are bounded by buffer lengths")]
        f(buf_index as usize * elem_size, col_offset + tile_index as usize * elem_size);

        if !next_position(&mut k, k_lo, k_hi) {
            break;
        }
    }
}

#[expect(clippy::too_many_arguments, reason = "inner loop helper")]
fn copy_out(
    bucket: &[u8],
    buf: &mut [u8],
    k_lo: &[u64],
    k_hi: &[u64],
    section: &Slicer,
    tile_pos: &[u64],
    tile: &[u64],
    section_strides: &[u64],
    col_offset: usize,
    elem_size: usize,
) {
    for_each_pixel(k_lo, k_hi, section, tile_pos, tile, section_strides, col_offset, elem_size, |b, t| {
        buf[b..b + elem_size].copy_from_slice(&bucket[t..t + elem_size]);
    });
}

#[expect(clippy::too_many_arguments, reason = "inner loop helper")]
fn copy_in(
    bucket: &mut [u8],
    buf: &[u8],
    k_lo: &[u64],
    k_hi: &[u64],
    section: &Slicer,
    tile_pos: &[u64],
    tile: &[u64],
    section_strides: &[u64],
    col_offset: usize,
    elem_size: usize,
) {
    for_each_pixel(k_lo, k_hi, section, tile_pos, tile, section_strides, col_offset, elem_size, |b, t| {
        bucket[t..t + elem_size].copy_from_slice(&buf[b..b + elem_size]);
    });
}
