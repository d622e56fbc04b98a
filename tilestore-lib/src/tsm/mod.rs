//! Tiled storage of N-dimensional array columns.
//!
//! A table's array cells are grouped into hypercubes whose last axis runs over
//! rows. Each hypercube is split into tiles of a fixed shape and stored in its
//! own data file. Tiles pass through a per-hypercube cache.
//!
//! - [`TiledStMan`]: owns the files, hypercubes and columns of one table
//! - [`TsmCube`]: one hypercube, its tile layout and cache
//! - [`TsmFile`]: a data file, identified by its sequence number
//! - [`TsmColumn`]: a column bound to data, coordinate or id access

mod bucket_cache;
mod bucket_file;
mod data_type;
mod shape;
mod tiled_stman;
mod tsm_column;
mod tsm_cube;
mod tsm_file;

pub use bucket_cache::{BucketCache, CacheStatistics};
pub use bucket_file::BucketFile;
pub use data_type::DataType;
pub use shape::Shape;
pub use tiled_stman::{CacheConfig, TiledStMan};
pub use tsm_column::{TsmColumn, TsmColumnKind, TsmCoordColumn, TsmDataColumn, TsmIdColumn};
pub use tsm_cube::{DEFAULT_TILE_PIXELS, TsmCube, make_tile_shape};
pub use tsm_file::{TsmFile, file_name};
