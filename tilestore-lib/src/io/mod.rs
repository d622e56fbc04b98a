//! Low-level persistence helpers.
//!
//! - [`stream`]: typed, canonical (big-endian) serialization of the structures
//!   kept on disk (table description, storage manager header, lock info).
//! - [`path_utils`]: path normalization used to key caches and lock files.

pub mod path_utils;
pub mod stream;

pub use path_utils::absolute_name;
pub use stream::{ObjectReader, ObjectWriter};
