//! Process-wide bookkeeping of open tables.

mod table_cache;

pub use table_cache::TableCache;
