//! Persistent cache of parsed log files and the directory manifest

mod codec;
mod legacy;
mod snapshot;
mod store;

pub(crate) use legacy::StoredCache;
pub(crate) use snapshot::{CacheSnapshot, FileCacheEntry, FileMeta, file_meta, mtime_nanos};
pub(crate) use store::CacheStore;
