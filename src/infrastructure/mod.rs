pub mod in_memory;
pub mod publisher;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod signature;
