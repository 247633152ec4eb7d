//! Key/value storage abstractions backing the directory.

pub mod kv_store;

pub use kv_store::{InMemoryStore, Store};
