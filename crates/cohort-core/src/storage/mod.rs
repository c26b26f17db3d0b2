//! # Storage Module
//!
//! Durable assignment storage. The only implementation is an embedded
//! redb database with a write-through in-memory cache.

pub mod redb_store;

pub use redb_store::RedbStore;
