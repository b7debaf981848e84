//! Durable key-value storage.
//!
//! The [`KeyValueStore`] trait is the only storage surface the submission
//! queue depends on: string keys, string values, asynchronous access, and
//! contents that survive a process restart (for the `SQLite` backend).

pub mod db;
pub mod memory_store;
pub mod schema;
pub mod sqlite_store;

use std::future::Future;
use std::pin::Pin;

use crate::Result;

pub use memory_store::MemoryStore;
pub use sqlite_store::SqliteStore;

/// Boxed future returned by [`KeyValueStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Asynchronous string key-value storage.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, or `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Storage`](crate::AppError::Storage) if the backend read fails.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Storage`](crate::AppError::Storage) if the backend write fails.
    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()>;

    /// Delete `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Storage`](crate::AppError::Storage) if the backend delete fails.
    fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}
