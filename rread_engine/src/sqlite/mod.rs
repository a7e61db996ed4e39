//! SQLite backend for the fulfilment engine. The same database holds the order store, the key pools and the job
//! queue.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
