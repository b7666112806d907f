//! SQLite persistence for tessera messages and blocks.
//!
//! [`SessionDb`] is the raw database handle; [`SqliteRepository`] adapts it
//! to the engine's [`MessageRepository`](tessera_engine::MessageRepository)
//! contract, layering the reactive in-memory live view on top.

pub mod db;
pub mod sqlite;

pub use db::SessionDb;
pub use sqlite::SqliteRepository;
