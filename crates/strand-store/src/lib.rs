//! SQLite-backed session persistence: an opaque resume identifier plus
//! save/load that round-trip the transcript, usage totals, and compaction
//! watermark exactly.

pub mod database;
pub mod error;
pub mod schema;
pub mod sessions;

pub use database::Database;
pub use error::StoreError;
pub use sessions::SessionRepo;
