//! `SQLite` storage backends.
//!
//! Each backend owns one `Mutex<Connection>`; WAL mode and the busy timeout
//! let every backend share one database file.

mod archive;
mod connection;
mod rankings;
mod repository;
mod row;

pub use archive::SqliteArchive;
pub use connection::{acquire_lock, configure_connection, open_connection};
pub use rankings::SqliteRankings;
pub use repository::SqliteRepository;
