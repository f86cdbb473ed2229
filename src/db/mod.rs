//! Database layer
//!
//! Read access to the content store behind an export. Both SQLite and MySQL
//! are supported; the driver is selected by configuration.
//!
//! # Usage
//!
//! ```ignore
//! use wxr_export::db::{create_pool, migrations, SqlxContentRepository};
//!
//! let pool = create_pool(&config.database).await?;
//! migrations::run_migrations(&pool).await?;
//! let repo = SqlxContentRepository::boxed(pool.clone());
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

#[cfg(test)]
pub(crate) mod fixtures;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
pub use repositories::{ContentRepository, SqlxContentRepository};
