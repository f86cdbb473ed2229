//! Database repositories
//!
//! Repository pattern implementations for database access.

pub mod content;

pub use content::{
    build_entity_query, BindValue, ContentRepository, EntityQuery, SqlxContentRepository,
    STICKY_POSTS_OPTION,
};
