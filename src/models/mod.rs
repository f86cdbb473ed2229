//! Data models
//!
//! Read-only projections of the content store used by the exporter:
//! - Entities (posts, pages, custom types, attachments) and their metadata
//! - Taxonomy terms
//! - Comments
//! - Authors

mod author;
mod comment;
mod entity;
mod term;

pub use author::Author;
pub use comment::{Comment, SPAM_APPROVAL};
pub use entity::{Entity, MetaEntry, ATTACHMENT_TYPE};
pub use term::{Term, CATEGORY_TAXONOMY, NAV_MENU_TAXONOMY, TAG_TAXONOMY};
