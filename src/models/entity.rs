//! Entity model
//!
//! An entity is one row of the content store: a post, a page, a custom
//! content type instance, a navigation menu item or an attachment. Entities
//! are a frozen snapshot taken when the export reads them.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Content type of uploaded media
pub const ATTACHMENT_TYPE: &str = "attachment";

/// Exportable content entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier
    pub id: i64,
    /// Owning user ID
    pub author_id: i64,
    /// Login of the owning user, empty when the user no longer exists
    pub author_login: String,
    /// Local publish date
    pub post_date: NaiveDateTime,
    /// UTC publish date, unset for unscheduled drafts
    pub post_date_gmt: Option<NaiveDateTime>,
    pub content: String,
    pub title: String,
    pub excerpt: String,
    /// Status (publish, draft, ...)
    pub status: String,
    pub comment_status: String,
    pub ping_status: String,
    pub password: String,
    /// Slug
    pub name: String,
    /// Parent entity ID, 0 for top-level entities
    pub parent_id: i64,
    pub guid: String,
    pub menu_order: i32,
    /// Content type name
    pub post_type: String,
}

impl Entity {
    /// Check if this entity is an uploaded attachment
    pub fn is_attachment(&self) -> bool {
        self.post_type == ATTACHMENT_TYPE
    }

    /// Query-string permalink relative to the blog URL
    pub fn permalink(&self, blog_url: &str) -> String {
        let blog_url = blog_url.trim_end_matches('/');
        match self.post_type.as_str() {
            "page" => format!("{}/?page_id={}", blog_url, self.id),
            ATTACHMENT_TYPE => format!("{}/?attachment_id={}", blog_url, self.id),
            "post" => format!("{}/?p={}", blog_url, self.id),
            other => format!("{}/?post_type={}&p={}", blog_url, other, self.id),
        }
    }
}

/// Key-value metadata entry, ordered by insertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaEntry {
    pub id: i64,
    pub key: String,
    pub value: String,
}
