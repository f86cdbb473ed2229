//! Taxonomy term model
//!
//! Categories, tags, navigation menus and custom taxonomy terms share one
//! shape and are told apart by `taxonomy`.

use serde::{Deserialize, Serialize};

/// Hierarchical taxonomy attached to posts
pub const CATEGORY_TAXONOMY: &str = "category";
/// Flat taxonomy attached to posts
pub const TAG_TAXONOMY: &str = "post_tag";
/// Taxonomy grouping navigation menu items into menus
pub const NAV_MENU_TAXONOMY: &str = "nav_menu";

/// Taxonomy term
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Term {
    /// Unique identifier
    pub id: i64,
    /// Display name
    pub name: String,
    /// URL-friendly slug, unique within the taxonomy
    pub slug: String,
    /// Term description (may be empty)
    pub description: String,
    /// Parent term ID, 0 for root terms
    pub parent_id: i64,
    /// Taxonomy this term belongs to
    pub taxonomy: String,
}

impl Term {
    /// Create a root term with an empty description
    pub fn new(id: i64, taxonomy: &str, slug: &str, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            slug: slug.to_string(),
            description: String::new(),
            parent_id: 0,
            taxonomy: taxonomy.to_string(),
        }
    }

    /// Set the parent term
    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = parent_id;
        self
    }

    /// Check if this is a root term (no parent)
    pub fn is_root(&self) -> bool {
        self.parent_id == 0
    }
}
