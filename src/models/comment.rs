//! Comment model

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Approval value the content store uses for spam comments
pub const SPAM_APPROVAL: &str = "spam";

/// Comment attached to an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author: String,
    pub author_email: String,
    pub author_url: String,
    pub author_ip: String,
    pub date: NaiveDateTime,
    pub date_gmt: Option<NaiveDateTime>,
    pub content: String,
    /// `1`, `0`, `spam`, `trash`...
    pub approved: String,
    pub comment_type: String,
    pub parent_id: i64,
    pub user_id: i64,
}

impl Comment {
    /// Check if the comment was flagged as spam
    pub fn is_spam(&self) -> bool {
        self.approved == SPAM_APPROVAL
    }
}
