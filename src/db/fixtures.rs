//! Seeded in-memory content store for tests

use sqlx::SqlitePool;

use super::{create_test_pool, migrations, DynDatabasePool};
use crate::models::Term;

/// Builder for a row in `posts`
#[derive(Debug, Clone)]
pub struct NewPost {
    post_type: String,
    date: String,
    date_gmt: Option<String>,
    author: i64,
    status: String,
    parent: i64,
    title: String,
    content: String,
    excerpt: String,
    name: String,
    guid: String,
    menu_order: i64,
    password: String,
}

impl NewPost {
    pub fn new(post_type: &str, date: &str) -> Self {
        Self {
            post_type: post_type.to_string(),
            date: date.to_string(),
            date_gmt: None,
            author: 1,
            status: "publish".to_string(),
            parent: 0,
            title: String::new(),
            content: String::new(),
            excerpt: String::new(),
            name: String::new(),
            guid: String::new(),
            menu_order: 0,
            password: String::new(),
        }
    }

    pub fn author(mut self, author: i64) -> Self {
        self.author = author;
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn parent(mut self, parent: i64) -> Self {
        self.parent = parent;
        self
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn content(mut self, content: &str) -> Self {
        self.content = content.to_string();
        self
    }

    pub fn excerpt(mut self, excerpt: &str) -> Self {
        self.excerpt = excerpt.to_string();
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn gmt(mut self, date_gmt: &str) -> Self {
        self.date_gmt = Some(date_gmt.to_string());
        self
    }

    pub fn guid(mut self, guid: &str) -> Self {
        self.guid = guid.to_string();
        self
    }

    pub fn menu_order(mut self, menu_order: i64) -> Self {
        self.menu_order = menu_order;
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.password = password.to_string();
        self
    }
}

/// Migrated in-memory SQLite database with seeding helpers
pub struct ContentFixture {
    pool: DynDatabasePool,
}

impl ContentFixture {
    pub async fn new() -> Self {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        Self { pool }
    }

    pub fn pool(&self) -> DynDatabasePool {
        self.pool.clone()
    }

    fn sqlite(&self) -> &SqlitePool {
        self.pool.sqlite().expect("sqlite pool")
    }

    pub async fn user(&self, id: i64, login: &str) {
        sqlx::query(
            "INSERT INTO users (id, user_login, user_email, display_name, first_name, last_name) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(login)
        .bind(format!("{}@example.com", login))
        .bind(login.to_uppercase())
        .bind(login)
        .bind("")
        .execute(self.sqlite())
        .await
        .expect("Failed to insert user");
    }

    pub async fn post(&self, post: NewPost) -> i64 {
        sqlx::query(
            "INSERT INTO posts (post_author, post_date, post_date_gmt, post_content, post_title, \
             post_excerpt, post_status, post_password, post_name, post_parent, guid, menu_order, post_type) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(post.author)
        .bind(post.date)
        .bind(post.date_gmt)
        .bind(post.content)
        .bind(post.title)
        .bind(post.excerpt)
        .bind(post.status)
        .bind(post.password)
        .bind(post.name)
        .bind(post.parent)
        .bind(post.guid)
        .bind(post.menu_order)
        .bind(post.post_type)
        .execute(self.sqlite())
        .await
        .expect("Failed to insert post")
        .last_insert_rowid()
    }

    /// Overwrite an entity's content with raw bytes
    pub async fn set_raw_content(&self, id: i64, content: Vec<u8>) {
        sqlx::query("UPDATE posts SET post_content = ? WHERE id = ?")
            .bind(content)
            .bind(id)
            .execute(self.sqlite())
            .await
            .expect("Failed to update post content");
    }

    pub async fn term(&self, term: Term) {
        sqlx::query(
            "INSERT INTO terms (term_id, name, slug, taxonomy, description, parent) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(term.id)
        .bind(term.name)
        .bind(term.slug)
        .bind(term.taxonomy)
        .bind(term.description)
        .bind(term.parent_id)
        .execute(self.sqlite())
        .await
        .expect("Failed to insert term");
    }

    pub async fn relate(&self, object_id: i64, term_id: i64) {
        sqlx::query("INSERT INTO term_relationships (object_id, term_id) VALUES (?, ?)")
            .bind(object_id)
            .bind(term_id)
            .execute(self.sqlite())
            .await
            .expect("Failed to insert term relationship");
    }

    pub async fn meta(&self, post_id: i64, key: &str, value: &str) {
        sqlx::query("INSERT INTO postmeta (post_id, meta_key, meta_value) VALUES (?, ?, ?)")
            .bind(post_id)
            .bind(key)
            .bind(value)
            .execute(self.sqlite())
            .await
            .expect("Failed to insert post meta");
    }

    pub async fn comment(&self, post_id: i64, author: &str, content: &str, approved: &str) -> i64 {
        sqlx::query(
            "INSERT INTO comments (comment_post_id, comment_author, comment_author_email, \
             comment_date, comment_date_gmt, comment_content, comment_approved) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(post_id)
        .bind(author)
        .bind(format!("{}@example.com", author.to_lowercase()))
        .bind("2024-01-05 08:30:00")
        .bind("2024-01-05 07:30:00")
        .bind(content)
        .bind(approved)
        .execute(self.sqlite())
        .await
        .expect("Failed to insert comment")
        .last_insert_rowid()
    }

    pub async fn comment_meta(&self, comment_id: i64, key: &str, value: &str) {
        sqlx::query("INSERT INTO commentmeta (comment_id, meta_key, meta_value) VALUES (?, ?, ?)")
            .bind(comment_id)
            .bind(key)
            .bind(value)
            .execute(self.sqlite())
            .await
            .expect("Failed to insert comment meta");
    }

    /// Insert or replace a site option
    pub async fn option(&self, name: &str, value: &str) {
        sqlx::query("INSERT OR REPLACE INTO options (option_name, option_value) VALUES (?, ?)")
            .bind(name)
            .bind(value)
            .execute(self.sqlite())
            .await
            .expect("Failed to write option");
    }
}
