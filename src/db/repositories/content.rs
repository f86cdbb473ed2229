//! Content repository
//!
//! Read-only access to the content store for the exporter: entity ID
//! queries, batched entity fetches, taxonomy terms, metadata, comments and
//! authors.
//!
//! Text columns are read as raw bytes and decoded as UTF-8, falling back to
//! Windows-1252 for legacy rows. Every ID query is ordered by ID ascending.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{mysql::MySqlRow, sqlite::SqliteRow, MySqlPool, Row, SqlitePool};

use crate::config::{DatabaseDriver, AUTO_DRAFT_STATUS};
use crate::db::DynDatabasePool;
use crate::export::cdata::coerce_utf8;
use crate::models::{
    Author, Comment, Entity, MetaEntry, Term, ATTACHMENT_TYPE, CATEGORY_TAXONOMY,
    NAV_MENU_TAXONOMY, SPAM_APPROVAL, TAG_TAXONOMY,
};

/// Maximum number of values bound into one `IN (...)` list
const MAX_IN_LIST: usize = 500;

const DATE_BIND_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Option holding the JSON array of sticky entity IDs
pub const STICKY_POSTS_OPTION: &str = "sticky_posts";

const ENTITY_COLUMNS: &str = "p.id, p.post_author, COALESCE(u.user_login, '') AS author_login, \
     p.post_date, p.post_date_gmt, p.post_content, p.post_title, p.post_excerpt, \
     p.post_status, p.comment_status, p.ping_status, p.post_password, p.post_name, \
     p.post_parent, p.guid, p.menu_order, p.post_type";

const TERM_COLUMNS: &str = "t.term_id, t.name, t.slug, t.description, t.parent, t.taxonomy";

const COMMENT_COLUMNS: &str = "comment_id, comment_post_id, comment_author, comment_author_email, \
     comment_author_url, comment_author_ip, comment_date, comment_date_gmt, comment_content, \
     comment_approved, comment_type, comment_parent, user_id";

/// Criteria for one entity ID query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityQuery {
    /// Content types to match; an empty list matches nothing
    pub content_types: Vec<String>,
    /// Statuses to match; an empty list matches any status
    pub statuses: Vec<String>,
    pub author: Option<i64>,
    /// Inclusive lower bound on `post_date`
    pub date_from: Option<NaiveDateTime>,
    /// Exclusive upper bound on `post_date`
    pub date_before: Option<NaiveDateTime>,
    /// Restrict to entities in this category or one of its descendants
    pub category: Option<i64>,
}

/// A value bound to a `?` placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindValue {
    Int(i64),
    Text(String),
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

/// Build the SQL and bind values for an entity ID query
///
/// Returns `None` when the query cannot match anything.
pub fn build_entity_query(query: &EntityQuery) -> Option<(String, Vec<BindValue>)> {
    if query.content_types.is_empty() {
        return None;
    }

    let mut sql = String::new();
    let mut binds = Vec::new();

    if let Some(category) = query.category {
        sql.push_str(
            "WITH RECURSIVE category_tree(term_id) AS (\
             SELECT term_id FROM terms WHERE term_id = ? AND taxonomy = ? \
             UNION \
             SELECT t.term_id FROM terms t INNER JOIN category_tree ct ON t.parent = ct.term_id \
             WHERE t.taxonomy = ?) ",
        );
        binds.push(BindValue::Int(category));
        binds.push(BindValue::Text(CATEGORY_TAXONOMY.to_string()));
        binds.push(BindValue::Text(CATEGORY_TAXONOMY.to_string()));
    }

    sql.push_str("SELECT p.id FROM posts p WHERE p.post_type IN (");
    sql.push_str(&placeholders(query.content_types.len()));
    sql.push(')');
    binds.extend(query.content_types.iter().cloned().map(BindValue::Text));

    if !query.statuses.is_empty() {
        sql.push_str(" AND p.post_status IN (");
        sql.push_str(&placeholders(query.statuses.len()));
        sql.push(')');
        binds.extend(query.statuses.iter().cloned().map(BindValue::Text));
    }

    if let Some(author) = query.author {
        sql.push_str(" AND p.post_author = ?");
        binds.push(BindValue::Int(author));
    }

    if let Some(from) = query.date_from {
        sql.push_str(" AND p.post_date >= ?");
        binds.push(BindValue::Text(from.format(DATE_BIND_FORMAT).to_string()));
    }

    if let Some(before) = query.date_before {
        sql.push_str(" AND p.post_date < ?");
        binds.push(BindValue::Text(before.format(DATE_BIND_FORMAT).to_string()));
    }

    if query.category.is_some() {
        sql.push_str(
            " AND p.id IN (SELECT tr.object_id FROM term_relationships tr \
             INNER JOIN category_tree ct ON ct.term_id = tr.term_id)",
        );
    }

    sql.push_str(" ORDER BY p.id ASC");
    Some((sql, binds))
}

/// Content repository trait
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// IDs of entities matching the query
    async fn query_entities(&self, query: &EntityQuery) -> Result<Vec<i64>>;

    /// IDs of attachments (any status) whose parent is one of `parent_ids`
    async fn query_attachments(&self, parent_ids: &[i64]) -> Result<Vec<i64>>;

    /// Entities with the given IDs, in the order requested; unknown IDs are skipped
    async fn fetch_entities(&self, ids: &[i64]) -> Result<Vec<Entity>>;

    /// Every term of the given taxonomies, ordered by name
    async fn fetch_terms(&self, taxonomies: &[String]) -> Result<Vec<Term>>;

    /// Every category, ordered by name
    async fn fetch_categories(&self) -> Result<Vec<Term>>;

    /// Every tag, ordered by name
    async fn fetch_tags(&self) -> Result<Vec<Term>>;

    /// Every navigation menu, ordered by name
    async fn fetch_nav_menus(&self) -> Result<Vec<Term>>;

    /// Look up a term by ID within a taxonomy
    async fn find_term(&self, id: i64, taxonomy: &str) -> Result<Option<Term>>;

    /// Terms of the given taxonomies linked to an entity, ordered by name
    async fn entity_terms(&self, entity_id: i64, taxonomies: &[String]) -> Result<Vec<Term>>;

    /// Metadata of an entity in insertion order
    async fn fetch_metadata(&self, entity_id: i64) -> Result<Vec<MetaEntry>>;

    /// Non-spam comments of an entity, oldest first
    async fn fetch_comments(&self, entity_id: i64) -> Result<Vec<Comment>>;

    /// Metadata of a comment in insertion order
    async fn fetch_comment_metadata(&self, comment_id: i64) -> Result<Vec<MetaEntry>>;

    /// Distinct owners of the given entities, or of every non-auto-draft
    /// entity when `entity_ids` is empty; users that no longer exist are
    /// skipped
    async fn distinct_authors(&self, entity_ids: &[i64]) -> Result<Vec<Author>>;

    /// IDs of entities marked sticky
    async fn sticky_ids(&self) -> Result<Vec<i64>>;
}

/// SQLx-based content repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxContentRepository {
    pool: DynDatabasePool,
}

impl SqlxContentRepository {
    /// Create a new SQLx content repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ContentRepository> {
        Arc::new(Self::new(pool))
    }

    async fn select<T: FromContentRow + Send>(
        &self,
        sql: &str,
        binds: &[BindValue],
    ) -> Result<Vec<T>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => select_sqlite(self.pool.sqlite()?, sql, binds).await,
            DatabaseDriver::Mysql => select_mysql(self.pool.mysql()?, sql, binds).await,
        }
    }

    /// Run `sql_for(chunk_len)` once per chunk of `ids`, binding `leading`
    /// before the chunk, and concatenate the results
    async fn select_in_chunks<T: FromContentRow + Send>(
        &self,
        ids: &[i64],
        leading: &[BindValue],
        sql_for: impl Fn(usize) -> String + Send + Sync,
    ) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        for chunk in ids.chunks(MAX_IN_LIST) {
            let sql = sql_for(chunk.len());
            let mut binds = leading.to_vec();
            binds.extend(chunk.iter().copied().map(BindValue::Int));
            rows.extend(self.select::<T>(&sql, &binds).await?);
        }
        Ok(rows)
    }
}

#[async_trait]
impl ContentRepository for SqlxContentRepository {
    async fn query_entities(&self, query: &EntityQuery) -> Result<Vec<i64>> {
        let Some((sql, binds)) = build_entity_query(query) else {
            return Ok(Vec::new());
        };
        self.select::<i64>(&sql, &binds)
            .await
            .context("Failed to query entities")
    }

    async fn query_attachments(&self, parent_ids: &[i64]) -> Result<Vec<i64>> {
        let mut ids: Vec<i64> = self
            .select_in_chunks(
                parent_ids,
                &[BindValue::Text(ATTACHMENT_TYPE.to_string())],
                |n| {
                    format!(
                        "SELECT id FROM posts WHERE post_type = ? AND post_parent IN ({}) ORDER BY id ASC",
                        placeholders(n)
                    )
                },
            )
            .await
            .context("Failed to query attachments")?;
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn fetch_entities(&self, ids: &[i64]) -> Result<Vec<Entity>> {
        let entities: Vec<Entity> = self
            .select_in_chunks(ids, &[], |n| {
                format!(
                    "SELECT {} FROM posts p LEFT JOIN users u ON u.id = p.post_author WHERE p.id IN ({})",
                    ENTITY_COLUMNS,
                    placeholders(n)
                )
            })
            .await
            .context("Failed to fetch entities")?;

        let mut by_id: HashMap<i64, Entity> = entities.into_iter().map(|e| (e.id, e)).collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn fetch_terms(&self, taxonomies: &[String]) -> Result<Vec<Term>> {
        if taxonomies.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM terms t WHERE t.taxonomy IN ({}) ORDER BY t.name ASC, t.term_id ASC",
            TERM_COLUMNS,
            placeholders(taxonomies.len())
        );
        let binds: Vec<BindValue> = taxonomies.iter().cloned().map(BindValue::Text).collect();
        self.select(&sql, &binds)
            .await
            .context("Failed to fetch terms")
    }

    async fn fetch_categories(&self) -> Result<Vec<Term>> {
        self.fetch_terms(&[CATEGORY_TAXONOMY.to_string()]).await
    }

    async fn fetch_tags(&self) -> Result<Vec<Term>> {
        self.fetch_terms(&[TAG_TAXONOMY.to_string()]).await
    }

    async fn fetch_nav_menus(&self) -> Result<Vec<Term>> {
        self.fetch_terms(&[NAV_MENU_TAXONOMY.to_string()]).await
    }

    async fn find_term(&self, id: i64, taxonomy: &str) -> Result<Option<Term>> {
        let sql = format!(
            "SELECT {} FROM terms t WHERE t.term_id = ? AND t.taxonomy = ?",
            TERM_COLUMNS
        );
        let terms: Vec<Term> = self
            .select(&sql, &[BindValue::Int(id), BindValue::Text(taxonomy.to_string())])
            .await
            .context("Failed to find term")?;
        Ok(terms.into_iter().next())
    }

    async fn entity_terms(&self, entity_id: i64, taxonomies: &[String]) -> Result<Vec<Term>> {
        if taxonomies.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM terms t INNER JOIN term_relationships tr ON tr.term_id = t.term_id \
             WHERE tr.object_id = ? AND t.taxonomy IN ({}) ORDER BY t.name ASC, t.term_id ASC",
            TERM_COLUMNS,
            placeholders(taxonomies.len())
        );
        let mut binds = vec![BindValue::Int(entity_id)];
        binds.extend(taxonomies.iter().cloned().map(BindValue::Text));
        self.select(&sql, &binds)
            .await
            .context("Failed to fetch entity terms")
    }

    async fn fetch_metadata(&self, entity_id: i64) -> Result<Vec<MetaEntry>> {
        self.select(
            "SELECT meta_id, meta_key, meta_value FROM postmeta WHERE post_id = ? ORDER BY meta_id ASC",
            &[BindValue::Int(entity_id)],
        )
        .await
        .context("Failed to fetch entity metadata")
    }

    async fn fetch_comments(&self, entity_id: i64) -> Result<Vec<Comment>> {
        let sql = format!(
            "SELECT {} FROM comments WHERE comment_post_id = ? AND comment_approved <> ? \
             ORDER BY comment_id ASC",
            COMMENT_COLUMNS
        );
        self.select(
            &sql,
            &[BindValue::Int(entity_id), BindValue::Text(SPAM_APPROVAL.to_string())],
        )
        .await
        .context("Failed to fetch comments")
    }

    async fn fetch_comment_metadata(&self, comment_id: i64) -> Result<Vec<MetaEntry>> {
        self.select(
            "SELECT meta_id, meta_key, meta_value FROM commentmeta WHERE comment_id = ? ORDER BY meta_id ASC",
            &[BindValue::Int(comment_id)],
        )
        .await
        .context("Failed to fetch comment metadata")
    }

    async fn distinct_authors(&self, entity_ids: &[i64]) -> Result<Vec<Author>> {
        let auto_draft = BindValue::Text(AUTO_DRAFT_STATUS.to_string());
        let owners = if entity_ids.is_empty() {
            self.select::<i64>(
                "SELECT DISTINCT post_author AS id FROM posts WHERE post_status <> ?",
                &[auto_draft],
            )
            .await
        } else {
            self.select_in_chunks::<i64>(entity_ids, &[auto_draft], |n| {
                format!(
                    "SELECT DISTINCT post_author AS id FROM posts WHERE post_status <> ? AND id IN ({})",
                    placeholders(n)
                )
            })
            .await
        };
        let owner_ids: Vec<i64> = owners
            .context("Failed to query entity owners")?
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        self.select_in_chunks(&owner_ids, &[], |n| {
            format!(
                "SELECT id, user_login, user_email, display_name, first_name, last_name \
                 FROM users WHERE id IN ({}) ORDER BY id ASC",
                placeholders(n)
            )
        })
        .await
        .context("Failed to fetch authors")
    }

    async fn sticky_ids(&self) -> Result<Vec<i64>> {
        let values: Vec<String> = self
            .select(
                "SELECT option_value AS value FROM options WHERE option_name = ?",
                &[BindValue::Text(STICKY_POSTS_OPTION.to_string())],
            )
            .await
            .context("Failed to read sticky posts")?;

        let Some(value) = values.into_iter().next() else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<i64>>(&value) {
            Ok(ids) => Ok(ids),
            Err(e) => {
                tracing::warn!("Ignoring malformed {} option: {}", STICKY_POSTS_OPTION, e);
                Ok(Vec::new())
            }
        }
    }
}

// ============================================================================
// Driver-specific execution
// ============================================================================

async fn select_sqlite<T: FromContentRow>(
    pool: &SqlitePool,
    sql: &str,
    binds: &[BindValue],
) -> Result<Vec<T>> {
    let mut query = sqlx::query(sql);
    for value in binds {
        query = match value {
            BindValue::Int(v) => query.bind(*v),
            BindValue::Text(v) => query.bind(v.as_str()),
        };
    }
    let rows = query
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to execute query: {}", sql))?;
    rows.iter().map(T::from_row).collect()
}

async fn select_mysql<T: FromContentRow>(
    pool: &MySqlPool,
    sql: &str,
    binds: &[BindValue],
) -> Result<Vec<T>> {
    let mut query = sqlx::query(sql);
    for value in binds {
        query = match value {
            BindValue::Int(v) => query.bind(*v),
            BindValue::Text(v) => query.bind(v.as_str()),
        };
    }
    let rows = query
        .fetch_all(pool)
        .await
        .with_context(|| format!("Failed to execute query: {}", sql))?;
    rows.iter().map(T::from_row).collect()
}

// ============================================================================
// Row mapping
// ============================================================================

/// Column access shared by the SQLite and MySQL rows
trait ContentRow {
    fn int(&self, column: &str) -> Result<i64>;
    fn text(&self, column: &str) -> Result<String>;
    fn datetime(&self, column: &str) -> Result<NaiveDateTime>;
    fn optional_datetime(&self, column: &str) -> Result<Option<NaiveDateTime>>;
}

impl ContentRow for SqliteRow {
    fn int(&self, column: &str) -> Result<i64> {
        self.try_get(column)
            .with_context(|| format!("Failed to read column {}", column))
    }

    fn text(&self, column: &str) -> Result<String> {
        let bytes: Option<Vec<u8>> = self
            .try_get(column)
            .with_context(|| format!("Failed to read column {}", column))?;
        Ok(bytes.map(coerce_utf8).unwrap_or_default())
    }

    fn datetime(&self, column: &str) -> Result<NaiveDateTime> {
        self.try_get(column)
            .with_context(|| format!("Failed to read column {}", column))
    }

    fn optional_datetime(&self, column: &str) -> Result<Option<NaiveDateTime>> {
        self.try_get(column)
            .with_context(|| format!("Failed to read column {}", column))
    }
}

impl ContentRow for MySqlRow {
    fn int(&self, column: &str) -> Result<i64> {
        self.try_get(column)
            .with_context(|| format!("Failed to read column {}", column))
    }

    fn text(&self, column: &str) -> Result<String> {
        let bytes: Option<Vec<u8>> = self
            .try_get(column)
            .with_context(|| format!("Failed to read column {}", column))?;
        Ok(bytes.map(coerce_utf8).unwrap_or_default())
    }

    fn datetime(&self, column: &str) -> Result<NaiveDateTime> {
        self.try_get(column)
            .with_context(|| format!("Failed to read column {}", column))
    }

    fn optional_datetime(&self, column: &str) -> Result<Option<NaiveDateTime>> {
        self.try_get(column)
            .with_context(|| format!("Failed to read column {}", column))
    }
}

/// Model that can be read from a content query row
trait FromContentRow: Sized {
    fn from_row<R: ContentRow>(row: &R) -> Result<Self>;
}

impl FromContentRow for i64 {
    fn from_row<R: ContentRow>(row: &R) -> Result<Self> {
        row.int("id")
    }
}

impl FromContentRow for String {
    fn from_row<R: ContentRow>(row: &R) -> Result<Self> {
        row.text("value")
    }
}

impl FromContentRow for Entity {
    fn from_row<R: ContentRow>(row: &R) -> Result<Self> {
        Ok(Entity {
            id: row.int("id")?,
            author_id: row.int("post_author")?,
            author_login: row.text("author_login")?,
            post_date: row.datetime("post_date")?,
            post_date_gmt: row.optional_datetime("post_date_gmt")?,
            content: row.text("post_content")?,
            title: row.text("post_title")?,
            excerpt: row.text("post_excerpt")?,
            status: row.text("post_status")?,
            comment_status: row.text("comment_status")?,
            ping_status: row.text("ping_status")?,
            password: row.text("post_password")?,
            name: row.text("post_name")?,
            parent_id: row.int("post_parent")?,
            guid: row.text("guid")?,
            menu_order: i32::try_from(row.int("menu_order")?).context("menu_order out of range")?,
            post_type: row.text("post_type")?,
        })
    }
}

impl FromContentRow for Term {
    fn from_row<R: ContentRow>(row: &R) -> Result<Self> {
        Ok(Term {
            id: row.int("term_id")?,
            name: row.text("name")?,
            slug: row.text("slug")?,
            description: row.text("description")?,
            parent_id: row.int("parent")?,
            taxonomy: row.text("taxonomy")?,
        })
    }
}

impl FromContentRow for MetaEntry {
    fn from_row<R: ContentRow>(row: &R) -> Result<Self> {
        Ok(MetaEntry {
            id: row.int("meta_id")?,
            key: row.text("meta_key")?,
            value: row.text("meta_value")?,
        })
    }
}

impl FromContentRow for Comment {
    fn from_row<R: ContentRow>(row: &R) -> Result<Self> {
        Ok(Comment {
            id: row.int("comment_id")?,
            post_id: row.int("comment_post_id")?,
            author: row.text("comment_author")?,
            author_email: row.text("comment_author_email")?,
            author_url: row.text("comment_author_url")?,
            author_ip: row.text("comment_author_ip")?,
            date: row.datetime("comment_date")?,
            date_gmt: row.optional_datetime("comment_date_gmt")?,
            content: row.text("comment_content")?,
            approved: row.text("comment_approved")?,
            comment_type: row.text("comment_type")?,
            parent_id: row.int("comment_parent")?,
            user_id: row.int("user_id")?,
        })
    }
}

impl FromContentRow for Author {
    fn from_row<R: ContentRow>(row: &R) -> Result<Self> {
        Ok(Author {
            id: row.int("id")?,
            login: row.text("user_login")?,
            email: row.text("user_email")?,
            display_name: row.text("display_name")?,
            first_name: row.text("first_name")?,
            last_name: row.text("last_name")?,
        })
    }
}
