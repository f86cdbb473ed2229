//! Database migrations module
//!
//! Code-based migrations describing the content store the exporter reads:
//! users, posts (every content type, attachments included), post metadata,
//! comments with their metadata, taxonomy terms with their object links, and
//! site options. The layout mirrors the WordPress tables with the
//! `terms`/`term_taxonomy` pair folded into a single `terms` table.
//!
//! # Usage
//!
//! ```ignore
//! use wxr_export::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All migrations, embedded in the binary.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_login VARCHAR(60) NOT NULL UNIQUE,
                user_email VARCHAR(100) NOT NULL DEFAULT '',
                display_name VARCHAR(250) NOT NULL DEFAULT '',
                first_name VARCHAR(250) NOT NULL DEFAULT '',
                last_name VARCHAR(250) NOT NULL DEFAULT ''
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                user_login VARCHAR(60) NOT NULL UNIQUE,
                user_email VARCHAR(100) NOT NULL DEFAULT '',
                display_name VARCHAR(250) NOT NULL DEFAULT '',
                first_name VARCHAR(250) NOT NULL DEFAULT '',
                last_name VARCHAR(250) NOT NULL DEFAULT ''
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_posts",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_author INTEGER NOT NULL DEFAULT 0,
                post_date DATETIME NOT NULL,
                post_date_gmt DATETIME,
                post_content TEXT NOT NULL DEFAULT '',
                post_title TEXT NOT NULL DEFAULT '',
                post_excerpt TEXT NOT NULL DEFAULT '',
                post_status VARCHAR(20) NOT NULL DEFAULT 'publish',
                comment_status VARCHAR(20) NOT NULL DEFAULT 'open',
                ping_status VARCHAR(20) NOT NULL DEFAULT 'open',
                post_password VARCHAR(255) NOT NULL DEFAULT '',
                post_name VARCHAR(200) NOT NULL DEFAULT '',
                post_parent INTEGER NOT NULL DEFAULT 0,
                guid VARCHAR(255) NOT NULL DEFAULT '',
                menu_order INTEGER NOT NULL DEFAULT 0,
                post_type VARCHAR(20) NOT NULL DEFAULT 'post'
            );
            CREATE INDEX IF NOT EXISTS idx_posts_type_status_date ON posts(post_type, post_status, post_date, id);
            CREATE INDEX IF NOT EXISTS idx_posts_parent ON posts(post_parent);
            CREATE INDEX IF NOT EXISTS idx_posts_author ON posts(post_author);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS posts (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                post_author BIGINT NOT NULL DEFAULT 0,
                post_date DATETIME NOT NULL,
                post_date_gmt DATETIME NULL,
                post_content LONGTEXT NOT NULL,
                post_title TEXT NOT NULL,
                post_excerpt TEXT NOT NULL,
                post_status VARCHAR(20) NOT NULL DEFAULT 'publish',
                comment_status VARCHAR(20) NOT NULL DEFAULT 'open',
                ping_status VARCHAR(20) NOT NULL DEFAULT 'open',
                post_password VARCHAR(255) NOT NULL DEFAULT '',
                post_name VARCHAR(200) NOT NULL DEFAULT '',
                post_parent BIGINT NOT NULL DEFAULT 0,
                guid VARCHAR(255) NOT NULL DEFAULT '',
                menu_order INT NOT NULL DEFAULT 0,
                post_type VARCHAR(20) NOT NULL DEFAULT 'post'
            );
            CREATE INDEX idx_posts_type_status_date ON posts(post_type, post_status, post_date, id);
            CREATE INDEX idx_posts_parent ON posts(post_parent);
            CREATE INDEX idx_posts_author ON posts(post_author);
        "#,
    },
    Migration {
        version: 3,
        name: "create_postmeta",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS postmeta (
                meta_id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL,
                meta_key VARCHAR(255) NOT NULL DEFAULT '',
                meta_value TEXT NOT NULL DEFAULT '',
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_postmeta_post_id ON postmeta(post_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS postmeta (
                meta_id BIGINT PRIMARY KEY AUTO_INCREMENT,
                post_id BIGINT NOT NULL,
                meta_key VARCHAR(255) NOT NULL DEFAULT '',
                meta_value LONGTEXT NOT NULL,
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_postmeta_post_id ON postmeta(post_id);
        "#,
    },
    Migration {
        version: 4,
        name: "create_comments",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS comments (
                comment_id INTEGER PRIMARY KEY AUTOINCREMENT,
                comment_post_id INTEGER NOT NULL,
                comment_author TEXT NOT NULL DEFAULT '',
                comment_author_email VARCHAR(100) NOT NULL DEFAULT '',
                comment_author_url VARCHAR(200) NOT NULL DEFAULT '',
                comment_author_ip VARCHAR(100) NOT NULL DEFAULT '',
                comment_date DATETIME NOT NULL,
                comment_date_gmt DATETIME,
                comment_content TEXT NOT NULL DEFAULT '',
                comment_approved VARCHAR(20) NOT NULL DEFAULT '1',
                comment_type VARCHAR(20) NOT NULL DEFAULT '',
                comment_parent INTEGER NOT NULL DEFAULT 0,
                user_id INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (comment_post_id) REFERENCES posts(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_comments_post_id ON comments(comment_post_id);
            CREATE TABLE IF NOT EXISTS commentmeta (
                meta_id INTEGER PRIMARY KEY AUTOINCREMENT,
                comment_id INTEGER NOT NULL,
                meta_key VARCHAR(255) NOT NULL DEFAULT '',
                meta_value TEXT NOT NULL DEFAULT '',
                FOREIGN KEY (comment_id) REFERENCES comments(comment_id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_commentmeta_comment_id ON commentmeta(comment_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS comments (
                comment_id BIGINT PRIMARY KEY AUTO_INCREMENT,
                comment_post_id BIGINT NOT NULL,
                comment_author TINYTEXT NOT NULL,
                comment_author_email VARCHAR(100) NOT NULL DEFAULT '',
                comment_author_url VARCHAR(200) NOT NULL DEFAULT '',
                comment_author_ip VARCHAR(100) NOT NULL DEFAULT '',
                comment_date DATETIME NOT NULL,
                comment_date_gmt DATETIME NULL,
                comment_content TEXT NOT NULL,
                comment_approved VARCHAR(20) NOT NULL DEFAULT '1',
                comment_type VARCHAR(20) NOT NULL DEFAULT '',
                comment_parent BIGINT NOT NULL DEFAULT 0,
                user_id BIGINT NOT NULL DEFAULT 0,
                FOREIGN KEY (comment_post_id) REFERENCES posts(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_comments_post_id ON comments(comment_post_id);
            CREATE TABLE IF NOT EXISTS commentmeta (
                meta_id BIGINT PRIMARY KEY AUTO_INCREMENT,
                comment_id BIGINT NOT NULL,
                meta_key VARCHAR(255) NOT NULL DEFAULT '',
                meta_value LONGTEXT NOT NULL,
                FOREIGN KEY (comment_id) REFERENCES comments(comment_id) ON DELETE CASCADE
            );
            CREATE INDEX idx_commentmeta_comment_id ON commentmeta(comment_id);
        "#,
    },
    Migration {
        version: 5,
        name: "create_terms",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS terms (
                term_id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(200) NOT NULL DEFAULT '',
                slug VARCHAR(200) NOT NULL DEFAULT '',
                taxonomy VARCHAR(32) NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                parent INTEGER NOT NULL DEFAULT 0,
                UNIQUE (taxonomy, slug)
            );
            CREATE INDEX IF NOT EXISTS idx_terms_taxonomy ON terms(taxonomy);
            CREATE TABLE IF NOT EXISTS term_relationships (
                object_id INTEGER NOT NULL,
                term_id INTEGER NOT NULL,
                term_order INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (object_id, term_id),
                FOREIGN KEY (term_id) REFERENCES terms(term_id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_term_relationships_term ON term_relationships(term_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS terms (
                term_id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(200) NOT NULL DEFAULT '',
                slug VARCHAR(200) NOT NULL DEFAULT '',
                taxonomy VARCHAR(32) NOT NULL,
                description LONGTEXT NOT NULL,
                parent BIGINT NOT NULL DEFAULT 0,
                UNIQUE KEY uniq_terms_taxonomy_slug (taxonomy, slug)
            );
            CREATE INDEX idx_terms_taxonomy ON terms(taxonomy);
            CREATE TABLE IF NOT EXISTS term_relationships (
                object_id BIGINT NOT NULL,
                term_id BIGINT NOT NULL,
                term_order INT NOT NULL DEFAULT 0,
                PRIMARY KEY (object_id, term_id),
                FOREIGN KEY (term_id) REFERENCES terms(term_id) ON DELETE CASCADE
            );
            CREATE INDEX idx_term_relationships_term ON term_relationships(term_id);
        "#,
    },
    Migration {
        version: 6,
        name: "create_options",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS options (
                option_name VARCHAR(191) PRIMARY KEY,
                option_value TEXT NOT NULL DEFAULT ''
            );
            INSERT OR IGNORE INTO options (option_name, option_value) VALUES ('sticky_posts', '[]');
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS options (
                option_name VARCHAR(191) PRIMARY KEY,
                option_value LONGTEXT NOT NULL
            );
            INSERT IGNORE INTO options (option_name, option_value) VALUES ('sticky_posts', '[]');
        "#,
    },
];

/// Run all pending migrations
///
/// # Returns
///
/// Number of migrations applied
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => get_applied_migrations_sqlite(pool.sqlite()?).await,
        DatabaseDriver::Mysql => get_applied_migrations_mysql(pool.mysql()?).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        records.push(MigrationRecord {
            version: row.try_get("version")?,
            name: row.try_get("name")?,
            applied_at: row.try_get("applied_at")?,
        });
    }

    Ok(records)
}

async fn get_applied_migrations_mysql(pool: &MySqlPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let version: i32 = row.try_get("version")?;
        records.push(MigrationRecord {
            version: version as i64,
            name: row.try_get("name")?,
            applied_at: row.try_get("applied_at")?,
        });
    }

    Ok(records)
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.driver() {
        DatabaseDriver::Sqlite => apply_migration_sqlite(pool.sqlite()?, migration).await,
        DatabaseDriver::Mysql => apply_migration_mysql(pool.mysql()?, migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_mysql) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool).await?;
    Ok(applied.len() == MIGRATIONS.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_is_up_to_date() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        assert!(!is_up_to_date(&pool).await.expect("Failed to check"));
        run_migrations(&pool).await.expect("Failed to run migrations");
        assert!(is_up_to_date(&pool).await.expect("Failed to check"));
    }

    #[tokio::test]
    async fn test_sticky_posts_option_seeded() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        let value: String =
            sqlx::query_scalar("SELECT option_value FROM options WHERE option_name = 'sticky_posts'")
                .fetch_one(pool.sqlite().expect("sqlite pool"))
                .await
                .expect("Failed to read option");
        assert_eq!(value, "[]");
    }

    #[tokio::test]
    async fn test_term_slug_unique_per_taxonomy() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");

        pool.execute("INSERT INTO terms (name, slug, taxonomy) VALUES ('News', 'news', 'category')")
            .await
            .expect("Failed to insert category");
        pool.execute("INSERT INTO terms (name, slug, taxonomy) VALUES ('News', 'news', 'post_tag')")
            .await
            .expect("Same slug in another taxonomy is allowed");

        let duplicate = pool
            .execute("INSERT INTO terms (name, slug, taxonomy) VALUES ('News 2', 'news', 'category')")
            .await;
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT); CREATE TABLE b (id INT);";
        assert_eq!(split_sql_statements(sql).len(), 2);

        let sql_with_comments = "-- Comment\nCREATE TABLE a (id INT);\n-- trailing";
        assert_eq!(split_sql_statements(sql_with_comments).len(), 1);
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- This is a comment"));
        assert!(is_comment_only("-- Line 1\n-- Line 2"));
        assert!(!is_comment_only("-- Comment\nCREATE TABLE test"));
    }
}
