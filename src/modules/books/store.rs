//! Book persistence.
//!
//! [`BookStore`] is the seam handlers depend on; [`SqliteBookStore`] is the
//! `sqlx` implementation used by the service.

use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use thiserror::Error;

use super::models::{Book, CreateBook};

/// Schema for the `books` table.
///
/// `AUTOINCREMENT` keeps SQLite from handing out the id of a deleted row again.
pub const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS books (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        title            TEXT    NOT NULL,
        author           TEXT    NOT NULL,
        publication_date TEXT    NOT NULL,
        price            REAL    NOT NULL,
        version          INTEGER NOT NULL DEFAULT 1
    );
    CREATE INDEX IF NOT EXISTS books_title_idx ON books (title);
"#;

const COLUMNS: &str = "id, title, author, publication_date, price, version";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("book {0} not found")]
    NotFound(i64),

    /// The row changed or disappeared between read and write.
    #[error("book {0} was modified or deleted concurrently")]
    ConcurrencyConflict(i64),

    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait BookStore: Send + Sync {
    /// At most `limit` books starting at `offset`, in insertion order.
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Book>, StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;

    async fn get_by_id(&self, id: i64) -> Result<Book, StoreError>;

    /// Persist a new book and return it with its assigned id.
    async fn create(&self, book: &CreateBook) -> Result<Book, StoreError>;

    /// Replace every field of an existing book.
    ///
    /// Returns [`StoreError::ConcurrencyConflict`] when no row was written:
    /// the row is gone, or `book.version` no longer matches.
    async fn update(&self, book: &Book) -> Result<(), StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;

    async fn exists(&self, id: i64) -> Result<bool, StoreError>;

    /// Books whose title starts with `title_prefix` and whose author contains
    /// `author_substring`, both compared case-sensitively. An empty argument
    /// disables its filter.
    async fn search(
        &self,
        title_prefix: &str,
        author_substring: &str,
    ) -> Result<Vec<Book>, StoreError>;
}

#[derive(Clone)]
pub struct SqliteBookStore {
    pool: SqlitePool,
}

impl SqliteBookStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookStore for SqliteBookStore {
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Book>, StoreError> {
        let books = sqlx::query_as::<_, Book>(&format!(
            "SELECT {COLUMNS} FROM books ORDER BY id LIMIT ? OFFSET ?"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(books)
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;

        Ok(total)
    }

    async fn get_by_id(&self, id: i64) -> Result<Book, StoreError> {
        sqlx::query_as::<_, Book>(&format!("SELECT {COLUMNS} FROM books WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound(id))
    }

    async fn create(&self, book: &CreateBook) -> Result<Book, StoreError> {
        let created = sqlx::query_as::<_, Book>(&format!(
            "INSERT INTO books (title, author, publication_date, price)
             VALUES (?, ?, ?, ?)
             RETURNING {COLUMNS}"
        ))
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.publication_date)
        .bind(book.price)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(book_id = created.id, title = %created.title, "book inserted");
        Ok(created)
    }

    async fn update(&self, book: &Book) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE books
             SET title = ?, author = ?, publication_date = ?, price = ?, version = version + 1
             WHERE id = ? AND (? IS NULL OR version = ?)",
        )
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.publication_date)
        .bind(book.price)
        .bind(book.id)
        .bind(book.version)
        .bind(book.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ConcurrencyConflict(book.id));
        }

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }

        Ok(())
    }

    async fn exists(&self, id: i64) -> Result<bool, StoreError> {
        let found: i64 = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM books WHERE id = ?)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(found != 0)
    }

    async fn search(
        &self,
        title_prefix: &str,
        author_substring: &str,
    ) -> Result<Vec<Book>, StoreError> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM books WHERE 1 = 1"));

        // LIKE narrows candidates but folds ASCII case; the substr() equality
        // keeps the prefix match under the column's BINARY collation, like instr().
        if !title_prefix.is_empty() {
            query
                .push(" AND title LIKE ")
                .push_bind(like_prefix_pattern(title_prefix))
                .push(" ESCAPE '\\'")
                .push(" AND substr(title, 1, length(")
                .push_bind(title_prefix.to_string())
                .push(")) = ")
                .push_bind(title_prefix.to_string());
        }

        if !author_substring.is_empty() {
            query
                .push(" AND instr(author, ")
                .push_bind(author_substring.to_string())
                .push(") > 0");
        }

        query.push(" ORDER BY id");

        let books = query.build_query_as::<Book>().fetch_all(&self.pool).await?;
        Ok(books)
    }
}

/// Escape LIKE wildcards in `prefix` and turn it into a prefix pattern.
fn like_prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
