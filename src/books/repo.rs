use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

/// Book entry owned by a single user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Book {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub rating: i16,
    pub review: String,
    pub cover: String, // data: URL or empty
    pub author: String,
    pub created_at: OffsetDateTime,
}

/// Editable fields of a book.
#[derive(Debug, Clone)]
pub struct BookFields<'a> {
    pub name: &'a str,
    pub rating: i16,
    pub review: &'a str,
    pub author: &'a str,
}

const COLUMNS: &str = "id, user_id, name, rating, review, cover, author, created_at";

/// Book persistence. Every per-book query is keyed by the owner as well as the id,
/// so a foreign book behaves exactly like a missing one.
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn random(&self, limit: i64) -> anyhow::Result<Vec<Book>>;
    async fn list_by_user(&self, user_id: i64) -> anyhow::Result<Vec<Book>>;
    /// Case-insensitive substring match on the book name.
    async fn search_by_name(&self, fragment: &str) -> anyhow::Result<Vec<Book>>;
    async fn get(&self, user_id: i64, book_id: i64) -> anyhow::Result<Option<Book>>;
    async fn create(
        &self,
        user_id: i64,
        fields: &BookFields<'_>,
        cover: &str,
    ) -> anyhow::Result<Book>;
    /// `cover: None` keeps the stored cover. Returns `None` when the book does
    /// not exist or belongs to someone else.
    async fn update(
        &self,
        user_id: i64,
        book_id: i64,
        fields: &BookFields<'_>,
        cover: Option<&str>,
    ) -> anyhow::Result<Option<Book>>;
    async fn delete(&self, user_id: i64, book_id: i64) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgBookStore {
    db: PgPool,
}

impl PgBookStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BookStore for PgBookStore {
    async fn random(&self, limit: i64) -> anyhow::Result<Vec<Book>> {
        let rows = sqlx::query_as::<_, Book>(&format!(
            "SELECT {COLUMNS} FROM books ORDER BY random() LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.db)
        .await
        .context("random books")?;
        Ok(rows)
    }

    async fn list_by_user(&self, user_id: i64) -> anyhow::Result<Vec<Book>> {
        let rows = sqlx::query_as::<_, Book>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM books
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list books by user")?;
        Ok(rows)
    }

    async fn search_by_name(&self, fragment: &str) -> anyhow::Result<Vec<Book>> {
        let rows = sqlx::query_as::<_, Book>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM books
            WHERE name ILIKE '%' || $1 || '%'
            ORDER BY name ASC
            "#
        ))
        .bind(escape_like(fragment))
        .fetch_all(&self.db)
        .await
        .context("search books by name")?;
        Ok(rows)
    }

    async fn get(&self, user_id: i64, book_id: i64) -> anyhow::Result<Option<Book>> {
        let row = sqlx::query_as::<_, Book>(&format!(
            "SELECT {COLUMNS} FROM books WHERE id = $1 AND user_id = $2"
        ))
        .bind(book_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("get book")?;
        Ok(row)
    }

    async fn create(
        &self,
        user_id: i64,
        fields: &BookFields<'_>,
        cover: &str,
    ) -> anyhow::Result<Book> {
        let row = sqlx::query_as::<_, Book>(&format!(
            r#"
            INSERT INTO books (user_id, name, rating, review, cover, author)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(fields.name)
        .bind(fields.rating)
        .bind(fields.review)
        .bind(cover)
        .bind(fields.author)
        .fetch_one(&self.db)
        .await
        .context("insert book")?;
        Ok(row)
    }

    async fn update(
        &self,
        user_id: i64,
        book_id: i64,
        fields: &BookFields<'_>,
        cover: Option<&str>,
    ) -> anyhow::Result<Option<Book>> {
        let row = sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books
               SET name = $1, rating = $2, review = $3,
                   cover = COALESCE($4, cover), author = $5
             WHERE id = $6 AND user_id = $7
            RETURNING {COLUMNS}
            "#
        ))
        .bind(fields.name)
        .bind(fields.rating)
        .bind(fields.review)
        .bind(cover)
        .bind(fields.author)
        .bind(book_id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("update book")?;
        Ok(row)
    }

    async fn delete(&self, user_id: i64, book_id: i64) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM books WHERE id = $1 AND user_id = $2")
            .bind(book_id)
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("delete book")?;
        Ok(res.rows_affected() > 0)
    }
}

/// Escapes LIKE metacharacters so user input only ever matches literally.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
