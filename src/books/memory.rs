//! In-memory book store for tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use time::OffsetDateTime;

use super::repo::{Book, BookFields, BookStore};

#[derive(Debug, Default)]
pub struct MemoryBookStore {
    books: Mutex<Vec<Book>>,
    next_id: AtomicI64,
}

impl MemoryBookStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.books.lock().unwrap().len()
    }
}

#[async_trait]
impl BookStore for MemoryBookStore {
    async fn random(&self, limit: i64) -> anyhow::Result<Vec<Book>> {
        let books = self.books.lock().unwrap();
        let n = usize::try_from(limit).unwrap_or(0);
        Ok(books
            .choose_multiple(&mut rand::thread_rng(), n)
            .cloned()
            .collect())
    }

    async fn list_by_user(&self, user_id: i64) -> anyhow::Result<Vec<Book>> {
        let books = self.books.lock().unwrap();
        let mut own: Vec<Book> = books.iter().filter(|b| b.user_id == user_id).cloned().collect();
        own.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(own)
    }

    async fn search_by_name(&self, fragment: &str) -> anyhow::Result<Vec<Book>> {
        let needle = fragment.to_lowercase();
        let books = self.books.lock().unwrap();
        let mut hits: Vec<Book> = books
            .iter()
            .filter(|b| b.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(hits)
    }

    async fn get(&self, user_id: i64, book_id: i64) -> anyhow::Result<Option<Book>> {
        let books = self.books.lock().unwrap();
        Ok(books
            .iter()
            .find(|b| b.id == book_id && b.user_id == user_id)
            .cloned())
    }

    async fn create(
        &self,
        user_id: i64,
        fields: &BookFields<'_>,
        cover: &str,
    ) -> anyhow::Result<Book> {
        let book = Book {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            user_id,
            name: fields.name.to_string(),
            rating: fields.rating,
            review: fields.review.to_string(),
            cover: cover.to_string(),
            author: fields.author.to_string(),
            created_at: OffsetDateTime::now_utc(),
        };
        self.books.lock().unwrap().push(book.clone());
        Ok(book)
    }

    async fn update(
        &self,
        user_id: i64,
        book_id: i64,
        fields: &BookFields<'_>,
        cover: Option<&str>,
    ) -> anyhow::Result<Option<Book>> {
        let mut books = self.books.lock().unwrap();
        let Some(book) = books
            .iter_mut()
            .find(|b| b.id == book_id && b.user_id == user_id)
        else {
            return Ok(None);
        };
        book.name = fields.name.to_string();
        book.rating = fields.rating;
        book.review = fields.review.to_string();
        book.author = fields.author.to_string();
        if let Some(cover) = cover {
            book.cover = cover.to_string();
        }
        Ok(Some(book.clone()))
    }

    async fn delete(&self, user_id: i64, book_id: i64) -> anyhow::Result<bool> {
        let mut books = self.books.lock().unwrap();
        let before = books.len();
        books.retain(|b| !(b.id == book_id && b.user_id == user_id));
        Ok(books.len() < before)
    }
}
