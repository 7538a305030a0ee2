use serde::Deserialize;

use super::repo::BookFields;

pub const MAX_RATING: i16 = 5;

/// Body for creating or editing a book. `cover_key`/`cover_value` name an
/// Open Library cover, e.g. `isbn` + `0385472579`.
#[derive(Debug, Deserialize)]
pub struct BookRequest {
    pub name: String,
    pub rating: i16,
    #[serde(default)]
    pub review: String,
    #[serde(default)]
    pub author: String,
    #[serde(default, alias = "key")]
    pub cover_key: Option<String>,
    #[serde(default, alias = "value")]
    pub cover_value: Option<String>,
}

impl BookRequest {
    pub fn validate(&self) -> Result<BookFields<'_>, String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("Book name is required".into());
        }
        if !(0..=MAX_RATING).contains(&self.rating) {
            return Err(format!("Rating must be between 0 and {MAX_RATING}"));
        }
        Ok(BookFields {
            name,
            rating: self.rating,
            review: self.review.trim(),
            author: self.author.trim(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(alias = "bookName")]
    pub name: String,
}
