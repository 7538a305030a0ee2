use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{auth::extractors::AuthUser, state::AppState};

use super::covers::cover_data_url;
use super::dto::{BookRequest, SearchRequest};
use super::repo::Book;

const RANDOM_SAMPLE: i64 = 10;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/books/random", get(random_books))
        .route("/books/search", post(search_books))
        .route("/books", get(list_books))
        .route("/books/:id", get(get_book))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/books", post(create_book))
        .route(
            "/books/:id",
            axum::routing::put(update_book).delete(delete_book),
        )
}

#[instrument(skip(state))]
pub async fn random_books(
    State(state): State<AppState>,
) -> Result<Json<Vec<Book>>, (StatusCode, String)> {
    let books = state.books.random(RANDOM_SAMPLE).await.map_err(internal)?;
    Ok(Json(books))
}

#[instrument(skip(state))]
pub async fn search_books(
    State(state): State<AppState>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<Vec<Book>>, (StatusCode, String)> {
    let books = state
        .books
        .search_by_name(body.name.trim())
        .await
        .map_err(internal)?;
    Ok(Json(books))
}

#[instrument(skip(state, principal), fields(user_id = principal.id))]
pub async fn list_books(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<Vec<Book>>, (StatusCode, String)> {
    let books = state
        .books
        .list_by_user(principal.id)
        .await
        .map_err(internal)?;
    Ok(Json(books))
}

#[instrument(skip(state, principal), fields(user_id = principal.id))]
pub async fn get_book(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Book>, (StatusCode, String)> {
    state
        .books
        .get(principal.id, id)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Book not found".into()))
}

#[instrument(skip(state, principal, body), fields(user_id = principal.id))]
pub async fn create_book(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(body): Json<BookRequest>,
) -> Result<(StatusCode, HeaderMap, Json<Book>), (StatusCode, String)> {
    let fields = body.validate().map_err(bad_request)?;
    let cover = cover_data_url(
        state.covers.as_ref(),
        body.cover_key.as_deref(),
        body.cover_value.as_deref(),
    )
    .await;

    let book = state
        .books
        .create(principal.id, &fields, &cover)
        .await
        .map_err(internal)?;
    info!(book_id = book.id, "book created");

    let mut headers = HeaderMap::new();
    if let Ok(location) = format!("/api/v1/books/{}", book.id).parse() {
        headers.insert(axum::http::header::LOCATION, location);
    }
    Ok((StatusCode::CREATED, headers, Json(book)))
}

#[instrument(skip(state, principal, body), fields(user_id = principal.id))]
pub async fn update_book(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<BookRequest>,
) -> Result<Json<Book>, (StatusCode, String)> {
    let fields = body.validate().map_err(bad_request)?;
    // No cover reference in the edit keeps the stored cover.
    let cover = match (body.cover_key.as_deref(), body.cover_value.as_deref()) {
        (Some(key), Some(value)) => {
            Some(cover_data_url(state.covers.as_ref(), Some(key), Some(value)).await)
        }
        _ => None,
    };

    match state
        .books
        .update(principal.id, id, &fields, cover.as_deref())
        .await
        .map_err(internal)?
    {
        Some(book) => Ok(Json(book)),
        None => {
            warn!(book_id = id, "update on missing or foreign book");
            Err((StatusCode::NOT_FOUND, "Book not found".into()))
        }
    }
}

#[instrument(skip(state, principal), fields(user_id = principal.id))]
pub async fn delete_book(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state
        .books
        .delete(principal.id, id)
        .await
        .map_err(internal)?
    {
        info!(book_id = id, "book deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "Book not found".into()))
    }
}

fn bad_request(msg: String) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, msg)
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    error!(error = ?e, "book query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal Server Error".into(),
    )
}
