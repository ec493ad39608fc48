use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use shelf_http::error::AppError;

use super::models::{Book, CreateBook, Violation};
use super::pagination::{self, BookPage, PageError};
use super::store::{BookStore, StoreError};

/// Longest accepted `title` / `author` search term.
pub const SEARCH_TERM_MAX_LEN: usize = 200;

const VALIDATION_MESSAGE: &str = "One or more validation errors occurred.";

#[derive(Clone)]
pub struct BooksState {
    pub store: Arc<dyn BookStore>,
}

/// Routes of the books module, relative to its mount point.
pub fn router(store: Arc<dyn BookStore>) -> Router {
    Router::new()
        .route("/", get(list_books).post(create_book))
        .route("/health", get(health_check))
        .route("/search", get(search_books))
        .route(
            "/{id}",
            get(get_book).put(update_book).delete(delete_book),
        )
        .with_state(BooksState { store })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(default = "ListParams::default_page")]
    pub page: i64,
    #[serde(default = "ListParams::default_page_size")]
    pub page_size: i64,
}

impl ListParams {
    fn default_page() -> i64 {
        1
    }

    fn default_page_size() -> i64 {
        10
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AppError::not_found(format!("Book {} not found.", id)),
            StoreError::ConcurrencyConflict(id) => AppError::conflict(format!(
                "Book {} was modified by another request.",
                id
            )),
            StoreError::Database(e) => AppError::Internal(e.into()),
        }
    }
}

impl From<PageError> for AppError {
    fn from(err: PageError) -> Self {
        match err {
            PageError::InvalidArgument(message) => AppError::bad_request(message),
            PageError::Store(e) => e.into(),
        }
    }
}

fn ensure_positive_id(id: i64) -> Result<(), AppError> {
    if id <= 0 {
        return Err(AppError::bad_request("Book id must be greater than 0."));
    }
    Ok(())
}

fn ensure_valid(violations: Vec<Violation>) -> Result<(), AppError> {
    if violations.is_empty() {
        return Ok(());
    }

    let details = violations.iter().map(|v| serde_json::json!(v)).collect();
    Err(AppError::validation(details, VALIDATION_MESSAGE))
}

async fn health_check() -> &'static str {
    "books module is healthy"
}

/// GET / - one page of books
async fn list_books(
    State(state): State<BooksState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<BookPage>, AppError> {
    let Query(params) = params.map_err(|e| AppError::bad_request(e.body_text()))?;

    let page = pagination::paginate(state.store.as_ref(), params.page, params.page_size).await?;
    Ok(Json(page))
}

/// GET /{id}
async fn get_book(
    State(state): State<BooksState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Book>, AppError> {
    let Path(id) = id.map_err(|e| AppError::bad_request(e.body_text()))?;
    ensure_positive_id(id)?;

    tracing::debug!(book_id = id, "fetching book");
    let book = state.store.get_by_id(id).await?;
    Ok(Json(book))
}

/// POST / - 201 with a `Location` pointing at the new book
async fn create_book(
    State(state): State<BooksState>,
    body: Result<Json<CreateBook>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(book) = body.map_err(|e| AppError::bad_request(e.body_text()))?;
    ensure_valid(book.validate())?;

    let created = state.store.create(&book).await?;
    tracing::info!(book_id = created.id, title = %created.title, "book created");

    let location = format!("/api/{}/{}", super::MODULE_NAME, created.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(created),
    )
        .into_response())
}

/// PUT /{id} - full replace
async fn update_book(
    State(state): State<BooksState>,
    id: Result<Path<i64>, PathRejection>,
    body: Result<Json<Book>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Path(id) = id.map_err(|e| AppError::bad_request(e.body_text()))?;
    let Json(book) = body.map_err(|e| AppError::bad_request(e.body_text()))?;

    if id != book.id {
        return Err(AppError::bad_request("Book ID mismatch"));
    }
    ensure_valid(book.validate())?;

    match state.store.update(&book).await {
        Ok(()) => {
            tracing::info!(book_id = id, "book updated");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(StoreError::ConcurrencyConflict(_)) => {
            if state.store.exists(id).await? {
                tracing::warn!(book_id = id, version = ?book.version, "update lost a concurrency race");
                Err(StoreError::ConcurrencyConflict(id).into())
            } else {
                Err(StoreError::NotFound(id).into())
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// DELETE /{id}
async fn delete_book(
    State(state): State<BooksState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let Path(id) = id.map_err(|e| AppError::bad_request(e.body_text()))?;
    ensure_positive_id(id)?;

    state.store.delete(id).await?;
    tracing::info!(book_id = id, "book deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /search?title=&author=
async fn search_books(
    State(state): State<BooksState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Vec<Book>>, AppError> {
    let Query(params) = params.map_err(|e| AppError::bad_request(e.body_text()))?;

    if params.title.chars().count() > SEARCH_TERM_MAX_LEN
        || params.author.chars().count() > SEARCH_TERM_MAX_LEN
    {
        return Err(AppError::bad_request(
            "Search terms can't be longer than 200 characters.",
        ));
    }

    let books = state.store.search(&params.title, &params.author).await?;
    Ok(Json(books))
}
