//! Page arithmetic for the book listing.

use serde::Serialize;
use thiserror::Error;

use super::models::Book;
use super::store::{BookStore, StoreError};

#[derive(Debug, Error)]
pub enum PageError {
    #[error("{0}")]
    InvalidArgument(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolved page bounds for a listing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub current_page: i64,
    pub page_size: i64,
    pub total_items: i64,
    pub total_pages: i64,
    pub is_over_last_page: bool,
}

impl PageWindow {
    /// Resolve `page` against `total_items`, clamping to the last page when
    /// the request runs past it. With no items the requested page is kept.
    pub fn compute(page: i64, page_size: i64, total_items: i64) -> Result<Self, PageError> {
        if page <= 0 || page_size <= 0 {
            return Err(PageError::InvalidArgument(
                "Page and pageSize must be greater than 0.",
            ));
        }

        let total_items = total_items.max(0);
        let total_pages = total_items / page_size + i64::from(total_items % page_size != 0);
        let is_over_last_page = total_pages > 0 && page > total_pages;

        Ok(Self {
            current_page: if is_over_last_page { total_pages } else { page },
            page_size,
            total_items,
            total_pages,
            is_over_last_page,
        })
    }

    pub fn offset(&self) -> i64 {
        (self.current_page - 1).saturating_mul(self.page_size)
    }
}

/// One page of books plus the totals a client needs to navigate.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookPage {
    pub total_items: i64,
    pub total_pages: i64,
    pub is_over_last_page: bool,
    pub current_page: i64,
    pub page_size: i64,
    pub books: Vec<Book>,
}

/// Fetch one page of books, clamping past-the-end requests to the last page.
pub async fn paginate(
    store: &dyn BookStore,
    page: i64,
    page_size: i64,
) -> Result<BookPage, PageError> {
    // Reject bad input before touching the store.
    PageWindow::compute(page, page_size, 0)?;

    let total_items = store.count().await?;
    let window = PageWindow::compute(page, page_size, total_items)?;

    let books = if window.total_items == 0 {
        Vec::new()
    } else {
        store.list(window.offset(), window.page_size).await?
    };

    if window.is_over_last_page {
        tracing::debug!(
            requested = page,
            served = window.current_page,
            "page clamped to last page"
        );
    }

    Ok(BookPage {
        total_items: window.total_items,
        total_pages: window.total_pages,
        is_over_last_page: window.is_over_last_page,
        current_page: window.current_page,
        page_size: window.page_size,
        books,
    })
}
