pub mod handlers;
pub mod models;
pub mod pagination;
pub mod store;

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use axum::Router;
use serde_json::json;
use shelf_kernel::{InitCtx, Migration, Module};
use sqlx::SqlitePool;

use store::{BookStore, SqliteBookStore};

/// Route prefix segment; the registry mounts the module under `/api/books`.
pub const MODULE_NAME: &str = "books";

/// Book catalogue module: CRUD, paging and search over the `books` table.
pub struct BooksModule {
    store: Arc<dyn BookStore>,
}

impl BooksModule {
    pub fn new(store: Arc<dyn BookStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        MODULE_NAME
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let sqlite_version: String = sqlx::query_scalar("SELECT sqlite_version()")
            .fetch_one(ctx.db)
            .await
            .context("books database is unreachable")?;

        tracing::info!(
            module = self.name(),
            environment = ?ctx.settings.environment,
            sqlite_version = %sqlite_version,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        handlers::router(self.store.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(openapi_fragment())
    }

    fn migrations(&self) -> Vec<Migration> {
        vec![Migration {
            id: "001_create_books",
            up: store::SCHEMA,
        }]
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        let total = self.store.count().await?;
        tracing::info!(module = self.name(), books = total, "books module started");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}

/// Create the books module backed by the given pool
pub fn create_module(pool: SqlitePool) -> Arc<dyn Module> {
    Arc::new(BooksModule::new(Arc::new(SqliteBookStore::new(pool))))
}

fn error_response(description: &str) -> serde_json::Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": { "$ref": "#/components/schemas/ErrorResponse" }
            }
        }
    })
}

fn id_parameter() -> serde_json::Value {
    json!({
        "name": "id",
        "in": "path",
        "required": true,
        "schema": { "type": "integer", "format": "int64", "minimum": 1 }
    })
}

fn openapi_fragment() -> serde_json::Value {
    let book_ref = json!({ "$ref": "#/components/schemas/Book" });

    json!({
        "paths": {
            "/": {
                "get": {
                    "summary": "List books, one page at a time",
                    "tags": ["Books"],
                    "parameters": [
                        { "name": "page", "in": "query", "required": false, "schema": { "type": "integer", "default": 1 } },
                        { "name": "pageSize", "in": "query", "required": false, "schema": { "type": "integer", "default": 10 } }
                    ],
                    "responses": {
                        "200": {
                            "description": "Page of books",
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/BookPage" }
                                }
                            }
                        },
                        "400": error_response("page or pageSize is not positive")
                    }
                },
                "post": {
                    "summary": "Create a book",
                    "tags": ["Books"],
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": { "$ref": "#/components/schemas/CreateBook" }
                            }
                        }
                    },
                    "responses": {
                        "201": {
                            "description": "Created; Location points at the new book",
                            "content": { "application/json": { "schema": book_ref } }
                        },
                        "400": error_response("Validation failed")
                    }
                }
            },
            "/{id}": {
                "get": {
                    "summary": "Get a book by id",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "responses": {
                        "200": {
                            "description": "The book",
                            "content": { "application/json": { "schema": book_ref } }
                        },
                        "400": error_response("id is not positive"),
                        "404": error_response("Book not found")
                    }
                },
                "put": {
                    "summary": "Replace a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "requestBody": {
                        "required": true,
                        "content": { "application/json": { "schema": book_ref } }
                    },
                    "responses": {
                        "204": { "description": "Updated" },
                        "400": error_response("Book ID mismatch or validation failed"),
                        "404": error_response("Book not found"),
                        "409": error_response("Book was modified by another request")
                    }
                },
                "delete": {
                    "summary": "Delete a book",
                    "tags": ["Books"],
                    "parameters": [id_parameter()],
                    "responses": {
                        "204": { "description": "Deleted" },
                        "400": error_response("id is not positive"),
                        "404": error_response("Book not found")
                    }
                }
            },
            "/search": {
                "get": {
                    "summary": "Search by title prefix and author substring",
                    "tags": ["Books"],
                    "parameters": [
                        { "name": "title", "in": "query", "required": false, "schema": { "type": "string", "maxLength": 200 } },
                        { "name": "author", "in": "query", "required": false, "schema": { "type": "string", "maxLength": 200 } }
                    ],
                    "responses": {
                        "200": {
                            "description": "Matching books",
                            "content": {
                                "application/json": {
                                    "schema": { "type": "array", "items": book_ref }
                                }
                            }
                        },
                        "400": error_response("Search term too long")
                    }
                }
            },
            "/health": {
                "get": {
                    "summary": "Books health check",
                    "tags": ["Books"],
                    "responses": {
                        "200": {
                            "description": "OK",
                            "content": { "text/plain": { "schema": { "type": "string" } } }
                        }
                    }
                }
            }
        },
        "components": {
            "schemas": {
                "Book": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "integer", "format": "int64" },
                        "title": { "type": "string", "maxLength": 200 },
                        "author": { "type": "string", "maxLength": 100 },
                        "publicationDate": { "type": "string", "format": "date" },
                        "price": { "type": "number", "minimum": 0.01, "maximum": 1000 },
                        "version": {
                            "type": "integer",
                            "description": "Concurrency token; send it back on update to detect lost updates"
                        }
                    },
                    "required": ["id", "title", "author", "price"]
                },
                "CreateBook": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string", "maxLength": 200 },
                        "author": { "type": "string", "maxLength": 100 },
                        "publicationDate": { "type": "string", "format": "date" },
                        "price": { "type": "number", "minimum": 0.01, "maximum": 1000 }
                    },
                    "required": ["title", "author", "price"]
                },
                "BookPage": {
                    "type": "object",
                    "properties": {
                        "totalItems": { "type": "integer" },
                        "totalPages": { "type": "integer" },
                        "isOverLastPage": { "type": "boolean" },
                        "currentPage": { "type": "integer" },
                        "pageSize": { "type": "integer" },
                        "books": { "type": "array", "items": book_ref }
                    },
                    "required": ["totalItems", "totalPages", "isOverLastPage", "currentPage", "pageSize", "books"]
                }
            }
        }
    })
}
