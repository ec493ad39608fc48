use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use shelf_app::books::{
    handlers,
    models::{Book, CreateBook},
    store::{BookStore, StoreError},
};
use shelf_http::router::RouterBuilder;
use shelf_kernel::settings::Settings;
use tower::ServiceExt;

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Value,
}

async fn app() -> Router {
    let settings = Settings::default();
    let pool = shelf_db::connect_in_memory().await.unwrap();
    let registry = shelf_app::app::prepare(&settings, &pool).await.unwrap();
    shelf_http::build_router(&registry, &settings).unwrap()
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Reply {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    Reply {
        status,
        headers,
        body,
    }
}

fn dune() -> Value {
    json!({
        "title": "Dune",
        "author": "Herbert",
        "price": 9.99,
        "publicationDate": "1965-01-01"
    })
}

async fn create(app: &Router, book: Value) -> Value {
    let reply = send(app, Method::POST, "/api/books", Some(book)).await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    reply.body
}

#[tokio::test]
async fn dune_scenario() {
    let app = app().await;
    let created = create(&app, dune()).await;
    let id = created["id"].as_i64().unwrap();

    let fetched = send(&app, Method::GET, &format!("/api/books/{id}"), None).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body, created);
    assert_eq!(fetched.body["title"], "Dune");
    assert_eq!(fetched.body["author"], "Herbert");
    assert_eq!(fetched.body["price"], 9.99);
    assert_eq!(fetched.body["publicationDate"], "1965-01-01");

    let by_title = send(&app, Method::GET, "/api/books/search?title=Du", None).await;
    assert_eq!(by_title.status, StatusCode::OK);
    assert_eq!(by_title.body, json!([created]));

    let by_author = send(&app, Method::GET, "/api/books/search?author=Tolkien", None).await;
    assert_eq!(by_author.status, StatusCode::OK);
    assert_eq!(by_author.body, json!([]));
}

#[tokio::test]
async fn search_filters_share_case_sensitivity() {
    let app = app().await;
    let created = create(&app, dune()).await;

    for uri in ["/api/books/search?title=du", "/api/books/search?author=herbert"] {
        let reply = send(&app, Method::GET, uri, None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body, json!([]), "{uri}");
    }

    let exact = send(&app, Method::GET, "/api/books/search?title=Du&author=Herb", None).await;
    assert_eq!(exact.body, json!([created]));
}

#[tokio::test]
async fn create_returns_location_of_new_book() {
    let app = app().await;
    let reply = send(&app, Method::POST, "/api/books", Some(dune())).await;

    assert_eq!(reply.status, StatusCode::CREATED);
    let id = reply.body["id"].as_i64().unwrap();
    let location = reply.headers[header::LOCATION].to_str().unwrap().to_string();
    assert_eq!(location, format!("/api/books/{id}"));

    let fetched = send(&app, Method::GET, &location, None).await;
    assert_eq!(fetched.status, StatusCode::OK);
    assert_eq!(fetched.body, reply.body);
}

#[tokio::test]
async fn create_without_date_uses_minimum_date() {
    let app = app().await;
    let created = create(
        &app,
        json!({ "title": "Undated", "author": "Anon", "price": 1.0 }),
    )
    .await;
    assert_eq!(created["publicationDate"], "0001-01-01");
}

#[tokio::test]
async fn empty_table_listing() {
    let app = app().await;
    let reply = send(&app, Method::GET, "/api/books?page=1&pageSize=10", None).await;

    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.body,
        json!({
            "totalItems": 0,
            "totalPages": 0,
            "isOverLastPage": false,
            "currentPage": 1,
            "pageSize": 10,
            "books": []
        })
    );
}

#[tokio::test]
async fn listing_defaults_and_clamps() {
    let app = app().await;
    for n in 0..12 {
        create(
            &app,
            json!({ "title": format!("Book {n}"), "author": "Anon", "price": 5.0 }),
        )
        .await;
    }

    let first = send(&app, Method::GET, "/api/books", None).await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["pageSize"], 10);
    assert_eq!(first.body["currentPage"], 1);
    assert_eq!(first.body["totalItems"], 12);
    assert_eq!(first.body["totalPages"], 2);
    assert_eq!(first.body["books"].as_array().unwrap().len(), 10);

    let past_end = send(&app, Method::GET, "/api/books?page=7&pageSize=5", None).await;
    assert_eq!(past_end.status, StatusCode::OK);
    assert_eq!(past_end.body["currentPage"], 3);
    assert_eq!(past_end.body["totalPages"], 3);
    assert_eq!(past_end.body["isOverLastPage"], true);
    let titles: Vec<&str> = past_end.body["books"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, vec!["Book 10", "Book 11"]);
}

#[tokio::test]
async fn listing_rejects_non_positive_paging() {
    let app = app().await;
    for uri in [
        "/api/books?page=0",
        "/api/books?pageSize=0",
        "/api/books?page=-2&pageSize=10",
        "/api/books?page=abc",
    ] {
        let reply = send(&app, Method::GET, uri, None).await;
        assert_eq!(reply.status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(reply.body["statusCode"], 400);
    }
}

#[tokio::test]
async fn overlong_title_is_rejected_without_insert() {
    let app = app().await;
    let mut book = dune();
    book["title"] = json!("x".repeat(201));

    let reply = send(&app, Method::POST, "/api/books", Some(book)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["details"][0]["field"], "title");

    let listing = send(&app, Method::GET, "/api/books", None).await;
    assert_eq!(listing.body["totalItems"], 0);
}

#[tokio::test]
async fn create_reports_every_violation() {
    let app = app().await;
    let reply = send(
        &app,
        Method::POST,
        "/api/books",
        Some(json!({ "title": "", "author": "", "price": 0, "publicationDate": "2999-01-01" })),
    )
    .await;

    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = reply.body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["title", "author", "publicationDate", "price"]);
}

#[tokio::test]
async fn malformed_json_is_bad_request() {
    let app = app().await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/books")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_by_id_validation_and_not_found() {
    let app = app().await;

    let zero = send(&app, Method::GET, "/api/books/0", None).await;
    assert_eq!(zero.status, StatusCode::BAD_REQUEST);

    let missing = send(&app, Method::GET, "/api/books/99", None).await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
    assert_eq!(missing.body["statusCode"], 404);

    let garbage = send(&app, Method::GET, "/api/books/abc", None).await;
    assert_eq!(garbage.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_replaces_book() {
    let app = app().await;
    let created = create(&app, dune()).await;
    let id = created["id"].as_i64().unwrap();

    let mut changed = created.clone();
    changed["title"] = json!("Dune Messiah");
    changed["price"] = json!(14.5);

    let reply = send(&app, Method::PUT, &format!("/api/books/{id}"), Some(changed)).await;
    assert_eq!(reply.status, StatusCode::NO_CONTENT);
    assert_eq!(reply.body, Value::Null);

    let fetched = send(&app, Method::GET, &format!("/api/books/{id}"), None).await;
    assert_eq!(fetched.body["title"], "Dune Messiah");
    assert_eq!(fetched.body["price"], 14.5);
    assert_eq!(fetched.body["version"], 2);
}

#[tokio::test]
async fn update_with_mismatched_id_leaves_store_untouched() {
    let app = app().await;
    for _ in 0..6 {
        create(&app, dune()).await;
    }
    let before = send(&app, Method::GET, "/api/books/5", None).await;

    let mut body = before.body.clone();
    body["id"] = json!(6);
    body["title"] = json!("Changed");

    let reply = send(&app, Method::PUT, "/api/books/5", Some(body)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["message"], "Book ID mismatch");

    assert_eq!(send(&app, Method::GET, "/api/books/5", None).await.body, before.body);
    assert_eq!(send(&app, Method::GET, "/api/books/6", None).await.body["title"], "Dune");
}

#[tokio::test]
async fn update_with_invalid_fields_is_rejected() {
    let app = app().await;
    let created = create(&app, dune()).await;
    let id = created["id"].as_i64().unwrap();

    let mut body = created.clone();
    body["price"] = json!(5000);

    let reply = send(&app, Method::PUT, &format!("/api/books/{id}"), Some(body)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["details"][0]["field"], "price");
}

#[tokio::test]
async fn update_of_missing_book_is_not_found() {
    let app = app().await;
    let mut body = dune();
    body["id"] = json!(41);

    let reply = send(&app, Method::PUT, "/api/books/41", Some(body)).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn update_with_stale_version_conflicts() {
    let app = app().await;
    let created = create(&app, dune()).await;
    let id = created["id"].as_i64().unwrap();
    let uri = format!("/api/books/{id}");

    let mut first = created.clone();
    first["title"] = json!("First");
    assert_eq!(
        send(&app, Method::PUT, &uri, Some(first)).await.status,
        StatusCode::NO_CONTENT
    );

    let mut second = created.clone();
    second["title"] = json!("Second");
    let reply = send(&app, Method::PUT, &uri, Some(second)).await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.body["statusCode"], 409);

    assert_eq!(send(&app, Method::GET, &uri, None).await.body["title"], "First");
}

#[tokio::test]
async fn delete_then_get_is_not_found() {
    let app = app().await;
    let created = create(&app, dune()).await;
    let uri = format!("/api/books/{}", created["id"]);

    let deleted = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    assert_eq!(send(&app, Method::GET, &uri, None).await.status, StatusCode::NOT_FOUND);
    assert_eq!(send(&app, Method::DELETE, &uri, None).await.status, StatusCode::NOT_FOUND);
    assert_eq!(
        send(&app, Method::DELETE, "/api/books/-1", None).await.status,
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn search_without_terms_returns_everything() {
    let app = app().await;
    create(&app, dune()).await;
    create(
        &app,
        json!({ "title": "The Hobbit", "author": "Tolkien", "price": 7.5 }),
    )
    .await;

    let reply = send(&app, Method::GET, "/api/books/search?title=&author=", None).await;
    assert_eq!(reply.body.as_array().unwrap().len(), 2);

    let reply = send(&app, Method::GET, "/api/books/search", None).await;
    assert_eq!(reply.body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn search_terms_are_length_limited() {
    let app = app().await;
    let ok = send(
        &app,
        Method::GET,
        &format!("/api/books/search?title={}", "a".repeat(200)),
        None,
    )
    .await;
    assert_eq!(ok.status, StatusCode::OK);

    let too_long = send(
        &app,
        Method::GET,
        &format!("/api/books/search?author={}", "a".repeat(201)),
        None,
    )
    .await;
    assert_eq!(too_long.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_and_docs_are_served() {
    let app = app().await;
    assert_eq!(send(&app, Method::GET, "/healthz", None).await.status, StatusCode::OK);
    assert_eq!(
        send(&app, Method::GET, "/api/books/health", None).await.status,
        StatusCode::OK
    );

    let docs = send(&app, Method::GET, "/docs/openapi.json", None).await;
    assert_eq!(docs.status, StatusCode::OK);
    assert!(docs.body["paths"]["/api/books"]["get"].is_object());
    assert!(docs.body["paths"]["/api/books/{id}"]["put"].is_object());
    assert!(docs.body["components"]["schemas"]["Book"].is_object());
}

#[tokio::test]
async fn swagger_document_carries_every_books_path() {
    let settings = Settings::default();
    let pool = shelf_db::connect_in_memory().await.unwrap();
    let registry = shelf_app::app::prepare(&settings, &pool).await.unwrap();

    let spec = shelf_http::router::merged_openapi(&registry);
    let document = shelf_http::router::openapi_document(&spec).unwrap();

    for path in [
        "/healthz",
        "/api/books",
        "/api/books/{id}",
        "/api/books/search",
        "/api/books/health",
    ] {
        assert!(document.paths.paths.contains_key(path), "missing {path}");
    }

    let app = shelf_http::build_router(&registry, &settings).unwrap();
    let served = send(&app, Method::GET, "/api-docs/openapi.json", None).await;
    assert_eq!(served.status, StatusCode::OK);
    assert!(served.body["paths"]["/api/books/search"]["get"].is_object());
}

/// Store that counts calls and fails every one of them.
#[derive(Default)]
struct BrokenStore {
    calls: AtomicUsize,
}

impl BrokenStore {
    fn fail<T>(&self) -> Result<T, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Database(sqlx::Error::PoolClosed))
    }
}

#[async_trait]
impl BookStore for BrokenStore {
    async fn list(&self, _offset: i64, _limit: i64) -> Result<Vec<Book>, StoreError> {
        self.fail()
    }
    async fn count(&self) -> Result<i64, StoreError> {
        self.fail()
    }
    async fn get_by_id(&self, _id: i64) -> Result<Book, StoreError> {
        self.fail()
    }
    async fn create(&self, _book: &CreateBook) -> Result<Book, StoreError> {
        self.fail()
    }
    async fn update(&self, _book: &Book) -> Result<(), StoreError> {
        self.fail()
    }
    async fn delete(&self, _id: i64) -> Result<(), StoreError> {
        self.fail()
    }
    async fn exists(&self, _id: i64) -> Result<bool, StoreError> {
        self.fail()
    }
    async fn search(&self, _title: &str, _author: &str) -> Result<Vec<Book>, StoreError> {
        self.fail()
    }
}

fn broken_app(store: Arc<BrokenStore>) -> Router {
    RouterBuilder::new()
        .with_panic_boundary()
        .mount_module("books", handlers::router(store))
        .build()
}

#[tokio::test]
async fn rejected_requests_never_reach_the_store() {
    let store = Arc::new(BrokenStore::default());
    let app = broken_app(store.clone());

    let mut mismatched = dune();
    mismatched["id"] = json!(6);
    let reply = send(&app, Method::PUT, "/api/books/5", Some(mismatched)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let mut invalid = dune();
    invalid["title"] = json!("x".repeat(201));
    let reply = send(&app, Method::POST, "/api/books", Some(invalid)).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = send(&app, Method::GET, "/api/books?page=0", None).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    assert_eq!(store.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn store_failures_become_uniform_500() {
    let store = Arc::new(BrokenStore::default());
    let app = broken_app(store.clone());

    let reply = send(&app, Method::GET, "/api/books/1", None).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(reply.body["statusCode"], 500);
    assert_eq!(reply.body["message"], "An unexpected error occurred.");
    assert!(reply.body["details"].as_str().unwrap().contains("pool"));

    let reply = send(&app, Method::GET, "/api/books", None).await;
    assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(store.calls.load(Ordering::SeqCst), 2);
}
