use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const TITLE_MAX_LEN: usize = 200;
pub const AUTHOR_MAX_LEN: usize = 100;
pub const PRICE_MIN: f64 = 0.01;
pub const PRICE_MAX: f64 = 1000.00;

/// Publication date used when a client does not send one.
pub fn default_publication_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// A book as stored in the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    /// Store-assigned identifier
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default = "default_publication_date")]
    pub publication_date: NaiveDate,
    #[serde(default)]
    pub price: f64,
    /// Concurrency token, bumped by the store on every update.
    /// When a client sends it back on update it must still match.
    #[serde(default)]
    pub version: Option<i64>,
}

/// Request model for creating a new book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBook {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default = "default_publication_date")]
    pub publication_date: NaiveDate,
    #[serde(default)]
    pub price: f64,
}

/// A single failed field rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: &'static str,
    pub message: &'static str,
}

impl Violation {
    const fn new(field: &'static str, message: &'static str) -> Self {
        Self { field, message }
    }
}

impl Book {
    pub fn validate(&self) -> Vec<Violation> {
        self.validate_on(Utc::now().date_naive())
    }

    pub fn validate_on(&self, today: NaiveDate) -> Vec<Violation> {
        validate_fields(
            &self.title,
            &self.author,
            self.publication_date,
            self.price,
            today,
        )
    }
}

impl CreateBook {
    pub fn validate(&self) -> Vec<Violation> {
        self.validate_on(Utc::now().date_naive())
    }

    pub fn validate_on(&self, today: NaiveDate) -> Vec<Violation> {
        validate_fields(
            &self.title,
            &self.author,
            self.publication_date,
            self.price,
            today,
        )
    }
}

/// Check every field rule; an empty result means the record may be written.
pub fn validate_fields(
    title: &str,
    author: &str,
    publication_date: NaiveDate,
    price: f64,
    today: NaiveDate,
) -> Vec<Violation> {
    let mut violations = Vec::new();

    if title.trim().is_empty() {
        violations.push(Violation::new("title", "Title is required."));
    } else if title.chars().count() > TITLE_MAX_LEN {
        violations.push(Violation::new(
            "title",
            "Title can't be longer than 200 characters.",
        ));
    }

    if author.trim().is_empty() {
        violations.push(Violation::new("author", "Author is required."));
    } else if author.chars().count() > AUTHOR_MAX_LEN {
        violations.push(Violation::new(
            "author",
            "Author name can't be longer than 100 characters.",
        ));
    }

    if publication_date > today {
        violations.push(Violation::new(
            "publicationDate",
            "Publication date cannot be in the future.",
        ));
    }

    // NaN fails the range check too.
    if !(PRICE_MIN..=PRICE_MAX).contains(&price) {
        violations.push(Violation::new(
            "price",
            "Price must be between $0.01 and $1000.",
        ));
    }

    violations
}
