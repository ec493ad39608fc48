//! Shelf application library
//!
//! Wires the book catalogue module into the shelf kernel and HTTP server.

pub mod app;
pub mod modules;

pub use modules::*;
