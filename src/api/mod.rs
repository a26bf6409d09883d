//! REST API for submitting analyses and polling their results.

pub mod handlers;
pub mod models;
pub mod server;

pub use server::{build_router, serve, AppState};
