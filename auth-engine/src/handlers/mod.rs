//! Transport-agnostic request handlers.
//!
//! Each handler validates its request body, drives the services held in
//! [`AppState`](crate::AppState) and converts failures into
//! [`AppError`](service_core::error::AppError) for the caller's transport.

pub mod admin;
pub mod auth;
