//! REST API client module for the volunteer management service.
//!
//! This module provides the `ApiClient`, with one method per entity
//! operation: users, projects (and volunteer assignment), activities,
//! skills (and per-user skills), resources and work logs.
//!
//! Requests carry a bearer token obtained from the authentication endpoint.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
