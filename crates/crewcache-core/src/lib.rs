//! crewcache core - typed API client, query cache and query bindings for the
//! volunteer/project management admin API.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod queries;
pub mod retry;
pub mod utils;
