//! # Oracle API Server Library
//!
//! HTTP surface of Oracle: accounts, generation (buffered and streaming),
//! artifact history, mock billing and settings.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Session gate, rate limiting, security headers, error pages
//! - `routes`: Route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
