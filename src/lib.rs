//! # Social Connect API Library
//!
//! This library provides the core functionality for the Social Connect API
//! service: OAuth authorization flows, encrypted token storage, and lazy
//! token refresh for the supported social platforms.

pub mod auth;
pub mod config;
pub mod credentials;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod pkce;
pub mod platforms;
pub mod repositories;
pub mod server;
pub mod telemetry;
pub mod token_manager;
pub use migration;
