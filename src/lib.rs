//! License Sentry - license validation with offline resilience
//!
//! This library implements the licensing subsystem for self-hosted deployments:
//! persistent license state, periodic revalidation against a remote authority,
//! graceful degradation when that authority is unreachable, and a request-path
//! gate that enforces license validity on business routes.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod scheduler;
pub mod service;
pub mod validator;
