//! Common utilities and types shared across the service crates.

#![warn(clippy::pedantic)]

/// Module for common configuration
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (header fields, unverified claims, iat checks)
pub mod jwt;

/// Module for tracing subscriber initialisation
pub mod telemetry;
